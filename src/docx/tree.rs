//! Owned block tree over WordprocessingML parts.
//!
//! A part is split into the events before its container (`w:body`, `w:hdr`, `w:ftr`), the
//! blocks inside it and the events after it. Paragraphs keep their raw events; tables are
//! parsed into rows and cells, and every cell holds blocks again, so nested tables of any
//! depth (up to [`MAX_NESTING`]) are plain owned values. Anything the tree does not model is
//! kept as `Raw` events so writing the tree back is lossless.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context};

use crate::docx::package::OfficePackage;
use crate::docx::substitute::replace_in_slots;
use crate::docx::xml::{collect_text_slots, element_end, parse_xml_part, write_events, XmlEvent};

/// Deepest table-in-cell nesting accepted when loading a template.
pub const MAX_NESTING: usize = 64;

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Raw(Vec<XmlEvent>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    pub events: Vec<XmlEvent>,
}

impl Paragraph {
    pub fn from_events(events: Vec<XmlEvent>) -> Self {
        Self { events }
    }

    pub fn with_text(text: &str, bold: bool) -> Self {
        let mut events = vec![XmlEvent::start("w:p", &[])];
        if !text.is_empty() {
            events.push(XmlEvent::start("w:r", &[]));
            if bold {
                events.push(XmlEvent::start("w:rPr", &[]));
                events.push(XmlEvent::empty("w:b", &[]));
                events.push(XmlEvent::end("w:rPr"));
            }
            events.push(XmlEvent::start("w:t", &[("xml:space", "preserve")]));
            events.push(XmlEvent::text(text));
            events.push(XmlEvent::end("w:t"));
            events.push(XmlEvent::end("w:r"));
        }
        events.push(XmlEvent::end("w:p"));
        Self { events }
    }

    /// Visible text: the `w:t` nodes of this paragraph, excluding text boxes nested inside it.
    pub fn text(&self) -> String {
        collect_text_slots(&self.events, "w:t", &["w:p"])
            .iter()
            .filter_map(|s| match &self.events[s.text_index] {
                XmlEvent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn replace_all(&mut self, marker: &str, value: &str) -> usize {
        let slots = collect_text_slots(&self.events, "w:t", &["w:p"]);
        replace_in_slots(&mut self.events, &slots, marker, value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    start: XmlEvent,
    pub items: Vec<TableItem>,
    end: XmlEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TableItem {
    Row(Row),
    Raw(Vec<XmlEvent>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    start: XmlEvent,
    pub items: Vec<RowItem>,
    end: XmlEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RowItem {
    Cell(Cell),
    Raw(Vec<XmlEvent>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    start: XmlEvent,
    pub blocks: Vec<Block>,
    end: XmlEvent,
}

impl Table {
    pub fn new(properties: Vec<XmlEvent>, rows: Vec<Row>) -> Self {
        let mut items = Vec::with_capacity(rows.len() + 1);
        if !properties.is_empty() {
            items.push(TableItem::Raw(properties));
        }
        items.extend(rows.into_iter().map(TableItem::Row));
        Self {
            start: XmlEvent::start("w:tbl", &[]),
            items,
            end: XmlEvent::end("w:tbl"),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.items.iter().filter_map(|i| match i {
            TableItem::Row(r) => Some(r),
            TableItem::Raw(_) => None,
        })
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.items.iter_mut().filter_map(|i| match i {
            TableItem::Row(r) => Some(r),
            TableItem::Raw(_) => None,
        })
    }

    fn push_events(&self, out: &mut Vec<XmlEvent>) {
        out.push(self.start.clone());
        for item in &self.items {
            match item {
                TableItem::Row(r) => r.push_events(out),
                TableItem::Raw(evs) => out.extend(evs.iter().cloned()),
            }
        }
        out.push(self.end.clone());
    }
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            start: XmlEvent::start("w:tr", &[]),
            items: cells.into_iter().map(RowItem::Cell).collect(),
            end: XmlEvent::end("w:tr"),
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.items.iter().filter_map(|i| match i {
            RowItem::Cell(c) => Some(c),
            RowItem::Raw(_) => None,
        })
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.items.iter_mut().filter_map(|i| match i {
            RowItem::Cell(c) => Some(c),
            RowItem::Raw(_) => None,
        })
    }

    fn push_events(&self, out: &mut Vec<XmlEvent>) {
        out.push(self.start.clone());
        for item in &self.items {
            match item {
                RowItem::Cell(c) => c.push_events(out),
                RowItem::Raw(evs) => out.extend(evs.iter().cloned()),
            }
        }
        out.push(self.end.clone());
    }
}

impl Cell {
    /// A cell of fixed width (twentieths of a point) holding `blocks`. A cell must end with
    /// a paragraph, so one is appended when `blocks` has none.
    pub fn new(width: u32, mut blocks: Vec<Block>) -> Self {
        if !matches!(blocks.last(), Some(Block::Paragraph(_))) {
            blocks.push(Block::Paragraph(Paragraph::with_text("", false)));
        }
        let width = width.to_string();
        let mut all = vec![Block::Raw(vec![
            XmlEvent::start("w:tcPr", &[]),
            XmlEvent::empty("w:tcW", &[("w:w", width.as_str()), ("w:type", "dxa")]),
            XmlEvent::end("w:tcPr"),
        ])];
        all.extend(blocks);
        Self {
            start: XmlEvent::start("w:tc", &[]),
            blocks: all,
            end: XmlEvent::end("w:tc"),
        }
    }

    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut Paragraph> {
        self.blocks.iter_mut().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.blocks.iter_mut().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Paragraph texts of this cell joined by newlines, nested tables excluded.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(p) => Some(p.text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push_events(&self, out: &mut Vec<XmlEvent>) {
        out.push(self.start.clone());
        push_blocks(&self.blocks, out);
        out.push(self.end.clone());
    }
}

fn push_blocks(blocks: &[Block], out: &mut Vec<XmlEvent>) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => out.extend(p.events.iter().cloned()),
            Block::Table(t) => t.push_events(out),
            Block::Raw(evs) => out.extend(evs.iter().cloned()),
        }
    }
}

pub fn for_each_paragraph(blocks: &[Block], f: &mut dyn FnMut(&Paragraph)) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => f(p),
            Block::Table(t) => {
                for row in t.rows() {
                    for cell in row.cells() {
                        for_each_paragraph(&cell.blocks, f);
                    }
                }
            }
            Block::Raw(_) => {}
        }
    }
}

pub fn for_each_paragraph_mut(blocks: &mut [Block], f: &mut dyn FnMut(&mut Paragraph)) {
    for block in blocks.iter_mut() {
        match block {
            Block::Paragraph(p) => f(p),
            Block::Table(t) => {
                for row in t.rows_mut() {
                    for cell in row.cells_mut() {
                        for_each_paragraph_mut(&mut cell.blocks, f);
                    }
                }
            }
            Block::Raw(_) => {}
        }
    }
}

fn parse_blocks(events: &[XmlEvent], pos: &mut usize, depth: usize) -> anyhow::Result<Vec<Block>> {
    let mut blocks = Vec::new();
    while let Some(ev) = events.get(*pos) {
        if matches!(ev, XmlEvent::End { .. }) {
            break;
        }
        if ev.is_start("w:p") || ev.is_empty_elem("w:p") {
            let end = element_end(events, *pos)?;
            blocks.push(Block::Paragraph(Paragraph::from_events(events[*pos..end].to_vec())));
            *pos = end;
        } else if ev.is_start("w:tbl") {
            blocks.push(Block::Table(parse_table(events, pos, depth + 1)?));
        } else {
            let end = element_end(events, *pos)?;
            blocks.push(Block::Raw(events[*pos..end].to_vec()));
            *pos = end;
        }
    }
    Ok(blocks)
}

fn parse_table(events: &[XmlEvent], pos: &mut usize, depth: usize) -> anyhow::Result<Table> {
    if depth > MAX_NESTING {
        bail!("tables nested deeper than {MAX_NESTING} levels");
    }
    let start = events[*pos].clone();
    *pos += 1;
    let mut items = Vec::new();
    loop {
        let ev = events
            .get(*pos)
            .ok_or_else(|| anyhow!("unclosed <w:tbl>"))?;
        if ev.is_end("w:tbl") {
            *pos += 1;
            return Ok(Table {
                start,
                items,
                end: ev.clone(),
            });
        }
        if ev.is_start("w:tr") {
            items.push(TableItem::Row(parse_row(events, pos, depth)?));
        } else {
            let end = element_end(events, *pos)?;
            items.push(TableItem::Raw(events[*pos..end].to_vec()));
            *pos = end;
        }
    }
}

fn parse_row(events: &[XmlEvent], pos: &mut usize, depth: usize) -> anyhow::Result<Row> {
    let start = events[*pos].clone();
    *pos += 1;
    let mut items = Vec::new();
    loop {
        let ev = events.get(*pos).ok_or_else(|| anyhow!("unclosed <w:tr>"))?;
        if ev.is_end("w:tr") {
            *pos += 1;
            return Ok(Row {
                start,
                items,
                end: ev.clone(),
            });
        }
        if ev.is_start("w:tc") {
            let cell_start = ev.clone();
            *pos += 1;
            let blocks = parse_blocks(events, pos, depth)?;
            let end = events.get(*pos).ok_or_else(|| anyhow!("unclosed <w:tc>"))?;
            if !end.is_end("w:tc") {
                bail!("unexpected {:?} inside <w:tc>", end.name());
            }
            *pos += 1;
            items.push(RowItem::Cell(Cell {
                start: cell_start,
                blocks,
                end: end.clone(),
            }));
        } else {
            let end = element_end(events, *pos)?;
            items.push(RowItem::Raw(events[*pos..end].to_vec()));
            *pos = end;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub part_name: String,
    prefix: Vec<XmlEvent>,
    pub blocks: Vec<Block>,
    suffix: Vec<XmlEvent>,
}

impl Body {
    pub fn parse(part_name: &str, events: Vec<XmlEvent>, container: &str) -> anyhow::Result<Self> {
        let open = events
            .iter()
            .position(|e| e.is_start(container))
            .ok_or_else(|| anyhow!("{part_name}: no <{container}> element"))?;
        let mut pos = open + 1;
        let blocks = parse_blocks(&events, &mut pos, 0)
            .with_context(|| format!("parse blocks: {part_name}"))?;
        match events.get(pos) {
            Some(ev) if ev.is_end(container) => {}
            other => bail!(
                "{part_name}: expected </{container}>, found {:?}",
                other.and_then(|e| e.name())
            ),
        }
        Ok(Self {
            part_name: part_name.to_string(),
            prefix: events[..=open].to_vec(),
            blocks,
            suffix: events[pos..].to_vec(),
        })
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut out = self.prefix.clone();
        push_blocks(&self.blocks, &mut out);
        out.extend(self.suffix.iter().cloned());
        out
    }

    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut Paragraph> {
        self.blocks.iter_mut().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.blocks.iter_mut().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }
}

fn story_container(part_name: &str) -> Option<&'static str> {
    let file = part_name.strip_prefix("word/")?;
    if file.contains('/') || !file.ends_with(".xml") {
        return None;
    }
    if file.starts_with("header") {
        Some("w:hdr")
    } else if file.starts_with("footer") {
        Some("w:ftr")
    } else {
        None
    }
}

pub struct DocumentTree {
    package: OfficePackage,
    pub body: Body,
    pub stories: Vec<Body>,
}

impl DocumentTree {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let package = OfficePackage::from_bytes(bytes).context("open docx package")?;
        Self::from_package(package)
    }

    pub fn from_package(package: OfficePackage) -> anyhow::Result<Self> {
        let main = package
            .entry(MAIN_DOCUMENT_PART)
            .ok_or_else(|| anyhow!("missing part: {MAIN_DOCUMENT_PART}"))?;
        let part = parse_xml_part(&main.name, &main.data)
            .with_context(|| format!("parse xml: {}", main.name))?;
        let body = Body::parse(&part.name, part.events, "w:body")?;

        let mut stories = Vec::new();
        for ent in package.xml_entries() {
            let Some(container) = story_container(&ent.name) else {
                continue;
            };
            if ent.data.is_empty() {
                continue;
            }
            let part = parse_xml_part(&ent.name, &ent.data)
                .with_context(|| format!("parse xml: {}", ent.name))?;
            stories.push(Body::parse(&part.name, part.events, container)?);
        }

        Ok(Self {
            package,
            body,
            stories,
        })
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        std::iter::once(&mut self.body).chain(self.stories.iter_mut())
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
        for body in std::iter::once(&self.body).chain(self.stories.iter()) {
            let bytes = write_events(&body.to_events())
                .with_context(|| format!("serialize xml: {}", body.part_name))?;
            replacements.insert(body.part_name.clone(), bytes);
        }
        self.package.to_bytes_with_replacements(&replacements)
    }
}
