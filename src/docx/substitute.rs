use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::tree::{for_each_paragraph, Body, DocumentTree, Paragraph, Table, MAX_NESTING};
use crate::docx::xml::{set_attr_value, TextSlot, XmlEvent};

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z][A-Za-z0-9_]*").expect("marker regex"));

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplacementMap {
    entries: Vec<(String, String)>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, marker: impl Into<String>, value: impl Display) {
        let marker = marker.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == marker) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((marker, value)),
        }
    }

    pub fn get(&self, marker: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == marker)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Application order: longest marker first, so `@rank1` can never eat into `@rank10_sum`.
    pub(crate) fn ordered(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self.iter().collect();
        out.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        out
    }
}

/// Replaces every occurrence of `marker` in the concatenation of `texts`.
///
/// The replacement goes into the piece where the occurrence starts; the remainder of the
/// marker is cut out of the following pieces. Replacement text is never rescanned.
pub(crate) fn replace_across(texts: &mut [String], marker: &str, value: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut search_from = 0usize;
    loop {
        let joined: String = texts.concat();
        let Some(rel) = joined.get(search_from..).and_then(|rest| rest.find(marker)) else {
            break;
        };
        let start = search_from + rel;
        let end = start + marker.len();

        let mut offset = 0usize;
        let mut placed = false;
        for piece in texts.iter_mut() {
            let lo = offset;
            let hi = offset + piece.len();
            offset = hi;
            if hi <= start || lo >= end {
                continue;
            }
            let cut_lo = start.max(lo) - lo;
            let cut_hi = end.min(hi) - lo;
            let with = if placed { "" } else { value };
            placed = true;
            piece.replace_range(cut_lo..cut_hi, with);
        }

        count += 1;
        search_from = start + value.len();
    }
    count
}

pub(crate) fn replace_in_slots(
    events: &mut [XmlEvent],
    slots: &[TextSlot],
    marker: &str,
    value: &str,
) -> usize {
    if slots.is_empty() {
        return 0;
    }
    let mut texts: Vec<String> = slots
        .iter()
        .map(|s| match &events[s.text_index] {
            XmlEvent::Text { text } => text.clone(),
            _ => String::new(),
        })
        .collect();
    let count = replace_across(&mut texts, marker, value);
    if count == 0 {
        return 0;
    }
    for (slot, new_text) in slots.iter().zip(texts) {
        let edge_space = new_text.starts_with(' ') || new_text.ends_with(' ');
        if let XmlEvent::Text { text } = &mut events[slot.text_index] {
            if *text == new_text {
                continue;
            }
            *text = new_text;
        }
        if edge_space {
            set_attr_value(&mut events[slot.elem_index], "xml:space", "preserve");
        }
    }
    count
}

fn substitute_paragraph(paragraph: &mut Paragraph, ordered: &[(&str, &str)]) -> usize {
    let text = paragraph.text();
    let mut count = 0;
    for (marker, value) in ordered {
        if !text.contains(marker) {
            continue;
        }
        count += paragraph.replace_all(marker, value);
    }
    count
}

pub fn substitute_paragraphs<'a>(
    paragraphs: impl IntoIterator<Item = &'a mut Paragraph>,
    map: &ReplacementMap,
) -> usize {
    let ordered = map.ordered();
    paragraphs
        .into_iter()
        .map(|p| substitute_paragraph(p, &ordered))
        .sum()
}

pub fn substitute_tables<'a>(
    tables: impl IntoIterator<Item = &'a mut Table>,
    map: &ReplacementMap,
) -> usize {
    let ordered = map.ordered();
    tables
        .into_iter()
        .map(|t| substitute_table(t, &ordered, 1))
        .sum()
}

fn substitute_table(table: &mut Table, ordered: &[(&str, &str)], depth: usize) -> usize {
    if depth > MAX_NESTING {
        tracing::warn!(depth, "table nesting limit reached, inner tables left as is");
        return 0;
    }
    let mut count = 0;
    for row in table.rows_mut() {
        for cell in row.cells_mut() {
            for p in cell.paragraphs_mut() {
                count += substitute_paragraph(p, ordered);
            }
            for nested in cell.tables_mut() {
                count += substitute_table(nested, ordered, depth + 1);
            }
        }
    }
    count
}

fn substitute_body(body: &mut Body, map: &ReplacementMap) -> usize {
    substitute_paragraphs(body.paragraphs_mut(), map) + substitute_tables(body.tables_mut(), map)
}

pub fn substitute_document(doc: &mut DocumentTree, map: &ReplacementMap) -> usize {
    if map.is_empty() {
        return 0;
    }
    let count = doc.bodies_mut().map(|b| substitute_body(b, map)).sum();
    let leftovers = unresolved_markers(&doc.body);
    if !leftovers.is_empty() {
        tracing::debug!(markers = ?leftovers, "markers without a value left in document");
    }
    count
}

pub fn unresolved_markers(body: &Body) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for_each_paragraph(&body.blocks, &mut |p| {
        for m in MARKER_RE.find_iter(&p.text()) {
            if !found.iter().any(|f| f == m.as_str()) {
                found.push(m.as_str().to_string());
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::{replace_across, substitute_document, unresolved_markers, ReplacementMap};
    use crate::docx::testutil::{docx_bytes, docx_with_header, para, table};
    use crate::docx::tree::{Block, DocumentTree};

    fn pieces(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replaces_every_occurrence_in_one_piece() {
        let mut texts = pieces(&["@x and @x"]);
        assert_eq!(replace_across(&mut texts, "@x", "1"), 2);
        assert_eq!(texts, pieces(&["1 and 1"]));
    }

    #[test]
    fn replaces_marker_split_across_runs() {
        let mut texts = pieces(&["Сума: @bill", "_s", "um грн"]);
        assert_eq!(replace_across(&mut texts, "@bill_sum", "1500.00"), 1);
        assert_eq!(texts, pieces(&["Сума: 1500.00", "", " грн"]));
    }

    #[test]
    fn replacement_is_not_rescanned() {
        let mut texts = pieces(&["@a"]);
        assert_eq!(replace_across(&mut texts, "@a", "@a@a"), 1);
        assert_eq!(texts, pieces(&["@a@a"]));
    }

    #[test]
    fn longest_marker_wins() {
        let mut map = ReplacementMap::new();
        map.insert("@rank1", "X");
        map.insert("@rank10_sum", "Y");
        let body = para("@rank10_sum / @rank1");
        let mut doc = DocumentTree::from_bytes(&docx_bytes(&body)).expect("load");
        substitute_document(&mut doc, &map);
        let Block::Paragraph(p) = &doc.body.blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.text(), "Y / X");
    }

    #[test]
    fn empty_map_leaves_document_unchanged() {
        let body = format!("{}{}", para("@x"), table(&[vec![para("@y")]]));
        let bytes = docx_bytes(&body);
        let mut doc = DocumentTree::from_bytes(&bytes).expect("load");
        let before = doc.body.clone();
        assert_eq!(substitute_document(&mut doc, &ReplacementMap::new()), 0);
        assert_eq!(doc.body, before);
    }

    #[test]
    fn reaches_paragraphs_nested_and_doubly_nested_cells() {
        let doubly = table(&[vec![para("deep @x")]]);
        let nested = table(&[vec![format!("{}{}", para("mid @x"), doubly)]]);
        let body = format!("{}{}", para("top @x"), nested);
        let mut doc = DocumentTree::from_bytes(&docx_bytes(&body)).expect("load");

        let mut map = ReplacementMap::new();
        map.insert("@x", "ok");
        assert_eq!(substitute_document(&mut doc, &map), 3);
        assert!(unresolved_markers(&doc.body).is_empty());
    }

    #[test]
    fn substitutes_headers() {
        let bytes = docx_with_header(&para("body"), Some(&para("Рік @year")));
        let mut doc = DocumentTree::from_bytes(&bytes).expect("load");
        let mut map = ReplacementMap::new();
        map.insert("@year", 2024);
        assert_eq!(substitute_document(&mut doc, &map), 1);
        let Block::Paragraph(p) = &doc.stories[0].blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.text(), "Рік 2024");
    }

    #[test]
    fn unknown_markers_stay() {
        let mut doc = DocumentTree::from_bytes(&docx_bytes(&para("@known @unknown"))).expect("load");
        let mut map = ReplacementMap::new();
        map.insert("@known", "v");
        substitute_document(&mut doc, &map);
        assert_eq!(unresolved_markers(&doc.body), vec!["@unknown".to_string()]);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut map = ReplacementMap::new();
        map.insert("@a", 1);
        map.insert("@a", 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("@a"), Some("2"));
    }
}
