use serde::{Deserialize, Serialize};

use crate::docx::tree::{for_each_paragraph_mut, DocumentTree};
use crate::docx::xml::{element_end, XmlEvent};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseStyle {
    pub font: String,
    pub size_pt: f32,
}

impl Default for HouseStyle {
    fn default() -> Self {
        Self {
            font: "Times New Roman".to_string(),
            size_pt: 12.0,
        }
    }
}

impl HouseStyle {
    fn half_points(&self) -> String {
        ((self.size_pt * 2.0).round().max(1.0) as u32).to_string()
    }
}

/// Child order of `w:rPr` (CT_RPr); Word rejects parts where it is violated.
const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

const REPLACED: &[&str] = &["w:rFonts", "w:sz", "w:szCs"];

fn rank(name: Option<&str>) -> usize {
    name.and_then(|n| RPR_ORDER.iter().position(|o| *o == n))
        .unwrap_or(RPR_ORDER.len())
}

fn style_elements(style: &HouseStyle) -> Vec<Vec<XmlEvent>> {
    let size = style.half_points();
    let font = style.font.as_str();
    vec![
        vec![XmlEvent::empty(
            "w:rFonts",
            &[("w:ascii", font), ("w:hAnsi", font), ("w:cs", font)],
        )],
        vec![XmlEvent::empty("w:sz", &[("w:val", size.as_str())])],
        vec![XmlEvent::empty("w:szCs", &[("w:val", size.as_str())])],
    ]
}

fn property_chunks(events: &[XmlEvent], start: usize, end: usize) -> Option<Vec<Vec<XmlEvent>>> {
    let mut chunks = Vec::new();
    let mut j = start + 1;
    while j < end - 1 {
        match &events[j] {
            XmlEvent::Text { .. } | XmlEvent::Comment { .. } => j += 1,
            _ => {
                let next = element_end(events, j).ok()?;
                chunks.push(events[j..next].to_vec());
                j = next;
            }
        }
    }
    Some(chunks)
}

pub fn restyle_runs(events: &mut Vec<XmlEvent>, style: &HouseStyle) -> usize {
    let mut out = Vec::with_capacity(events.len() + 8);
    let mut touched = 0;
    let mut i = 0;
    while i < events.len() {
        if !events[i].is_start("w:r") {
            out.push(events[i].clone());
            i += 1;
            continue;
        }
        out.push(events[i].clone());
        i += 1;

        let mut chunks = Vec::new();
        match events.get(i) {
            Some(ev) if ev.is_start("w:rPr") => {
                let end = element_end(events, i).ok();
                let existing = end.and_then(|end| property_chunks(events, i, end));
                match (end, existing) {
                    (Some(end), Some(existing)) => {
                        chunks = existing;
                        i = end;
                    }
                    _ => continue,
                }
            }
            Some(ev) if ev.is_empty_elem("w:rPr") => i += 1,
            _ => {}
        }

        chunks.retain(|c| !REPLACED.contains(&c[0].name().unwrap_or("")));
        chunks.extend(style_elements(style));
        chunks.sort_by_key(|c| rank(c[0].name()));

        out.push(XmlEvent::start("w:rPr", &[]));
        out.extend(chunks.into_iter().flatten());
        out.push(XmlEvent::end("w:rPr"));
        touched += 1;
    }
    *events = out;
    touched
}

pub fn apply_house_style(doc: &mut DocumentTree, style: &HouseStyle) -> usize {
    let mut touched = 0;
    for body in doc.bodies_mut() {
        for_each_paragraph_mut(&mut body.blocks, &mut |p| {
            touched += restyle_runs(&mut p.events, style);
        });
    }
    tracing::debug!(runs = touched, font = %style.font, "house style applied");
    touched
}
