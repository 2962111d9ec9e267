use std::collections::HashMap;

use anyhow::Context;

use crate::docx::package::OfficePackage;
use crate::docx::substitute::{replace_in_slots, ReplacementMap};
use crate::docx::xml::{collect_text_slots, element_end, parse_xml_part, write_events, XmlEvent, XmlPart};

const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

fn is_worksheet(name: &str) -> bool {
    name.starts_with("xl/worksheets/") && name.ends_with(".xml") && !name["xl/worksheets/".len()..].contains('/')
}

/// A spreadsheet template: the shared string table and the worksheets' inline strings.
pub struct Workbook {
    package: OfficePackage,
    parts: Vec<XmlPart>,
}

impl Workbook {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let package = OfficePackage::from_bytes(bytes).context("open xlsx package")?;
        let mut parts = Vec::new();
        for ent in package.xml_entries() {
            if ent.name != SHARED_STRINGS_PART && !is_worksheet(&ent.name) {
                continue;
            }
            parts.push(
                parse_xml_part(&ent.name, &ent.data)
                    .with_context(|| format!("parse xml: {}", ent.name))?,
            );
        }
        if !parts.iter().any(|p| is_worksheet(&p.name)) {
            anyhow::bail!("workbook has no worksheets");
        }
        Ok(Self { package, parts })
    }

    /// Replaces markers in every string item (`<si>`) and inline string (`<is>`). Phonetic
    /// runs are left alone.
    pub fn substitute(&mut self, map: &ReplacementMap) -> usize {
        if map.is_empty() {
            return 0;
        }
        let ordered = map.ordered();
        let mut count = 0;
        for part in &mut self.parts {
            let container = if part.name == SHARED_STRINGS_PART { "si" } else { "is" };
            let mut i = 0;
            while i < part.events.len() {
                if !part.events[i].is_start(container) {
                    i += 1;
                    continue;
                }
                let Ok(end) = element_end(&part.events, i) else {
                    tracing::warn!(part = %part.name, "unclosed string item, rest of part skipped");
                    break;
                };
                let item = &mut part.events[i..end];
                for (marker, value) in &ordered {
                    let slots = collect_text_slots(item, "t", &["rPh"]);
                    count += replace_in_slots(item, &slots, marker, value);
                }
                i = end;
            }
        }
        count
    }

    /// Plain text of every shared string, in table order.
    pub fn shared_strings(&self) -> Vec<String> {
        let Some(part) = self.parts.iter().find(|p| p.name == SHARED_STRINGS_PART) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut i = 0;
        while i < part.events.len() {
            if !part.events[i].is_start("si") {
                i += 1;
                continue;
            }
            let end = element_end(&part.events, i).unwrap_or(part.events.len());
            let item = &part.events[i..end];
            let text: String = collect_text_slots(item, "t", &["rPh"])
                .iter()
                .filter_map(|s| match &item[s.text_index] {
                    XmlEvent::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            out.push(text);
            i = end;
        }
        out
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
        for part in &self.parts {
            let bytes = write_events(&part.events)
                .with_context(|| format!("serialize xml: {}", part.name))?;
            replacements.insert(part.name.clone(), bytes);
        }
        self.package.to_bytes_with_replacements(&replacements)
    }
}
