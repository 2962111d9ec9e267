use std::cell::Cell;
use std::collections::HashMap;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::GenerationError;
use crate::templates::TemplateSource;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

pub fn zip_bytes(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zout.start_file(*name, SimpleFileOptions::default())
            .expect("start file");
        zout.write_all(body.as_bytes()).expect("write file");
    }
    zout.finish().expect("finish zip").into_inner()
}

pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

pub fn docx_bytes(body: &str) -> Vec<u8> {
    docx_with_header(body, None)
}

pub fn docx_with_header(body: &str, header: Option<&str>) -> Vec<u8> {
    let document = document_xml(body);
    let mut parts: Vec<(&str, &str)> = vec![
        ("[Content_Types].xml", r#"<?xml version="1.0" encoding="UTF-8"?><Types/>"#),
        ("word/document.xml", document.as_str()),
    ];
    let header_xml = header.map(|h| {
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><w:hdr xmlns:w="{W_NS}">{h}</w:hdr>"#)
    });
    if let Some(h) = header_xml.as_deref() {
        parts.push(("word/header1.xml", h));
    }
    zip_bytes(&parts)
}

pub fn para(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

pub fn table(rows: &[Vec<String>]) -> String {
    let mut out = String::from("<w:tbl><w:tblPr/>");
    for row in rows {
        out.push_str("<w:tr>");
        for cell in row {
            out.push_str("<w:tc><w:tcPr/>");
            out.push_str(cell);
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
    out
}

pub fn xlsx_bytes(shared_strings: &[&str], sheet_cells: &str) -> Vec<u8> {
    let mut sst = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    for s in shared_strings {
        // Entries starting with '<' are rich text items given as raw XML.
        if s.starts_with('<') {
            sst.push_str("<si>");
            sst.push_str(s);
            sst.push_str("</si>");
        } else {
            sst.push_str("<si><t>");
            sst.push_str(s);
            sst.push_str("</t></si>");
        }
    }
    sst.push_str("</sst>");
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_cells}</sheetData></worksheet>"#
    );
    zip_bytes(&[
        ("[Content_Types].xml", r#"<?xml version="1.0" encoding="UTF-8"?><Types/>"#),
        ("xl/sharedStrings.xml", sst.as_str()),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ])
}

/// In-memory templates that count how often they are opened.
#[derive(Default)]
pub struct MemoryTemplates {
    pub files: HashMap<String, Vec<u8>>,
    pub loads: Cell<usize>,
}

impl MemoryTemplates {
    pub fn with(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), bytes);
        self
    }
}

impl TemplateSource for MemoryTemplates {
    fn load(&self, name: &str) -> Result<Vec<u8>, GenerationError> {
        self.loads.set(self.loads.get() + 1);
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| GenerationError::TemplateUnavailable {
                name: name.to_string(),
                reason: "not registered".to_string(),
            })
    }
}
