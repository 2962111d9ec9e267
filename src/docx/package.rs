use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub struct OfficePackage {
    pub entries: Vec<PackageEntry>,
}

pub struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl OfficePackage {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).context("read zip entry")?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn to_bytes_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }

    pub fn xml_entries(&self) -> Vec<&PackageEntry> {
        self.entries
            .iter()
            .filter(|e| e.name.to_lowercase().ends_with(".xml"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::OfficePackage;
    use crate::docx::testutil::docx_bytes;

    #[test]
    fn replacement_swaps_only_named_entry() {
        let bytes = docx_bytes("<w:p><w:r><w:t>x</w:t></w:r></w:p>");
        let pkg = OfficePackage::from_bytes(&bytes).expect("read package");
        let mut repl = HashMap::new();
        repl.insert("word/document.xml".to_string(), b"<changed/>".to_vec());
        let out = pkg.to_bytes_with_replacements(&repl).expect("write package");

        let reread = OfficePackage::from_bytes(&out).expect("reread package");
        assert_eq!(reread.entries.len(), pkg.entries.len());
        assert_eq!(
            reread.entry("word/document.xml").expect("document").data,
            b"<changed/>".to_vec()
        );
        assert_eq!(
            reread.entry("[Content_Types].xml").expect("content types").data,
            pkg.entry("[Content_Types].xml").expect("content types").data
        );
    }

    #[test]
    fn garbage_is_not_a_package() {
        assert!(OfficePackage::from_bytes(b"not a zip").is_err());
    }
}
