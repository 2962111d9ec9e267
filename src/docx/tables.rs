use crate::docx::tree::{Block, Cell, Paragraph, Row, Table};
use crate::docx::xml::XmlEvent;

/// Default column width in twentieths of a point (about 6 cm).
const DEFAULT_COLUMN_WIDTH: u32 = 3400;

#[derive(Clone, Debug, PartialEq)]
pub struct GridTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub column_widths: Vec<u32>,
}

impl GridTable {
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            column_widths: vec![DEFAULT_COLUMN_WIDTH; header.len()],
        }
    }

    pub fn push_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn width(&self, column: usize) -> u32 {
        self.column_widths
            .get(column)
            .copied()
            .unwrap_or(DEFAULT_COLUMN_WIDTH)
    }

    fn properties(&self) -> Vec<XmlEvent> {
        let mut evs = vec![
            XmlEvent::start("w:tblPr", &[]),
            XmlEvent::empty("w:tblW", &[("w:w", "0"), ("w:type", "auto")]),
            XmlEvent::start("w:tblBorders", &[]),
        ];
        for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            evs.push(XmlEvent::empty(
                side,
                &[
                    ("w:val", "single"),
                    ("w:sz", "4"),
                    ("w:space", "0"),
                    ("w:color", "000000"),
                ],
            ));
        }
        evs.push(XmlEvent::end("w:tblBorders"));
        evs.push(XmlEvent::end("w:tblPr"));

        evs.push(XmlEvent::start("w:tblGrid", &[]));
        let columns = self
            .header
            .len()
            .max(self.rows.iter().map(Vec::len).max().unwrap_or(0));
        for c in 0..columns {
            let w = self.width(c).to_string();
            evs.push(XmlEvent::empty("w:gridCol", &[("w:w", w.as_str())]));
        }
        evs.push(XmlEvent::end("w:tblGrid"));
        evs
    }

    fn row(&self, cells: &[String], bold: bool) -> Row {
        let cells = cells
            .iter()
            .enumerate()
            .map(|(i, text)| {
                // Multi-line values (IP lists) become one paragraph per line.
                let blocks = text
                    .split('\n')
                    .map(|line| Block::Paragraph(Paragraph::with_text(line, bold)))
                    .collect();
                Cell::new(self.width(i), blocks)
            })
            .collect();
        Row::new(cells)
    }

    pub fn to_table(&self) -> Table {
        let mut rows = Vec::with_capacity(self.rows.len() + 1);
        if !self.header.is_empty() {
            rows.push(self.row(&self.header, true));
        }
        rows.extend(self.rows.iter().map(|r| self.row(r, false)));
        Table::new(self.properties(), rows)
    }
}

/// Splices `table` right after the first top-level paragraph containing `marker`, removing the
/// marker text from that paragraph. Returns `false` (and leaves `blocks` alone) when no
/// paragraph carries the marker.
pub fn insert_table_at_marker(blocks: &mut Vec<Block>, marker: &str, table: Table) -> bool {
    let found = blocks.iter().position(|b| match b {
        Block::Paragraph(p) => p.text().contains(marker),
        _ => false,
    });
    let Some(idx) = found else {
        tracing::info!(marker, "table marker not found, table dropped");
        return false;
    };
    if let Block::Paragraph(p) = &mut blocks[idx] {
        p.replace_all(marker, "");
    }
    blocks.insert(idx + 1, Block::Table(table));
    true
}

#[cfg(test)]
mod tests {
    use super::{insert_table_at_marker, GridTable};
    use crate::docx::testutil::{docx_bytes, para};
    use crate::docx::tree::{Block, DocumentTree};

    fn models() -> GridTable {
        let mut grid = GridTable::new(&["Модель", "Кількість"]);
        grid.push_row(vec!["DES-3200".to_string(), "4".to_string()]);
        grid.push_row(vec!["SNR-S2985".to_string(), "2".to_string()]);
        grid
    }

    #[test]
    fn grid_has_header_and_rows() {
        let table = models().to_table();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows.len(), 3);
        let header: Vec<String> = rows[0].cells().map(|c| c.text()).collect();
        assert_eq!(header, vec!["Модель", "Кількість"]);
        let last: Vec<String> = rows[2].cells().map(|c| c.text()).collect();
        assert_eq!(last, vec!["SNR-S2985", "2"]);
    }

    #[test]
    fn multi_line_cell_keeps_lines() {
        let mut grid = GridTable::new(&["Пул", "Адреси"]);
        grid.push_row(vec!["10.0.1".to_string(), "10.0.1.2\n10.0.1.3".to_string()]);
        let table = grid.to_table();
        let row = table.rows().nth(1).expect("data row");
        let ips = row.cells().nth(1).expect("ip cell");
        assert_eq!(ips.text(), "10.0.1.2\n10.0.1.3");
    }

    #[test]
    fn splices_after_marker_paragraph() {
        let body = format!("{}{}{}", para("Додаток"), para("@table1"), para("Кінець"));
        let mut doc = DocumentTree::from_bytes(&docx_bytes(&body)).expect("load");
        assert!(insert_table_at_marker(
            &mut doc.body.blocks,
            "@table1",
            models().to_table()
        ));

        let Block::Paragraph(marker) = &doc.body.blocks[1] else {
            panic!("expected paragraph");
        };
        assert_eq!(marker.text(), "");
        assert!(matches!(doc.body.blocks[2], Block::Table(_)));
        let Block::Paragraph(tail) = &doc.body.blocks[3] else {
            panic!("expected paragraph");
        };
        assert_eq!(tail.text(), "Кінець");

        let bytes = doc.to_bytes().expect("write");
        let again = DocumentTree::from_bytes(&bytes).expect("reload");
        let Block::Table(t) = &again.body.blocks[2] else {
            panic!("expected table after reload");
        };
        assert_eq!(t.rows().count(), 3);
    }

    #[test]
    fn missing_marker_drops_table() {
        let mut doc = DocumentTree::from_bytes(&docx_bytes(&para("без маркера"))).expect("load");
        let before = doc.body.clone();
        assert!(!insert_table_at_marker(
            &mut doc.body.blocks,
            "@table2",
            models().to_table()
        ));
        assert_eq!(doc.body, before);
    }
}
