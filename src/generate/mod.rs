//! Document assembly: fetch, pick the template, fill it, serialize, name.

pub mod allocation;
pub mod replacements;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AppConfig;
use crate::docx::style::apply_house_style;
use crate::docx::substitute::{substitute_document, ReplacementMap};
use crate::docx::tables::{insert_table_at_marker, GridTable};
use crate::docx::tree::DocumentTree;
use crate::error::GenerationError;
use crate::locale::format_date;
use crate::model::{
    AgreementRecord, BillingPeriodRecord, IpPool, ModelCount, OrganizationKind, PartyRole, RankAllocationRecord,
    RecordId,
};
use crate::sheet::Workbook;
use crate::store::BillingStore;
use crate::templates::TemplateSource;

pub use allocation::{generate_allocations, AllocationOutcome};

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum DocumentKind {
    MasterProtocol,
    MasterAct,
    OrganizationProtocol,
    Bill,
    Appendix,
}

impl DocumentKind {
    pub fn needs_period(self) -> bool {
        !matches!(self, DocumentKind::OrganizationProtocol)
    }

    fn principal_role(self) -> PartyRole {
        match self {
            DocumentKind::MasterProtocol | DocumentKind::MasterAct => PartyRole::Master,
            _ => PartyRole::Organization,
        }
    }

    pub fn local_word(self) -> &'static str {
        match self {
            DocumentKind::MasterProtocol => "протокол",
            DocumentKind::MasterAct => "акт",
            DocumentKind::OrganizationProtocol => "Протокол",
            DocumentKind::Bill => "Рахунок",
            DocumentKind::Appendix => "додаток",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Bill => "xlsx",
            _ => "docx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Bill => XLSX_MIME,
            _ => DOCX_MIME,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentRequest {
    pub kind: DocumentKind,
    pub agreement_id: RecordId,
    /// Required by every kind except the organization protocol.
    pub period_id: Option<RecordId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: &'static str,
}

/// `{agreement}_{word}_{month}_{year}.{ext}`
pub fn output_filename(agreement_name: &str, kind: DocumentKind, date: NaiveDate) -> String {
    let f = format_date(date);
    format!(
        "{agreement_name}_{}_{}_{}.{}",
        kind.local_word(),
        f.month_name,
        f.year,
        kind.extension()
    )
}

/// Everything a document needs from the store, fetched before any template is opened.
struct Fetched {
    agreement: AgreementRecord,
    period: Option<BillingPeriodRecord>,
    allocations: Vec<RankAllocationRecord>,
    models: Vec<ModelCount>,
    pools: Vec<IpPool>,
}

pub struct Generator<'a> {
    store: &'a dyn BillingStore,
    templates: &'a dyn TemplateSource,
    config: &'a AppConfig,
    today: NaiveDate,
}

impl<'a> Generator<'a> {
    pub fn new(store: &'a dyn BillingStore, templates: &'a dyn TemplateSource, config: &'a AppConfig) -> Self {
        Self {
            store,
            templates,
            config,
            today: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn generate(&self, request: &DocumentRequest) -> Result<GeneratedDocument, GenerationError> {
        let kind = request.kind;
        let data = self.fetch(request)?;
        let org_kind =
            OrganizationKind::resolve(&data.agreement.principal.tax_id, &self.config.organization.special_tax_id);

        let templates = &self.config.templates;
        let template = match kind {
            DocumentKind::MasterProtocol => templates.master_protocol.as_str(),
            DocumentKind::MasterAct => templates.master_act.as_str(),
            DocumentKind::OrganizationProtocol => templates.protocol(org_kind),
            DocumentKind::Bill => templates.bill(org_kind),
            DocumentKind::Appendix => templates.appendix(org_kind),
        };
        let raw = self.templates.load(template)?;

        let map = self.replacement_map(kind, org_kind, &data)?;
        let bytes = match kind {
            DocumentKind::Bill => fill_workbook(template, &raw, &map)?,
            _ => {
                let mut doc = DocumentTree::from_bytes(&raw).map_err(|e| unavailable(template, e))?;
                let replaced = substitute_document(&mut doc, &map);
                tracing::debug!(template, replaced, "markers substituted");
                if kind == DocumentKind::Appendix {
                    inject_summary_tables(&mut doc, &data.models, &data.pools);
                }
                apply_house_style(&mut doc, &self.config.style);
                doc.to_bytes()
                    .map_err(|e| GenerationError::Serialize(format!("{e:#}")))?
            }
        };

        let named_after = data.period.as_ref().map_or(data.agreement.date, |p| p.date);
        let filename = output_filename(&data.agreement.name, kind, named_after);
        tracing::info!(?kind, agreement = %data.agreement.name, %filename, size = bytes.len(), "document generated");
        Ok(GeneratedDocument {
            bytes,
            filename,
            mime_type: kind.mime_type(),
        })
    }

    fn fetch(&self, request: &DocumentRequest) -> Result<Fetched, GenerationError> {
        let kind = request.kind;
        let agreement = self.store.fetch_agreement(request.agreement_id)?;
        if agreement.principal.role != kind.principal_role() {
            return Err(GenerationError::not_found("agreement", request.agreement_id));
        }

        let period = if kind.needs_period() {
            let period_id = request
                .period_id
                .ok_or_else(|| GenerationError::not_found("billing period", "-"))?;
            let period = self.store.fetch_billing_period(period_id)?;
            if period.agreement_id != agreement.id {
                return Err(GenerationError::not_found("billing period", period_id));
            }
            if !period.amount.is_finite() {
                return Err(GenerationError::InvalidAmount(period.amount.to_string()));
            }
            Some(period)
        } else {
            None
        };

        let mut fetched = Fetched {
            agreement,
            period,
            allocations: Vec::new(),
            models: Vec::new(),
            pools: Vec::new(),
        };
        if let Some(period_id) = fetched.period.as_ref().map(|p| p.id) {
            if matches!(kind, DocumentKind::Bill | DocumentKind::Appendix) {
                fetched.allocations = self.store.fetch_rank_allocations(period_id)?;
            }
            if kind == DocumentKind::Appendix {
                fetched.models = self.store.fetch_model_summary(period_id)?;
                fetched.pools = self.store.fetch_ip_pools(period_id)?;
            }
        }
        Ok(fetched)
    }

    fn replacement_map(
        &self,
        kind: DocumentKind,
        org_kind: OrganizationKind,
        data: &Fetched,
    ) -> Result<ReplacementMap, GenerationError> {
        let agreement = &data.agreement;
        match (kind, data.period.as_ref()) {
            (DocumentKind::OrganizationProtocol, _) => Ok(replacements::organization_protocol(agreement)),
            (DocumentKind::MasterProtocol, Some(p)) => replacements::master_protocol(agreement, p),
            (DocumentKind::MasterAct, Some(p)) => replacements::master_act(agreement, p, self.today),
            (DocumentKind::Bill, Some(p)) => replacements::bill(agreement, p, org_kind, &data.allocations),
            (DocumentKind::Appendix, Some(p)) => Ok(replacements::appendix(agreement, p, org_kind, &data.allocations)),
            // `fetch` guarantees a period for every kind that needs one.
            (_, None) => Ok(ReplacementMap::new()),
        }
    }
}

fn unavailable(template: &str, err: anyhow::Error) -> GenerationError {
    GenerationError::TemplateUnavailable {
        name: template.to_string(),
        reason: format!("{err:#}"),
    }
}

fn fill_workbook(template: &str, raw: &[u8], map: &ReplacementMap) -> Result<Vec<u8>, GenerationError> {
    let mut workbook = Workbook::from_bytes(raw).map_err(|e| unavailable(template, e))?;
    let replaced = workbook.substitute(map);
    tracing::debug!(template, replaced, "markers substituted");
    workbook
        .to_bytes()
        .map_err(|e| GenerationError::Serialize(format!("{e:#}")))
}

/// `@table1`: devices per model; `@table2`: addresses per /24 pool.
fn inject_summary_tables(doc: &mut DocumentTree, models: &[ModelCount], pools: &[IpPool]) {
    let mut model_table = GridTable::new(&["Модель", "Кількість"]);
    for m in models {
        model_table.push_row(vec![m.model.clone(), m.count.to_string()]);
    }
    let mut pool_table = GridTable::new(&["Пул", "IP-адреси"]);
    for p in pools {
        pool_table.push_row(vec![p.pool.clone(), p.ips.join("\n")]);
    }
    insert_table_at_marker(&mut doc.body.blocks, "@table1", model_table.to_table());
    insert_table_at_marker(&mut doc.body.blocks, "@table2", pool_table.to_table());
}

#[cfg(test)]
mod tests {
    use super::{generate_allocations, output_filename, DocumentKind, DocumentRequest, Generator, XLSX_MIME};
    use crate::allocator::FixedShares;
    use crate::config::AppConfig;
    use crate::docx::substitute::unresolved_markers;
    use crate::docx::testutil::{docx_bytes, para, table, xlsx_bytes, MemoryTemplates};
    use crate::docx::tree::{Block, DocumentTree};
    use crate::error::GenerationError;
    use crate::logging;
    use crate::sheet::Workbook;
    use crate::store::fixtures::{date, store};
    use crate::store::MemoryStore;

    fn request(kind: DocumentKind, agreement_id: i64, period_id: Option<i64>) -> DocumentRequest {
        DocumentRequest {
            kind,
            agreement_id,
            period_id,
        }
    }

    fn texts(doc: &DocumentTree) -> Vec<String> {
        doc.body
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(p) => Some(p.text()),
                _ => None,
            })
            .collect()
    }

    fn allocated_store() -> MemoryStore {
        let mut s = store();
        let mut shares = FixedShares::new(vec![0.6, 0.15]);
        generate_allocations(&mut s, &AppConfig::default(), 1, 10, &mut shares).expect("allocate");
        s
    }

    #[test]
    fn missing_agreement_loads_no_template() {
        logging::init_test();
        let s = store();
        let templates = MemoryTemplates::default().with("M-RI_protocol.docx", docx_bytes(&para("x")));
        let cfg = AppConfig::default();
        let gen = Generator::new(&s, &templates, &cfg);

        let err = gen
            .generate(&request(DocumentKind::MasterProtocol, 999, Some(30)))
            .expect_err("missing agreement");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.user_message(), "Договор не найден");
        assert_eq!(templates.loads.get(), 0);
    }

    #[test]
    fn foreign_or_inactive_period_loads_no_template() {
        let s = store();
        let templates = MemoryTemplates::default().with("llc_bill.xlsx", xlsx_bytes(&["x"], ""));
        let cfg = AppConfig::default();
        let gen = Generator::new(&s, &templates, &cfg);

        for period in [Some(20), Some(11), None] {
            let err = gen
                .generate(&request(DocumentKind::Bill, 1, period))
                .expect_err("period not usable");
            assert!(matches!(err, GenerationError::NotFound { entity: "billing period", .. }));
        }
        assert_eq!(templates.loads.get(), 0);
    }

    #[test]
    fn unavailable_store_maps_to_503() {
        let mut s = store();
        s.set_offline(true);
        let templates = MemoryTemplates::default();
        let cfg = AppConfig::default();
        let err = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::OrganizationProtocol, 1, None))
            .expect_err("offline");
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn master_protocol_end_to_end() {
        let body = format!(
            "{}{}",
            para("Протокол до договору № @agr_num від @agr_date"),
            table(&[vec![para("Сума: @agr_sum"), para("@agrsum_handwriting_sample")]])
        );
        let s = store();
        let templates = MemoryTemplates::default().with("M-RI_protocol.docx", docx_bytes(&body));
        let cfg = AppConfig::default();
        let out = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::MasterProtocol, 3, Some(30)))
            .expect("generate");

        assert_eq!(out.filename, "М-9_протокол_березня_2024.docx");
        let doc = DocumentTree::from_bytes(&out.bytes).expect("reload");
        assert_eq!(texts(&doc), vec!["Протокол до договору № М-9 від 15 січня 2023 року"]);
        let Block::Table(t) = &doc.body.blocks[1] else {
            panic!("expected table");
        };
        let cells: Vec<String> = t.rows().next().expect("row").cells().map(|c| c.text()).collect();
        assert_eq!(cells[0], "Сума: 12,345.67");
        assert!(cells[1].starts_with("дванадцять тисяч"));
        assert!(unresolved_markers(&doc.body).is_empty());
    }

    #[test]
    fn master_act_uses_today_and_hours() {
        let body = format!("{}{}", para("Акт № @act_nubmer від @today"), para("Відпрацьовано @act_hours"));
        let s = store();
        let templates = MemoryTemplates::default().with("M-RI_act.docx", docx_bytes(&body));
        let cfg = AppConfig::default();
        let out = Generator::new(&s, &templates, &cfg)
            .with_today(date(2024, 4, 1))
            .generate(&request(DocumentKind::MasterAct, 3, Some(30)))
            .expect("generate");

        assert_eq!(out.filename, "М-9_акт_березня_2024.docx");
        let doc = DocumentTree::from_bytes(&out.bytes).expect("reload");
        assert_eq!(
            texts(&doc),
            vec!["Акт № 30/М-9 від 01 квітня 2024 року", "Відпрацьовано 12 годин 20 хвилин"]
        );
    }

    #[test]
    fn organization_protocol_template_follows_tax_id() {
        let s = store();
        let templates = MemoryTemplates::default().with("KDN_proto.docx", docx_bytes(&para("№ @proto_num")));
        let cfg = AppConfig::default();
        let gen = Generator::new(&s, &templates, &cfg);

        let out = gen
            .generate(&request(DocumentKind::OrganizationProtocol, 2, None))
            .expect("type A protocol");
        assert_eq!(out.filename, "К-5_Протокол_січня_2023.docx");
        let doc = DocumentTree::from_bytes(&out.bytes).expect("reload");
        assert_eq!(texts(&doc), vec!["№ 2_2023-01-15_К-5"]);

        let err = gen
            .generate(&request(DocumentKind::OrganizationProtocol, 1, None))
            .expect_err("type B template missing");
        assert!(matches!(err, GenerationError::TemplateUnavailable { ref name, .. } if name == "llc_proto.docx"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn master_documents_refuse_organization_agreements() {
        let s = store();
        let templates = MemoryTemplates::default();
        let cfg = AppConfig::default();
        let err = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::MasterProtocol, 1, Some(10)))
            .expect_err("not a master agreement");
        assert_eq!(err.status_code(), 404);
        assert_eq!(templates.loads.get(), 0);
    }

    #[test]
    fn corrupt_template_is_unavailable() {
        let s = store();
        let templates = MemoryTemplates::default().with("M-RI_protocol.docx", b"not a zip".to_vec());
        let cfg = AppConfig::default();
        let err = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::MasterProtocol, 3, Some(30)))
            .expect_err("corrupt");
        assert!(matches!(err, GenerationError::TemplateUnavailable { .. }));
    }

    #[test]
    fn bill_fills_spreadsheet() {
        let s = allocated_store();
        let template = xlsx_bytes(
            &[
                "Рахунок № @bill_name від @bill_date",
                "@rank3_count",
                "@rank3_sum",
                "@rank4_sum",
                "@time_count",
                "@time_sum",
                "@handwritebill_sum",
            ],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#,
        );
        let templates = MemoryTemplates::default().with("llc_bill.xlsx", template);
        let cfg = AppConfig::default();
        let out = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::Bill, 1, Some(10)))
            .expect("generate");

        assert_eq!(out.filename, "Д-17_Рахунок_березня_2024.xlsx");
        assert_eq!(out.mime_type, XLSX_MIME);
        let wb = Workbook::from_bytes(&out.bytes).expect("reload");
        assert_eq!(
            wb.shared_strings(),
            vec![
                "Рахунок № B10_31/03/24_Д-17 від 31 березня 2024 року",
                "3",
                "3000.00",
                "500.00",
                "6.50",
                "6500.00",
                "десять тисяч гривень нуль копійок",
            ]
        );
    }

    #[test]
    fn appendix_injects_summary_tables() {
        let s = allocated_store();
        let body = format!(
            "{}{}{}",
            para("Додаток до акту від @act_date"),
            para("@table1"),
            para("@table2")
        );
        let templates = MemoryTemplates::default().with("llc_appendix.docx", docx_bytes(&body));
        let cfg = AppConfig::default();
        let out = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::Appendix, 1, Some(10)))
            .expect("generate");

        assert_eq!(out.filename, "Д-17_додаток_березня_2024.docx");
        let doc = DocumentTree::from_bytes(&out.bytes).expect("reload");
        let tables: Vec<_> = doc
            .body
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Table(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(tables.len(), 2);

        let models: Vec<Vec<String>> = tables[0]
            .rows()
            .map(|r| r.cells().map(|c| c.text()).collect())
            .collect();
        assert_eq!(models[1], vec!["DES-3200", "2"]);
        assert_eq!(models.len(), 4);

        let pools: Vec<Vec<String>> = tables[1]
            .rows()
            .map(|r| r.cells().map(|c| c.text()).collect())
            .collect();
        assert_eq!(pools[1], vec!["10.0.1.0/24", "10.0.1.2\n10.0.1.3"]);
        assert_eq!(texts(&doc)[0], "Додаток до акту від 05 березня 2024 року");
    }

    #[test]
    fn output_is_restyled() {
        let s = store();
        let templates = MemoryTemplates::default().with("M-RI_protocol.docx", docx_bytes(&para("@agr_num")));
        let mut cfg = AppConfig::default();
        cfg.style.font = "Arial".to_string();
        let out = Generator::new(&s, &templates, &cfg)
            .generate(&request(DocumentKind::MasterProtocol, 3, Some(30)))
            .expect("generate");
        let pkg = crate::docx::package::OfficePackage::from_bytes(&out.bytes).expect("package");
        let xml = String::from_utf8(pkg.entry("word/document.xml").expect("document").data.clone()).expect("utf8");
        assert!(xml.contains(r#"<w:rFonts w:ascii="Arial" w:hAnsi="Arial" w:cs="Arial"/>"#));
        assert!(xml.contains(r#"<w:sz w:val="24"/>"#));
    }

    #[test]
    fn filename_convention() {
        assert_eq!(
            output_filename("Д-17", DocumentKind::Bill, date(2024, 12, 3)),
            "Д-17_Рахунок_грудня_2024.xlsx"
        );
    }
}
