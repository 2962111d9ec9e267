use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::docx::style::HouseStyle;
use crate::model::OrganizationKind;

pub const CONFIG_FILE_NAME: &str = "billing-docs.toml";
pub const CONFIG_ENV_VAR: &str = "BILLING_DOCS_CONFIG";

/// Tax id (EDRPOU) of the organization billed with the type A variant.
pub const DEFAULT_SPECIAL_TAX_ID: &str = "38736443";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub templates: TemplatesSection,
    #[serde(default)]
    pub organization: OrganizationSection,
    #[serde(default)]
    pub style: HouseStyle,
}

/// Template file names, relative to `dir`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplatesSection {
    /// Relative paths are resolved against the config file's directory.
    pub dir: PathBuf,
    pub master_protocol: String,
    pub master_act: String,
    pub type_a_protocol: String,
    pub type_b_protocol: String,
    pub type_a_bill: String,
    pub type_b_bill: String,
    pub type_a_appendix: String,
    pub type_b_appendix: String,
}

impl Default for TemplatesSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("templates"),
            master_protocol: "M-RI_protocol.docx".to_string(),
            master_act: "M-RI_act.docx".to_string(),
            type_a_protocol: "KDN_proto.docx".to_string(),
            type_b_protocol: "llc_proto.docx".to_string(),
            type_a_bill: "kdn_bill.xlsx".to_string(),
            type_b_bill: "llc_bill.xlsx".to_string(),
            type_a_appendix: "kdn_appendix.docx".to_string(),
            type_b_appendix: "llc_appendix.docx".to_string(),
        }
    }
}

impl TemplatesSection {
    pub fn protocol(&self, kind: OrganizationKind) -> &str {
        match kind {
            OrganizationKind::TypeA => &self.type_a_protocol,
            OrganizationKind::TypeB => &self.type_b_protocol,
        }
    }

    pub fn bill(&self, kind: OrganizationKind) -> &str {
        match kind {
            OrganizationKind::TypeA => &self.type_a_bill,
            OrganizationKind::TypeB => &self.type_b_bill,
        }
    }

    pub fn appendix(&self, kind: OrganizationKind) -> &str {
        match kind {
            OrganizationKind::TypeA => &self.type_a_appendix,
            OrganizationKind::TypeB => &self.type_b_appendix,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OrganizationSection {
    pub special_tax_id: String,
}

impl Default for OrganizationSection {
    fn default() -> Self {
        Self {
            special_tax_id: DEFAULT_SPECIAL_TAX_ID.to_string(),
        }
    }
}

fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    if let Some(p) = find_file_upwards(workdir, CONFIG_FILE_NAME, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, CONFIG_FILE_NAME, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let mut cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    if cfg.templates.dir.is_relative() {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.templates.dir = base.join(&cfg.templates.dir);
    }
    Ok(cfg)
}

/// Explicit path first, then the environment and an upward search; defaults when none exists.
pub fn resolve_config(explicit: Option<&Path>, workdir: &Path) -> anyhow::Result<AppConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| find_default_config(workdir));
    match path {
        Some(p) if p.exists() => {
            tracing::info!(path = %p.display(), "using config");
            load_config(&p)
        }
        Some(p) if explicit.is_some() => anyhow::bail!("config not found: {}", p.display()),
        _ => {
            tracing::info!("no config file, using defaults");
            let mut cfg = AppConfig::default();
            cfg.templates.dir = workdir.join(&cfg.templates.dir);
            Ok(cfg)
        }
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# billing-docs configuration

[templates]
# Relative to this file.
dir = "templates"
master_protocol = "M-RI_protocol.docx"
master_act = "M-RI_act.docx"
type_a_protocol = "KDN_proto.docx"
type_b_protocol = "llc_proto.docx"
type_a_bill = "kdn_bill.xlsx"
type_b_bill = "llc_bill.xlsx"
type_a_appendix = "kdn_appendix.docx"
type_b_appendix = "llc_appendix.docx"

[organization]
# Organizations with this EDRPOU are billed by ranks 1 and 2 (type A); all others by 3 and 4.
special_tax_id = "38736443"

[style]
font = "Times New Roman"
size_pt = 12.0
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    let templates = dir.join("templates");
    std::fs::create_dir_all(&templates)
        .with_context(|| format!("create templates dir: {}", templates.display()))?;
    Ok(cfg_path)
}
