use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use billing_docs::allocator::{FixedShares, RngShares, ShareSource};
use billing_docs::config::{init_default_config, resolve_config, AppConfig};
use billing_docs::error::GenerationError;
use billing_docs::generate::{generate_allocations, DocumentKind, DocumentRequest, Generator};
use billing_docs::logging;
use billing_docs::model::RecordId;
use billing_docs::store::MemoryStore;
use billing_docs::templates::TemplateDir;

#[derive(Parser, Debug)]
#[command(name = "billing-docs")]
#[command(about = "Billing document generator for maintenance agreements (DOCX/XLSX templates)", long_about = None)]
struct Args {
    /// Config file path (default: search for billing-docs.toml upwards, or BILLING_DOCS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON data file with agreements, periods, equipment and zones
    #[arg(long, global = true, value_name = "JSON", default_value = "billing-data.json")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a billing period's amount over device ranks and store the result
    Allocate {
        #[arg(long)]
        agreement: RecordId,
        #[arg(long)]
        period: RecordId,
        /// Replay these shares instead of drawing random ones (e.g. 0.6,0.15)
        #[arg(long, value_delimiter = ',')]
        fixed_shares: Option<Vec<f64>>,
        /// Write the updated data here (default: the --data file)
        #[arg(long, value_name = "JSON")]
        write_data: Option<PathBuf>,
    },
    /// Fill a template and write the document
    Generate {
        #[arg(value_enum)]
        kind: DocumentKind,
        #[arg(long)]
        agreement: RecordId,
        /// Required by every kind except organization-protocol
        #[arg(long)]
        period: Option<RecordId>,
        /// Output directory (default: current directory)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Write a default config and an empty templates directory, then exit
    InitConfig {
        /// Directory to write into (default: current directory)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Keeps generated names from escaping the output directory.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

fn report(err: GenerationError) -> anyhow::Error {
    tracing::error!(status = err.status_code(), error = %err, "request failed");
    anyhow::anyhow!("{} ({})", err.user_message(), err.status_code())
}

fn allocate(
    cfg: &AppConfig,
    data: &Path,
    agreement: RecordId,
    period: RecordId,
    fixed_shares: Option<Vec<f64>>,
    write_data: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut store = MemoryStore::from_json_path(data)?;
    let mut shares: Box<dyn ShareSource> = match fixed_shares {
        Some(values) => Box::new(FixedShares::new(values)),
        None => Box::new(RngShares::from_entropy()),
    };
    let outcome = generate_allocations(&mut store, cfg, agreement, period, shares.as_mut()).map_err(report)?;
    for shortfall in &outcome.shortfalls {
        tracing::warn!(?shortfall, "allocation shortfall");
    }
    if outcome.overcommitted {
        tracing::warn!("device ranks exceed the period amount; consultation share is negative");
    }
    for record in &outcome.records {
        println!(
            "rank {}: {} devices, {:.2} h",
            record.rank, record.device_count, record.work_time
        );
    }
    let target = write_data.unwrap_or_else(|| data.to_path_buf());
    store.write_json_path(&target)?;
    eprintln!("Wrote data: {}", target.display());
    Ok(())
}

fn generate(
    cfg: &AppConfig,
    data: &Path,
    request: DocumentRequest,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = MemoryStore::from_json_path(data)?;
    let templates = TemplateDir::new(&cfg.templates.dir);
    let doc = Generator::new(&store, &templates, cfg)
        .generate(&request)
        .map_err(report)?;

    let dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).with_context(|| format!("create output dir: {}", dir.display()))?;
    let path = dir.join(sanitize_filename(&doc.filename));
    std::fs::write(&path, &doc.bytes).with_context(|| format!("write document: {}", path.display()))?;
    eprintln!("Wrote {} ({}): {}", doc.filename, doc.mime_type, path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();
    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    match args.command {
        Command::InitConfig { dir, force } => {
            let dir = dir.unwrap_or(workdir);
            let cfg_path = init_default_config(&dir, force).context("init default config")?;
            eprintln!("Wrote config: {}", cfg_path.display());
            Ok(())
        }
        Command::Allocate {
            agreement,
            period,
            fixed_shares,
            write_data,
        } => {
            let cfg = resolve_config(args.config.as_deref(), &workdir)?;
            allocate(&cfg, &args.data, agreement, period, fixed_shares, write_data)
        }
        Command::Generate {
            kind,
            agreement,
            period,
            output_dir,
        } => {
            let cfg = resolve_config(args.config.as_deref(), &workdir)?;
            let request = DocumentRequest {
                kind,
                agreement_id: agreement,
                period_id: period,
            };
            generate(&cfg, &args.data, request, output_dir)
        }
    }
}
