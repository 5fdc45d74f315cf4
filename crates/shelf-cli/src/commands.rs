use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use shelf_repo::ShopConfig;
use shelf_store::{RedbStore, SnapshotRecord, SnapshotSummary, StoreConfig, Storer};
use tracing::debug;

use crate::cli::*;

const VALUE_PREVIEW: usize = 60;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = store_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Init => cmd_init(&config, format),
        Command::Backup(args) => cmd_backup(&config, args, format),
        Command::Restore(args) => cmd_restore(&config, args, format),
        Command::Verify(args) => cmd_verify(args, format),
        Command::Tree(args) => cmd_tree(&config, args, format),
    }
}

fn store_config(path: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let mut config = match path {
        Some(path) => ShopConfig::load(path)?.store,
        None => StoreConfig::default(),
    };
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    debug!(path = %config.db_path().display(), "store location");
    Ok(config)
}

fn open(config: &StoreConfig) -> anyhow::Result<RedbStore> {
    RedbStore::open(config)
        .with_context(|| format!("cannot open store at {}", config.db_path().display()))
}

fn summary_json(summary: &SnapshotSummary) -> serde_json::Value {
    json!({
        "namespaces": summary.namespaces,
        "entries": summary.entries,
        "bytes": summary.bytes,
    })
}

fn print_summary(summary: &SnapshotSummary) {
    println!("  Namespaces: {}", summary.namespaces.to_string().bold());
    println!("  Entries:    {}", summary.entries.to_string().bold());
    println!("  Bytes:      {}", summary.bytes.to_string().bold());
}

fn cmd_init(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(config)?;
    let path = config.db_path();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "path": path.display().to_string(), "namespaces": store.namespaces() })
        ),
        OutputFormat::Text => {
            println!(
                "{} Initialized store at {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            for namespace in store.namespaces() {
                println!("  {}/", namespace.cyan());
            }
        }
    }
    Ok(())
}

fn cmd_backup(config: &StoreConfig, args: BackupArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(config)?;
    let file = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut sink = BufWriter::new(file);
    let bytes = store.backup(&mut sink)?;
    sink.flush()?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "output": args.output.display().to_string(), "bytes": bytes })
        ),
        OutputFormat::Text => println!(
            "{} Wrote {} bytes to {}",
            "✓".green().bold(),
            bytes.to_string().bold(),
            args.output.display()
        ),
    }
    Ok(())
}

fn cmd_restore(config: &StoreConfig, args: RestoreArgs, format: OutputFormat) -> anyhow::Result<()> {
    if !args.yes {
        bail!(
            "restore replaces everything in {}; pass --yes to continue",
            config.db_path().display()
        );
    }
    let store = open(config)?;
    let file = File::open(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let summary = store.restore(BufReader::new(file))?;
    match format {
        OutputFormat::Json => println!("{}", summary_json(&summary)),
        OutputFormat::Text => {
            println!("{} Restored {}", "✓".green().bold(), args.input.display());
            print_summary(&summary);
        }
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let result = RedbStore::verify_backup(BufReader::new(file));
    match (format, result) {
        (OutputFormat::Json, Ok(summary)) => {
            println!("{}", json!({ "valid": true, "summary": summary_json(&summary) }))
        }
        (OutputFormat::Json, Err(e)) => {
            println!("{}", json!({ "valid": false, "error": e.to_string() }));
            bail!("snapshot is invalid");
        }
        (OutputFormat::Text, Ok(summary)) => {
            println!("{} Snapshot {} is valid", "✓".green().bold(), args.input.display());
            print_summary(&summary);
        }
        (OutputFormat::Text, Err(e)) => {
            println!("{} {}", "✗".red().bold(), e);
            bail!("snapshot is invalid");
        }
    }
    Ok(())
}

fn cmd_tree(config: &StoreConfig, args: TreeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(config)?;
    let prefix = parse_prefix(args.prefix.as_deref());
    let mut rows = Vec::new();
    store.walk(&mut |record| {
        if record_path(&record).starts_with(&prefix) {
            rows.push(record);
        }
        Ok(())
    })?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = rows.iter().map(|r| record_json(r, args.values)).collect();
            println!("{}", serde_json::Value::Array(rows));
        }
        OutputFormat::Text => {
            for row in &rows {
                println!("{}", render_record(row, args.values));
            }
        }
    }
    Ok(())
}

fn parse_prefix(raw: Option<&str>) -> Vec<Vec<u8>> {
    raw.unwrap_or_default()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.as_bytes().to_vec())
        .collect()
}

fn record_path(record: &SnapshotRecord) -> &[Vec<u8>] {
    match record {
        SnapshotRecord::Namespace { path } | SnapshotRecord::Entry { path, .. } => path,
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn joined(path: &[Vec<u8>]) -> String {
    path.iter().map(|s| lossy(s)).collect::<Vec<_>>().join("/")
}

fn preview(value: &[u8]) -> String {
    let text = lossy(value);
    if text.chars().count() <= VALUE_PREVIEW {
        return text;
    }
    let mut cut: String = text.chars().take(VALUE_PREVIEW).collect();
    cut.push('…');
    cut
}

fn render_record(record: &SnapshotRecord, values: bool) -> String {
    match record {
        SnapshotRecord::Namespace { path } => {
            let indent = "  ".repeat(path.len().saturating_sub(1));
            let name = path.last().map(|n| lossy(n)).unwrap_or_default();
            format!("{indent}{}", format!("{name}/").cyan().bold())
        }
        SnapshotRecord::Entry { path, key, value } => {
            let indent = "  ".repeat(path.len());
            let size = format!("({} bytes)", value.len()).dimmed();
            if values {
                format!("{indent}{} {size} {}", lossy(key).yellow(), preview(value))
            } else {
                format!("{indent}{} {size}", lossy(key).yellow())
            }
        }
    }
}

fn record_json(record: &SnapshotRecord, values: bool) -> serde_json::Value {
    match record {
        SnapshotRecord::Namespace { path } => json!({
            "type": "namespace",
            "path": joined(path),
        }),
        SnapshotRecord::Entry { path, key, value } => {
            let mut row = json!({
                "type": "entry",
                "path": joined(path),
                "key": lossy(key),
                "bytes": value.len(),
            });
            if values {
                row["value"] = json!(lossy(value));
            }
            row
        }
    }
}
