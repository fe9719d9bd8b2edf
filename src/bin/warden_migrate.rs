//! warden_migrate - import exported detection rows into the configured record store

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use warden::records::LegacyRecord;
use warden::{open_record_store, WardenConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,
    /// JSON array of {camera_name, timestamp, truck_count, avg_confidence}.
    #[arg(default_value = "truck_detections.txt")]
    input: PathBuf,
    /// Parse and convert every row without writing.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = WardenConfig::load_from(args.config.as_deref())?;

    let raw = std::fs::read_to_string(&args.input)
        .map_err(|e| anyhow!("failed to read {}: {}", args.input.display(), e))?;
    let rows: Vec<LegacyRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", args.input.display()))?;

    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_record(cfg.timezone)
                .with_context(|| format!("row {}", i))
        })
        .collect::<Result<Vec<_>>>()?;

    if args.dry_run {
        log::info!("dry run: {} rows parsed, nothing written", records.len());
        return Ok(());
    }

    let store = open_record_store(&cfg.detection_store)?;
    for record in &records {
        store.save(record)?;
        log::info!(
            "inserted {} at {}",
            record.camera,
            record.timestamp_millis()
        );
    }
    log::info!("{} rows inserted into {}", records.len(), store.name());
    Ok(())
}
