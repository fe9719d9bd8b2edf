//! warden - capture stills from every configured camera and record truck counts

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use warden::detect::build_detector;
use warden::naming::{canonicalize, key_time_to_utc};
use warden::ocr::build_extractor;
use warden::{
    build_terminals, open_photo_store, open_record_store, DetectionAggregator, DetectionOutcome,
    DetectionStage, HttpFetcher, Pipeline, TimestampResolver, WardenConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List terminals and camera full names.
    List,
    /// Run one capture cycle over every camera.
    Capture {
        /// Run truck detection on each stored photo.
        #[arg(long)]
        detect: bool,
        /// Only capture cameras of this terminal.
        #[arg(long, value_name = "NAME")]
        terminal: Option<String>,
    },
    /// Print the detection record for a camera and time.
    Record {
        /// Camera full name, e.g. main_gate_lane_1.
        camera: String,
        /// RFC 3339 instant or key-style local time (2024-07-09_14:17:10).
        timestamp: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = WardenConfig::load_from(args.config.as_deref())?;

    match args.command {
        Command::List => list(&cfg),
        Command::Capture { detect, terminal } => capture(&cfg, detect, terminal.as_deref()),
        Command::Record { camera, timestamp } => record(&cfg, &camera, &timestamp),
    }
}

fn list(cfg: &WardenConfig) -> Result<()> {
    for terminal in &cfg.terminals {
        println!("{}", terminal.name);
        for camera in &terminal.cameras {
            println!(
                "  {}  {}",
                warden::full_name(&terminal.name, &camera.name),
                camera.url
            );
        }
    }
    Ok(())
}

fn capture(cfg: &WardenConfig, detect: bool, only: Option<&str>) -> Result<()> {
    let photos = open_photo_store(&cfg.photo_store)?;
    let descriptors: Vec<_> = cfg
        .terminals
        .iter()
        .filter(|t| only.map_or(true, |name| canonicalize(name) == canonicalize(&t.name)))
        .cloned()
        .collect();
    if descriptors.is_empty() {
        return Err(match only {
            Some(name) => anyhow!("no terminal named '{}'", name),
            None => anyhow!("no terminals configured"),
        });
    }
    let mut terminals = build_terminals(&descriptors, photos, cfg.default_crop)?;

    let extractor = build_extractor(cfg.ocr.engine, &cfg.ocr.binary);
    let resolver = TimestampResolver::new(&cfg.timestamp_format, cfg.timezone, extractor)?;
    log::info!(
        "overlay format '{}' read via {} in {}",
        resolver.format(),
        resolver.engine_name(),
        resolver.timezone()
    );
    let mut pipeline = Pipeline::new(Arc::new(HttpFetcher::new(cfg.fetch_timeout)), resolver);
    if detect {
        let detector = build_detector(&cfg.detector)?
            .ok_or_else(|| anyhow!("--detect needs [detector] kind set to rekognition or stub"))?;
        let store = open_record_store(&cfg.detection_store)?;
        let aggregator = DetectionAggregator::new(detector, &cfg.detector.labels);
        log::info!(
            "detecting with {}, records to {}",
            aggregator.detector_name(),
            store.name()
        );
        pipeline = pipeline.with_detection(DetectionStage::new(aggregator, store));
    }

    let report = pipeline.run_batch(&mut terminals);
    for cycle in &report.cycles {
        let detection = match &cycle.detection {
            DetectionOutcome::Skipped => "-".to_string(),
            DetectionOutcome::Recorded(record) => {
                format!("{} trucks ({:.2})", record.truck_count, record.avg_confidence)
            }
            DetectionOutcome::Failed(e) => format!("detection failed: {}", e),
        };
        println!("ok    {}  {}  {}", cycle.camera, cycle.key, detection);
    }
    for failure in &report.failures {
        println!("fail  {}  {}", failure.camera, failure.error);
    }
    log::info!(
        "batch done: {} of {} cameras stored a photo",
        report.cycles.len(),
        report.attempted
    );

    if report.all_failed() {
        return Err(anyhow!("every camera failed"));
    }
    Ok(())
}

fn record(cfg: &WardenConfig, camera: &str, raw: &str) -> Result<()> {
    let timestamp = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => {
            key_time_to_utc(raw, cfg.timezone)
                .with_context(|| format!("timestamp '{}' is neither RFC 3339 nor key-style", raw))?
                .0
        }
    };
    let store = open_record_store(&cfg.detection_store)?;
    match store.load(camera, timestamp) {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(e) if e.is_not_found() => Err(anyhow!("{}", e)),
        Err(e) => Err(e).context("detection store"),
    }
}
