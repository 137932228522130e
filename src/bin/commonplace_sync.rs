//! Commonplace sync runner
//!
//! Loads a staging snapshot into in-memory stores, maps it, and prints the
//! sync reports as JSON on stdout. Logs go to stderr; set `RUST_LOG` to
//! change the level.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use commonplace::duplicates::DuplicateDetector;
use commonplace::embedding::refresh_stale_embeddings;
use commonplace::{
    CancellationToken, EngineConfig, GraphError, GraphStores, LexicalEmbedder, SourceTag, StagingRow,
    SyncEngine, SyncScheduler,
};

/// Command line options
struct Options {
    /// JSON array of staging rows
    snapshot: PathBuf,
    /// Optional engine configuration file
    config: Option<PathBuf>,
    /// Sources to run; empty means all registered sources
    sources: Vec<SourceTag>,
    /// Also embed records and report duplicate candidates
    duplicates: bool,
}

fn usage() {
    println!("commonplace-sync - map a staging snapshot into the record graph");
    println!();
    println!("USAGE:");
    println!("    commonplace-sync --snapshot <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -s, --snapshot <FILE>     JSON array of staging rows");
    println!("    -c, --config <FILE>       Engine configuration (JSON)");
    println!("        --source <NAME>       Only run this source (repeatable)");
    println!("        --duplicates          Report duplicate candidates after syncing");
    println!("    -h, --help                Print help information");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut snapshot = None;
    let mut config = None;
    let mut sources = Vec::new();
    let mut duplicates = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--snapshot" | "-s" => {
                let value = iter.next().ok_or("--snapshot requires a value")?;
                snapshot = Some(PathBuf::from(value));
            }
            "--config" | "-c" => {
                let value = iter.next().ok_or("--config requires a value")?;
                config = Some(PathBuf::from(value));
            }
            "--source" => {
                let value = iter.next().ok_or("--source requires a value")?;
                let source = SourceTag::parse(value).ok_or_else(|| format!("unknown source: {value}"))?;
                sources.push(source);
            }
            "--duplicates" => duplicates = true,
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Options {
        snapshot: snapshot.ok_or("--snapshot is required")?,
        config,
        sources,
        duplicates,
    })
}

fn run(options: &Options) -> Result<serde_json::Value, GraphError> {
    let config = match &options.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let raw = std::fs::read_to_string(&options.snapshot)
        .map_err(|e| GraphError::internal(format!("reading {}: {e}", options.snapshot.display())))?;
    let rows: Vec<StagingRow> =
        serde_json::from_str(&raw).map_err(|e| GraphError::internal(format!("parsing snapshot: {e}")))?;

    let stores = GraphStores::in_memory();
    let loaded = rows.len();
    for row in rows {
        stores.staging.upsert_row(row)?;
    }
    info!(rows = loaded, snapshot = %options.snapshot.display(), "snapshot loaded");

    let engine = Arc::new(SyncEngine::new(stores.clone(), config.sync));
    let scheduler = SyncScheduler::new(Arc::clone(&engine));
    let cancel = CancellationToken::new();
    let results = if options.sources.is_empty() {
        scheduler.run_all(&cancel)?
    } else {
        scheduler.run(&options.sources, &cancel)?
    };

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(error = %e, "source run failed");
                failures.push(e.to_string());
            }
        }
    }

    let mut output = json!({ "reports": reports, "errors": failures });
    if options.duplicates {
        let embedder = LexicalEmbedder::default();
        let embedded = refresh_stale_embeddings(&stores, &embedder, usize::MAX)?;
        let candidates = DuplicateDetector::new(config.duplicates).scan_store(stores.records.as_ref())?;
        info!(embedded, candidates = candidates.len(), "duplicate scan finished");
        output["duplicates"] = json!(candidates);
    }
    Ok(output)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("error: {message}");
            usage();
            return ExitCode::from(2);
        }
    };

    match run(&options) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to serialize report");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(error = %e, "sync failed");
            ExitCode::FAILURE
        }
    }
}
