//! upload-inspector: deterministic threat analysis for uploaded files.
//!
//! This is the main entry point for the CLI application.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use upload_inspector::core::config::Config;
use upload_inspector::core::error::{Error, Result};
use upload_inspector::core::types::{ScanResult, ScanStatus};
use upload_inspector::detection::heuristic::EntropyAnalyzer;
use upload_inspector::detection::yara::YaraEngine;
use upload_inspector::scanner::{
    BatchItem, BatchScanner, BatchStatus, FileAnalyzer, ScanRecord, ScanResultStore,
};
use upload_inspector::ui::cli::{Cli, Commands, ConfigAction, OutputFormat};
use upload_inspector::utils::logging::{init_logging, set_level, LogConfig};
use uuid::Uuid;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.suggestion() {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(log_config)?;

    log::debug!("upload-inspector v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default();
    if !cli.verbose {
        set_level(LogConfig::from_config(&config).level);
    }
    log::debug!("Configuration loaded");

    match cli.command {
        Some(Commands::Scan {
            paths,
            no_store,
            rules,
        }) => run_scan(&config, paths, no_store, rules.as_deref(), cli.format).await,
        Some(Commands::Show { id }) => run_show(&config, &id, cli.format),
        Some(Commands::History { limit }) => run_history(&config, limit, cli.format),
        Some(Commands::Rules { rules }) => run_rules(rules.as_deref(), cli.format),
        Some(Commands::Config { action }) => run_config(action, &config),
        Some(Commands::Info) => run_info(&config),
        None => {
            println!("upload-inspector - threat analysis for uploaded files");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  upload-inspector scan <file>...   Analyze files");
            println!("  upload-inspector history          Show recent scans");
            println!("  upload-inspector rules            List detection rules");
            Ok(())
        }
    }
}

fn load_engine(rules: Option<&Path>) -> Result<YaraEngine> {
    match rules {
        Some(path) => YaraEngine::from_rules_file(path),
        None => YaraEngine::with_default_rules(),
    }
}

fn open_store(config: &Config) -> Result<ScanResultStore> {
    match &config.storage.database_path {
        Some(path) => ScanResultStore::open(path),
        None => ScanResultStore::open_default(),
    }
}

/// Per-file line of `scan` output.
#[derive(Serialize)]
struct ScanReport {
    scan_id: String,
    path: PathBuf,
    status: ScanStatus,
    degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Analyze files and record the outcomes.
async fn run_scan(
    config: &Config,
    paths: Vec<PathBuf>,
    no_store: bool,
    rules: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let engine = Arc::new(load_engine(rules)?);
    let analyzer = FileAnalyzer::from_config(engine, &config.analysis);
    let batch = BatchScanner::from_config(analyzer, &config.scan);
    let store = if no_store {
        None
    } else {
        Some(open_store(config)?)
    };

    let scan_ids: Vec<String> = paths.iter().map(|_| Uuid::new_v4().to_string()).collect();
    if let Some(store) = &store {
        for (scan_id, path) in scan_ids.iter().zip(&paths) {
            store.create_scan(scan_id, &display_name(path))?;
        }
    }

    let items = batch.scan_all(paths).await;

    let mut reports = Vec::with_capacity(items.len());
    let mut store_errors = 0usize;
    for (scan_id, item) in scan_ids.into_iter().zip(items) {
        let (report, store_error) = record_item(store.as_ref(), scan_id, item);
        if let Some(e) = store_error {
            log::error!("Could not store scan {}: {}", report.scan_id, e);
            store_errors += 1;
        }
        reports.push(report);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    if store_errors > 0 {
        return Err(Error::Database(format!(
            "{} of {} scan record(s) could not be stored",
            store_errors,
            reports.len()
        )));
    }
    Ok(())
}

/// Turn one batch item into a report and record it in the store.
///
/// A store failure is returned next to the report so the rest of the batch
/// is still recorded and printed.
fn record_item(
    store: Option<&ScanResultStore>,
    scan_id: String,
    item: BatchItem,
) -> (ScanReport, Option<Error>) {
    let (status, degraded, result, error) = match item.status {
        BatchStatus::Done(Ok(outcome)) => {
            let degraded = outcome.is_degraded();
            (ScanStatus::Complete, degraded, Some(outcome.into_result()), None)
        }
        BatchStatus::Done(Err(e)) => {
            if e.is_read_error() {
                log::warn!("Could not read {}: {}", item.path.display(), e);
            } else {
                log::error!("Analysis of {} failed: {}", item.path.display(), e);
            }
            (ScanStatus::Failed, false, None, Some(e.to_string()))
        }
        BatchStatus::TimedOut => (
            ScanStatus::Failed,
            false,
            None,
            Some("analysis timed out".to_string()),
        ),
    };

    let store_error = store.and_then(|store| {
        let stored = match (&result, &error) {
            (Some(result), _) => store.update_scan_results(&scan_id, result),
            (None, Some(reason)) => store.mark_failed(&scan_id, reason),
            (None, None) => Ok(()),
        };
        stored.err()
    });

    let report = ScanReport {
        scan_id,
        path: item.path,
        status,
        degraded,
        result,
        error,
    };
    (report, store_error)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_report(report: &ScanReport) {
    println!();
    println!("=== {} ===", report.path.display());
    println!("Scan ID:     {}", report.scan_id);
    match (&report.result, &report.error) {
        (Some(result), _) => {
            print_result(result);
            if report.degraded {
                println!("Note:        analysis was degraded");
            }
        }
        (None, Some(error)) => println!("Failed:      {}", error),
        (None, None) => println!("Status:      {}", report.status),
    }
}

fn print_result(result: &ScanResult) {
    println!("Risk:        {}", result.risk_level);
    println!("Type:        {}", result.mime_type);
    println!("Size:        {} bytes", result.file_size);
    println!(
        "Entropy:     {:.3} ({})",
        result.entropy,
        EntropyAnalyzer::classify(result.entropy)
    );
    println!("SHA-256:     {}", result.hashes.sha256);
    if result.threats.is_empty() {
        println!("Threats:     none");
    } else {
        println!("Threats:");
        for threat in &result.threats {
            println!("  - {}", threat);
        }
    }
}

/// Show one stored scan.
fn run_show(config: &Config, id: &str, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let record = store
        .get_scan(id)?
        .ok_or_else(|| Error::ScanNotFound(id.to_string()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => print_record(&record),
    }
    Ok(())
}

fn print_record(record: &ScanRecord) {
    println!("Scan ID:     {}", record.scan_id);
    println!("File:        {}", record.filename);
    println!("Status:      {}", record.status);
    println!("Created:     {}", record.created_at.to_rfc3339());
    if let Some(error) = &record.error {
        println!("Error:       {}", error);
    }
    if let Some(result) = &record.result {
        print_result(result);
    }
}

/// Show recent scans.
fn run_history(config: &Config, limit: usize, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let records = store.recent_scans(limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No scans recorded.");
            }
            for record in &records {
                let risk = record
                    .result
                    .as_ref()
                    .map(|r| r.risk_level.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<9} {:<8} {:>3} threat(s)  {}",
                    record.scan_id,
                    record.status,
                    risk,
                    record.threats.len(),
                    record.filename
                );
            }
        }
    }
    Ok(())
}

/// List detection rules.
fn run_rules(rules: Option<&Path>, format: OutputFormat) -> Result<()> {
    let engine = load_engine(rules)?;

    match format {
        OutputFormat::Json => {
            let rules: Vec<_> = engine
                .list_rules()
                .into_iter()
                .filter_map(|name| engine.get_rule(name))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        OutputFormat::Text => {
            for name in engine.list_rules() {
                let description = engine
                    .get_rule(name)
                    .and_then(|rule| rule.meta.description.as_deref())
                    .unwrap_or("");
                println!("{:<28} {}", name, description);
            }
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn run_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Reset => {
            log::info!("Resetting configuration to defaults...");
            Config::default().save(&Config::default_config_path())?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", Config::default_config_path().display());
        }
    }
    Ok(())
}

/// Show application information.
fn run_info(config: &Config) -> Result<()> {
    let engine = YaraEngine::with_default_rules()?;

    println!("upload-inspector - threat analysis for uploaded files");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Config Path:      {}", Config::default_config_path().display());
    println!("Data Directory:   {}", Config::data_dir().display());
    println!("Database:         {}", config.storage.database_path().display());
    println!("Built-in Rules:   {}", engine.rule_count());
    println!();
    println!("Analysis Settings:");
    match config.analysis.max_file_size_bytes() {
        Some(_) => println!("  Max File Size:  {} MB", config.analysis.max_file_size_mb),
        None => println!("  Max File Size:  unlimited"),
    }
    println!("  Workers:        {}", config.scan.workers);
    println!("  Job Timeout:    {} s", config.scan.job_timeout_secs);
    Ok(())
}
