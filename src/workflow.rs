use crate::clean::clean_file;
use crate::cli::{CleanArgs, RunArgs, SalvageArgs, StatusArgs};
use crate::config::{load_config_file, ConfigFile, RunConfig, ServiceSelection};
use crate::enrich::{run_enrichment, RunSummary};
use crate::inference::{ChatCompletionService, CommandService, CompletionService, Enricher};
use crate::run_log::{summarize_latest, RunLog, RunLogSummary};
use crate::store::{BackupOutcome, Encoding, RecordStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub fn run_enrich(args: RunArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    let config = RunConfig::resolve(&args, file, |key| std::env::var(key).ok())?;
    let service = build_service(&config.service)?;
    let enricher = Enricher::new(service, config.schema, config.retry);
    let store = RecordStore::new(&config.input_path, config.delimiter, config.encoding);
    let log = RunLog::new(&config.log_path);

    let summary = run_enrichment(&store, &enricher, &config.loop_settings(), &log)
        .with_context(|| format!("enrich {}", config.input_path.display()))?;
    print_run_summary(&config.input_path, &summary);
    Ok(())
}

fn build_service(selection: &ServiceSelection) -> Result<Box<dyn CompletionService>> {
    match selection {
        ServiceSelection::Command(command) => Ok(Box::new(CommandService::parse(command)?)),
        ServiceSelection::Http {
            base_url,
            api_key,
            model,
            timeout,
        } => Ok(Box::new(ChatCompletionService::new(
            base_url,
            api_key.clone(),
            model.clone(),
            *timeout,
        )?)),
    }
}

fn print_run_summary(input: &Path, summary: &RunSummary) {
    println!(
        "Enriched {}: {} rows ({} merged, {} sentinel, {} copied, {} reused from scratch)",
        input.display(),
        summary.total_rows,
        summary.merged,
        summary.sentinel,
        summary.copied,
        summary.reused
    );
    print_backup(summary.backup.as_ref());
}

fn print_backup(backup: Option<&BackupOutcome>) {
    match backup {
        Some(BackupOutcome::Created(path)) => println!("Backup written to {}", path.display()),
        Some(BackupOutcome::AlreadyPresent(path)) => {
            println!("Backup kept at {} (already present)", path.display())
        }
        None => {}
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    input: PathBuf,
    log: PathBuf,
    last_run: RunLogSummary,
    /// Complete rows in a scratch file left by a halted run.
    abandoned_rows: Option<usize>,
    /// Suggested `--start` for the next run; `None` when nothing is pending.
    next_start: Option<usize>,
    next_action: Option<String>,
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let log = match &args.log_file {
        Some(path) => RunLog::new(path),
        None => RunLog::for_input(&args.input),
    };
    let last_run = summarize_latest(&log.load()?);
    let store = RecordStore::new(&args.input, ',', Encoding::Auto);
    let abandoned_rows = store.abandoned_rows()?;
    let input = args.input.display().to_string();

    let (next_start, next_action) = match (abandoned_rows, last_run.fatal_offset) {
        (Some(rows), _) => (
            Some(rows + 1),
            Some(format!("bookrich run --input {input} --start {}", rows + 1)),
        ),
        (None, Some(offset)) => (
            Some(offset),
            Some(format!("bookrich run --input {input} --start {offset}")),
        ),
        (None, None) => (None, None),
    };

    let report = StatusReport {
        input: args.input.clone(),
        log: log.path().to_path_buf(),
        last_run,
        abandoned_rows,
        next_start,
        next_action,
    };

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status report")?;
        println!("{text}");
    } else {
        print_status(&report);
    }
    Ok(())
}

fn print_status(report: &StatusReport) {
    let run = &report.last_run;
    println!("input: {}", report.input.display());
    println!("log: {}", report.log.display());
    match run.run_id {
        None => println!("last run: none recorded"),
        Some(run_id) => {
            let state = if run.halted() { "halted" } else { "finished" };
            println!(
                "last run: {run_id} ({state}; {} merged, {} sentinel)",
                run.merged, run.sentinel
            );
            if let Some(last) = run.last_written {
                println!("last row written: {last}");
            }
            if let (Some(offset), Some(error)) = (run.fatal_offset, run.fatal_error.as_deref()) {
                println!("halted on row {offset}: {error}");
            }
            if !run.sentinel_offsets.is_empty() {
                let rows: Vec<String> = run.sentinel_offsets.iter().map(usize::to_string).collect();
                println!("sentinel rows: {}", rows.join(", "));
            }
        }
    }
    if let Some(rows) = report.abandoned_rows {
        println!("scratch file: {rows} complete rows not yet in the input");
    }
    match &report.next_action {
        Some(action) => println!("next: {action}"),
        None => println!("next: nothing pending"),
    }
}

pub fn run_salvage(args: SalvageArgs) -> Result<()> {
    let store = RecordStore::new(&args.input, args.delimiter, args.encoding);
    match store.salvage()? {
        Some(report) => {
            println!(
                "Salvaged {}: {} rows recovered, {} carried from the original",
                args.input.display(),
                report.recovered,
                report.carried
            );
            println!(
                "next: bookrich run --input {} --start {}",
                args.input.display(),
                report.next_start()
            );
        }
        None => println!("Nothing to salvage for {}", args.input.display()),
    }
    Ok(())
}

pub fn run_clean(args: CleanArgs) -> Result<()> {
    let summary = clean_file(&args.input, &args.output, args.encoding, args.backup)?;
    println!(
        "Cleaned {} into {}: {} rows ({} title-only, {} blank lines dropped)",
        args.input.display(),
        args.output.display(),
        summary.rows_written,
        summary.single_column,
        summary.blank_skipped
    );
    print_backup(summary.backup.as_ref());
    Ok(())
}
