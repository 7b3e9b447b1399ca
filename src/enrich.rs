//! The enrichment loop.
//!
//! Rows are processed strictly in order, one inference call in flight at a
//! time. Rows before the start offset are copied through verbatim, or taken
//! from the scratch file a halted run left behind; every row
//! from the start offset on is rebuilt from its title and author plus a
//! freshly derived tail. Each row moves through
//! `PENDING -> CALLING -> {MERGED, SENTINEL, FATAL}`:
//!
//! - MERGED: the reply parsed; the merged row is appended.
//! - SENTINEL: retries ran out; the row is appended with sentinel values.
//! - FATAL: the service failed permanently; the loop stops without
//!   committing, so the original file is left as it was.
//!
//! When every row has been written the scratch file replaces the original.
//!
//! A halted run's scratch file is never truncated unasked. If it holds
//! fewer complete rows than the start offset skips, the run refuses to
//! begin unless told to discard it.

use crate::inference::{Enricher, EnrichmentOutcome, ServiceError};
use crate::record::Record;
use crate::run_log::{RowLogBuilder, RunLog};
use crate::store::{AbandonedWrite, BackupOutcome, RecordStore, StoreError};
use crate::util::now_epoch_ms;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("row {offset}: {source}; the original file was not modified and the rows already written were kept, rerun with --start {offset} to continue")]
    Fatal {
        offset: usize,
        #[source]
        source: ServiceError,
    },
    #[error(
        "{} holds {rows} finished rows from an earlier run but --start {start} skips {needed}; rerun with --start {} or lower, or pass --discard-scratch to drop them",
        path.display(),
        rows + 1
    )]
    AbandonedWrite {
        path: PathBuf,
        rows: usize,
        start: usize,
        needed: usize,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Loop settings taken from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// First row to enrich (1-indexed); lower values are treated as 1.
    pub start_offset: usize,
    /// Courtesy pause between inference calls.
    pub delay: Duration,
    pub backup: bool,
    /// Drop a halted run's scratch file instead of reusing its rows.
    pub discard_abandoned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_rows: usize,
    /// Rows before the start offset, copied unchanged.
    pub copied: usize,
    /// Rows before the start offset taken from a halted run's scratch file.
    pub reused: usize,
    pub merged: usize,
    pub sentinel: usize,
    pub backup: Option<BackupOutcome>,
}

/// Run the loop over the whole store.
pub fn run_enrichment(
    store: &RecordStore,
    enricher: &Enricher,
    settings: &LoopSettings,
    log: &RunLog,
) -> Result<RunSummary, RunError> {
    // Validate everything before touching the filesystem.
    let snapshot = store.scan()?;
    let start = settings.start_offset.max(1);
    let run_id = now_epoch_ms();
    tracing::info!(
        rows = snapshot.rows,
        start,
        service = %enricher.describe(),
        schema = %enricher.schema(),
        "starting enrichment"
    );

    let mut summary = RunSummary {
        total_rows: snapshot.rows,
        ..RunSummary::default()
    };
    let mut prefix = claim_prefix(store, settings, start, snapshot.rows)?;
    if settings.backup {
        summary.backup = Some(store.backup()?);
    }

    let mut writer = store.begin_incremental_write()?;
    let mut calls = 0usize;

    for row in store.rows(snapshot.encoding)? {
        let row = row?;
        let offset = row.offset;
        if offset < start {
            match prefix.as_mut() {
                Some(prefix) => {
                    writer.write_raw(&prefix.take_matching(&row)?)?;
                    summary.reused += 1;
                }
                None => {
                    writer.copy_through(&row)?;
                    summary.copied += 1;
                }
            }
            continue;
        }
        if let Some(prefix) = prefix.take() {
            prefix.discard()?;
        }

        if calls > 0 && !settings.delay.is_zero() {
            thread::sleep(settings.delay);
        }
        calls += 1;

        let title = row.record.title();
        let author = row.record.author();
        let entry = RowLogBuilder::new(run_id, offset, title);
        let enrichment = match enricher.enrich(title, author) {
            Ok(enrichment) => enrichment,
            Err(source) => {
                log.record(&entry.fatal(source.to_string()));
                eprintln!(
                    "enrich: [{offset}/{}] FATAL '{title}' by {author}: {source}",
                    snapshot.rows
                );
                tracing::error!(
                    offset,
                    scratch = %writer.scratch_path().display(),
                    "halting; scratch file left in place"
                );
                return Err(RunError::Fatal { offset, source });
            }
        };

        let merged = Record::merged(title, author, enrichment.result().fields());
        writer.append(&merged)?;

        let retries = enrichment.retry.attempt;
        tracing::debug!(
            offset,
            retries,
            waited_ms = enrichment.retry.waited.as_millis() as u64,
            "row written"
        );
        match &enrichment.outcome {
            EnrichmentOutcome::Parsed(_) => {
                summary.merged += 1;
                log.record(&entry.merged(retries));
                eprintln!(
                    "enrich: [{offset}/{}] merged '{title}' by {author}",
                    snapshot.rows
                );
            }
            EnrichmentOutcome::Sentinel { last_error, .. } => {
                summary.sentinel += 1;
                log.record(&entry.sentinel(retries, last_error.as_str()));
                eprintln!(
                    "enrich: [{offset}/{}] sentinel '{title}' by {author} after {} attempts",
                    snapshot.rows,
                    retries + 1
                );
            }
        }
    }

    if let Some(prefix) = prefix.take() {
        prefix.discard()?;
    }
    let written = writer.commit()?;
    tracing::info!(
        rows = written,
        merged = summary.merged,
        sentinel = summary.sentinel,
        copied = summary.copied,
        reused = summary.reused,
        "enrichment committed"
    );
    Ok(summary)
}

/// Decide what happens to a scratch file left by a halted run.
///
/// Its complete rows stand in for the rows before `start`, so resuming with
/// `--start k+1` after `k` finished rows gives the same file as one run.
fn claim_prefix(
    store: &RecordStore,
    settings: &LoopSettings,
    start: usize,
    total_rows: usize,
) -> Result<Option<AbandonedWrite>, RunError> {
    let Some(rows) = store.abandoned_rows()? else {
        return Ok(None);
    };
    if settings.discard_abandoned {
        store.discard_abandoned_write()?;
        return Ok(None);
    }
    let needed = (start - 1).min(total_rows);
    if rows < needed {
        return Err(RunError::AbandonedWrite {
            path: store.scratch_path(),
            rows,
            start,
            needed,
        });
    }
    if rows > needed {
        tracing::warn!(
            rows,
            reused = needed,
            "scratch file has rows past --start; they will be derived again"
        );
    }
    let prefix = store.claim_abandoned_write()?;
    tracing::info!(reused = needed, "resuming from a halted run's scratch file");
    Ok(prefix)
}
