//! Per-row outcome log for enrichment runs.
//!
//! Entries are appended to `<input>.log.jsonl` as newline-delimited JSON, one
//! per processed row:
//!
//! ```jsonl
//! {"schema_version":1,"run_id":1707900000000,"ts":1707900001200,"offset":12,"outcome":"merged","retries":0,...}
//! {"schema_version":1,"run_id":1707900000000,"ts":1707900004100,"offset":13,"outcome":"sentinel","retries":3,...}
//! ```
//!
//! The log is how an operator finds where a halted run stopped; `status`
//! reads it back to suggest the next `--start`.

use crate::util::{now_epoch_ms, truncate_string};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Current schema version for run log entries.
pub const RUN_LOG_SCHEMA_VERSION: u32 = 1;

const TITLE_PREVIEW_BYTES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// Parsed result merged into the row.
    Merged,
    /// Retries exhausted; sentinel values written.
    Sentinel,
    /// Permanent failure; the run halted on this row.
    Fatal,
}

impl fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::Sentinel => write!(f, "sentinel"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub schema_version: u32,

    /// Epoch milliseconds at which the run started; groups entries by run.
    pub run_id: u64,

    /// Epoch milliseconds at which the row finished.
    pub ts: u64,

    /// 1-indexed row position.
    pub offset: usize,

    pub outcome: RowOutcome,

    /// Retries spent on this row.
    pub retries: u32,

    pub duration_ms: u64,

    /// Title preview for quick reference.
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Times one row and finishes it into a log entry.
pub struct RowLogBuilder {
    start: Instant,
    run_id: u64,
    offset: usize,
    title: String,
}

impl RowLogBuilder {
    pub fn new(run_id: u64, offset: usize, title: &str) -> Self {
        Self {
            start: Instant::now(),
            run_id,
            offset,
            title: truncate_string(title, TITLE_PREVIEW_BYTES),
        }
    }

    pub fn merged(self, retries: u32) -> RunLogEntry {
        self.build(RowOutcome::Merged, retries, None)
    }

    pub fn sentinel(self, retries: u32, error: impl Into<String>) -> RunLogEntry {
        self.build(RowOutcome::Sentinel, retries, Some(error.into()))
    }

    pub fn fatal(self, error: impl Into<String>) -> RunLogEntry {
        self.build(RowOutcome::Fatal, 0, Some(error.into()))
    }

    fn build(self, outcome: RowOutcome, retries: u32, error: Option<String>) -> RunLogEntry {
        RunLogEntry {
            schema_version: RUN_LOG_SCHEMA_VERSION,
            run_id: self.run_id,
            ts: now_epoch_ms(),
            offset: self.offset,
            outcome,
            retries,
            duration_ms: self.start.elapsed().as_millis() as u64,
            title: self.title,
            error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default log location for an input file.
    pub fn for_input(input: &Path) -> Self {
        let mut name = input.as_os_str().to_os_string();
        name.push(".log.jsonl");
        Self::new(PathBuf::from(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &RunLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open run log for append: {}", self.path.display()))?;
        let line = serde_json::to_string(entry).context("serialize run log entry")?;
        writeln!(file, "{line}").context("write run log entry")?;
        Ok(())
    }

    /// Append without failing the caller; the log is advisory.
    pub fn record(&self, entry: &RunLogEntry) {
        if let Err(err) = self.append(entry) {
            tracing::warn!(path = %self.path.display(), "run log write failed: {err:#}");
        }
    }

    pub fn load(&self) -> Result<Vec<RunLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("open run log: {}", self.path.display()))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read line {} of run log", line_num + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(line = line_num + 1, "skip corrupt run log entry: {err}");
                }
            }
        }
        Ok(entries)
    }
}

/// What the most recent run in a log got through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunLogSummary {
    pub run_id: Option<u64>,
    pub merged: usize,
    pub sentinel: usize,
    /// Highest row written by the run (merged or sentinel).
    pub last_written: Option<usize>,
    /// Row the run halted on, if it halted.
    pub fatal_offset: Option<usize>,
    pub fatal_error: Option<String>,
    /// Rows written with sentinel values, for follow-up reruns.
    pub sentinel_offsets: Vec<usize>,
}

impl RunLogSummary {
    pub fn halted(&self) -> bool {
        self.fatal_offset.is_some()
    }
}

/// Summarize the entries of the latest run.
pub fn summarize_latest(entries: &[RunLogEntry]) -> RunLogSummary {
    let Some(run_id) = entries.iter().map(|entry| entry.run_id).max() else {
        return RunLogSummary::default();
    };
    let mut summary = RunLogSummary {
        run_id: Some(run_id),
        ..RunLogSummary::default()
    };
    for entry in entries.iter().filter(|entry| entry.run_id == run_id) {
        match entry.outcome {
            RowOutcome::Merged => summary.merged += 1,
            RowOutcome::Sentinel => {
                summary.sentinel += 1;
                summary.sentinel_offsets.push(entry.offset);
            }
            RowOutcome::Fatal => {
                summary.fatal_offset = Some(entry.offset);
                summary.fatal_error = entry.error.clone();
                continue;
            }
        }
        summary.last_written = summary.last_written.max(Some(entry.offset));
    }
    summary
}
