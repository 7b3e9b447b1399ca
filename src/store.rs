//! Flat-file record store with incremental, atomically published rewrites.
//!
//! The original file is never written in place. Rewrites go to a fixed
//! scratch file next to it (`.<name>.tmp`) one row at a time and replace the
//! original with a single rename once every row is written. A run that
//! stops early leaves the scratch file behind and the original untouched.

use crate::record::{parse_line, Record, MIN_COLUMNS};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: row {row}: {detail}", path.display())]
    Format {
        path: PathBuf,
        row: usize,
        detail: String,
    },
    #[error("{action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Text encoding of the input file. Output is always UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// UTF-8 if every line decodes, Latin-1 otherwise.
    #[default]
    Auto,
    #[value(name = "utf-8", alias = "utf8")]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[value(name = "latin-1", alias = "latin1")]
    #[serde(rename = "latin-1", alias = "latin1")]
    Latin1,
}

/// Result of a validating pass over the whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub rows: usize,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(PathBuf),
    AlreadyPresent(PathBuf),
}

/// One row read from disk, with its source text kept for verbatim copies.
#[derive(Debug, Clone)]
pub struct StoredRow {
    /// 1-indexed row position.
    pub offset: usize,
    /// Decoded source line including its terminator, if any.
    pub raw: String,
    pub record: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalvageReport {
    /// Rows taken from the abandoned scratch file.
    pub recovered: usize,
    /// Rows taken from the original file after the recovered prefix.
    pub carried: usize,
}

impl SalvageReport {
    /// The `--start` value that continues after the recovered rows.
    pub fn next_start(&self) -> usize {
        self.recovered + 1
    }
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    delimiter: char,
    encoding: Encoding,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>, delimiter: char, encoding: Encoding) -> Self {
        Self {
            path: path.into(),
            delimiter,
            encoding,
        }
    }

    pub fn scratch_path(&self) -> PathBuf {
        sibling_path(&self.path, "tmp")
    }

    fn salvage_path(&self) -> PathBuf {
        sibling_path(&self.path, "salvage.tmp")
    }

    /// Where an abandoned scratch file is set aside while a new run reads it.
    fn resume_path(&self) -> PathBuf {
        sibling_path(&self.path, "resume.tmp")
    }

    /// Parse the whole file into memory.
    #[cfg(test)]
    pub fn load(&self) -> Result<Vec<Record>, StoreError> {
        let encoding = self.resolve_encoding()?;
        self.rows(encoding)?
            .map(|row| row.map(|row| row.record))
            .collect()
    }

    /// Validate every row without holding more than one in memory.
    ///
    /// Resolves [`Encoding::Auto`] to the concrete encoding later reads use.
    pub fn scan(&self) -> Result<Snapshot, StoreError> {
        let encoding = self.resolve_encoding()?;
        let mut rows = 0;
        for row in self.rows(encoding)? {
            row?;
            rows += 1;
        }
        Ok(Snapshot { rows, encoding })
    }

    /// Stream rows in file order using an encoding resolved by [`scan`](Self::scan).
    pub fn rows(&self, encoding: Encoding) -> Result<RecordReader, StoreError> {
        Ok(RecordReader {
            lines: LineReader::open(&self.path, encoding)?,
            delimiter: self.delimiter,
        })
    }

    /// Copy the source file to `<input>.bak` unless a backup already exists.
    pub fn backup(&self) -> Result<BackupOutcome, StoreError> {
        backup_once(&self.path)
    }

    /// Open the scratch file that will replace the original on commit.
    pub fn begin_incremental_write(&self) -> Result<ScopedWriter, StoreError> {
        ScopedWriter::create(self.scratch_path(), self.path.clone(), self.delimiter)
    }

    /// Whether an earlier run left its scratch file behind.
    #[cfg(test)]
    pub fn has_abandoned_write(&self) -> bool {
        self.scratch_path().exists() || self.resume_path().exists()
    }

    /// Count the complete rows in an abandoned scratch file.
    pub fn abandoned_rows(&self) -> Result<Option<usize>, StoreError> {
        let mut rows = None;
        for path in [self.scratch_path(), self.resume_path()] {
            if path.exists() {
                rows = rows.max(Some(count_complete_rows(&path)?));
            }
        }
        Ok(rows)
    }

    /// Move an abandoned scratch file aside and open it for reading.
    ///
    /// The new run's writer can then reuse the scratch path without
    /// truncating rows it still has to copy. When both the scratch file and
    /// an earlier set-aside copy exist, the one with more complete rows wins.
    pub fn claim_abandoned_write(&self) -> Result<Option<AbandonedWrite>, StoreError> {
        let scratch = self.scratch_path();
        let resume = self.resume_path();
        if scratch.exists() {
            if resume.exists() && count_complete_rows(&resume)? > count_complete_rows(&scratch)? {
                fs::remove_file(&scratch).map_err(StoreError::io("remove", &scratch))?;
            } else {
                fs::rename(&scratch, &resume).map_err(StoreError::io("set aside", &scratch))?;
            }
        } else if !resume.exists() {
            return Ok(None);
        }
        let rows = count_complete_rows(&resume)?;
        tracing::debug!(path = %resume.display(), rows, "claimed abandoned scratch file");
        Ok(Some(AbandonedWrite {
            lines: LineReader::open(&resume, Encoding::Utf8)?,
            path: resume,
            delimiter: self.delimiter,
            rows,
        }))
    }

    /// Delete any abandoned scratch file.
    pub fn discard_abandoned_write(&self) -> Result<(), StoreError> {
        for path in [self.scratch_path(), self.resume_path()] {
            if path.exists() {
                fs::remove_file(&path).map_err(StoreError::io("remove", &path))?;
                tracing::warn!(path = %path.display(), "discarded abandoned scratch file");
            }
        }
        Ok(())
    }

    /// Fold the completed rows of an abandoned scratch file into the original.
    ///
    /// The result is the scratch file's complete rows followed by the
    /// original's remaining rows, published with one rename. The abandoned
    /// scratch file is removed afterwards. Returns `None` when there is
    /// nothing to salvage.
    pub fn salvage(&self) -> Result<Option<SalvageReport>, StoreError> {
        let Some(recovered) = self.abandoned_rows()? else {
            return Ok(None);
        };
        let snapshot = self.scan()?;
        if recovered > snapshot.rows {
            return Err(StoreError::Format {
                path: self.scratch_path(),
                row: recovered,
                detail: format!(
                    "scratch file has {recovered} rows but the original only has {}",
                    snapshot.rows
                ),
            });
        }
        let Some(mut prefix) = self.claim_abandoned_write()? else {
            return Ok(None);
        };

        let mut writer =
            ScopedWriter::create(self.salvage_path(), self.path.clone(), self.delimiter)?;
        let mut carried = 0;
        for row in self.rows(snapshot.encoding)? {
            let row = row?;
            if row.offset <= recovered {
                let line = prefix.take_matching(&row)?;
                writer.write_raw(&line)?;
            } else {
                writer.copy_through(&row)?;
                carried += 1;
            }
        }
        writer.commit()?;
        prefix.discard()?;

        tracing::info!(recovered, carried, path = %self.path.display(), "salvaged scratch file");
        Ok(Some(SalvageReport { recovered, carried }))
    }

    fn resolve_encoding(&self) -> Result<Encoding, StoreError> {
        resolve_encoding(&self.path, self.encoding)
    }
}

/// Resolve [`Encoding::Auto`] by checking whether every line is UTF-8.
pub(crate) fn resolve_encoding(path: &Path, encoding: Encoding) -> Result<Encoding, StoreError> {
    if encoding != Encoding::Auto {
        return Ok(encoding);
    }
    let file = File::open(path).map_err(StoreError::io("open", path))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(StoreError::io("read", path))?;
        if read == 0 {
            return Ok(Encoding::Utf8);
        }
        if std::str::from_utf8(&buf).is_err() {
            tracing::debug!(path = %path.display(), "input is not UTF-8; reading as Latin-1");
            return Ok(Encoding::Latin1);
        }
    }
}

/// Path of the one-time backup for `path`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to its backup path unless one already exists.
///
/// The copy is staged under a temporary name and renamed into place so an
/// interrupted copy never masquerades as a finished backup.
pub fn backup_once(path: &Path) -> Result<BackupOutcome, StoreError> {
    let backup = backup_path_for(path);
    if backup.exists() {
        tracing::debug!(backup = %backup.display(), "backup already present");
        return Ok(BackupOutcome::AlreadyPresent(backup));
    }
    let staged = sibling_path(&backup, "tmp");
    fs::copy(path, &staged).map_err(StoreError::io("copy backup of", path))?;
    fs::rename(&staged, &backup).map_err(StoreError::io("publish backup", &backup))?;
    tracing::info!(backup = %backup.display(), "created backup");
    Ok(BackupOutcome::Created(backup))
}

/// `<dir>/.<file name>.<suffix>`, on the same filesystem as `path`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("records");
    path.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.{suffix}"))
}

/// Decoded line reader that keeps line terminators.
pub(crate) struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    encoding: Encoding,
    buf: Vec<u8>,
    line_no: usize,
}

impl LineReader {
    pub(crate) fn open(path: &Path, encoding: Encoding) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(StoreError::io("open", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            encoding,
            buf: Vec::new(),
            line_no: 0,
        })
    }

    pub(crate) fn line_no(&self) -> usize {
        self.line_no
    }

    pub(crate) fn next_line(&mut self) -> Result<Option<String>, StoreError> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(StoreError::io("read", &self.path))?;
        if read == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let line = match self.encoding {
            Encoding::Latin1 => self.buf.iter().map(|&byte| char::from(byte)).collect(),
            Encoding::Utf8 | Encoding::Auto => String::from_utf8(self.buf.clone()).map_err(|err| {
                StoreError::Format {
                    path: self.path.clone(),
                    row: self.line_no,
                    detail: format!("invalid UTF-8: {err}"),
                }
            })?,
        };
        Ok(Some(line))
    }
}

/// Strip one trailing `\n` or `\r\n`.
pub(crate) fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn count_complete_rows(path: &Path) -> Result<usize, StoreError> {
    let mut lines = LineReader::open(path, Encoding::Utf8)?;
    let mut complete = 0;
    while let Some(line) = lines.next_line()? {
        if !line.ends_with('\n') {
            break;
        }
        complete += 1;
    }
    Ok(complete)
}

/// Rows written by a halted run, read back in order.
///
/// Only complete rows are handed out; a trailing partial row is ignored.
pub struct AbandonedWrite {
    path: PathBuf,
    lines: LineReader,
    delimiter: char,
    rows: usize,
}

impl AbandonedWrite {
    /// The next complete row, checked against the input row it replaces.
    pub fn take_matching(&mut self, row: &StoredRow) -> Result<String, StoreError> {
        let mismatch = |detail: String| StoreError::Format {
            path: self.path.clone(),
            row: row.offset,
            detail,
        };
        if self.lines.line_no() >= self.rows {
            return Err(mismatch(format!("only {} complete rows", self.rows)));
        }
        let line = self
            .lines
            .next_line()?
            .ok_or_else(|| mismatch(format!("only {} complete rows", self.rows)))?;
        let title = parse_line(strip_terminator(&line), self.delimiter)
            .ok()
            .and_then(|fields| fields.into_iter().next())
            .unwrap_or_default();
        if title.trim() != row.record.title() {
            return Err(mismatch(format!(
                "scratch row '{}' does not match input row '{}'",
                title.trim(),
                row.record.title()
            )));
        }
        Ok(line)
    }

    pub fn discard(self) -> Result<(), StoreError> {
        let Self { path, lines, .. } = self;
        drop(lines);
        fs::remove_file(&path).map_err(StoreError::io("remove", &path))
    }
}

/// Streaming iterator over validated rows.
pub struct RecordReader {
    lines: LineReader,
    delimiter: char,
}

impl RecordReader {
    fn read_row(&mut self) -> Result<Option<StoredRow>, StoreError> {
        let Some(raw) = self.lines.next_line()? else {
            return Ok(None);
        };
        let offset = self.lines.line_no();
        let format_error = |detail: String| StoreError::Format {
            path: self.lines.path.clone(),
            row: offset,
            detail,
        };
        let fields = parse_line(strip_terminator(&raw), self.delimiter)
            .map_err(|err| format_error(err.to_string()))?;
        if fields.len() < MIN_COLUMNS {
            return Err(format_error(format!(
                "expected at least {MIN_COLUMNS} columns (title, author), found {}",
                fields.len()
            )));
        }
        Ok(Some(StoredRow {
            offset,
            raw,
            record: Record::new(fields),
        }))
    }
}

impl Iterator for RecordReader {
    type Item = Result<StoredRow, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row().transpose()
    }
}

/// Scratch-file writer that replaces its target only on [`commit`](Self::commit).
///
/// Every appended row is flushed before the call returns. Dropping the
/// writer without committing leaves the scratch file on disk.
pub struct ScopedWriter {
    scratch: PathBuf,
    target: PathBuf,
    out: BufWriter<File>,
    delimiter: char,
    rows: usize,
}

impl ScopedWriter {
    fn create(scratch: PathBuf, target: PathBuf, delimiter: char) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&scratch)
            .map_err(StoreError::io("create", &scratch))?;
        tracing::debug!(scratch = %scratch.display(), "opened scratch file");
        Ok(Self {
            scratch,
            target,
            out: BufWriter::new(file),
            delimiter,
            rows: 0,
        })
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch
    }

    /// Write one freshly formatted row.
    pub fn append(&mut self, record: &Record) -> Result<(), StoreError> {
        let mut line = record.to_line(self.delimiter);
        line.push('\n');
        self.write_raw(&line)
    }

    /// Write a row exactly as it was read.
    pub fn copy_through(&mut self, row: &StoredRow) -> Result<(), StoreError> {
        if row.raw.ends_with('\n') {
            self.write_raw(&row.raw)
        } else {
            self.write_raw(&format!("{}\n", row.raw))
        }
    }

    /// Write text that already carries its terminator.
    pub(crate) fn write_raw(&mut self, line: &str) -> Result<(), StoreError> {
        self.out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(StoreError::io("write", &self.scratch))?;
        self.rows += 1;
        Ok(())
    }

    /// Sync the scratch file and rename it over the target.
    pub fn commit(self) -> Result<usize, StoreError> {
        let Self {
            scratch,
            target,
            out,
            rows,
            ..
        } = self;
        let file = out
            .into_inner()
            .map_err(|err| StoreError::Io {
                action: "flush",
                path: scratch.clone(),
                source: err.into_error(),
            })?;
        file.sync_all().map_err(StoreError::io("sync", &scratch))?;
        drop(file);
        fs::rename(&scratch, &target).map_err(StoreError::io("replace", &target))?;
        tracing::debug!(target = %target.display(), rows, "committed rewrite");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_input(dir: &Path, contents: &[u8]) -> PathBuf {
        let path = dir.join("books.csv");
        fs::write(&path, contents).unwrap();
        path
    }

    fn store(path: &Path) -> RecordStore {
        RecordStore::new(path, ',', Encoding::Auto)
    }

    #[test]
    fn load_parses_rows_and_keeps_tails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Dune,Herbert\nEmma,Austen,1815,Novel\n");
        let records = store(&path).load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title(), "Emma");
        assert_eq!(records[1].to_line(','), "Emma,Austen,1815,Novel");
    }

    #[test]
    fn short_row_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Dune,Herbert\nJust a title\n");
        let err = store(&path).scan().unwrap_err();
        match err {
            StoreError::Format { row, .. } => assert_eq!(row, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_interior_line_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Dune,Herbert\n\nEmma,Austen\n");
        assert!(matches!(
            store(&path).load(),
            Err(StoreError::Format { row: 2, .. })
        ));
    }

    #[test]
    fn auto_encoding_falls_back_to_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Les Mis\xe9rables,Hugo\n");
        let snapshot = store(&path).scan().unwrap();
        assert_eq!(snapshot.encoding, Encoding::Latin1);
        let records = store(&path).load().unwrap();
        assert_eq!(records[0].title(), "Les Misérables");
    }

    #[test]
    fn strict_utf8_rejects_invalid_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Les Mis\xe9rables,Hugo\n");
        let store = RecordStore::new(&path, ',', Encoding::Utf8);
        assert!(matches!(store.scan(), Err(StoreError::Format { row: 1, .. })));
    }

    #[test]
    fn commit_replaces_original_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Dune,Herbert\n");
        let store = store(&path);
        let mut writer = store.begin_incremental_write().unwrap();
        writer
            .append(&Record::merged("Dune", "Herbert", &["1965".to_string()]))
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Dune,Herbert\n");
        assert_eq!(writer.commit().unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Dune,Herbert,1965\n");
        assert!(!store.has_abandoned_write());
    }

    #[test]
    fn dropped_writer_leaves_scratch_and_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Dune,Herbert\nEmma,Austen\n");
        let store = store(&path);
        {
            let mut writer = store.begin_incremental_write().unwrap();
            writer
                .append(&Record::merged("Dune", "Herbert", &["1965".to_string()]))
                .unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "Dune,Herbert\nEmma,Austen\n");
        assert_eq!(
            fs::read_to_string(store.scratch_path()).unwrap(),
            "Dune,Herbert,1965\n"
        );
        assert_eq!(store.abandoned_rows().unwrap(), Some(1));
    }

    #[test]
    fn copy_through_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let original = b"\"Dune\" ,Herbert\r\nEmma,Austen";
        let path = write_input(dir.path(), original);
        let store = store(&path);
        let mut writer = store.begin_incremental_write().unwrap();
        for row in store.rows(Encoding::Utf8).unwrap() {
            writer.copy_through(&row.unwrap()).unwrap();
        }
        writer.commit().unwrap();
        assert_eq!(
            fs::read(&path).unwrap(),
            b"\"Dune\" ,Herbert\r\nEmma,Austen\n".to_vec()
        );
    }

    #[test]
    fn backup_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"Dune,Herbert\n");
        let store = store(&path);
        assert!(matches!(store.backup().unwrap(), BackupOutcome::Created(_)));

        fs::write(&path, b"changed,later\n").unwrap();
        assert!(matches!(
            store.backup().unwrap(),
            BackupOutcome::AlreadyPresent(_)
        ));
        assert_eq!(
            fs::read_to_string(backup_path_for(&path)).unwrap(),
            "Dune,Herbert\n"
        );
    }

    #[test]
    fn salvage_merges_scratch_prefix_with_original_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"A,1\nB,2\nC,3\n");
        let store = store(&path);
        fs::write(store.scratch_path(), b"A,1,x\nB,2,y\nC,3,partial").unwrap();

        let report = store.salvage().unwrap().unwrap();
        assert_eq!(report.recovered, 2);
        assert_eq!(report.carried, 1);
        assert_eq!(report.next_start(), 3);
        assert_eq!(fs::read_to_string(&path).unwrap(), "A,1,x\nB,2,y\nC,3\n");
        assert!(!store.has_abandoned_write());
        assert_eq!(store.salvage().unwrap(), None);
    }

    #[test]
    fn salvage_refuses_scratch_longer_than_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"A,1\nB,2\n");
        let store = store(&path);
        fs::write(store.scratch_path(), b"A,1,x\nB,2,y\nC,3,z\nD,4,w\n").unwrap();

        match store.salvage() {
            Err(StoreError::Format { row, detail, .. }) => {
                assert_eq!(row, 4);
                assert!(detail.contains("only has 2"), "{detail}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "A,1\nB,2\n");
        assert_eq!(store.abandoned_rows().unwrap(), Some(4));
    }

    #[test]
    fn claimed_scratch_survives_a_new_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"A,1\nB,2\n");
        let store = store(&path);
        fs::write(store.scratch_path(), b"A,1,x\nB,2,par").unwrap();

        let mut prefix = store.claim_abandoned_write().unwrap().unwrap();
        let mut writer = store.begin_incremental_write().unwrap();
        assert_eq!(store.abandoned_rows().unwrap(), Some(1));

        let rows: Vec<StoredRow> = store
            .rows(Encoding::Utf8)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        writer.write_raw(&prefix.take_matching(&rows[0]).unwrap()).unwrap();
        assert!(matches!(
            prefix.take_matching(&rows[1]),
            Err(StoreError::Format { row: 2, .. })
        ));
        prefix.discard().unwrap();
        writer.copy_through(&rows[1]).unwrap();
        writer.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "A,1,x\nB,2\n");
        assert!(!store.has_abandoned_write());
    }

    #[test]
    fn claim_prefers_the_longer_of_two_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), b"A,1\nB,2\n");
        let store = store(&path);
        fs::write(store.resume_path(), b"A,1,x\nB,2,y\n").unwrap();
        fs::write(store.scratch_path(), b"A,1,x\n").unwrap();

        assert_eq!(store.abandoned_rows().unwrap(), Some(2));
        let prefix = store.claim_abandoned_write().unwrap().unwrap();
        assert!(!store.scratch_path().exists());
        prefix.discard().unwrap();
        assert!(store.claim_abandoned_write().unwrap().is_none());
    }

    #[test]
    fn scratch_and_backup_paths_sit_next_to_input() {
        let store = RecordStore::new("/data/books.csv", ',', Encoding::Utf8);
        assert_eq!(store.scratch_path(), PathBuf::from("/data/.books.csv.tmp"));
        assert_eq!(
            backup_path_for(Path::new("/data/books.csv")),
            PathBuf::from("/data/books.csv.bak")
        );
    }
}
