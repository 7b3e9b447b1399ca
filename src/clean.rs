//! Normalisation of raw title/author tables before enrichment.
//!
//! Titles and authors are reduced to ASCII letters, digits and spaces.
//! Authors written as `Last, First` keep only the last name. Blank lines are
//! dropped; lines without an author are kept as a single cleaned column.

use crate::record::{format_fields, parse_line};
use crate::store::{
    backup_once, resolve_encoding, strip_terminator, BackupOutcome, Encoding, LineReader,
};
use anyhow::{Context, Result};
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub rows_written: usize,
    pub blank_skipped: usize,
    /// Rows written with a title only.
    pub single_column: usize,
    pub backup: Option<BackupOutcome>,
}

pub struct Cleaner {
    disallowed: Regex,
}

impl Cleaner {
    pub fn new() -> Result<Self> {
        let disallowed = Regex::new(r"[^a-zA-Z0-9 ]").context("compile cleaning pattern")?;
        Ok(Self { disallowed })
    }

    pub fn clean_text(&self, text: &str) -> String {
        let text = text.trim().replace('"', "");
        self.disallowed.replace_all(&text, "").trim().to_string()
    }

    /// Keep the last name of `Last, First` authors, then clean.
    pub fn clean_author(&self, author: &str) -> String {
        let author = author.replace('"', "");
        let last_name = author.split(',').next().unwrap_or("");
        self.clean_text(last_name)
    }

    /// Clean one source line. `None` for blank lines.
    ///
    /// Everything after the first column is the author, so both
    /// `Title,"Last, First"` and `Title,Last, First` reduce the same way.
    pub fn clean_line(&self, line: &str) -> Option<Vec<String>> {
        if line.trim().is_empty() {
            return None;
        }
        let fields = parse_line(line, ',').unwrap_or_else(|_| {
            let (title, rest) = line.split_once(',').unwrap_or((line, ""));
            vec![title.to_string(), rest.to_string()]
        });
        let title = self.clean_text(&fields[0]);
        if fields.len() < 2 || fields[1..].iter().all(|field| field.trim().is_empty()) {
            return Some(vec![title]);
        }
        let author = self.clean_author(&fields[1..].join(","));
        Some(vec![title, author])
    }
}

/// Clean `input` into `output`, publishing the result with a rename.
pub fn clean_file(
    input: &Path,
    output: &Path,
    encoding: Encoding,
    backup: bool,
) -> Result<CleanSummary> {
    let cleaner = Cleaner::new()?;
    let mut summary = CleanSummary::default();
    if backup {
        summary.backup = Some(backup_once(input)?);
    }

    let encoding = resolve_encoding(input, encoding)?;

    let file_name = output
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("cleaned");
    let staged = output
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.clean.tmp"));
    let file = File::create(&staged).with_context(|| format!("create {}", staged.display()))?;
    let mut out = BufWriter::new(file);

    let mut lines = LineReader::open(input, encoding)?;
    while let Some(line) = lines.next_line()? {
        match cleaner.clean_line(strip_terminator(&line)) {
            None => summary.blank_skipped += 1,
            Some(fields) => {
                if fields.len() == 1 {
                    summary.single_column += 1;
                }
                writeln!(out, "{}", format_fields(&fields, ','))
                    .with_context(|| format!("write {}", staged.display()))?;
                summary.rows_written += 1;
            }
        }
    }
    out.flush()
        .with_context(|| format!("flush {}", staged.display()))?;
    drop(out);
    fs::rename(&staged, output).with_context(|| format!("publish {}", output.display()))?;

    tracing::info!(
        rows = summary.rows_written,
        blank = summary.blank_skipped,
        output = %output.display(),
        "cleaned table"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> Cleaner {
        Cleaner::new().unwrap()
    }

    #[test]
    fn strips_punctuation_but_keeps_spaces() {
        assert_eq!(cleaner().clean_text(" Aesop's Fables! "), "Aesops Fables");
        assert_eq!(cleaner().clean_text("\"1984\""), "1984");
    }

    #[test]
    fn last_name_first_authors_keep_last_name() {
        assert_eq!(cleaner().clean_author("\"Austen, Jane\""), "Austen");
        assert_eq!(cleaner().clean_author("Homer"), "Homer");
    }

    #[test]
    fn clean_line_handles_quoted_and_bare_author_commas() {
        let c = cleaner();
        assert_eq!(
            c.clean_line("Pride and Prejudice,\"Austen, Jane\""),
            Some(vec!["Pride and Prejudice".to_string(), "Austen".to_string()])
        );
        assert_eq!(
            c.clean_line("Emma,Austen, Jane"),
            Some(vec!["Emma".to_string(), "Austen".to_string()])
        );
        assert_eq!(c.clean_line("   "), None);
        assert_eq!(c.clean_line("Beowulf"), Some(vec!["Beowulf".to_string()]));
    }

    #[test]
    fn unbalanced_quotes_fall_back_to_first_comma() {
        assert_eq!(
            cleaner().clean_line("\"Moby Dick,Melville"),
            Some(vec!["Moby Dick".to_string(), "Melville".to_string()])
        );
    }

    #[test]
    fn clean_file_writes_cleaned_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("clean.csv");
        fs::write(&input, b"Les Mis\xe9rables,\"Hugo, Victor\"\n\nBeowulf\n").unwrap();

        let summary = clean_file(&input, &output, Encoding::Auto, true).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.blank_skipped, 1);
        assert_eq!(summary.single_column, 1);
        assert!(matches!(summary.backup, Some(BackupOutcome::Created(_))));
        assert_eq!(fs::read_to_string(&output).unwrap(), "Les Misrables,Hugo\nBeowulf\n");
    }

    #[test]
    fn clean_in_place_replaces_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("books.csv");
        fs::write(&input, "Don Quixote!,Cervantes\n").unwrap();
        clean_file(&input, &input, Encoding::Utf8, false).unwrap();
        assert_eq!(fs::read_to_string(&input).unwrap(), "Don Quixote,Cervantes\n");
    }
}
