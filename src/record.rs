//! Delimited-line codec for title/author tables.
//!
//! One record per physical line. Fields may be wrapped in double quotes so
//! they can carry the delimiter; a doubled quote inside a quoted field is a
//! literal quote. Embedded line breaks are not supported.

use thiserror::Error;

/// Minimum column count for an enrichable row (title, author).
pub const MIN_COLUMNS: usize = 2;

const QUOTE: char = '"';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("unterminated quoted field")]
    UnterminatedQuote,
}

/// One row of the table: title, author, then whatever tail the row carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Build an enriched row: trimmed title and author followed by `tail`.
    pub fn merged(title: &str, author: &str, tail: &[String]) -> Self {
        let mut fields = Vec::with_capacity(MIN_COLUMNS + tail.len());
        fields.push(title.trim().to_string());
        fields.push(author.trim().to_string());
        fields.extend(tail.iter().cloned());
        Self { fields }
    }

    pub fn title(&self) -> &str {
        self.field(0)
    }

    pub fn author(&self) -> &str {
        self.field(1)
    }

    /// Render the record as one line (no terminator).
    pub fn to_line(&self, delimiter: char) -> String {
        format_fields(&self.fields, delimiter)
    }

    fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(|value| value.trim()).unwrap_or("")
    }
}

/// Split one line into fields.
///
/// Parsing is lenient about text following a closing quote (it is appended
/// to the field), but a quote that is never closed is an error.
pub fn parse_line(line: &str, delimiter: char) -> Result<Vec<String>, LineError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    field.push(QUOTE);
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }
        if ch == delimiter {
            fields.push(std::mem::take(&mut field));
            field_started = false;
        } else if ch == QUOTE && !field_started {
            in_quotes = true;
            field_started = true;
        } else {
            field.push(ch);
            field_started = true;
        }
    }

    if in_quotes {
        return Err(LineError::UnterminatedQuote);
    }
    fields.push(field);
    Ok(fields)
}

/// Join fields with minimal quoting.
pub fn format_fields(fields: &[String], delimiter: char) -> String {
    let mut line = String::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            line.push(delimiter);
        }
        if needs_quotes(field, delimiter) {
            line.push(QUOTE);
            line.push_str(&field.replace(QUOTE, "\"\""));
            line.push(QUOTE);
        } else {
            line.push_str(field);
        }
    }
    line
}

fn needs_quotes(field: &str, delimiter: char) -> bool {
    field
        .chars()
        .any(|ch| ch == delimiter || ch == QUOTE || ch == '\n' || ch == '\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|field| field.to_string()).collect()
    }

    #[test]
    fn parses_plain_and_quoted_fields() {
        let fields = parse_line(r#"Aesop's Fables,"Aesopus, the fabulist",x"#, ',').unwrap();
        assert_eq!(fields, owned(&["Aesop's Fables", "Aesopus, the fabulist", "x"]));
    }

    #[test]
    fn doubled_quotes_are_literal() {
        let fields = parse_line(r#""The ""Iliad""",Homer"#, ',').unwrap();
        assert_eq!(fields, owned(&["The \"Iliad\"", "Homer"]));
    }

    #[test]
    fn empty_line_is_one_empty_field() {
        assert_eq!(parse_line("", ',').unwrap(), owned(&[""]));
    }

    #[test]
    fn trailing_delimiter_yields_empty_field() {
        assert_eq!(parse_line("a,b,", ',').unwrap(), owned(&["a", "b", ""]));
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        assert_eq!(
            parse_line(r#""Moby Dick,Melville"#, ','),
            Err(LineError::UnterminatedQuote)
        );
    }

    #[test]
    fn custom_delimiter() {
        let fields = parse_line("Ulysses;Joyce;1922", ';').unwrap();
        assert_eq!(fields, owned(&["Ulysses", "Joyce", "1922"]));
    }

    #[test]
    fn formatting_quotes_only_when_needed() {
        let line = format_fields(&owned(&["Dune", "Herbert, Frank", "say \"hi\""]), ',');
        assert_eq!(line, r#"Dune,"Herbert, Frank","say ""hi""""#);
        assert_eq!(parse_line(&line, ',').unwrap().len(), 3);
    }

    #[test]
    fn merged_record_trims_title_and_author() {
        let record = Record::merged(" Aesop's Fables ", "Aesopus ", &owned(&["6th century BCE"]));
        assert_eq!(
            record.to_line(','),
            "Aesop's Fables,Aesopus,6th century BCE"
        );
        assert_eq!(record.title(), "Aesop's Fables");
        assert_eq!(record.author(), "Aesopus");
    }

    #[test]
    fn missing_fields_read_as_empty() {
        let record = Record::new(owned(&["Only Title"]));
        assert_eq!(record.author(), "");
        assert_eq!(record.to_line(','), "Only Title");
    }
}
