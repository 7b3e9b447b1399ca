//! Strict parsing of a completion into the active schema's fields.

use crate::record::parse_line;
use crate::schema::TargetSchema;
use thiserror::Error;

/// Derived fields for one row, exactly as many as the schema defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentResult {
    fields: Vec<String>,
}

impl EnrichmentResult {
    pub fn sentinel(schema: TargetSchema) -> Self {
        Self {
            fields: schema.sentinel_fields(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseMismatch {
    #[error("empty response")]
    Empty,
    #[error("response spans {lines} lines; expected one")]
    ExtraLines { lines: usize },
    #[error("response has an unterminated quote")]
    UnbalancedQuote,
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
    #[error("field {name} is empty")]
    EmptyField { name: &'static str },
}

/// Parse a raw completion.
///
/// Accepts one line of comma-separated values, optionally wrapped in a code
/// fence, quotes or square brackets. A reply that echoes the title and
/// author ahead of the derived fields is accepted with the echo dropped.
pub fn parse_response(
    raw: &str,
    schema: TargetSchema,
    title: &str,
    author: &str,
) -> Result<EnrichmentResult, ParseMismatch> {
    let body = strip_code_fences(raw);
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let line = match lines.as_slice() {
        [] => return Err(ParseMismatch::Empty),
        [line] => *line,
        _ => return Err(ParseMismatch::ExtraLines { lines: lines.len() }),
    };

    let line = unwrap_quotes(line).replace(['[', ']'], "");
    let mut fields: Vec<String> = parse_line(&line, ',')
        .map_err(|_| ParseMismatch::UnbalancedQuote)?
        .into_iter()
        .map(|field| field.trim().to_string())
        .collect();

    let expected = schema.field_count();
    if fields.len() == expected + 2 && echoes(&fields, title, author) {
        fields.drain(..2);
    }
    if fields.len() != expected {
        return Err(ParseMismatch::FieldCount {
            expected,
            actual: fields.len(),
        });
    }
    if let Some(idx) = fields.iter().position(|field| field.is_empty()) {
        return Err(ParseMismatch::EmptyField {
            name: schema.fields()[idx],
        });
    }
    Ok(EnrichmentResult { fields })
}

fn echoes(fields: &[String], title: &str, author: &str) -> bool {
    fields[0].eq_ignore_ascii_case(title.trim()) && fields[1].eq_ignore_ascii_case(author.trim())
}

/// Remove one pair of quotes around the whole line, if the quotes are not
/// part of a quoted first field.
fn unwrap_quotes(line: &str) -> &str {
    match line.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) if !inner.contains('"') => inner,
        _ => line,
    }
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines
        .first()
        .is_some_and(|first| first.trim_start().starts_with("```"))
    {
        lines.remove(0);
    }
    if lines
        .last()
        .is_some_and(|last| last.trim_start().starts_with("```"))
    {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}
