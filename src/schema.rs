//! Trailing-column schemas written after title and author.
//!
//! Exactly one schema is active per run. `classic` carries four derived
//! columns; `extended` adds an estimated word count.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder written for every derived column when inference gives up.
pub const SENTINEL_VALUE: &str = "Unknown";

const CLASSIC_FIELDS: &[&str] = &["Publication Date", "Genre", "Literary Form", "Reading Level"];
const EXTENDED_FIELDS: &[&str] = &[
    "Publication Date",
    "Genre",
    "Literary Form",
    "Reading Level",
    "Word Count",
];

const CLASSIC_READING_LEVELS: &[&str] = &["Easy", "Medium", "Hard", "Adult", "Advanced"];
const EXTENDED_READING_LEVELS: &[&str] = &[
    "Early Elementary",
    "Upper Elementary",
    "Middle School",
    "High School",
    "College or Adult General",
    "College or Adult Advanced",
    "Academic or Scholarly",
];

const LITERARY_FORMS: &[&str] = &[
    "Allegory",
    "Autobiography",
    "Biography",
    "Epic",
    "Essay",
    "Fable",
    "Fairy tale",
    "Frame story",
    "Graphic novel",
    "Memoir",
    "Novel",
    "Novella",
    "Philosophical dialogue",
    "Play",
    "Poem",
    "Prose Poetry",
    "Satire",
    "Short Story",
    "Treatise",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TargetSchema {
    /// Publication date, genre, literary form, reading level.
    #[default]
    Classic,
    /// Classic columns plus an estimated word count.
    Extended,
}

impl TargetSchema {
    /// Column labels in output order.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Classic => CLASSIC_FIELDS,
            Self::Extended => EXTENDED_FIELDS,
        }
    }

    pub fn field_count(self) -> usize {
        self.fields().len()
    }

    pub fn reading_levels(self) -> &'static [&'static str] {
        match self {
            Self::Classic => CLASSIC_READING_LEVELS,
            Self::Extended => EXTENDED_READING_LEVELS,
        }
    }

    /// Literary forms the model must choose from, if the schema constrains them.
    pub fn literary_forms(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Classic => None,
            Self::Extended => Some(LITERARY_FORMS),
        }
    }

    /// A well-formed sample line shown to the model.
    pub fn example_response(self) -> &'static str {
        match self {
            Self::Classic => "1925,Fiction,Novel,Medium",
            Self::Extended => "1925,Fiction,Novel,College or Adult General,95000",
        }
    }

    /// Sentinel tail for rows whose inference could not be parsed.
    pub fn sentinel_fields(self) -> Vec<String> {
        vec![SENTINEL_VALUE.to_string(); self.field_count()]
    }
}

impl fmt::Display for TargetSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => write!(f, "classic"),
            Self::Extended => write!(f, "extended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_counts_match_schema() {
        assert_eq!(TargetSchema::Classic.field_count(), 4);
        assert_eq!(TargetSchema::Extended.field_count(), 5);
        assert_eq!(TargetSchema::Extended.fields()[4], "Word Count");
    }

    #[test]
    fn sentinel_fills_every_column() {
        let sentinel = TargetSchema::Extended.sentinel_fields();
        assert_eq!(sentinel.len(), 5);
        assert!(sentinel.iter().all(|value| value == SENTINEL_VALUE));
    }

    #[test]
    fn examples_have_schema_width() {
        for schema in [TargetSchema::Classic, TargetSchema::Extended] {
            let width = schema.example_response().split(',').count();
            assert_eq!(width, schema.field_count(), "{schema}");
        }
    }

    #[test]
    fn schema_names_roundtrip_through_serde() {
        let parsed: TargetSchema = serde_json::from_str("\"extended\"").unwrap();
        assert_eq!(parsed, TargetSchema::Extended);
        assert_eq!(TargetSchema::default().to_string(), "classic");
    }
}
