use crate::schema::TargetSchema;

const ENRICH_SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/enrich_system.md"
));

/// A chat-style prompt: fixed instructions plus the per-row request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Flatten into a single text block for backends without roles.
    ///
    /// The user line is always last so line-oriented stubs can read it.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system.trim_end(), self.user)
    }
}

/// Build the deterministic prompt for one row.
pub fn build_prompt(schema: TargetSchema, title: &str, author: &str) -> Prompt {
    Prompt {
        system: system_prompt(schema),
        user: format!("{},{}", title.trim(), author.trim()),
    }
}

fn system_prompt(schema: TargetSchema) -> String {
    ENRICH_SYSTEM
        .replace("{field_list}", &schema.fields().join(","))
        .replace("{example}", schema.example_response())
        .replace("{vocabulary}", &vocabulary_section(schema))
}

fn vocabulary_section(schema: TargetSchema) -> String {
    let mut section = String::new();
    if let Some(forms) = schema.literary_forms() {
        section.push_str("\nFor Literary Form, choose ONLY ONE of the following:\n");
        section.push_str(&forms.join(", "));
        section.push('\n');
    }
    section.push_str("\nFor Reading Level, choose ONLY ONE of the following:\n");
    section.push_str(&schema.reading_levels().join(", "));
    section.push('\n');
    section
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_fields_in_order() {
        let prompt = build_prompt(TargetSchema::Classic, "Aesop's Fables", "Aesopus");
        assert!(prompt
            .system
            .contains("Publication Date,Genre,Literary Form,Reading Level\n"));
        assert!(!prompt.system.contains("Word Count"));
        assert!(!prompt.system.contains('{'));
        assert_eq!(prompt.user, "Aesop's Fables,Aesopus");
    }

    #[test]
    fn extended_prompt_lists_vocabularies() {
        let prompt = build_prompt(TargetSchema::Extended, "Emma", "Austen");
        assert!(prompt.system.contains("Word Count"));
        assert!(prompt.system.contains("Philosophical dialogue"));
        assert!(prompt.system.contains("Academic or Scholarly"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let first = build_prompt(TargetSchema::Extended, " Emma ", "Austen");
        let second = build_prompt(TargetSchema::Extended, "Emma", " Austen");
        assert_eq!(first, second);
    }

    #[test]
    fn rendered_prompt_ends_with_request_line() {
        let prompt = build_prompt(TargetSchema::Classic, "Dune", "Herbert");
        let rendered = prompt.render();
        assert_eq!(rendered.lines().last(), Some("Dune,Herbert"));
    }
}
