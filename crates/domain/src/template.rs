use serde::Deserialize;
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use super::draft::{DRAFT_TITLE_PLACEHOLDER, DraftedDocument, Section};

pub const JSON_PARSE_ERROR_TEXT: &str = "I was unable to find content related to your query and could not generate a template. Please try again.";
pub const JSON_STRUCTURE_ERROR_TEXT: &str =
    "Unable to render the sections within the template. Please try again.";

const OUTLINE_INTRO: &str = "The proposal will include the following sections:";
const OUTLINE_CLOSING: &str = "Does this look good? If so, you can **generate the document** now. You can also ask me to **add an item** or **change the order of the sections**.";
const OUTLINE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TemplateError {
    #[snafu(display("{}", JSON_PARSE_ERROR_TEXT))]
    JsonParse {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("{}", JSON_STRUCTURE_ERROR_TEXT))]
    JsonStructure { stage: &'static str },
    #[snafu(display("template entry {index} is malformed: {source}"))]
    MalformedEntry {
        stage: &'static str,
        index: usize,
        source: serde_json::Error,
    },
}

impl TemplateError {
    /// Fixed user-facing text for the two tolerated failure modes.
    ///
    /// Malformed entries have no sentinel; they surface as regular errors.
    pub fn sentinel_text(&self) -> Option<&'static str> {
        match self {
            Self::JsonParse { .. } => Some(JSON_PARSE_ERROR_TEXT),
            Self::JsonStructure { .. } => Some(JSON_STRUCTURE_ERROR_TEXT),
            Self::MalformedEntry { .. } => None,
        }
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    section_title: String,
    section_description: String,
}

/// Strips fence and `json` marker lines, trimming and joining the rest without separators.
///
/// Line-oriented and lossy: any line containing the substring `json` is dropped, even inside
/// a section description.
pub fn clean_template_json(raw: &str) -> String {
    raw.split('\n')
        .filter(|line| !line.contains("json") && !line.contains("```"))
        .map(str::trim)
        .collect()
}

/// Compiles an assistant reply carrying `{"template": [...]}` into an empty draft.
pub fn compile_template(raw_assistant_content: &str) -> TemplateResult<DraftedDocument> {
    let outline = TemplateOutline::parse(raw_assistant_content)?;
    Ok(outline.into_document())
}

/// Parsed template before it is turned into a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOutline {
    pub sections: Vec<Section>,
}

impl TemplateOutline {
    pub fn parse(raw_assistant_content: &str) -> TemplateResult<Self> {
        let cleaned = clean_template_json(raw_assistant_content);
        let parsed = serde_json::from_str::<Value>(&cleaned).context(JsonParseSnafu {
            stage: "compile-template-parse",
        })?;

        let Some(entries) = parsed.get("template").and_then(Value::as_array) else {
            return JsonStructureSnafu {
                stage: "compile-template-structure",
            }
            .fail();
        };

        let sections = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                TemplateEntry::deserialize(entry)
                    .map(|entry| Section::new(entry.section_title, entry.section_description))
                    .context(MalformedEntrySnafu {
                        stage: "compile-template-entry",
                        index,
                    })
            })
            .collect::<TemplateResult<Vec<_>>>()?;

        Ok(Self { sections })
    }

    pub fn into_document(self) -> DraftedDocument {
        DraftedDocument::new(DRAFT_TITLE_PLACEHOLDER, self.sections)
    }

    /// Chat-visible rendering of the outline.
    pub fn summary_text(&self) -> String {
        let mut text = format!("{OUTLINE_INTRO}{OUTLINE_SEPARATOR}");
        for section in &self.sections {
            text.push_str(&section.title);
            text.push_str(OUTLINE_SEPARATOR);
        }
        text.push_str(OUTLINE_CLOSING);
        text.trim().to_string()
    }
}

/// Outline text for an assistant reply, or the fixed sentinel when it cannot be rendered.
pub fn outline_reply_text(raw_assistant_content: &str) -> TemplateResult<String> {
    match TemplateOutline::parse(raw_assistant_content) {
        Ok(outline) => Ok(outline.summary_text()),
        Err(error) => match error.sentinel_text() {
            Some(text) => Ok(text.to_string()),
            None => Err(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED: &str = "```json\n{\n  \"template\": [\n    {\"section_title\": \"Overview\", \"section_description\": \"What the grant funds\"},\n    {\"section_title\": \"Budget\", \"section_description\": \"Cost breakdown\"}\n  ]\n}\n```";

    #[test]
    fn fenced_template_compiles_to_empty_sections() {
        let document = compile_template(FENCED).unwrap();

        assert_eq!(document.title, DRAFT_TITLE_PLACEHOLDER);
        assert_eq!(document.sections.len(), 2);
        assert_eq!(document.sections[0].title, "Overview");
        assert_eq!(document.sections[0].description, "What the grant funds");
        assert_eq!(document.sections[1].title, "Budget");
        assert!(document.sections.iter().all(|section| section.content.is_empty()));
    }

    #[test]
    fn non_json_yields_parse_sentinel() {
        let error = compile_template("Sorry, I can't help with that.").unwrap_err();
        assert!(matches!(error, TemplateError::JsonParse { .. }));
        assert_eq!(error.sentinel_text(), Some(JSON_PARSE_ERROR_TEXT));
        assert_eq!(error.to_string(), JSON_PARSE_ERROR_TEXT);
    }

    #[test]
    fn missing_or_non_array_template_yields_structure_sentinel() {
        for raw in [r#"{"sections": []}"#, r#"{"template": "Overview"}"#] {
            let error = compile_template(raw).unwrap_err();
            assert!(matches!(error, TemplateError::JsonStructure { .. }));
            assert_eq!(error.sentinel_text(), Some(JSON_STRUCTURE_ERROR_TEXT));
        }
    }

    #[test]
    fn malformed_entries_are_not_swallowed() {
        let error = compile_template(r#"{"template": [{"section_title": "Only title"}]}"#).unwrap_err();
        assert!(matches!(error, TemplateError::MalformedEntry { index: 0, .. }));
        assert_eq!(error.sentinel_text(), None);
    }

    #[test]
    fn empty_template_array_compiles() {
        let document = compile_template(r#"{"template": []}"#).unwrap();
        assert!(document.sections.is_empty());
    }

    #[test]
    fn cleaning_drops_lines_mentioning_json() {
        // Known gap: a description line containing "json" is removed with the fence markers.
        let raw = "```\n{\"template\": [\n{\"section_title\": \"A\",\n\"section_description\": \"export as json\"}]}\n```";
        assert!(compile_template(raw).is_err());
        assert_eq!(clean_template_json("a\n```\n json \n b "), "ab");
    }

    #[test]
    fn outline_text_lists_titles_between_intro_and_closing() {
        let text = outline_reply_text(FENCED).unwrap();
        assert!(text.starts_with("The proposal will include the following sections:\n\nOverview\n\nBudget\n\n"));
        assert!(text.ends_with("**change the order of the sections**."));
        assert_eq!(outline_reply_text("nope").unwrap(), JSON_PARSE_ERROR_TEXT);
    }
}
