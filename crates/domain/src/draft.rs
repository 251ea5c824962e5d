use serde::{Deserialize, Serialize};

/// Maximum number of characters a section body may hold.
pub const SECTION_CONTENT_LIMIT: usize = 2000;

/// Title given to a freshly compiled draft until the user names it.
pub const DRAFT_TITLE_PLACEHOLDER: &str = "Enter a draft document title";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub content: String,
}

/// Result of clamping section content to [`SECTION_CONTENT_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Truncation {
    pub dropped_chars: usize,
}

impl Truncation {
    pub fn is_lossless(&self) -> bool {
        self.dropped_chars == 0
    }
}

impl Section {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            content: String::new(),
        }
    }

    /// Replaces the body, keeping at most [`SECTION_CONTENT_LIMIT`] characters.
    pub fn set_content(&mut self, content: impl Into<String>) -> Truncation {
        let (content, truncation) = clamp_content(content.into());
        self.content = content;
        truncation
    }

    pub fn with_content(mut self, content: impl Into<String>) -> (Self, Truncation) {
        let truncation = self.set_content(content);
        (self, truncation)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Clamps text to the section character ceiling. Counting is per Unicode scalar value.
pub fn clamp_content(mut content: String) -> (String, Truncation) {
    let cut = content
        .char_indices()
        .nth(SECTION_CONTENT_LIMIT)
        .map(|(byte_offset, _)| byte_offset);

    let Some(byte_offset) = cut else {
        return (content, Truncation::default());
    };

    let dropped_chars = content[byte_offset..].chars().count();
    content.truncate(byte_offset);
    (content, Truncation { dropped_chars })
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DraftedDocument {
    pub title: String,
    pub sections: Vec<Section>,
}

/// One paragraph of an exported draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportParagraph {
    Title(String),
    Section {
        heading: String,
        body: String,
    },
}

/// Input handed to the document exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutline {
    pub file_name: String,
    pub paragraphs: Vec<ExportParagraph>,
}

impl DraftedDocument {
    pub fn new(title: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            title: title.into(),
            sections,
        }
    }

    pub fn pending_sections(&self) -> impl Iterator<Item = (usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.is_empty())
    }

    pub fn export_file_name(&self) -> String {
        format!("DraftTemplate-{}.docx", self.title)
    }

    pub fn export_outline(&self) -> ExportOutline {
        let mut paragraphs = Vec::with_capacity(self.sections.len() + 1);
        paragraphs.push(ExportParagraph::Title(self.title.clone()));
        paragraphs.extend(
            self.sections
                .iter()
                .enumerate()
                .map(|(index, section)| ExportParagraph::Section {
                    heading: format!("Section {}: {}", index + 1, section.title),
                    body: section.content.clone(),
                }),
        );

        ExportOutline {
            file_name: self.export_file_name(),
            paragraphs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_beyond_limit_is_dropped_and_reported() {
        let mut section = Section::new("Intro", "Opening words");
        let truncation = section.set_content("x".repeat(SECTION_CONTENT_LIMIT + 15));

        assert_eq!(section.content.chars().count(), SECTION_CONTENT_LIMIT);
        assert_eq!(truncation.dropped_chars, 15);
    }

    #[test]
    fn content_at_limit_is_kept_whole() {
        let (section, truncation) =
            Section::new("a", "b").with_content("é".repeat(SECTION_CONTENT_LIMIT));
        assert!(truncation.is_lossless());
        assert_eq!(section.content.chars().count(), SECTION_CONTENT_LIMIT);
    }

    #[test]
    fn multibyte_truncation_lands_on_char_boundary() {
        let (content, truncation) = clamp_content("ü".repeat(SECTION_CONTENT_LIMIT + 1));
        assert_eq!(content.chars().count(), SECTION_CONTENT_LIMIT);
        assert_eq!(truncation.dropped_chars, 1);
    }

    #[test]
    fn export_outline_numbers_sections_in_order() {
        let document = DraftedDocument::new(
            "Grant",
            vec![
                Section::new("Summary", "d").with_content("s").0,
                Section::new("Budget", "d").with_content("b").0,
            ],
        );

        let outline = document.export_outline();
        assert_eq!(outline.file_name, "DraftTemplate-Grant.docx");
        assert_eq!(outline.paragraphs[0], ExportParagraph::Title("Grant".to_string()));
        assert_eq!(
            outline.paragraphs[2],
            ExportParagraph::Section {
                heading: "Section 2: Budget".to_string(),
                body: "b".to_string(),
            }
        );
    }
}
