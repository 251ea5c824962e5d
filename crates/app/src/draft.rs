use std::sync::Arc;

use docdraft_api::Collaborator;
use docdraft_domain::{DraftedDocument, ExportOutline, Section, Truncation};
use snafu::{OptionExt, ResultExt, ensure};

use super::error::{
    DraftResult, EmptyDescriptionSnafu, GenerateSnafu, NoDraftSnafu, SectionChangedSnafu,
    SectionOutOfRangeSnafu,
};
use super::state::{Action, AppStore};

/// Edits the drafted document held in the store and fills its sections from the backend.
pub struct DraftEditor {
    collaborator: Arc<dyn Collaborator>,
    store: Arc<AppStore>,
}

impl DraftEditor {
    pub fn new(collaborator: Arc<dyn Collaborator>, store: Arc<AppStore>) -> Self {
        Self {
            collaborator,
            store,
        }
    }

    pub fn document(&self) -> Option<DraftedDocument> {
        self.store.snapshot().drafted_document.clone()
    }

    pub fn set_title(&self, title: &str) -> DraftResult<()> {
        self.current("set-title")?;
        self.store
            .dispatch(Action::UpdateDraftTitle(title.to_string()));
        Ok(())
    }

    /// Replaces a section body; text past the section limit is dropped and reported.
    pub fn edit_section(&self, index: usize, content: &str) -> DraftResult<Truncation> {
        let mut section = self.section("edit-section", index)?;
        let truncation = section.set_content(content);
        if !truncation.is_lossless() {
            tracing::debug!(index, dropped_chars = truncation.dropped_chars, "section content clamped");
        }

        self.store.dispatch(Action::UpdateSection { index, section });
        Ok(truncation)
    }

    /// Asks the backend to write section `index`.
    ///
    /// With `description_override` the section's description is replaced first; an override must
    /// not be blank.
    pub async fn generate_section(
        &self,
        index: usize,
        description_override: Option<&str>,
    ) -> DraftResult<Truncation> {
        let requested = self.section("generate-section", index)?;
        let mut section = requested.clone();
        if let Some(description) = description_override {
            let description = description.trim();
            ensure!(
                !description.is_empty(),
                EmptyDescriptionSnafu {
                    stage: "generate-section",
                    index,
                }
            );
            section.description = description.to_string();
        }

        tracing::info!(index, title = %section.title, "generating section");
        let content = self
            .collaborator
            .generate_section(&section.title, &section.description)
            .await
            .context(GenerateSnafu {
                stage: "generate-section",
                index,
            })?;

        // The draft may have been edited while the request ran.
        let current = self.section("generate-section", index)?;
        ensure!(
            current.title == requested.title && current.description == requested.description,
            SectionChangedSnafu {
                stage: "generate-section",
                index,
            }
        );

        let truncation = section.set_content(content);
        self.store.dispatch(Action::UpdateSection { index, section });
        Ok(truncation)
    }

    /// Generates every section whose body is still empty, one request at a time.
    ///
    /// Stops at the first failure; sections filled before it keep their content.
    pub async fn generate_missing_sections(&self) -> DraftResult<usize> {
        let pending = self
            .current("generate-missing-sections")?
            .pending_sections()
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        for &index in &pending {
            self.generate_section(index, None).await?;
        }

        tracing::info!(generated = pending.len(), "filled missing sections");
        Ok(pending.len())
    }

    pub fn replace_sections(&self, sections: Vec<Section>) -> DraftResult<()> {
        self.current("replace-sections")?;
        self.store.dispatch(Action::ReplaceSections(sections));
        Ok(())
    }

    pub fn export(&self) -> DraftResult<ExportOutline> {
        Ok(self.current("export")?.export_outline())
    }

    fn current(&self, stage: &'static str) -> DraftResult<DraftedDocument> {
        self.store
            .snapshot()
            .drafted_document
            .clone()
            .context(NoDraftSnafu { stage })
    }

    fn section(&self, stage: &'static str, index: usize) -> DraftResult<Section> {
        let document = self.current(stage)?;
        let len = document.sections.len();
        document
            .sections
            .into_iter()
            .nth(index)
            .context(SectionOutOfRangeSnafu { stage, index, len })
    }
}
