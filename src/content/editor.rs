//! Editing state for a generated article.

use strum::{Display, EnumString};

use super::{to_html, to_plain_text};
use crate::error::{GenError, Result};
use crate::types::GenerationResult;

/// How the article is currently presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum EditMode {
    #[default]
    View,
    /// Editing the flattened plain-text form.
    EditText,
    /// Editing raw markup.
    EditHtml,
}

/// A generated article plus an optional in-progress edit.
///
/// Switching modes always commits the current edit first, so the committed
/// HTML is what a renderer should display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleDraft {
    html: String,
    mode: EditMode,
    editing: String,
}

impl ArticleDraft {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    /// Start a draft from an article result; other results yield `None`.
    pub fn from_result(result: &GenerationResult) -> Option<Self> {
        result.html().map(Self::new)
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// The edit buffer; empty in [`EditMode::View`].
    pub fn editing(&self) -> &str {
        &self.editing
    }

    /// Replace the edit buffer.
    pub fn set_editing(&mut self, source: impl Into<String>) -> Result<()> {
        if self.mode == EditMode::View {
            return Err(GenError::InvalidState(
                "cannot edit an article while in view mode".to_string(),
            ));
        }
        self.editing = source.into();
        Ok(())
    }

    /// Commit the current edit, then enter `mode`.
    ///
    /// Entering an edit mode on an empty article falls back to view.
    pub fn switch_mode(&mut self, mode: EditMode) {
        match self.mode {
            EditMode::EditText => self.html = to_html(&self.editing),
            EditMode::EditHtml => self.html = std::mem::take(&mut self.editing),
            EditMode::View => {}
        }

        if mode == EditMode::View || self.html.is_empty() {
            self.editing.clear();
            self.mode = EditMode::View;
            return;
        }

        self.editing = match mode {
            EditMode::EditText => to_plain_text(&self.html),
            _ => self.html.clone(),
        };
        self.mode = mode;
    }
}
