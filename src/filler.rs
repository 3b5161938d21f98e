//! # Filler
//!
//! Anything that fills one or more placeholders in a [PartialPrompt].

use crate::prompt::errors::PlaceholderNotExist;
use crate::prompt::PartialPrompt;

pub trait FillPlaceholders {
    fn placeholders_to_fill(&self) -> Vec<String>;
}

pub trait Fill: FillPlaceholders {
    type Error;
    fn fill(&self, partial_prompt: &mut PartialPrompt) -> Result<(), Self::Error>;
}

/// Values computed up front, filled in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SlotValues {
    values: Vec<(String, String)>,
}

impl SlotValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value. A later value for the same placeholder wins.
    pub fn push(&mut self, placeholder: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.push((placeholder.into(), value.into()));
        self
    }
}

impl FillPlaceholders for SlotValues {
    fn placeholders_to_fill(&self) -> Vec<String> {
        let mut placeholders: Vec<String> = Vec::with_capacity(self.values.len());
        for (placeholder, _) in &self.values {
            if !placeholders.contains(placeholder) {
                placeholders.push(placeholder.clone());
            }
        }
        placeholders
    }
}

impl Fill for SlotValues {
    type Error = PlaceholderNotExist;

    fn fill(&self, partial_prompt: &mut PartialPrompt) -> Result<(), PlaceholderNotExist> {
        for (placeholder, value) in &self.values {
            partial_prompt.try_fill(placeholder.as_str(), value.as_str())?;
        }
        Ok(())
    }
}
