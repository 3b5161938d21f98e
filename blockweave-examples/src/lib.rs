//! Shared pieces of the `blockweave` examples.

use std::cell::Cell;
use anyhow::{bail, Result};
use blockweave::llm::GenerateText;

/// Plays back prepared replies in order, standing in for a real provider.
pub struct ScriptedModel {
    replies: Vec<String>,
    next: Cell<usize>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item=impl Into<String>>) -> Self {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            next: Cell::new(0),
        }
    }
}

impl GenerateText for ScriptedModel {
    fn generate(&self, prompt: &str) -> Result<String> {
        let idx = self.next.get();
        match self.replies.get(idx) {
            Some(reply) => {
                println!("----- prompt #{} -----\n{}\n", idx + 1, prompt);
                self.next.set(idx + 1);
                Ok(reply.clone())
            }
            None => bail!("no scripted reply left for prompt #{}", idx + 1),
        }
    }
}
