use std::collections::HashMap;
use anyhow::{bail, Result};
pub use tiktoken_rs::{get_bpe_from_model, CoreBPE};

use crate::utils::token::CountToken;
use lazy_static::lazy_static;

lazy_static! {
    /// Context size in tokens of each supported model.
    pub static ref MODEL_TO_MAX_TOKENS: HashMap<&'static str, usize> = HashMap::from([
        ("gpt-4", 8192),
        ("gpt-4-0613", 8192),
        ("gpt-4-32k", 32768),
        ("gpt-4-32k-0613", 32768),
        ("gpt-3.5-turbo", 4096),
        ("gpt-3.5-turbo-16k", 16384),
        ("gpt-3.5-turbo-0613", 4096),
        ("gpt-3.5-turbo-16k-0613", 16384),
    ]);
}

/// Counter using the Tiktoken tokenizer.
#[derive(Clone)]
#[readonly::make]
pub struct Tiktoken {
    /// The model name as given, used to look up the context size. read-only.
    #[readonly]
    pub model: String,
    /// The tokenizer. read-only.
    #[readonly]
    pub bpe: CoreBPE,
}

impl Tiktoken {
    /// Create a new Tiktoken counter. Fails for models missing from [MODEL_TO_MAX_TOKENS].
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if !MODEL_TO_MAX_TOKENS.contains_key(model.as_str()) {
            bail!("model {} is not supported, supported models are {:?}", model, MODEL_TO_MAX_TOKENS.keys());
        }
        let tokenizer_model = if model.starts_with("gpt-4-32k") {
            "gpt-4-32k"
        } else if model.starts_with("gpt-4") {
            "gpt-4"
        } else {
            "gpt-3.5-turbo"
        };
        let bpe = get_bpe_from_model(tokenizer_model)?;
        Ok(Tiktoken {
            model,
            bpe,
        })
    }

    /// Context size of the model in tokens.
    pub fn max_tokens(&self) -> usize {
        MODEL_TO_MAX_TOKENS.get(self.model.as_str()).copied().unwrap_or(0)
    }

    /// Whether a prompt leaves at least `reserved_for_reply` tokens of the context for the reply.
    pub fn fits(&self, prompt: &str, reserved_for_reply: usize) -> bool {
        self.count_token(prompt) + reserved_for_reply <= self.max_tokens()
    }
}

impl CountToken for Tiktoken {
    fn count_token(&self, string: &str) -> usize {
        self.bpe.encode_with_special_tokens(string).len()
    }
}

#[cfg(test)]
mod test_tiktoken {
    use super::Tiktoken;
    use crate::utils::token::CountToken;

    #[test]
    fn test_count() {
        let counter = Tiktoken::new("gpt-3.5-turbo").unwrap();
        assert_eq!(2, counter.count_token("hello world"));
        assert_eq!(4096, counter.max_tokens());
        assert!(counter.fits("hello world", 4094));
        assert!(!counter.fits("hello world", 4095));
    }

    #[test]
    fn test_unsupported_model() {
        assert!(Tiktoken::new("davinci").is_err());
    }
}
