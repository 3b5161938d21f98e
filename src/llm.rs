//! # Endpoint or LLM
//!
//! Anything that turns a prompt into a reply. Agents only depend on [GenerateText]; choosing a provider, holding
//! credentials, retrying and timing out are up to the implementor.
//!
//! Plain closures work out of the box:
//!
//! ```
//! use blockweave::llm::GenerateText;
//! let echo = |prompt: &str| prompt.to_uppercase();
//! assert_eq!("HI", echo.generate("hi").unwrap());
//! ```

use anyhow::Result;

/// A blocking, single-shot text generator.
pub trait GenerateText {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Blanket impl of GenerateText for infallible Fn(&str) -> String.
impl<F> GenerateText for F where F: Fn(&str) -> String {
    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(self(prompt))
    }
}

#[cfg(test)]
mod test_llm {
    use anyhow::{anyhow, Result};
    use super::GenerateText;

    struct Unavailable;

    impl GenerateText for Unavailable {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("provider is unreachable"))
        }
    }

    #[test]
    fn test_closure_impl() {
        let reply = |prompt: &str| format!("{} back", prompt);
        assert_eq!("ping back", reply.generate("ping").unwrap());
    }

    #[test]
    fn test_fallible_impl_as_trait_object() {
        let model: &dyn GenerateText = &Unavailable;
        assert_eq!("provider is unreachable", model.generate("ping").unwrap_err().to_string());
    }
}
