//! # blockweave
//!
//! Typed, delimited prompt blocks and agent functions for LLM applications in Rust
//!
//! ## Why `blockweave`
//!
//! An LLM takes text and gives text back. As soon as one call feeds the next, we need to know which part of a reply
//! is the answer, and what kind of answer it is. `blockweave` writes every piece of data into a prompt as a typed,
//! delimited **block** and reads blocks back out of the reply, so an LLM call can be treated like a function with a
//! signature.
//!
//! ## Concepts and Design
//!
//! The APIs are meant to be explicit and flat: every step from template to prompt to reply to typed result can be
//! called and inspected on its own.
//!
//! ### Block Type and Block
//!
//! A [BlockType](crate::block::BlockType) is a named kind of text, e.g. `Topic` or `ResearchQuestions`, with a pair
//! of delimiters. A [Block](crate::block::Block) is some content of a block type. Rendered into a prompt it looks like
//!
//! ```text
//! ## @Block Topic topic_block
//! |---
//! GDPR and speech data
//! ---|
//! ```
//!
//! Block type names are unique within a [BlockTypeRegistry](crate::registry::BlockTypeRegistry), and blocks are
//! compared by the name of their type.
//!
//! ### Prompt Template and Placeholder
//!
//! A template is a string with placeholders in the form `{[name]}`:
//!
//! ```text
//! You are a {[role]}. Today is {[date]}.
//! ```
//!
//! A [PartialPrompt](crate::prompt::PartialPrompt), constructed from a
//! [PromptTemplate](crate::prompt::PromptTemplate), records which placeholder is filled by what value. When all
//! placeholders are filled, it can be completed into a prompt. Anything that fills placeholders is a
//! [filler](crate::filler).
//!
//! ### Endpoint or LLM
//!
//! The endpoint is anything implementing [GenerateText](crate::llm::GenerateText): a prompt goes in, a reply comes
//! out. Closures `Fn(&str) -> String` qualify, so tests and demos need no provider at all.
//!
//! ### Agent
//!
//! An [Agent](crate::agent::Agent) binds named input block types, named output block types and a template. Calling
//! it checks the input blocks, renders the prompt, calls the LLM once and returns the output blocks found in the
//! reply, or an error that says exactly which part of the contract was broken.
//!
//! ```
//! use blockweave::agent::{Agent, AgentConfig};
//! use blockweave::block::Block;
//! use blockweave::prompt::PromptTemplate;
//! use blockweave::registry::BlockTypeRegistry;
//!
//! let registry = BlockTypeRegistry::new();
//! let topic = registry.register("Topic").unwrap();
//! let questions = registry.register("ResearchQuestions").unwrap();
//! let agent = Agent::new(
//!     [("topic_block", topic.clone())],
//!     [("rq_block", questions)],
//!     PromptTemplate::new("Create research questions.\n{[input_blocks]}\nAnswer:\n{[rq_block]}"),
//!     AgentConfig::default(),
//! ).unwrap();
//!
//! let llm = |_prompt: &str| "## @Block ResearchQuestions rq_block\n|---\n1. RQ1\n2. RQ2\n---|".to_string();
//! let output = agent.invoke(Block::new(topic, "GDPR and speech data"), Some(&llm)).unwrap();
//! assert_eq!("1. RQ1\n2. RQ2", output.single().unwrap().content());
//! ```
//!
//! ## Utilities
//!
//! * [utils::files]: reading and writing UTF-8 template files.
//! * [utils::token]: counting prompt tokens, with a `tiktoken` counter.
//! * [utils::postprocess]: getting JSON out of block contents.
//!
//! ## Attribution
//! * `tiktoken-rs`: In [crate::utils::token::tiktoken], we re-export the `tiktoken-rs` crate.


pub mod block;
pub mod registry;
pub mod prompt;
pub mod filler;
pub mod llm;
pub mod agent;
pub mod utils;
