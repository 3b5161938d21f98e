//! # Blocks
//!
//! A [Block] is a piece of typed text exchanged with an LLM. Its [BlockType] decides how it is written into a prompt
//! and how it is found again in a reply. A rendered block looks like
//!
//! ```text
//! ## @Block ResearchQuestions rq_block
//! |---
//! 1. RQ1
//! 2. RQ2
//! ---|
//! ```
//!
//! The header line carries the type name and the block name, the [Delimiter] pair brackets the content.
//! Whitespace around the header and the delimiters is tolerated when reading a block back, anything else is not.
//!
//! ## Extraction order
//!
//! [BlockType::locate_all] scans a text for several block types at once and returns the fragments in the order they
//! **appear** in the text. When two fragments start at the same offset, the one whose type comes first in the
//! candidate list wins. The order of the candidate list never reorders fragments otherwise.

use std::fmt;
use std::sync::Arc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use crate::block::errors::{ContentConflict, NoMatch, RegistrationError};
use crate::registry::BlockTypeRegistry;
use crate::utils::postprocess::json::filter_to;

/// Structural marker that starts the header line of every rendered block.
pub const BLOCK_START: &str = "## @Block";
/// Block name used when a block is rendered without a name.
pub const BLOCK_NAME_PLACEHOLDER: &str = "{block_name}";
/// Content placeholder of the unfilled block form.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

/// Literal markers around the content of a rendered block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiter {
    pub start: String,
    pub end: String,
}

impl Delimiter {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether either marker occurs in `content`.
    #[inline]
    pub fn appears_in(&self, content: &str) -> bool {
        content.contains(self.start.as_str()) || content.contains(self.end.as_str())
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::new("|---", "---|")
    }
}

/// The pieces of a rendered block that [BlockType::extract] can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockField {
    /// The whole matched fragment, header to end delimiter.
    Full,
    TypeName,
    /// The block name from the header, empty if the header has none.
    BlockName,
    Content,
}

impl BlockField {
    #[inline]
    fn group(self) -> usize {
        match self {
            BlockField::Full => 0,
            BlockField::TypeName => 1,
            BlockField::BlockName => 2,
            BlockField::Content => 3,
        }
    }
}

/// A fragment found by [BlockType::locate_all_typed].
#[derive(Debug, Clone)]
pub struct LocatedBlock<'t> {
    /// Byte offset of the fragment in the scanned text.
    pub start: usize,
    /// The candidate type whose pattern matched.
    pub block_type: BlockType,
    pub text: &'t str,
}

struct BlockTypeInner {
    name: String,
    delimiter: Delimiter,
    pattern: Regex,
}

/// A named category of blocks. Cheap to clone, all clones share one definition.
///
/// Two block types are equal when their names are equal. Names are unique per [BlockTypeRegistry].
#[derive(Clone)]
pub struct BlockType {
    inner: Arc<BlockTypeInner>,
}

impl BlockType {
    /// Register a block type with the default delimiters in the [global registry](BlockTypeRegistry::global).
    pub fn new(name: impl Into<String>) -> Result<Self, RegistrationError> {
        BlockTypeRegistry::global().register(name)
    }

    /// Register a block type with custom delimiters in the [global registry](BlockTypeRegistry::global).
    pub fn with_delimiter(name: impl Into<String>, delimiter: Delimiter) -> Result<Self, RegistrationError> {
        BlockTypeRegistry::global().register_with_delimiter(name, delimiter)
    }

    /// Validate and compile a block type without registering it.
    pub(crate) fn build(name: String, delimiter: Delimiter) -> Result<Self, RegistrationError> {
        if name.is_empty() {
            return Err(RegistrationError::InvalidName { name, reason: "name is empty" });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(RegistrationError::InvalidName { name, reason: "name contains whitespace" });
        }
        if delimiter.start.is_empty() || delimiter.end.is_empty() {
            return Err(RegistrationError::InvalidDelimiter { delimiter, reason: "delimiter is empty".to_string() });
        }
        // group 1: type name, group 2: block name, group 3: content
        let pattern = format!(
            r"(?s){marker}[ \t]*({name})(?:[ \t]+([^\r\n]*?))?\s*{start}[ \t]*\r?\n?(.*?)\r?\n?[ \t]*{end}",
            marker = regex::escape(BLOCK_START),
            name = regex::escape(&name),
            start = regex::escape(&delimiter.start),
            end = regex::escape(&delimiter.end),
        );
        let pattern = match Regex::new(&pattern) {
            Ok(pattern) => pattern,
            Err(e) => return Err(RegistrationError::InvalidDelimiter { delimiter, reason: e.to_string() }),
        };
        Ok(Self {
            inner: Arc::new(BlockTypeInner { name, delimiter, pattern }),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn delimiter(&self) -> &Delimiter {
        &self.inner.delimiter
    }

    /// The canonical unfilled block, with `{block_name}` and `{content}` in place of name and content.
    pub fn render_empty(&self) -> String {
        self.render_unchecked(BLOCK_NAME_PLACEHOLDER, CONTENT_PLACEHOLDER)
    }

    /// Render a block of this type. Fails if `content` contains either delimiter.
    pub fn fill(&self, block_name: &str, content: &str) -> Result<String, ContentConflict> {
        if self.delimiter().appears_in(content) {
            return Err(ContentConflict {
                block_type: self.name().to_string(),
                delimiter: self.delimiter().clone(),
            });
        }
        Ok(self.render_unchecked(block_name, content))
    }

    fn render_unchecked(&self, block_name: &str, content: &str) -> String {
        let Delimiter { start, end } = self.delimiter();
        format!("{} {} {}\n{}\n{}\n{}", BLOCK_START, self.name(), block_name, start, content, end)
    }

    /// The pattern matching blocks of this type. Capture groups: 0 full match, 1 type name, 2 block name, 3 content.
    #[inline]
    pub fn match_pattern(&self) -> &Regex {
        &self.inner.pattern
    }

    /// Return one field of the first block of this type in `text`, by appearance order.
    ///
    /// Use [BlockType::locate_all] to scan for several blocks.
    pub fn extract(&self, text: &str, field: BlockField) -> Result<String, NoMatch> {
        let captures = self.match_pattern().captures(text).ok_or_else(|| NoMatch {
            block_type: self.name().to_string(),
            text: text.to_string(),
        })?;
        Ok(captures.get(field.group()).map_or("", |m| m.as_str()).to_string())
    }

    /// Find every block of the candidate types in `text`, in appearance order.
    ///
    /// Matches of one type never overlap. Fragments starting at the same offset keep the order of the candidate
    /// types. A type listed twice is scanned once, so outputs declared as `[A, A]` are matched by position against
    /// two distinct `A` fragments.
    pub fn locate_all_typed<'t>(candidates: &[BlockType], text: &'t str) -> Vec<LocatedBlock<'t>> {
        let mut located = Vec::new();
        for (idx, block_type) in candidates.iter().enumerate() {
            if candidates[..idx].contains(block_type) {
                continue;
            }
            located.extend(block_type.match_pattern().find_iter(text).map(|m| LocatedBlock {
                start: m.start(),
                block_type: block_type.clone(),
                text: m.as_str(),
            }));
        }
        // stable, so ties keep the scan order of the candidates
        located.sort_by_key(|l| l.start);
        located
    }

    /// Like [BlockType::locate_all_typed] but only returns the raw fragments.
    pub fn locate_all<'t>(candidates: &[BlockType], text: &'t str) -> Vec<&'t str> {
        Self::locate_all_typed(candidates, text).into_iter().map(|l| l.text).collect()
    }
}

impl PartialEq for BlockType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for BlockType {}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockType")
            .field("name", &self.name())
            .field("delimiter", self.delimiter())
            .finish()
    }
}

/// Typed content. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    block_type: BlockType,
    content: String,
}

impl Block {
    /// Any content is accepted here, delimiters are only checked when rendering.
    pub fn new(block_type: BlockType, content: impl Into<String>) -> Self {
        Self {
            block_type,
            content: content.into(),
        }
    }

    /// Parse the first block of `block_type` found in `text`.
    pub fn from_delimited_text(block_type: BlockType, text: &str) -> Result<Self, NoMatch> {
        let content = block_type.extract(text, BlockField::Content)?;
        Ok(Self::new(block_type, content))
    }

    #[inline]
    pub fn block_type(&self) -> &BlockType {
        &self.block_type
    }

    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Render for use in a prompt, named `{block_name}` when no name is given.
    pub fn render(&self, name: Option<&str>) -> Result<String, ContentConflict> {
        self.block_type.fill(name.unwrap_or(BLOCK_NAME_PLACEHOLDER), &self.content)
    }

    /// Whether this block is of `block_type`, compared by name.
    #[inline]
    pub fn type_matches(&self, block_type: &BlockType) -> bool {
        self.block_type.name() == block_type.name()
    }

    /// Deserialize JSON found in the content, ignoring text around it.
    pub fn parse_json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        filter_to(self.content.as_str())
    }
}

/// The block rendered with the `{block_name}` name, or its debug form when the content holds a delimiter.
impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render(None) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;
    use crate::block::Delimiter;

    /// Error when a block type cannot be created.
    #[derive(Debug, Clone)]
    pub enum RegistrationError {
        /// The name is already taken in the registry.
        DuplicateName {
            name: String,
            existing: Vec<String>,
        },
        InvalidName {
            name: String,
            reason: &'static str,
        },
        InvalidDelimiter {
            delimiter: Delimiter,
            reason: String,
        },
    }

    impl fmt::Display for RegistrationError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match self {
                RegistrationError::DuplicateName { name, existing } =>
                    write!(f, "DuplicateBlockTypeName: a BlockType named {} already exists in this registry, use another name. Existing names: {:?}",
                           name, existing),
                RegistrationError::InvalidName { name, reason } =>
                    write!(f, "InvalidBlockTypeName: {:?} cannot name a BlockType: {}", name, reason),
                RegistrationError::InvalidDelimiter { delimiter, reason } =>
                    write!(f, "InvalidDelimiter: ({:?}, {:?}) cannot delimit blocks: {}", delimiter.start, delimiter.end, reason),
            }
        }
    }

    impl Error for RegistrationError {}

    /// Error when block content contains a delimiter of its type and would not be read back unambiguously.
    #[derive(Debug, Clone)]
    pub struct ContentConflict {
        pub block_type: String,
        pub delimiter: Delimiter,
    }

    impl fmt::Display for ContentConflict {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "ContentConflict: delimiters {} and {} are not allowed in the content of a {} block",
                   self.delimiter.start, self.delimiter.end, self.block_type)
        }
    }

    impl Error for ContentConflict {}

    /// Error when no block of the type is found in a text.
    #[derive(Debug, Clone)]
    pub struct NoMatch {
        pub block_type: String,
        pub text: String,
    }

    impl fmt::Display for NoMatch {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "NoMatch: no block of type {} found in:\n{}", self.block_type, self.text)
        }
    }

    impl Error for NoMatch {}
}
