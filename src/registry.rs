//! Registry of block type names.
//!
//! Block type names must be unique, because blocks are told apart by the type name in their header. A
//! [BlockTypeRegistry] owns a set of names. It is thread-safe and cheaply cloneable, all clones share the same
//! storage. Build a fresh registry per run (or per test); [BlockType::new] uses the process-wide
//! [global](BlockTypeRegistry::global) one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use lazy_static::lazy_static;
use log::debug;
use parking_lot::RwLock;
use crate::block::errors::RegistrationError;
use crate::block::{BlockType, Delimiter};

lazy_static! {
    static ref GLOBAL_REGISTRY: BlockTypeRegistry = BlockTypeRegistry::new();
}

#[derive(Clone, Default)]
pub struct BlockTypeRegistry {
    inner: Arc<RwLock<HashMap<String, BlockType>>>,
}

impl BlockTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. Never cleared.
    pub fn global() -> &'static BlockTypeRegistry {
        &GLOBAL_REGISTRY
    }

    /// Create a block type with the default delimiters `|---` and `---|`.
    pub fn register(&self, name: impl Into<String>) -> Result<BlockType, RegistrationError> {
        self.register_with_delimiter(name, Delimiter::default())
    }

    /// Create a block type. Fails if the name is taken, malformed, or a delimiter is empty.
    pub fn register_with_delimiter(&self, name: impl Into<String>, delimiter: Delimiter) -> Result<BlockType, RegistrationError> {
        let block_type = BlockType::build(name.into(), delimiter)?;
        let mut guard = self.inner.write();
        if guard.contains_key(block_type.name()) {
            let mut existing: Vec<String> = guard.keys().cloned().collect();
            existing.sort();
            return Err(RegistrationError::DuplicateName {
                name: block_type.name().to_string(),
                existing,
            });
        }
        debug!("registered block type {} with delimiters {:?}", block_type.name(), block_type.delimiter());
        guard.insert(block_type.name().to_string(), block_type.clone());
        Ok(block_type)
    }

    /// Look up a block type by name.
    pub fn get(&self, name: &str) -> Option<BlockType> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl fmt::Debug for BlockTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockTypeRegistry")
            .field("names", &self.names())
            .finish()
    }
}
