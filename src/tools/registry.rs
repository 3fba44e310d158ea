//! Tool registry — the catalog of invocable operations.
//!
//! Populated once at startup and read-only afterwards, so the model's view
//! of the available capabilities is stable for the life of the session.

use crate::tools::spec::{ToolDefinition, ToolSpec};
use std::collections::BTreeMap;
use thiserror::Error;

/// Registration-time errors. These indicate a configuration bug and are
/// fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate tool registration: {0}")]
    DuplicateTool(String),
}

/// Catalog of registered tool specifications, keyed by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    specs: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool spec. Fails if the name is already taken.
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.specs.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Look up a spec by name.
    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    /// Model-facing definitions for every registered tool, recomputed on
    /// each call in registration-name order.
    pub fn describe_all(&self) -> impl Iterator<Item = ToolDefinition> + '_ {
        self.specs.values().map(ToolDefinition::from)
    }

    /// All registered specs, in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
