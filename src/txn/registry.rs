//! Step function registry
//!
//! Built once at start-up by the feature modules, then frozen behind an
//! `Arc` and handed to the engine. Lookups after that are lock-free.

use crate::common::{Error, Result};
use crate::txn::step::{StepFunc, LOCK_FUNC, UNLOCK_FUNC};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct StepRegistry {
    funcs: HashMap<String, Arc<dyn StepFunc>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`. Names are unique across feature modules.
    pub fn register(&mut self, name: impl Into<String>, func: Arc<dyn StepFunc>) -> Result<()> {
        let name = name.into();
        if name == LOCK_FUNC || name == UNLOCK_FUNC || self.funcs.contains_key(&name) {
            return Err(Error::DuplicateStep(name));
        }
        tracing::debug!(step = %name, "registered step function");
        self.funcs.insert(name, func);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StepFunc>> {
        self.funcs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::StepNotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("funcs", &self.names())
            .finish()
    }
}
