//! Catalogue of available strategies, separate from [`crate::StrategyHost`]
//! which manages the single *active* one. The registry lets the CLI/config
//! layer pick a strategy by name and instantiate it without coupling
//! discovery to execution.

use crate::{Strategy, StrategySpec};

pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyMeta {
    pub name: String,
    pub version: String,
    pub timeframe_secs: u32,
    pub description: String,
}

impl StrategyMeta {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        timeframe_secs: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            timeframe_secs,
            description: description.into(),
        }
    }

    pub fn from_spec(spec: &StrategySpec, version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: spec.strategy_id.clone(),
            version: version.into(),
            timeframe_secs: spec.timeframe_secs,
            description: description.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName { name: String },
    UnknownStrategy { name: String },
    EmptyName,
    TimeframeMismatch {
        name: String,
        meta_secs: u32,
        spec_secs: u32,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "strategy '{name}' is already registered"),
            Self::UnknownStrategy { name } => write!(f, "no strategy named '{name}' is registered"),
            Self::EmptyName => write!(f, "strategy name must not be empty"),
            Self::TimeframeMismatch { name, meta_secs, spec_secs } => write!(
                f,
                "strategy '{name}': metadata timeframe {meta_secs}s != spec timeframe {spec_secs}s"
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

struct RegistryEntry {
    meta: StrategyMeta,
    factory: StrategyFactory,
}

/// Insertion-ordered catalogue of strategy factories.
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register<F>(&mut self, meta: StrategyMeta, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        if meta.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.contains(&meta.name) {
            return Err(RegistryError::DuplicateName { name: meta.name.clone() });
        }
        self.entries.push(RegistryEntry { meta, factory: Box::new(factory) });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> Vec<&StrategyMeta> {
        self.entries.iter().map(|e| &e.meta).collect()
    }

    pub fn lookup(&self, name: &str) -> Result<&StrategyMeta, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| &e.meta)
            .ok_or_else(|| RegistryError::UnknownStrategy { name: name.to_string() })
    }

    /// Each call produces a fresh instance; strategies carry mutable state
    /// (bar history) that must not leak across runs.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .ok_or_else(|| RegistryError::UnknownStrategy { name: name.to_string() })?;
        Ok((entry.factory)())
    }

    pub fn instantiate_verified(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .ok_or_else(|| RegistryError::UnknownStrategy { name: name.to_string() })?;

        let strategy = (entry.factory)();
        let spec = strategy.spec();

        if spec.timeframe_secs != entry.meta.timeframe_secs {
            return Err(RegistryError::TimeframeMismatch {
                name: name.to_string(),
                meta_secs: entry.meta.timeframe_secs,
                spec_secs: spec.timeframe_secs,
            });
        }

        Ok(strategy)
    }

    pub fn deregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.meta.name != name);
        self.entries.len() < before
    }
}
