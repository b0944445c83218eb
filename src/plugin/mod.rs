//! Post-update plugin hooks
//!
//! A plugin is an opaque side-effecting hook named in a channel's roster
//! entry and invoked by the dispatcher after each successful per-day
//! update. Its result carries no meaning for the engine: a failure is
//! logged and the committed merge stands.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Channel;

/// Contract for a per-channel post-processing hook.
pub trait Plugin: Send + Sync {
    fn update(&self, channel: &mut Channel, date: NaiveDate) -> Result<()>;
}

/// Maps plugin names from the roster config to implementations.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(name.into(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
