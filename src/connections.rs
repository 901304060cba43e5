//! Connection Registry
//!
//! Maps connection aliases to store handles. Document types keep only the
//! alias and resolve it at call time, so a store can be registered after the
//! types that use it are built.

use crate::error::DocumentError;
use crate::store::DocumentStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub const DEFAULT_ALIAS: &str = "default";

static GLOBAL: OnceLock<Arc<Connections>> = OnceLock::new();

/// Alias -> store handle
pub struct Connections {
    stores: RwLock<HashMap<String, Arc<dyn DocumentStore>>>,
    default_alias: RwLock<String>,
}

impl Default for Connections {
    fn default() -> Self {
        Connections {
            stores: RwLock::new(HashMap::new()),
            default_alias: RwLock::new(DEFAULT_ALIAS.to_string()),
        }
    }
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut aliases: Vec<String> = self.stores.read().keys().cloned().collect();
        aliases.sort();
        f.debug_struct("Connections")
            .field("aliases", &aliases)
            .field("default_alias", &*self.default_alias.read())
            .finish()
    }
}

impl Connections {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide registry used by types built without their own
    pub fn global() -> Arc<Connections> {
        GLOBAL.get_or_init(Connections::new).clone()
    }

    /// Register (or replace) the store behind `alias`
    pub fn register(&self, alias: impl Into<String>, store: Arc<dyn DocumentStore>) {
        let alias = alias.into();
        debug!(alias = %alias, "registering connection");
        self.stores.write().insert(alias, store);
    }

    pub fn remove(&self, alias: &str) -> Option<Arc<dyn DocumentStore>> {
        self.stores.write().remove(alias)
    }

    pub fn set_default_alias(&self, alias: impl Into<String>) {
        *self.default_alias.write() = alias.into();
    }

    pub fn default_alias(&self) -> String {
        self.default_alias.read().clone()
    }

    /// Resolve `alias`, or the default alias when `None`
    pub fn get_connection(&self, alias: Option<&str>) -> Result<Arc<dyn DocumentStore>, DocumentError> {
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => self.default_alias(),
        };
        self.stores.read().get(&alias).cloned().ok_or_else(|| {
            DocumentError::Configuration(format!("no connection registered under '{}'", alias))
        })
    }

    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.stores.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }
}
