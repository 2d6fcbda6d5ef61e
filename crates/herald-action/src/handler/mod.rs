//! Action handler registry and trait definition.
//!
//! Defines the `ActionHandler` async trait and the registry the engine
//! resolves action kinds through.

pub mod simulated;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use herald_core::types::TenantId;
use tracing::{debug, info};

use crate::error::ActionError;
use crate::types::{Action, ActionKind, ActionResult};

/// Executes one kind of action against the platform.
///
/// Implementations must tolerate being invoked again after a transient
/// failure of the same action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The kind this handler serves.
    fn kind(&self) -> ActionKind;

    /// Perform the mutation.
    async fn execute(&self, tenant: &TenantId, action: &Action)
        -> Result<ActionResult, ActionError>;

    /// Human-readable description for confirmation prompts.
    fn describe(&self, action: &Action) -> String {
        action.raw_text.clone()
    }
}

struct RegistryEntry {
    handler: Arc<dyn ActionHandler>,
    enabled: bool,
}

/// Map from action kind to its handler and enabled flag.
///
/// The owner may toggle entries at any time; lookups only ever return
/// enabled handlers.
pub struct ActionRegistry {
    entries: RwLock<HashMap<ActionKind, RegistryEntry>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) the handler for its kind, enabled.
    pub fn register(&self, handler: Arc<dyn ActionHandler>) {
        let kind = handler.kind();
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(kind = %kind, "Registered action handler");
        entries.insert(
            kind,
            RegistryEntry {
                handler,
                enabled: true,
            },
        );
    }

    pub fn register_all<I>(&self, handlers: I)
    where
        I: IntoIterator<Item = Arc<dyn ActionHandler>>,
    {
        for handler in handlers {
            self.register(handler);
        }
    }

    /// Enable or disable a registered kind. Returns `false` if it was never registered.
    pub fn set_enabled(&self, kind: &ActionKind, enabled: bool) -> bool {
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get_mut(kind) {
            Some(entry) => {
                entry.enabled = enabled;
                info!(kind = %kind, enabled, "Action kind toggled");
                true
            }
            None => false,
        }
    }

    /// The handler for `kind`, if registered and enabled.
    pub fn lookup(&self, kind: &ActionKind) -> Option<Arc<dyn ActionHandler>> {
        let entries = match self.entries.read() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .get(kind)
            .filter(|entry| entry.enabled)
            .map(|entry| Arc::clone(&entry.handler))
    }

    pub fn is_enabled(&self, kind: &ActionKind) -> bool {
        self.lookup(kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
