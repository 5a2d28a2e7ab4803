//! Per-context conversational memory.
//!
//! A context is a principal-scoped bucket holding an ordered, append-only list
//! of opaque memory entries and a last-write-wins preference map. Contexts are
//! created lazily: reading one that was never written yields an empty,
//! unpersisted value, so callers can always merge into whatever they get back.
//!
//! Merging is the only way to change a context:
//!
//! ```text
//!   stored:  memory [m1, m2]     preferences {a: 1, b: 2}
//!   patch:   additions [m3]      updates     {a: 3}
//!   result:  memory [m1, m2, m3] preferences {a: 3, b: 2}
//! ```

mod locks;
mod store;

pub use locks::KeyedLocks;
pub use store::ContextStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Preference key → value mapping
pub type Preferences = BTreeMap<String, Value>;

/// A principal-scoped conversational context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub context_id: String,
    pub principal_id: String,
    pub memory: Vec<Value>,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether a row backs this context
    #[serde(default)]
    pub persisted: bool,
}

impl Context {
    /// Fresh, unpersisted context stamped with a single instant
    pub fn empty(context_id: &str, principal_id: &str) -> Self {
        let now = Utc::now();
        Self {
            context_id: context_id.to_string(),
            principal_id: principal_id.to_string(),
            memory: Vec::new(),
            preferences: Preferences::new(),
            created_at: now,
            updated_at: now,
            persisted: false,
        }
    }

    /// Apply a patch in place: append memory, overlay preferences
    fn apply(&mut self, patch: ContextPatch) {
        self.memory.extend(patch.memory_additions);
        self.preferences.extend(patch.preference_updates);
    }
}

/// Changes to merge into a context.
///
/// Accepts the wire names `memory` and `preferences` as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPatch {
    #[serde(default, alias = "memory")]
    pub memory_additions: Vec<Value>,
    #[serde(default, alias = "preferences")]
    pub preference_updates: Preferences,
}

impl ContextPatch {
    pub fn memory(entries: impl IntoIterator<Item = Value>) -> Self {
        Self {
            memory_additions: entries.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn preferences(updates: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            preference_updates: updates.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.memory_additions.is_empty() && self.preference_updates.is_empty()
    }
}

/// Memory usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub contexts: u64,
    pub executions: u64,
    pub principals: u64,
}
