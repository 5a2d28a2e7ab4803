//! Database-backed context store.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::{Context, ContextPatch, KeyedLocks, MemoryStats, Preferences};
use crate::db::{ContextRow, Database, PreferenceRow};
use crate::error::Result;

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Durable store for contexts and per-principal preferences.
///
/// Every read-modify-write runs under a per-key lock, so concurrent merges
/// into the same `(context_id, principal_id)` never lose an update.
pub struct ContextStore {
    db: Arc<Database>,
    context_locks: KeyedLocks<(String, String)>,
    preference_locks: KeyedLocks<String>,
}

impl ContextStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            context_locks: KeyedLocks::new(),
            preference_locks: KeyedLocks::new(),
        }
    }

    /// Read a context. Absent contexts come back empty and unpersisted.
    pub fn get(&self, context_id: &str, principal_id: &str) -> Result<Context> {
        match self.db.get_context(context_id, principal_id)? {
            Some(row) => Self::decode(row),
            None => Ok(Context::empty(context_id, principal_id)),
        }
    }

    fn decode(row: ContextRow) -> Result<Context> {
        Ok(Context {
            memory: serde_json::from_str(&row.memory_json)?,
            preferences: serde_json::from_str(&row.preferences_json)?,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
            context_id: row.context_id,
            principal_id: row.principal_id,
            persisted: true,
        })
    }

    /// Merge a patch into a context and return the stored result.
    pub fn merge(&self, context_id: &str, principal_id: &str, patch: ContextPatch) -> Result<Context> {
        let key = (context_id.to_string(), principal_id.to_string());
        self.context_locks.with_lock(&key, || {
            let now = Utc::now();
            let mut context = self.get(context_id, principal_id)?;
            if !context.persisted {
                context.created_at = now;
            }

            let additions = patch.memory_additions.len();
            let updates = patch.preference_updates.len();
            context.apply(patch);
            context.updated_at = now;

            self.db.upsert_context(&ContextRow {
                context_id: context.context_id.clone(),
                principal_id: context.principal_id.clone(),
                memory_json: serde_json::to_string(&context.memory)?,
                preferences_json: serde_json::to_string(&context.preferences)?,
                created_at: context.created_at.timestamp_millis(),
                updated_at: now.timestamp_millis(),
            })?;
            context.persisted = true;

            debug!(
                context_id = %context_id,
                principal = %principal_id,
                additions,
                updates,
                memory_len = context.memory.len(),
                "Context merged"
            );
            Ok(context)
        })
    }

    /// Delete a context. Clearing an absent context succeeds.
    pub fn clear(&self, context_id: &str, principal_id: &str) -> Result<()> {
        let key = (context_id.to_string(), principal_id.to_string());
        let existed = self
            .context_locks
            .with_lock(&key, || self.db.delete_context(context_id, principal_id))?;
        debug!(context_id = %context_id, principal = %principal_id, existed, "Context cleared");
        Ok(())
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        let counts = self.db.table_counts()?;
        Ok(MemoryStats {
            contexts: counts.contexts,
            executions: counts.executions,
            principals: counts.principals,
        })
    }

    /// Preferences recorded for a principal across all contexts
    pub fn preferences(&self, principal_id: &str) -> Result<Preferences> {
        match self.db.get_preferences(principal_id)? {
            Some(row) => Ok(serde_json::from_str(&row.preferences_json)?),
            None => Ok(Preferences::new()),
        }
    }

    /// Overlay preference updates key by key and return the merged map
    pub fn update_preferences(&self, principal_id: &str, updates: Preferences) -> Result<Preferences> {
        self.preference_locks.with_lock(&principal_id.to_string(), || {
            let now = Utc::now().timestamp_millis();
            let existing = self.db.get_preferences(principal_id)?;
            let created_at = existing.as_ref().map_or(now, |row| row.created_at);

            let mut preferences = match existing {
                Some(row) => serde_json::from_str(&row.preferences_json)?,
                None => Preferences::new(),
            };
            preferences.extend(updates);

            self.db.upsert_preferences(&PreferenceRow {
                principal_id: principal_id.to_string(),
                preferences_json: serde_json::to_string(&preferences)?,
                created_at,
                updated_at: now,
            })?;
            Ok(preferences)
        })
    }
}
