//! Database types for infergate-core.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Row Types
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted context row. JSON columns are kept raw; the context store decodes them.
#[derive(Debug, Clone)]
pub struct ContextRow {
    pub context_id: String,
    pub principal_id: String,
    pub memory_json: String,
    pub preferences_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One row of the append-only execution log.
#[derive(Debug, Clone)]
pub struct ExecutionRow {
    pub seq: i64,
    pub command_id: String,
    pub command: String,
    pub parameters_json: String,
    pub principal_id: String,
    pub output: String,
    pub timestamp: i64,
    pub compliance_score: f64,
}

#[derive(Debug, Clone)]
pub struct PreferenceRow {
    pub principal_id: String,
    pub preferences_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalToken {
    pub id: String,
    pub principal_id: String,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub last_used_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

/// Row counts used by the stats endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub contexts: u64,
    pub executions: u64,
    pub principals: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating entities)
// ─────────────────────────────────────────────────────────────────────────────

/// Input for appending to the execution log
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub command_id: String,
    pub command: String,
    pub parameters_json: String,
    pub principal_id: String,
    pub output: String,
    pub timestamp: i64,
    pub compliance_score: f64,
}

/// Input for storing a principal token
#[derive(Debug, Clone)]
pub struct NewPrincipalToken {
    pub principal_id: String,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub expires_at: Option<i64>,
}
