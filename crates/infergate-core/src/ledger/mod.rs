//! Append-only execution ledger.
//!
//! Every executed command leaves exactly one record. Records are never
//! updated or deleted; the ledger is the audit trail and is never re-derived.
//! Each record carries the fixed compliance score [`COMPLIANCE_SCORE`]: the
//! gateway runs no validation or denial step, and the ledger says so.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Database, ExecutionRow, NewExecution};
use crate::error::{Error, Result};

/// Score recorded on every execution record
pub const COMPLIANCE_SCORE: f64 = 1.0;

/// How command identifiers are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandIdScheme {
    /// `cmd_` + first 8 hex chars of the MD5 of the command text.
    ///
    /// Deterministic, but 32 bits collide quickly across distinct commands.
    #[default]
    ContentHash,
    /// `cmd_` + a random UUID
    Random,
}

impl CommandIdScheme {
    pub fn derive(&self, command: &str) -> String {
        match self {
            Self::ContentHash => {
                let digest = format!("{:x}", md5::compute(command.as_bytes()));
                format!("cmd_{}", &digest[..8])
            }
            Self::Random => format!("cmd_{}", uuid::Uuid::new_v4().simple()),
        }
    }
}

/// An immutable ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Insertion sequence, strictly increasing
    pub seq: i64,
    pub command_id: String,
    pub command: String,
    pub parameters: Value,
    pub principal_id: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub compliance_score: f64,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = Error;

    fn try_from(row: ExecutionRow) -> Result<Self> {
        Ok(Self {
            seq: row.seq,
            parameters: serde_json::from_str(&row.parameters_json)?,
            command_id: row.command_id,
            command: row.command,
            principal_id: row.principal_id,
            output: row.output,
            timestamp: DateTime::from_timestamp_millis(row.timestamp).unwrap_or_default(),
            compliance_score: row.compliance_score,
        })
    }
}

/// Input for [`ExecutionLedger::append`]
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub command_id: String,
    pub command: String,
    pub parameters: Value,
    pub principal_id: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

pub struct ExecutionLedger {
    db: Arc<Database>,
}

impl ExecutionLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Durably append a record.
    ///
    /// Fails with `DuplicateCommandId` when the id is already held by a record
    /// for different command text.
    pub fn append(&self, entry: LedgerEntry) -> Result<ExecutionRecord> {
        let row = self
            .db
            .append_execution(&NewExecution {
                command_id: entry.command_id,
                command: entry.command,
                parameters_json: serde_json::to_string(&entry.parameters)?,
                principal_id: entry.principal_id,
                output: entry.output,
                timestamp: entry.timestamp.timestamp_millis(),
                compliance_score: COMPLIANCE_SCORE,
            })
            .inspect_err(|e| {
                if let Error::DuplicateCommandId { command_id } = e {
                    warn!(command_id = %command_id, "Command id collision, record rejected");
                }
            })?;

        info!(
            command_id = %row.command_id,
            seq = row.seq,
            principal = %row.principal_id,
            "Execution recorded"
        );
        row.try_into()
    }

    pub fn count(&self) -> Result<u64> {
        self.db.count_executions()
    }

    pub fn latest(&self) -> Result<Option<ExecutionRecord>> {
        self.db.latest_execution()?.map(TryInto::try_into).transpose()
    }

    pub fn count_for(&self, principal_id: &str) -> Result<u64> {
        self.db.count_principal_executions(principal_id)
    }

    /// One principal's records, newest first
    pub fn list_for(&self, principal_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.db
            .list_principal_executions(principal_id, limit)?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    /// Every record under a command id, oldest first
    pub fn get(&self, command_id: &str) -> Result<Vec<ExecutionRecord>> {
        self.db
            .get_executions(command_id)?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }
}
