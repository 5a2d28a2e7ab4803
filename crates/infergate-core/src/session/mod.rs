//! Session registry.
//!
//! Tracks every principal seen since startup and the contexts each one has
//! touched. Sessions live for the process lifetime; there is no expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

use crate::context::{ContextStore, MemoryStats};
use crate::error::Result;
use crate::training::TrainingCorpus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// The bootstrap principal created at engine start
    Owner,
    Standard,
}

/// A context a session has used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHandle {
    pub context_id: String,
    pub attached_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub principal_id: String,
    pub created_at: DateTime<Utc>,
    pub access_level: AccessLevel,
    pub contexts: HashMap<String, ContextHandle>,
}

impl Session {
    fn new(principal_id: &str, access_level: AccessLevel) -> Self {
        Self {
            principal_id: principal_id.to_string(),
            created_at: Utc::now(),
            access_level,
            contexts: HashMap::new(),
        }
    }
}

/// Aggregate counts for observability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatus {
    pub sessions: usize,
    pub uptime_secs: f64,
    pub training_samples: usize,
    pub memory: MemoryStats,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    bootstrap_principal: String,
    started_at: Instant,
}

impl SessionRegistry {
    /// Create the registry with the bootstrap principal's session in place
    pub fn new(bootstrap_principal: impl Into<String>) -> Self {
        let bootstrap_principal = bootstrap_principal.into();
        let mut sessions = HashMap::new();
        sessions.insert(
            bootstrap_principal.clone(),
            Session::new(&bootstrap_principal, AccessLevel::Owner),
        );

        Self {
            sessions: RwLock::new(sessions),
            bootstrap_principal,
            started_at: Instant::now(),
        }
    }

    pub fn bootstrap_principal(&self) -> &str {
        &self.bootstrap_principal
    }

    /// Get or create the session for a principal
    pub async fn ensure(&self, principal_id: &str) -> Session {
        if let Some(session) = self.sessions.read().await.get(principal_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(principal_id.to_string())
            .or_insert_with(|| {
                info!(principal = %principal_id, "Session created");
                Session::new(principal_id, AccessLevel::Standard)
            })
            .clone()
    }

    /// Record that a principal used a context
    pub async fn attach_context(&self, principal_id: &str, context_id: &str) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(principal_id.to_string())
            .or_insert_with(|| Session::new(principal_id, AccessLevel::Standard));

        session
            .contexts
            .entry(context_id.to_string())
            .and_modify(|handle| handle.last_used_at = now)
            .or_insert_with(|| ContextHandle {
                context_id: context_id.to_string(),
                attached_at: now,
                last_used_at: now,
            });
    }

    /// Drop a context handle after the context was cleared
    pub async fn detach_context(&self, principal_id: &str, context_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(principal_id) {
            session.contexts.remove(context_id);
        }
    }

    pub async fn get(&self, principal_id: &str) -> Option<Session> {
        self.sessions.read().await.get(principal_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub async fn status(&self, contexts: &ContextStore, corpus: &TrainingCorpus) -> Result<RegistryStatus> {
        Ok(RegistryStatus {
            sessions: self.count().await,
            uptime_secs: self.uptime().as_secs_f64(),
            training_samples: corpus.len(),
            memory: contexts.stats()?,
        })
    }
}
