//! Application state.

use infergate_core::auth::{ServiceToken, hash_key};
use infergate_core::db::PrincipalToken;
use infergate_core::Engine;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::Config;

/// Principal token entry for validation
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEntry {
    pub token_id: String,
    pub principal_id: String,
    pub name: String,
    /// Unix millis
    pub expires_at: Option<i64>,
}

impl TokenEntry {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at.is_some_and(|at| now_millis > at)
    }
}

/// Principal token registry, keyed by SHA-256 hex hash of the raw key
#[derive(Debug, Default)]
pub struct PrincipalTokenRegistry {
    tokens: RwLock<HashMap<String, TokenEntry>>,
}

impl PrincipalTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a presented raw key. Expired entries never validate.
    pub async fn validate(&self, raw_key: &str) -> Option<TokenEntry> {
        let tokens = self.tokens.read().await;
        let entry = tokens.get(&hash_key(raw_key))?;
        if entry.is_expired(chrono::Utc::now().timestamp_millis()) {
            return None;
        }
        Some(entry.clone())
    }

    pub async fn add(&self, key_hash: String, entry: TokenEntry) {
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, existing| existing.token_id != entry.token_id);
        tokens.insert(key_hash, entry);
    }

    pub async fn remove(&self, token_id: &str) {
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, entry| entry.token_id != token_id);
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Load tokens from database rows
    pub async fn load_from_db(&self, rows: Vec<PrincipalToken>) {
        let mut tokens = self.tokens.write().await;
        for row in rows {
            tokens.insert(
                row.key_hash,
                TokenEntry {
                    token_id: row.id,
                    principal_id: row.principal_id,
                    name: row.name,
                    expires_at: row.expires_at,
                },
            );
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Gateway engine: orchestrator, context store, ledger, sessions
    pub engine: Arc<Engine>,
    /// Service token for the fronting process
    pub service_token: Arc<ServiceToken>,
    /// Principal token registry
    pub principal_tokens: Arc<PrincipalTokenRegistry>,
    /// Server start time
    pub start_time: Instant,
    /// Active request count
    pub active_requests: Arc<AtomicUsize>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, engine: Engine, service_token: ServiceToken) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            service_token: Arc::new(service_token),
            principal_tokens: Arc::new(PrincipalTokenRegistry::new()),
            start_time: Instant::now(),
            active_requests: Arc::new(AtomicUsize::new(0)),
        })
    }
}
