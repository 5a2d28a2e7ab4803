//! Engine lifecycle.
//!
//! Owns the single instance of every gateway component. Built once at process
//! start, shared behind an `Arc` by the request layer, and shut down once.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::backend::{GenerationBackend, ModelInfo};
use crate::context::ContextStore;
use crate::db::Database;
use crate::error::Result;
use crate::ledger::{CommandIdScheme, ExecutionLedger};
use crate::orchestrator::Orchestrator;
use crate::session::{RegistryStatus, SessionRegistry};
use crate::training::TrainingCorpus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Principal that owns the gateway; gets a session at startup
    pub bootstrap_principal: String,
    pub command_ids: CommandIdScheme,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bootstrap_principal: "owner".to_string(),
            command_ids: CommandIdScheme::default(),
        }
    }
}

/// Combined status of the registry and the loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub registry: RegistryStatus,
    pub model: ModelInfo,
}

pub struct Engine {
    db: Arc<Database>,
    backend: Arc<dyn GenerationBackend>,
    contexts: Arc<ContextStore>,
    ledger: Arc<ExecutionLedger>,
    sessions: Arc<SessionRegistry>,
    corpus: Arc<TrainingCorpus>,
    orchestrator: Orchestrator,
}

impl Engine {
    pub fn start(db: Arc<Database>, backend: Arc<dyn GenerationBackend>, config: EngineConfig) -> Result<Self> {
        db.ping()?;

        let contexts = Arc::new(ContextStore::new(db.clone()));
        let ledger = Arc::new(ExecutionLedger::new(db.clone()));
        let sessions = Arc::new(SessionRegistry::new(config.bootstrap_principal));
        let corpus = Arc::new(TrainingCorpus::new());
        let orchestrator = Orchestrator::new(
            backend.clone(),
            ledger.clone(),
            sessions.clone(),
            corpus.clone(),
            config.command_ids,
        );

        let model = backend.info();
        info!(
            model = %model.name,
            version = %model.version,
            context_window = model.context_window,
            bootstrap = %sessions.bootstrap_principal(),
            records = ledger.count()?,
            "Engine started"
        );

        Ok(Self {
            db,
            backend,
            contexts,
            ledger,
            sessions,
            corpus,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn corpus(&self) -> &TrainingCorpus {
        &self.corpus
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn model(&self) -> ModelInfo {
        self.backend.info()
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            registry: self.sessions.status(&self.contexts, &self.corpus).await?,
            model: self.backend.info(),
        })
    }

    /// Flush the WAL so the database file is complete on its own
    pub fn shutdown(&self) -> Result<()> {
        self.db.checkpoint()?;
        info!(records = self.ledger.count()?, "Engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EchoBackend;
    use crate::context::ContextPatch;
    use crate::orchestrator::CommandRequest;
    use serde_json::{Map, json};
    use tempfile::TempDir;

    fn start(db: Database) -> Engine {
        Engine::start(
            Arc::new(db),
            Arc::new(EchoBackend::default()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_bootstrap_and_model() {
        let engine = start(Database::open_in_memory().unwrap());
        let status = engine.status().await.unwrap();

        assert_eq!(status.registry.sessions, 1);
        assert_eq!(status.model.context_window, 4096);

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["sessions"], 1);
        assert!(value["model"]["name"].is_string());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("infergate.db");

        {
            let engine = start(Database::open_path(&path).unwrap());
            engine
                .contexts()
                .merge("c1", "p1", ContextPatch::memory([json!("remember me")]))
                .unwrap();
            engine
                .orchestrator()
                .execute_command(
                    "p1",
                    CommandRequest {
                        command: "ping".into(),
                        parameters: Map::new(),
                        priority: 1,
                    },
                )
                .await
                .unwrap();
            tokio_test::assert_ok!(engine.shutdown());
        }

        let engine = start(Database::open_path(&path).unwrap());
        let context = engine.contexts().get("c1", "p1").unwrap();
        assert_eq!(context.memory, vec![json!("remember me")]);
        assert_eq!(engine.ledger().count().unwrap(), 1);
        // Sessions are process-scoped
        assert_eq!(engine.sessions().count().await, 1);
    }
}
