//! infergate-core - Core library for the infergate inference gateway
//!
//! - **backend**: Generation backend trait and adapters
//! - **context**: Per-principal context memory and preferences
//! - **ledger**: Append-only execution ledger
//! - **orchestrator**: Completion, chat, streaming, commands and training
//! - **session**: In-process session registry
//! - **db**: Direct SQLite database access
//! - **auth**: Service token and principal key material

pub mod auth;
pub mod backend;
pub mod context;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod session;
pub mod training;

// Re-export commonly used types
pub use db::Database;
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
