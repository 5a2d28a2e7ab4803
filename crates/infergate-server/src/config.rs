//! Server configuration.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (INFERGATE_*)
//! 2. Config file ($INFERGATE_DIR/config.toml)
//! 3. Default values
//!
//! Standard directory structure:
//! ```text
//! ~/.infergate/
//! ├── config.toml           # Main configuration
//! ├── infergate.db          # Context memory, ledger, principal tokens
//! └── service-token         # Service token (0600)
//! ```

use anyhow::{Context, Result};
use infergate_core::EngineConfig;
use infergate_core::backend::{EchoBackend, GenerationBackend, OpenAiCompatibleBackend};
use infergate_core::ledger::CommandIdScheme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for gateway state
    #[serde(skip)]
    pub base_dir: PathBuf,

    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Whether `config_path` existed at load time
    #[serde(skip)]
    pub from_file: bool,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP address the HTTP API binds to
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path; defaults to `<base_dir>/infergate.db`
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_bootstrap_principal")]
    pub bootstrap_principal: String,

    #[serde(default)]
    pub command_ids: CommandIdScheme,

    /// Pause between streamed chunks
    #[serde(default = "default_stream_delay_ms")]
    pub stream_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Echo,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

// Default value functions
fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_bootstrap_principal() -> String {
    EngineConfig::default().bootstrap_principal
}

fn default_stream_delay_ms() -> u64 {
    10
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/v1".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_context_window() -> usize {
    4096
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".infergate")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            bootstrap_principal: default_bootstrap_principal(),
            command_ids: CommandIdScheme::default(),
            stream_delay_ms: default_stream_delay_ms(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            context_window: default_context_window(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment and config file
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_dir = env("INFERGATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_base_dir);
        std::fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create {}", base_dir.display()))?;

        let config_path = base_dir.join("config.toml");
        let from_file = config_path.exists();
        let mut config: Config = if from_file {
            let content = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.base_dir = base_dir;
        config.config_path = config_path;
        config.from_file = from_file;
        config.apply_env(env)?;
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(listen) = env("INFERGATE_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(path) = env("INFERGATE_DATABASE") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Some(principal) = env("INFERGATE_BOOTSTRAP_PRINCIPAL") {
            self.engine.bootstrap_principal = principal;
        }
        if let Some(scheme) = env("INFERGATE_COMMAND_IDS") {
            self.engine.command_ids = parse_enum(&scheme).context("Invalid INFERGATE_COMMAND_IDS")?;
        }
        if let Some(delay) = env("INFERGATE_STREAM_DELAY_MS") {
            self.engine.stream_delay_ms = delay.parse().context("Invalid INFERGATE_STREAM_DELAY_MS")?;
        }
        if let Some(kind) = env("INFERGATE_BACKEND") {
            self.backend.kind = parse_enum(&kind).context("Invalid INFERGATE_BACKEND")?;
        }
        if let Some(url) = env("INFERGATE_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(model) = env("INFERGATE_MODEL") {
            self.backend.model = model;
        }
        if let Some(key) = env("INFERGATE_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(timeout) = env("INFERGATE_TIMEOUT_SECS") {
            self.backend.timeout_secs = timeout.parse().context("Invalid INFERGATE_TIMEOUT_SECS")?;
        }
        if let Some(window) = env("INFERGATE_CONTEXT_WINDOW") {
            self.backend.context_window = window.parse().context("Invalid INFERGATE_CONTEXT_WINDOW")?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("infergate.db"))
    }

    pub fn service_token_file(&self) -> PathBuf {
        self.base_dir.join("service-token")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            bootstrap_principal: self.engine.bootstrap_principal.clone(),
            command_ids: self.engine.command_ids,
        }
    }

    pub fn config_source(&self) -> &Path {
        if self.from_file {
            &self.config_path
        } else {
            Path::new("defaults")
        }
    }
}

impl BackendConfig {
    /// Instantiate the configured backend
    pub fn build(&self) -> Result<Arc<dyn GenerationBackend>> {
        Ok(match self.kind {
            BackendKind::Echo => Arc::new(EchoBackend::new(self.context_window)),
            BackendKind::Openai => Arc::new(
                OpenAiCompatibleBackend::new(
                    &self.base_url,
                    &self.model,
                    self.api_key.clone(),
                    self.timeout_secs,
                    self.context_window,
                )
                .context("Failed to create OpenAI-compatible backend")?,
            ),
        })
    }
}

/// Parse a snake_case enum value the way the config file spells it
fn parse_enum<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(value.to_string()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_with(lookup(&[("INFERGATE_DIR", dir.path().to_str().unwrap())])).unwrap();

        assert!(!config.from_file);
        assert_eq!(config.server.listen, "127.0.0.1:8000");
        assert_eq!(config.engine.bootstrap_principal, "owner");
        assert_eq!(config.engine.command_ids, CommandIdScheme::ContentHash);
        assert_eq!(config.engine.stream_delay_ms, 10);
        assert_eq!(config.backend.kind, BackendKind::Echo);
        assert_eq!(config.database_path(), dir.path().join("infergate.db"));
        assert_eq!(config.service_token_file(), dir.path().join("service-token"));
    }

    #[test]
    fn test_file_values_are_read() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
[server]
listen = "0.0.0.0:9000"

[engine]
command_ids = "random"

[backend]
kind = "openai"
model = "llama-3"
context_window = 8192
"#,
        )
        .unwrap();

        let config = Config::load_with(lookup(&[("INFERGATE_DIR", dir.path().to_str().unwrap())])).unwrap();
        assert!(config.from_file);
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.engine.command_ids, CommandIdScheme::Random);
        // Unset keys in a present section keep their defaults
        assert_eq!(config.engine.stream_delay_ms, 10);
        assert_eq!(config.backend.kind, BackendKind::Openai);
        assert_eq!(config.backend.model, "llama-3");
        assert_eq!(config.backend.context_window, 8192);
        assert_eq!(config.backend.timeout_secs, 120);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[server]\nlisten = \"0.0.0.0:9000\"\n",
        )
        .unwrap();

        let config = Config::load_with(lookup(&[
            ("INFERGATE_DIR", dir.path().to_str().unwrap()),
            ("INFERGATE_LISTEN", "127.0.0.1:9100"),
            ("INFERGATE_DATABASE", "/tmp/other.db"),
            ("INFERGATE_COMMAND_IDS", "random"),
            ("INFERGATE_STREAM_DELAY_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:9100");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/other.db"));
        assert_eq!(config.engine.command_ids, CommandIdScheme::Random);
        assert_eq!(config.engine.stream_delay_ms, 0);
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        let dir = tempdir().unwrap();
        let result = Config::load_with(lookup(&[
            ("INFERGATE_DIR", dir.path().to_str().unwrap()),
            ("INFERGATE_BACKEND", "mystery"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_with_custom_dir() {
        let temp_dir = tempdir().unwrap();
        let custom_path = temp_dir.path().join("state");

        // Save current value to restore later
        let old_val = env::var("INFERGATE_DIR").ok();
        // SAFETY: This test runs in isolation and we restore the env var afterward
        unsafe { env::set_var("INFERGATE_DIR", &custom_path) };

        let config = Config::load().unwrap();

        // Should use and create the custom directory
        assert!(custom_path.exists());
        assert!(config.config_path.starts_with(&custom_path));
        assert!(config.database_path().starts_with(&custom_path));

        // SAFETY: Restoring environment to previous state
        unsafe {
            if let Some(val) = old_val {
                env::set_var("INFERGATE_DIR", val);
            } else {
                env::remove_var("INFERGATE_DIR");
            }
        }
    }

    #[test]
    fn test_echo_backend_builds() {
        let backend = BackendConfig::default().build().unwrap();
        assert_eq!(backend.context_window(), 4096);
    }
}
