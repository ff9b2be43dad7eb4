//! Server configuration
//!
//! Runtime settings come from the environment. The responder catalog and
//! announcement texts come from an optional JSON file layered over built-in
//! defaults.

use crate::turn::{Notices, ResponderRegistry};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),

    #[error("Unknown checkpoint backend '{0}' (expected 'sqlite' or 'memory')")]
    CheckpointBackend(String),
}

/// Where supervisor checkpoints are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointBackend {
    Sqlite,
    Memory,
}

impl CheckpointBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::CheckpointBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub supervisor_url: String,
    pub assistant_id: String,
    pub catalog_path: Option<PathBuf>,
    pub checkpoints: CheckpointBackend,
    pub app_secret: String,
    pub login_key: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = var("SWITCHBOARD_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.switchboard/chat.db"))
            },
            PathBuf::from,
        );

        let port = var("SWITCHBOARD_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let checkpoints = match var("SWITCHBOARD_CHECKPOINTS") {
            Some(value) => CheckpointBackend::parse(&value)?,
            None => CheckpointBackend::Sqlite,
        };

        let app_secret = var("APP_SECRET").unwrap_or_else(|| {
            tracing::warn!("APP_SECRET not set, using the insecure default");
            "change-me".to_string()
        });

        Ok(Self {
            db_path,
            port,
            upload_dir: var("SWITCHBOARD_UPLOAD_DIR").map_or_else(|| PathBuf::from("images"), PathBuf::from),
            supervisor_url: var("SWITCHBOARD_SUPERVISOR_URL")
                .unwrap_or_else(|| "http://127.0.0.1:2024".to_string()),
            assistant_id: var("SWITCHBOARD_ASSISTANT_ID").unwrap_or_else(|| "supervisor".to_string()),
            catalog_path: var("SWITCHBOARD_CATALOG").map(PathBuf::from),
            checkpoints,
            app_secret,
            login_key: var("SWITCHBOARD_LOGIN_KEY").unwrap_or_else(|| "open-sesame".to_string()),
        })
    }
}

/// Responder rules plus announcement texts
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    #[serde(flatten)]
    pub responders: ResponderRegistry,
    pub notices: Notices,
}

impl Catalog {
    /// Load a catalog file, or the built-in catalog when no path is given.
    /// Sections missing from the file keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&text)?;
        tracing::info!(
            path = %path.display(),
            responders = catalog.responders.responders.len(),
            "Loaded responder catalog"
        );
        Ok(catalog)
    }

    fn parse(text: &str) -> Result<Self, ConfigError> {
        let catalog: Self = serde_json::from_str(text)?;
        catalog.responders.validate().map_err(ConfigError::Invalid)?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("HOME", "/home/alice")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/home/alice/.switchboard/chat.db"));
        assert_eq!(config.port, 8000);
        assert_eq!(config.upload_dir, PathBuf::from("images"));
        assert_eq!(config.supervisor_url, "http://127.0.0.1:2024");
        assert_eq!(config.assistant_id, "supervisor");
        assert_eq!(config.catalog_path, None);
        assert_eq!(config.checkpoints, CheckpointBackend::Sqlite);
        assert_eq!(config.app_secret, "change-me");
        assert_eq!(config.login_key, "open-sesame");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SWITCHBOARD_DB_PATH", "/data/chat.db"),
            ("SWITCHBOARD_PORT", "9001"),
            ("SWITCHBOARD_CHECKPOINTS", "Memory"),
            ("SWITCHBOARD_CATALOG", "/etc/catalog.json"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/chat.db"));
        assert_eq!(config.port, 9001);
        assert_eq!(config.checkpoints, CheckpointBackend::Memory);
        assert_eq!(config.catalog_path, Some(PathBuf::from("/etc/catalog.json")));
    }

    #[test]
    fn test_bad_port_falls_back() {
        let config = ServerConfig::from_lookup(lookup(&[("SWITCHBOARD_PORT", "eighty")])).unwrap();
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_unknown_checkpoint_backend() {
        let result = ServerConfig::from_lookup(lookup(&[("SWITCHBOARD_CHECKPOINTS", "redis")]));
        assert!(matches!(result, Err(ConfigError::CheckpointBackend(_))));
    }

    #[test]
    fn test_catalog_partial_override() {
        let catalog = Catalog::parse(
            r#"{
                "responders": [{
                    "id": "math",
                    "fragment": "calculator",
                    "display_name": "Math Agent",
                    "handoff_notice": "Handing off to math...",
                    "working_notice": "Crunching numbers..."
                }],
                "notices": {"opening": "Thinking..."}
            }"#,
        )
        .unwrap();

        assert_eq!(catalog.responders.responders.len(), 1);
        assert_eq!(catalog.responders.supervisor.display_name, "Supervisor");
        assert_eq!(catalog.notices.opening, "Thinking...");
        assert_eq!(catalog.notices.preparing, Notices::default().preparing);
    }

    #[test]
    fn test_catalog_rejects_empty_fragment() {
        let result = Catalog::parse(
            r#"{"responders": [{"id": "x", "fragment": "", "display_name": "X",
                "handoff_notice": "", "working_notice": ""}]}"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_catalog_load_without_path() {
        let catalog = Catalog::load(None).unwrap();
        assert_eq!(catalog.responders.responders.len(), 3);
    }
}
