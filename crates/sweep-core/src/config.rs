//! Sweep Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use crate::{CredentialStore, Credentials, Ontology};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Triple store endpoints
    pub store: StoreConfig,

    /// Ontology term mapping
    pub ontology: Ontology,

    /// Cascade deletion limits
    pub cascade: CascadeConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Credentials for remote endpoints
    pub credentials: Vec<CredentialEntry>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store
        if let Ok(url) = std::env::var("SWEEP_ENDPOINT") {
            config.store.endpoints = vec![EndpointConfig::new("default", url)];
        }
        if let Ok(secs) = std::env::var("SWEEP_TIMEOUT_SECS") {
            config.store.timeout_secs = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SWEEP_TIMEOUT_SECS".to_string(),
                value: secs,
            })?;
        }
        if let Ok(mode) = std::env::var("SWEEP_GRAPH_MODE") {
            config.store.graph_mode = mode.parse()?;
        }

        // Cascade
        if let Ok(depth) = std::env::var("SWEEP_MAX_DEPTH") {
            config.cascade.max_depth = depth.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SWEEP_MAX_DEPTH".to_string(),
                value: depth,
            })?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.store.endpoints != defaults.store.endpoints {
            self.store.endpoints = env_config.store.endpoints;
        }
        if env_config.store.timeout_secs != defaults.store.timeout_secs {
            self.store.timeout_secs = env_config.store.timeout_secs;
        }
        if env_config.store.graph_mode != defaults.store.graph_mode {
            self.store.graph_mode = env_config.store.graph_mode;
        }
        if env_config.cascade.max_depth != defaults.cascade.max_depth {
            self.cascade.max_depth = env_config.cascade.max_depth;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }

        Ok(self)
    }

    /// Fail unless at least one endpoint is configured
    pub fn require_endpoints(&self) -> Result<(), ConfigError> {
        if self.store.endpoints.is_empty() {
            return Err(ConfigError::MissingRequired(
                "store.endpoints (or SWEEP_ENDPOINT)".to_string(),
            ));
        }
        Ok(())
    }

    /// Credential lookup backed by the configured entries
    pub fn credential_store(&self) -> StaticCredentials {
        StaticCredentials::new(self.credentials.clone())
    }
}

/// Triple store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Endpoints in registration order
    pub endpoints: Vec<EndpointConfig>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// How delete statements address graphs
    pub graph_mode: GraphMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_secs: 120,
            graph_mode: GraphMode::UnionDefault,
        }
    }
}

/// One SPARQL protocol endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Name used in logs and outcome reports
    pub name: String,

    /// Query service URL
    pub query_url: String,

    /// Update service URL; defaults to the query URL
    #[serde(default)]
    pub update_url: Option<String>,

    /// Whether the endpoint accepts direct queries and updates
    #[serde(default = "default_direct")]
    pub direct: bool,
}

fn default_direct() -> bool {
    true
}

impl EndpointConfig {
    /// Endpoint serving queries and updates from one URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_url: url.into(),
            update_url: None,
            direct: true,
        }
    }

    /// URL update statements are posted to
    pub fn update_url(&self) -> &str {
        self.update_url.as_deref().unwrap_or(&self.query_url)
    }
}

/// Graph addressing of delete statements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphMode {
    /// The store's default graph is the union of all named graphs
    #[default]
    UnionDefault,
    /// Named graphs must be addressed explicitly
    Quads,
}

impl std::str::FromStr for GraphMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "union_default" | "union" => Ok(Self::UnionDefault),
            "quads" => Ok(Self::Quads),
            _ => Err(ConfigError::InvalidValue {
                key: "SWEEP_GRAPH_MODE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Cascade deletion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Maximum number of reference hops followed from the confirmed roots
    pub max_depth: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Credentials for one remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub host: String,
    pub user: String,
    pub password: String,
}

/// Credential lookup over a fixed list of entries
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: Vec<CredentialEntry>,
}

impl StaticCredentials {
    pub fn new(entries: Vec<CredentialEntry>) -> Self {
        Self { entries }
    }
}

impl CredentialStore for StaticCredentials {
    fn credentials(&self, host: &str) -> Option<Credentials> {
        self.entries
            .iter()
            .find(|entry| entry.host.eq_ignore_ascii_case(host))
            .map(|entry| Credentials {
                user: entry.user.clone(),
                password: entry.password.clone(),
            })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OntologyKey;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.timeout_secs, 120);
        assert_eq!(config.cascade.max_depth, 64);
        assert_eq!(config.store.graph_mode, GraphMode::UnionDefault);
        assert!(config.store.endpoints.is_empty());
        assert!(matches!(
            config.require_endpoints(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_graph_mode_parse() {
        assert_eq!("quads".parse::<GraphMode>().unwrap(), GraphMode::Quads);
        assert_eq!(
            "UNION_DEFAULT".parse::<GraphMode>().unwrap(),
            GraphMode::UnionDefault
        );
        assert!("triples".parse::<GraphMode>().is_err());
    }

    #[test]
    fn test_parse_full_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [store]
            timeout_secs = 30
            graph_mode = "quads"

            [[store.endpoints]]
            name = "local"
            query_url = "http://localhost:9999/sparql"

            [[store.endpoints]]
            name = "archive"
            query_url = "http://archive/sparql"
            update_url = "http://archive/update"
            direct = false

            [ontology]
            copy_of = "http://ex.org/copy_of"

            [cascade]
            max_depth = 8

            [[credentials]]
            host = "archive"
            user = "admin"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.timeout_secs, 30);
        assert_eq!(config.store.graph_mode, GraphMode::Quads);
        assert_eq!(config.store.endpoints.len(), 2);
        assert!(config.store.endpoints[0].direct);
        assert_eq!(
            config.store.endpoints[0].update_url(),
            "http://localhost:9999/sparql"
        );
        assert!(!config.store.endpoints[1].direct);
        assert_eq!(config.store.endpoints[1].update_url(), "http://archive/update");
        assert_eq!(config.cascade.max_depth, 8);
        assert!(config.ontology.get(OntologyKey::CopyOf).is_ok());
        assert_eq!(config.logging.level, "info");

        let creds = config.credential_store();
        assert_eq!(creds.credentials("ARCHIVE").unwrap().user, "admin");
        assert!(creds.credentials("elsewhere").is_none());
    }

    #[test]
    fn test_sample_config_is_complete() {
        let config: AppConfig =
            toml::from_str(include_str!("../../../config/sweep.toml")).unwrap();
        assert!(config.ontology.missing_keys().is_empty());
        assert_eq!(
            config.ontology.get(OntologyKey::CopyOf).unwrap().as_str(),
            "<http://wisski.unify/ontology/P01_copy_of>"
        );
        assert_eq!(config.store.endpoints.len(), 2);
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = AppConfig::from_file("/nonexistent/sweep.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
