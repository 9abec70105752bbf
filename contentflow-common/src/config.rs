//! Settings loading
//!
//! Resolution priority (highest first):
//! 1. Command-line flags (applied by the binary after `load`)
//! 2. Environment variables (`CONTENTFLOW_*`, plus `DATABASE_URL`)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: the service starts with defaults and
//! logs a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "CONTENTFLOW_CONFIG";

/// Full service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub orchestrator: OrchestratorSettings,
    pub processing: ProcessingSettings,
    pub embedding_cache: EmbeddingCacheSettings,
    pub cors: CorsSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    /// "development", "staging", "production"
    pub environment: String,
    pub host: String,
    pub port: u16,
    /// Owner recorded on content until real authentication exists
    pub default_user_id: String,
    /// Accepted `Host` header values; `*.example.com` matches subdomains,
    /// `*` accepts any host
    pub allowed_hosts: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "ContentFlow".to_string(),
            environment: "development".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            default_user_id: "user_demo".to_string(),
            allowed_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "*.localhost".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// sqlx SQLite URL, e.g. `sqlite:///var/lib/contentflow/contentflow.db`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Base URL of the AI orchestration service. `None` disables processing.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Upper bound on each external extractor/generator call
    pub task_timeout_seconds: u64,
    pub enable_vector_deduplication: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            task_timeout_seconds: 300,
            enable_vector_deduplication: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingCacheSettings {
    pub max_entries: u32,
    pub ttl_seconds: u64,
}

impl Default for EmbeddingCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: 30 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsSettings {
    pub origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from TOML (if any) and apply environment overrides
    ///
    /// `explicit_path` comes from the command line; when given, the file must exist.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut settings = match resolve_config_path(explicit_path)? {
            Some(path) => {
                let settings = Self::from_file(&path)?;
                info!("Loaded configuration from {}", path.display());
                settings
            }
            None => {
                warn!("No configuration file found, using defaults");
                Self::default()
            }
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CONTENTFLOW_ENVIRONMENT") {
            self.app.environment = v;
        }
        if let Some(v) = lookup("CONTENTFLOW_HOST") {
            self.app.host = v;
        }
        if let Some(v) = lookup("CONTENTFLOW_PORT") {
            self.app.port = parse_value("CONTENTFLOW_PORT", &v)?;
        }
        // The project-specific name wins over the conventional one
        if let Some(v) = lookup("CONTENTFLOW_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.database.url = v;
        }
        if let Some(v) = lookup("CONTENTFLOW_ORCHESTRATOR_URL") {
            self.orchestrator.base_url = non_empty(v);
        }
        if let Some(v) = lookup("CONTENTFLOW_ORCHESTRATOR_API_KEY") {
            self.orchestrator.api_key = non_empty(v);
        }
        if let Some(v) = lookup("CONTENTFLOW_TASK_TIMEOUT_SECONDS") {
            self.processing.task_timeout_seconds =
                parse_value("CONTENTFLOW_TASK_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("CONTENTFLOW_ENABLE_VECTOR_DEDUPLICATION") {
            self.processing.enable_vector_deduplication =
                parse_value("CONTENTFLOW_ENABLE_VECTOR_DEDUPLICATION", &v)?;
        }
        if let Some(v) = lookup("CONTENTFLOW_ALLOWED_HOSTS") {
            self.app.allowed_hosts = split_list(&v);
        }
        if let Some(v) = lookup("CONTENTFLOW_CORS_ORIGINS") {
            self.cors.origins = split_list(&v);
        }
        if let Some(v) = lookup("CONTENTFLOW_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("CONTENTFLOW_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.processing.task_timeout_seconds == 0 {
            return Err(Error::Config(
                "processing.task_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.embedding_cache.max_entries == 0 {
            return Err(Error::Config(
                "embedding_cache.max_entries must be greater than zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.app.allowed_hosts.is_empty() {
            return Err(Error::Config(
                "app.allowed_hosts must list at least one host (use \"*\" to allow any)"
                    .to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(Error::Config(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        if !self.is_development() && self.orchestrator.base_url.is_none() {
            return Err(Error::Config(format!(
                "orchestrator.base_url is required in the {} environment \
                 (set CONTENTFLOW_ORCHESTRATOR_URL)",
                self.app.environment
            )));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }

    /// "host:port" for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}

/// Pick the config file: explicit path, then `CONTENTFLOW_CONFIG`, then the
/// platform config directory. Only the last one may be absent.
fn resolve_config_path(explicit_path: Option<&Path>) -> Result<Option<PathBuf>> {
    let required = explicit_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

    if let Some(path) = required {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    Ok(default_config_path().filter(|path| path.exists()))
}

/// `<config_dir>/contentflow/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("contentflow").join("config.toml"))
}

fn default_database_url() -> String {
    let data_dir = dirs::data_local_dir()
        .map(|d| d.join("contentflow"))
        .unwrap_or_else(|| PathBuf::from("./contentflow_data"));
    format!("sqlite://{}", data_dir.join("contentflow.db").display())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: \"{}\"", key, value)))
}

/// Comma-separated list, blanks dropped
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
