//! Application configuration
//!
//! Loaded from a TOML file (`~/.config/user-service/config.toml` by default).
//! Every setting has a default except the secrets, which must come from the
//! file or the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::database::{DatabaseConfig, DEFAULT_DATABASE_URL};

pub const CONFIG_PATH_ENV: &str = "USER_SERVICE_CONFIG";

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_INTERNAL_SECRET: &str = "USERS_INTERNAL_SECRET";
const ENV_JWKS_URI: &str = "USERS_AUTH_JWKS_URI";
const ENV_ISSUER: &str = "USERS_AUTH_ISSUER";
const ENV_AUDIENCE: &str = "USERS_AUTH_AUDIENCE";

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// `~/.config/user-service/config.toml`, or `./config.toml` when no config
/// directory is known.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("user-service").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub internal: InternalSection,
    pub security: SecuritySection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Serve Swagger UI at `/docs`
    pub docs_enabled: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            docs_enabled: false,
        }
    }
}

impl ServerSection {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
            query_timeout_secs: 5,
        }
    }
}

impl From<&DatabaseSection> for DatabaseConfig {
    fn from(section: &DatabaseSection) -> Self {
        Self {
            url: section.url.clone(),
            max_connections: section.max_connections,
            connect_timeout: Duration::from_secs(section.connect_timeout_secs),
            query_timeout: Duration::from_secs(section.query_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// `https://` key set endpoint or a `file://` path to a JWKS document
    pub jwks_uri: String,
    pub issuer: String,
    pub audience: String,
    pub clock_skew_secs: u64,
    pub jwks_cache_ttl_secs: u64,
    pub jwks_min_refresh_secs: u64,
    pub jwks_fetch_timeout_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwks_uri: String::new(),
            issuer: String::new(),
            audience: "users-api".to_string(),
            clock_skew_secs: 30,
            jwks_cache_ttl_secs: 300,
            jwks_min_refresh_secs: 10,
            jwks_fetch_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalSection {
    pub shared_secret: String,
}

impl std::fmt::Debug for InternalSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalSection")
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub bcrypt_cost: u32,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Read and parse the file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay non-empty values from `lookup` (normally the process environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_DATABASE_URL) {
            self.database.url = url;
        }
        if let Some(secret) = get(ENV_INTERNAL_SECRET) {
            self.internal.shared_secret = secret;
        }
        if let Some(uri) = get(ENV_JWKS_URI) {
            self.auth.jwks_uri = uri;
        }
        if let Some(issuer) = get(ENV_ISSUER) {
            self.auth.issuer = issuer;
        }
        if let Some(audience) = get(ENV_AUDIENCE) {
            self.auth.audience = audience;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.internal.shared_secret.trim().is_empty() {
            return Err(ConfigError::Missing("internal.shared_secret"));
        }
        if self.auth.jwks_uri.trim().is_empty() {
            return Err(ConfigError::Missing("auth.jwks_uri"));
        }
        if self.auth.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("auth.issuer"));
        }
        if self.auth.audience.trim().is_empty() {
            return Err(ConfigError::Missing("auth.audience"));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                key: "server.port",
                reason: "cannot be 0".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "database.max_connections",
                reason: "cannot be 0".to_string(),
            });
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "security.bcrypt_cost",
                reason: format!(
                    "must be between {} and {}",
                    MIN_BCRYPT_COST,
                    MAX_BCRYPT_COST
                ),
            });
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid {
                key: "logging.level",
                reason: format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}
