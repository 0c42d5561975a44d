//! Process configuration.
//!
//! Defaults, then an optional JSON file (`GATEHOUSE_CONFIG`), then individual
//! `GATEHOUSE_*` environment variables. Later sources win.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_auth::SecretHasher;

pub const ENV_PREFIX: &str = "GATEHOUSE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {message}")]
    InvalidVar { var: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Echo verification codes and log at debug level.
    pub debug: bool,
    /// Name of a user placed in the "Site Owner" group at startup.
    pub owner: Option<String>,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub hashing: HashingConfig,
    pub codes: CodesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Empty means "use the in-memory store".
    pub url: String,
    pub name: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: "gatehouse".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: SecretHasher::DEFAULT_MEMORY_KIB,
            iterations: SecretHasher::DEFAULT_ITERATIONS,
            parallelism: SecretHasher::DEFAULT_PARALLELISM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodesConfig {
    pub ttl_secs: u64,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let mut config = match var("CONFIG") {
            Some(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => Self::default(),
        };

        if let Some(v) = var("DEBUG") {
            config.debug = parse_bool("DEBUG", &v)?;
        }
        if let Some(v) = var("OWNER") {
            config.owner = Some(v.trim().to_string()).filter(|name| !name.is_empty());
        }
        if let Some(v) = var("BIND") {
            config.server.bind = v;
        }
        if let Some(v) = var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Some(v) = var("DATABASE_NAME") {
            config.database.name = v;
        }
        if let Some(v) = var("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = parse_num("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            config.database.acquire_timeout_secs = parse_num("DATABASE_ACQUIRE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("HASH_MEMORY_KIB") {
            config.hashing.memory_kib = parse_num("HASH_MEMORY_KIB", &v)?;
        }
        if let Some(v) = var("HASH_ITERATIONS") {
            config.hashing.iterations = parse_num("HASH_ITERATIONS", &v)?;
        }
        if let Some(v) = var("HASH_PARALLELISM") {
            config.hashing.parallelism = parse_num("HASH_PARALLELISM", &v)?;
        }
        if let Some(v) = var("CODE_TTL_SECS") {
            config.codes.ttl_secs = parse_num("CODE_TTL_SECS", &v)?;
        }

        Ok(config)
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidVar {
            var: format!("{ENV_PREFIX}{name}"),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_num<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        var: format!("{ENV_PREFIX}{name}"),
        message: e.to_string(),
    })
}
