use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::sql::Backend;

use super::constants::{
    DEFAULT_FIND_LIMIT, DEFAULT_STREAM_BUFFER, ENV_CONFIG, ENV_DATABASE_BACKEND, ENV_DATABASE_URL,
    ENV_DEFAULT_LIMIT, ENV_STREAM_BUFFER, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS, POSTGRES_DEFAULT_MAX_CONNECTIONS,
    POSTGRES_DEFAULT_MAX_LIFETIME_SECS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS, SQLITE_BUSY_TIMEOUT_SECS, SQLITE_DEFAULT_URL,
    SQLITE_MAX_CONNECTIONS,
};

// =============================================================================
// File Configuration (all optional, as read from JSON)
// =============================================================================

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// Backend: sqlite (default) or postgres
    pub backend: Option<Backend>,
    /// Connection URL (or use QUERYDECK_DATABASE_URL env var)
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: Option<u32>,
    /// Minimum number of connections to keep warm (postgres only)
    pub min_connections: Option<u32>,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: Option<u64>,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: Option<u64>,
    /// Max connection lifetime in seconds
    pub max_lifetime_secs: Option<u64>,
    /// Statement timeout in seconds, 0 to disable (postgres only)
    pub statement_timeout_secs: Option<u64>,
    /// Busy timeout in seconds (sqlite only)
    pub busy_timeout_secs: Option<u64>,
    /// Rows returned by `find` when the caller gives no limit (default: 100)
    pub default_limit: Option<u32>,
    /// Rows buffered by `find_stream` before the cursor is paused (default: 64)
    pub stream_buffer: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl DatabaseFileConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        config.warn_unknown_fields();
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Connection pool sizing and timeouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// 0 = disabled
    pub statement_timeout_secs: u64,
    pub busy_timeout_secs: u64,
}

impl PoolConfig {
    fn defaults_for(backend: Backend) -> Self {
        match backend {
            Backend::Sqlite => Self {
                max_connections: SQLITE_MAX_CONNECTIONS,
                min_connections: 0,
                acquire_timeout_secs: POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
                idle_timeout_secs: POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
                max_lifetime_secs: POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
                statement_timeout_secs: 0,
                busy_timeout_secs: SQLITE_BUSY_TIMEOUT_SECS,
            },
            Backend::Postgres => Self {
                max_connections: POSTGRES_DEFAULT_MAX_CONNECTIONS,
                min_connections: POSTGRES_DEFAULT_MIN_CONNECTIONS,
                acquire_timeout_secs: POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
                idle_timeout_secs: POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
                max_lifetime_secs: POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
                statement_timeout_secs: POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
                busy_timeout_secs: 0,
            },
        }
    }
}

/// Per-call query defaults shared by every repository on a database handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySettings {
    pub default_limit: u32,
    pub stream_buffer: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_FIND_LIMIT,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

/// Database configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: Backend,
    pub url: String,
    pub pool: PoolConfig,
    pub query: QuerySettings,
}

impl DatabaseConfig {
    /// Single-connection in-memory SQLite database
    ///
    /// One connection keeps every query on the same in-memory database.
    pub fn sqlite_memory() -> Self {
        let mut pool = PoolConfig::defaults_for(Backend::Sqlite);
        pool.max_connections = 1;
        Self {
            backend: Backend::Sqlite,
            url: SQLITE_DEFAULT_URL.to_string(),
            pool,
            query: QuerySettings::default(),
        }
    }

    /// Load configuration
    ///
    /// Precedence (lowest to highest):
    /// 1. Built-in defaults per backend
    /// 2. JSON config file (explicit path, or QUERYDECK_CONFIG)
    /// 3. Environment variables (after loading `.env`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::trace!(error = %e, "No .env file loaded");
        }

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));

        let file_config = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                DatabaseFileConfig::load_from_file(&path)?
            }
            None => DatabaseFileConfig::default(),
        };

        Self::resolve(file_config, |key| std::env::var(key).ok())
    }

    /// Layer environment overrides over a file config and fill in defaults
    pub fn resolve<F>(file: DatabaseFileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match env(ENV_DATABASE_BACKEND) {
            Some(raw) => raw
                .parse::<Backend>()
                .map_err(|e| anyhow::anyhow!("Invalid {}: {}", ENV_DATABASE_BACKEND, e))?,
            None => file.backend.unwrap_or_default(),
        };

        let url = env(ENV_DATABASE_URL).or(file.url).unwrap_or_default();
        let url = match (backend, url.is_empty()) {
            (Backend::Sqlite, true) => SQLITE_DEFAULT_URL.to_string(),
            (Backend::Postgres, true) => {
                anyhow::bail!("PostgreSQL URL is required (set {})", ENV_DATABASE_URL)
            }
            (_, false) => url,
        };

        let defaults = PoolConfig::defaults_for(backend);
        let pool = PoolConfig {
            max_connections: file.max_connections.unwrap_or(defaults.max_connections),
            min_connections: file.min_connections.unwrap_or(defaults.min_connections),
            acquire_timeout_secs: file
                .acquire_timeout_secs
                .unwrap_or(defaults.acquire_timeout_secs),
            idle_timeout_secs: file.idle_timeout_secs.unwrap_or(defaults.idle_timeout_secs),
            max_lifetime_secs: file.max_lifetime_secs.unwrap_or(defaults.max_lifetime_secs),
            statement_timeout_secs: file
                .statement_timeout_secs
                .unwrap_or(defaults.statement_timeout_secs),
            busy_timeout_secs: file.busy_timeout_secs.unwrap_or(defaults.busy_timeout_secs),
        };

        let default_limit = match env(ENV_DEFAULT_LIMIT) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_DEFAULT_LIMIT, raw))?,
            None => file.default_limit.unwrap_or(DEFAULT_FIND_LIMIT),
        };
        let stream_buffer = match env(ENV_STREAM_BUFFER) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_STREAM_BUFFER, raw))?,
            None => file.stream_buffer.unwrap_or(DEFAULT_STREAM_BUFFER),
        };
        if stream_buffer == 0 {
            anyhow::bail!("stream_buffer must be greater than zero");
        }

        let config = Self {
            backend,
            url,
            pool,
            query: QuerySettings {
                default_limit,
                stream_buffer,
            },
        };
        tracing::debug!(backend = %config.backend, pool = ?config.pool, "Database config resolved");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_resolve_defaults_to_sqlite_memory() {
        let config = DatabaseConfig::resolve(DatabaseFileConfig::default(), no_env).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.url, SQLITE_DEFAULT_URL);
        assert_eq!(config.pool.max_connections, SQLITE_MAX_CONNECTIONS);
        assert_eq!(config.query.default_limit, 100);
        assert_eq!(config.query.stream_buffer, 64);
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "backend": "postgres",
            "url": "postgres://localhost/app",
            "max_connections": 8,
            "default_limit": 25
        }"#;
        let file: DatabaseFileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(file.backend, Some(Backend::Postgres));

        let config = DatabaseConfig::resolve(file, no_env).unwrap();
        assert_eq!(config.url, "postgres://localhost/app");
        assert_eq!(config.pool.max_connections, 8);
        assert_eq!(config.pool.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.query.default_limit, 25);
    }

    #[test]
    fn test_postgres_requires_url() {
        let file = DatabaseFileConfig {
            backend: Some(Backend::Postgres),
            ..Default::default()
        };
        assert!(DatabaseConfig::resolve(file, no_env).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_URL, "sqlite://override.db"),
            (ENV_DEFAULT_LIMIT, "10"),
            (ENV_STREAM_BUFFER, "4"),
        ]);
        let file = DatabaseFileConfig {
            url: Some("sqlite://file.db".to_string()),
            default_limit: Some(50),
            ..Default::default()
        };
        let config =
            DatabaseConfig::resolve(file, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.url, "sqlite://override.db");
        assert_eq!(config.query.default_limit, 10);
        assert_eq!(config.query.stream_buffer, 4);
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        let bad_backend = DatabaseConfig::resolve(DatabaseFileConfig::default(), |k| {
            (k == ENV_DATABASE_BACKEND).then(|| "mysql".to_string())
        });
        assert!(bad_backend.is_err());

        let zero_buffer = DatabaseConfig::resolve(DatabaseFileConfig::default(), |k| {
            (k == ENV_STREAM_BUFFER).then(|| "0".to_string())
        });
        assert!(zero_buffer.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"backend": "sqlite", "stream_buffer": 16, "typo_field": 1}}"#).unwrap();

        let loaded = DatabaseFileConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.stream_buffer, Some(16));
        assert!(loaded.extra.get("typo_field").is_some());
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = DatabaseFileConfig::load_from_file(Path::new("/nonexistent/querydeck.json"));
        assert!(result.is_err());
    }
}
