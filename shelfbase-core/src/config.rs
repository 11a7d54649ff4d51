// shelfbase-core/src/config.rs
//! Connection configuration
//!
//! Resolution order, later wins: built-in defaults, TOML file, environment,
//! explicit overrides (CLI flags).
//!
//! ```toml
//! endpoint = "/var/lib/shelfbase"
//! database = "plp_bookstore"
//! collection = "books"
//! ```

use crate::error::{Result, ShelfError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "shelfbase.toml";
pub const CONFIG_PATH_ENV: &str = "SHELFBASE_CONFIG";
pub const ENDPOINT_ENV: &str = "SHELFBASE_ENDPOINT";
pub const DATABASE_ENV: &str = "SHELFBASE_DATABASE";
pub const COLLECTION_ENV: &str = "SHELFBASE_COLLECTION";

/// Where the store lives and which collection the reports read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// `memory:`, a directory path, or `file://<dir>`
    pub endpoint: String,
    pub database: String,
    pub collection: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            endpoint: "memory:".to_string(),
            database: "plp_bookstore".to_string(),
            collection: "books".to_string(),
        }
    }
}

/// Parsed endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Memory,
    Directory(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Memory => f.write_str("memory:"),
            Endpoint::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Explicit values that beat every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
}

impl ConnectionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShelfError::Config(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Full resolution against the process environment.
    ///
    /// An explicit `config_path` must exist; the default file is optional.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::load_with(config_path, overrides, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with an injectable environment lookup
    pub fn load_with<F>(
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = config_path
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                debug!(path = DEFAULT_CONFIG_FILE, "loading default config file");
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        if let Some(endpoint) = env(ENDPOINT_ENV) {
            config.endpoint = endpoint;
        }
        if let Some(database) = env(DATABASE_ENV) {
            config.database = database;
        }
        if let Some(collection) = env(COLLECTION_ENV) {
            config.collection = collection;
        }

        config = config.with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(ref endpoint) = overrides.endpoint {
            self.endpoint = endpoint.clone();
        }
        if let Some(ref database) = overrides.database {
            self.database = database.clone();
        }
        if let Some(ref collection) = overrides.collection {
            self.collection = collection.clone();
        }
        self
    }

    /// Names follow the document-database naming rules
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ShelfError::Config("endpoint cannot be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(ShelfError::Config("database name cannot be empty".to_string()));
        }
        const INVALID: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?'];
        if let Some(c) = self.database.chars().find(|c| INVALID.contains(c)) {
            return Err(ShelfError::Config(format!(
                "database name '{}' contains invalid character '{}'",
                self.database, c
            )));
        }
        if self.collection.is_empty() {
            return Err(ShelfError::Config("collection name cannot be empty".to_string()));
        }
        if self.collection.contains('$') || self.collection.starts_with("system.") {
            return Err(ShelfError::Config(format!(
                "collection name '{}' is reserved or invalid",
                self.collection
            )));
        }
        Ok(())
    }

    /// Parse the endpoint. Remote URIs are refused as connection failures.
    pub fn endpoint(&self) -> Result<Endpoint> {
        let raw = self.endpoint.trim();
        if raw == "memory:" {
            return Ok(Endpoint::Memory);
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(Endpoint::Directory(PathBuf::from(path)));
        }
        if raw.contains("://") {
            warn!(endpoint = %self.redacted_endpoint(), "unsupported endpoint scheme");
            return Err(ShelfError::Connection(format!(
                "unsupported endpoint '{}': expected memory: or a directory",
                self.redacted_endpoint()
            )));
        }
        Ok(Endpoint::Directory(PathBuf::from(raw)))
    }

    /// Endpoint with any `user:password@` part masked, safe for logs
    pub fn redacted_endpoint(&self) -> String {
        let raw = self.endpoint.trim();
        let Some((scheme, rest)) = raw.split_once("://") else {
            return raw.to_string();
        };
        let authority_end = rest.find('/').unwrap_or(rest.len());
        match rest[..authority_end].rfind('@') {
            Some(at) => format!("{}://***@{}", scheme, &rest[at + 1..]),
            None => raw.to_string(),
        }
    }
}
