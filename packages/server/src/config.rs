//! Server configuration from environment variables
//!
//! - `KBASE_SERVER_PORT`: Server port (default: 3001)
//! - `KBASE_BIND_ADDR`: Bind address (default: 127.0.0.1)
//! - `KBASE_ROOT_NAME`: Display name of new root collections
//! - `KBASE_DB_PATH`: Database path (default: ~/.kbase/database/graph.db),
//!   `surrealdb` feature only

use kbase_core::ServiceConfig;
use std::env;
#[cfg(feature = "surrealdb")]
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("Failed to get home directory")]
    HomeDirUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_addr: String,
    pub service: ServiceConfig,
    #[cfg(feature = "surrealdb")]
    pub db_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("KBASE_SERVER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                var: "KBASE_SERVER_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let mut service = ServiceConfig::default();
        if let Some(name) = lookup("KBASE_ROOT_NAME").filter(|n| !n.trim().is_empty()) {
            service.root_collection_name = name.trim().to_string();
        }

        Ok(Self {
            port,
            bind_addr: lookup("KBASE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            service,
            #[cfg(feature = "surrealdb")]
            db_path: match lookup("KBASE_DB_PATH") {
                Some(path) => PathBuf::from(path),
                None => dirs::home_dir()
                    .ok_or(ConfigError::HomeDirUnavailable)?
                    .join(".kbase")
                    .join("database")
                    .join("graph.db"),
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
