//! services/progress_api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use manga_progress_core::{SignOutPolicy, DEFAULT_HISTORY_CAPACITY};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Directory holding the device-local bookmark and history records.
    pub data_dir: PathBuf,
    pub history_capacity: usize,
    pub remote_timeout: Duration,
    pub catalog_base_url: String,
    pub sign_out_policy: SignOutPolicy,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url =
            var("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Local Ledger Settings ---
        let data_dir = var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let history_capacity = match var("HISTORY_CAPACITY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "HISTORY_CAPACITY".to_string(),
                        format!("'{}' is not a positive integer", raw),
                    ))
                }
            },
            None => DEFAULT_HISTORY_CAPACITY,
        };

        let sign_out_policy = match var("SIGN_OUT_POLICY").as_deref().map(str::to_lowercase) {
            None => SignOutPolicy::Retain,
            Some(policy) if policy == "retain" => SignOutPolicy::Retain,
            Some(policy) if policy == "clear" => SignOutPolicy::Clear,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "SIGN_OUT_POLICY".to_string(),
                    format!("'{}' is neither 'retain' nor 'clear'", other),
                ))
            }
        };

        // --- Remote Collaborators ---
        let remote_timeout_ms = var("REMOTE_TIMEOUT_MS")
            .map(|raw| {
                raw.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue("REMOTE_TIMEOUT_MS".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or(10_000);

        let catalog_base_url = var("CATALOG_BASE_URL")
            .unwrap_or_else(|| "https://api.mangadex.org".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            data_dir,
            history_capacity,
            remote_timeout: Duration::from_millis(remote_timeout_ms),
            catalog_base_url,
            sign_out_policy,
        })
    }
}
