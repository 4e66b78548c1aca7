//! Application configuration management.
//!
//! Values come from `config/default.toml`, `config/{RUN_MODE}.toml` and
//! `STOWAGE__`-prefixed environment variables, in increasing priority.
//! Sections owned by other crates (such as `drive`) are read through
//! [`load_section`] so this crate does not depend on their types.

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body, in bytes (multipart uploads included).
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    20 * 1024 * 1024
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Builds the layered configuration source.
///
/// # Errors
///
/// Returns an error if a present config file cannot be parsed.
pub fn source() -> Result<config::Config, config::ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

    config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
        .add_source(config::Environment::with_prefix("STOWAGE").separator("__"))
        .build()
}

/// Deserializes one top-level section of the configuration.
///
/// # Errors
///
/// Returns an error if the section is missing or malformed.
pub fn load_section<T: DeserializeOwned>(key: &str) -> Result<T, config::ConfigError> {
    source()?.get(key)
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        source()?.try_deserialize()
    }
}
