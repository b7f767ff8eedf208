//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin token is loaded from the FULFILLMENT_ADMIN_TOKEN env var or
//! auth_token_file, never stored in the TOML directly to avoid leaking
//! secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Pool store locations and sweep schedule
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// JSON file holding the account pool (created on first start)
    pub accounts_file: PathBuf,
    /// JSON file holding the order slice the allocator owns
    pub orders_file: PathBuf,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Admin API protection
#[derive(Debug, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(skip)]
    pub auth_token: Option<Secret<String>>,
    /// Path to a file containing the bearer token (alternative to the
    /// FULFILLMENT_ADMIN_TOKEN env var). When neither is set the admin API
    /// is unauthenticated, acceptable only behind a private listener.
    #[serde(default)]
    pub auth_token_file: Option<PathBuf>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_sweep_interval() -> u64 {
    300
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Admin token resolution order:
    /// 1. FULFILLMENT_ADMIN_TOKEN env var
    /// 2. auth_token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.pool.sweep_interval_secs == 0 {
            return Err(common::Error::Config(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // The two stores persist independently; pointing them at the same
        // file would have each overwrite the other.
        if config.pool.accounts_file == config.pool.orders_file {
            return Err(common::Error::Config(
                "accounts_file and orders_file must be distinct paths".into(),
            ));
        }

        // Resolve admin token: env var takes precedence over file
        if let Ok(token) = std::env::var("FULFILLMENT_ADMIN_TOKEN") {
            config.admin.auth_token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.admin.auth_token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read auth_token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.admin.auth_token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("fulfillment.toml")
    }
}
