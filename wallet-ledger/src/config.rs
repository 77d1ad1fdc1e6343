//! Configuration for the wallet service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// HTTP listen address
    pub http_listen_addr: String,

    /// Shared request token
    pub api_token: String,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Write-back configuration
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "wallet-ledger".to_string(),
            http_listen_addr: "0.0.0.0:9000".to_string(),
            api_token: "testtask".to_string(),
            data_dir: PathBuf::from("./data/wallet"),
            rocksdb: RocksDBConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Write-back synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cycle period (milliseconds)
    pub interval_ms: u64,

    /// Deadline for a single gateway call (milliseconds)
    pub gateway_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            gateway_timeout_ms: 5_000,
        }
    }
}

impl SyncConfig {
    /// Cycle period
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Gateway call deadline
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("WALLET_HTTP_ADDR") {
            config.http_listen_addr = addr;
        }

        if let Ok(token) = std::env::var("WALLET_API_TOKEN") {
            config.api_token = token;
        }

        if let Ok(value) = std::env::var("WALLET_SYNC_INTERVAL_MS") {
            config.sync.interval_ms = parse_ms("WALLET_SYNC_INTERVAL_MS", &value)?;
        }

        if let Ok(value) = std::env::var("WALLET_GATEWAY_TIMEOUT_MS") {
            config.sync.gateway_timeout_ms = parse_ms("WALLET_GATEWAY_TIMEOUT_MS", &value)?;
        }

        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.api_token.is_empty() {
            return Err(crate::Error::Config("api_token must not be empty".to_string()));
        }
        if self.sync.interval_ms == 0 {
            return Err(crate::Error::Config(
                "sync.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sync.gateway_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "sync.gateway_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_ms(var: &str, value: &str) -> crate::Result<u64> {
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}={:?}: {}", var, value, e)))
}
