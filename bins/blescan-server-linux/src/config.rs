//! Host configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use blescan_core::store::STORE_FILE;
use blescan_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file when no path is
/// given on the command line.
pub const CONFIG_ENV: &str = "BLESCAN_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// WebSocket port.
    pub port: u16,

    pub max_connections: usize,

    /// Directory holding the store document.
    pub data_dir: PathBuf,

    pub store_file: String,

    /// Record every delivered scan result in the store.
    pub persist_scanned: bool,

    /// Milliseconds between server ticks.
    pub tick_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            port: server.port,
            max_connections: server.max_connections,
            data_dir: PathBuf::from("data"),
            store_file: STORE_FILE.to_string(),
            persist_scanned: server.persist_scanned,
            tick_interval_ms: 5,
        }
    }
}

impl AppConfig {
    /// Load from the first CLI argument, else from `BLESCAN_CONFIG`, else
    /// defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            max_connections: self.max_connections,
            persist_scanned: self.persist_scanned,
            ..Default::default()
        }
    }
}
