//! Configuration for the HTTP server and its storage

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// File written by the file sink and read by the primary source
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Further record files queried after the primary one, in order
    #[serde(default)]
    pub extra_sources: Vec<PathBuf>,

    /// Also echo every ingested record to standard output
    #[serde(default)]
    pub console: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            extra_sources: vec![],
            console: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;
        let config: ServerConfig = toml::from_str(&contents)
            .context("Failed to parse configuration file")?;
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `LOGKEEP_*` environment variables
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("LOGKEEP_ADDR") {
            if let Ok(ip) = addr.parse() {
                self.listen_addr = ip;
            }
        }

        if let Ok(port) = std::env::var("LOGKEEP_PORT") {
            if let Ok(p) = port.parse() {
                self.listen_port = p;
            }
        }

        if let Ok(file) = std::env::var("LOGKEEP_LOG_FILE") {
            self.storage.log_file = PathBuf::from(file);
        }

        if let Ok(console) = std::env::var("LOGKEEP_CONSOLE") {
            if let Ok(enabled) = console.parse() {
                self.storage.console = enabled;
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), contents)
            .context("Failed to write configuration file")?;
        Ok(())
    }
}

fn default_listen_addr() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_listen_port() -> u16 {
    8080
}

fn default_log_file() -> PathBuf {
    // Respect $HOME first (for tests/sandbox), fall back to dirs::home_dir()
    let home = std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".logkeep").join("records.log")
}
