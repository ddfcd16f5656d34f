// src/config.rs

//! Manages the framework configuration: loading, file search, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The server fleets, one address list per service. A handle's server index
/// is a position in these lists.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServersConfig {
    pub object: Vec<String>,
    pub kv: Vec<String>,
}

/// Backend selection for one service: which backend to run, on which side
/// (`client` or `server`), and its storage path.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceConfig {
    pub backend: String,
    #[serde(default = "default_component")]
    pub component: String,
    #[serde(default)]
    pub path: String,
}

fn default_component() -> String {
    "server".to_string()
}

/// Client-side resource limits.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ClientsConfig {
    /// Live connections per server; pool leases block beyond this.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Background workers for async batches; zero means one per CPU.
    #[serde(default)]
    pub background_workers: usize,
}

fn default_max_connections() -> usize {
    8
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            background_workers: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The validated configuration. Read once at init, immutable afterwards,
/// shared by reference.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub servers: ServersConfig,
    pub object: ServiceConfig,
    pub kv: ServiceConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Finds and loads the configuration.
    ///
    /// Search order: `JASPER_CONFIG` as an absolute path (searching stops
    /// there either way), `JASPER_CONFIG` as a basename below the standard
    /// config directories, then the default name `jasper` below
    /// `$XDG_CONFIG_HOME/jasper` and each entry of `$XDG_CONFIG_DIRS`.
    pub fn load() -> Result<Self> {
        let mut config_name = "jasper".to_string();

        if let Ok(env_path) = env::var("JASPER_CONFIG") {
            let path = Path::new(&env_path);
            if path.is_absolute() {
                return Self::from_file(&env_path);
            }
            if let Some(name) = path.file_name() {
                config_name = name.to_string_lossy().to_string();
            }
        }

        for candidate in Self::candidate_paths(&config_name) {
            if candidate.is_file() {
                info!("Using configuration {}", candidate.display());
                return Self::from_file(&candidate.to_string_lossy());
            }
        }

        Err(anyhow!("Could not find configuration '{config_name}'"))
    }

    fn candidate_paths(config_name: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(user_dir) = dirs::config_dir() {
            candidates.push(user_dir.join("jasper").join(config_name));
        }

        let system_dirs = env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| "/etc/xdg".to_string());
        for dir in system_dirs.split(':').filter(|dir| !dir.is_empty()) {
            candidates.push(Path::new(dir).join("jasper").join(config_name));
        }

        candidates
    }

    /// Validates the configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.servers.object.is_empty() {
            return Err(anyhow!("servers.object cannot be empty"));
        }
        if self.servers.kv.is_empty() {
            return Err(anyhow!("servers.kv cannot be empty"));
        }
        if self.object.backend.trim().is_empty() {
            return Err(anyhow!("object.backend cannot be empty"));
        }
        if self.kv.backend.trim().is_empty() {
            return Err(anyhow!("kv.backend cannot be empty"));
        }
        for component in [&self.object.component, &self.kv.component] {
            if component != "client" && component != "server" {
                return Err(anyhow!("component must be 'client' or 'server'"));
            }
        }
        if self.clients.max_connections == 0 {
            return Err(anyhow!("clients.max-connections cannot be 0"));
        }
        Ok(())
    }
}
