//! Configuration loading for opencon
//!
//! TOML file with environment-variable overrides. The file path comes from
//! `OPENCON_CONFIG` (default `opencon.toml` in the working directory); a
//! missing file just means every field falls back to its default or its
//! environment override.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP bind address
    pub bind_address: String,
    /// SQLite database path
    pub database_path: PathBuf,
    /// Remote schedule XML source (env: OPENCON_XML_URL)
    pub schedule_url: Option<String>,
    /// Directory holding local schedule assets for `use_local_xml` imports
    pub local_schedule_dir: PathBuf,
    /// Default local schedule filename
    pub local_schedule_file: String,
    /// Secret for signing identity tokens (env: OPENCON_JWT_SECRET)
    pub jwt_secret: String,
    /// Push-notification gateway; jobs are POSTed here (env: OPENCON_PUSH_GATEWAY_URL)
    pub push_gateway_url: Option<String>,
    /// Name of the synthetic fallback track injected when the schedule
    /// lacks one (also the canonical name duplicate main-track aliases
    /// collapse into)
    pub default_track: String,
    /// Group reschedule notifications per user (one job per user) instead
    /// of one job per changed session
    pub group_notifications: bool,
    /// Optional JSON asset with the sponsor map served in the sync payload
    pub sponsors_file: Option<PathBuf>,
    /// Outbound notification queue capacity
    pub notification_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            database_path: PathBuf::from("opencon.db"),
            schedule_url: None,
            local_schedule_dir: PathBuf::from("tests/fixtures"),
            local_schedule_file: "sfscon2024.xml".to_string(),
            jwt_secret: "secret".to_string(),
            push_gateway_url: None,
            default_track: "SFSCON".to_string(),
            group_notifications: true,
            sponsors_file: None,
            notification_queue_capacity: 256,
        }
    }
}

impl Config {
    /// Load configuration: TOML file (if present) overridden by environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("OPENCON_CONFIG").unwrap_or_else(|_| "opencon.toml".to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Parse config failed: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OPENCON_XML_URL") {
            self.schedule_url = Some(url);
        }
        if let Ok(secret) = std::env::var("OPENCON_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var("OPENCON_PUSH_GATEWAY_URL") {
            self.push_gateway_url = Some(url);
        }
        if let Ok(addr) = std::env::var("OPENCON_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Ok(path) = std::env::var("OPENCON_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
    }

    /// Remote schedule source, or a Config error when unset.
    pub fn schedule_url(&self) -> Result<&str> {
        self.schedule_url
            .as_deref()
            .ok_or_else(|| Error::Config("XML_URL not set".to_string()))
    }

    /// Path of a local schedule asset by filename.
    pub fn local_schedule_path(&self, fname: &str) -> PathBuf {
        self.local_schedule_dir.join(fname)
    }
}
