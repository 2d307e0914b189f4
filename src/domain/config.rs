//! # Configuration
//!
//! Manages the loading and parsing of the bot's configuration file (`config.yaml`).
//! Every field has a default, so an empty file yields a public bot with all sections enabled.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotConfig,
    /// Enabled section ids. Empty means every registered section.
    #[serde(default)]
    pub sections: Vec<String>,
    /// Keyword → `section.method`
    #[serde(default)]
    pub hears: HashMap<String, String>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// `data/config.yaml` if present, else the per-user config directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("data/config.yaml");
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("sectionkit").join("config.yaml"))
            .unwrap_or(local)
    }

    pub fn section_enabled(&self, id: &str) -> bool {
        self.sections.is_empty() || self.sections.iter().any(|s| s == id)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Public,
    Private,
}

/// Dispatcher and access settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default)]
    pub access_usernames: Vec<String>,
    #[serde(default)]
    pub access_keys: Vec<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub keep_section_instances: bool,
    #[serde(default)]
    pub dev_hot_reload_sections: bool,
    /// Rows of reply-keyboard labels shown by the home section
    #[serde(default)]
    pub main_menu: Vec<Vec<String>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            access: AccessMode::default(),
            access_usernames: Vec::new(),
            access_keys: Vec::new(),
            debug: false,
            keep_section_instances: true,
            dev_hot_reload_sections: false,
            main_menu: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_idle_eviction_minutes")]
    pub idle_eviction_minutes: u64,
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,
    #[serde(default = "default_message_id_limit")]
    pub message_id_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_eviction_minutes: default_idle_eviction_minutes(),
            eviction_interval_secs: default_eviction_interval(),
            message_id_limit: default_message_id_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            retention_minutes: default_retention_minutes(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Overrides the env filter when `RUST_LOG` is unset
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file: default_log_file(),
            filter: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_idle_eviction_minutes() -> u64 {
    30
}
fn default_eviction_interval() -> u64 {
    60
}
fn default_message_id_limit() -> usize {
    10
}
fn default_retention_minutes() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_log_directory() -> String {
    "data".to_string()
}
fn default_log_file() -> String {
    "session.log".to_string()
}
