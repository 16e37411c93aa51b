//! Service configuration
//!
//! A single YAML file (default `~/.wgfleet/config.yaml`) describes the bot
//! token, the admins to alert, the node registry seed, the agent client and
//! every worker's schedule. Secrets may come from the environment instead of
//! the file.

pub mod validation;

pub use validation::{
    format_validation_result, validate_config, ValidationMessage, ValidationResult,
    ValidationSeverity,
};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentClientConfig;
use crate::fleet::Node;
use crate::messaging::telegram::DEFAULT_API_BASE;
use crate::messaging::ChatId;
use crate::worker::{Schedule, WorkerError};

/// Environment variable that overrides `telegram.token`
pub const TOKEN_ENV_VAR: &str = "WGFLEET_TELEGRAM_TOKEN";

/// Default config file location: ~/.wgfleet/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wgfleet")
        .join("config.yaml")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Chats that receive node outage alerts
    #[serde(default)]
    pub admins: Vec<ChatId>,

    /// Nodes loaded into the registry at startup
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl AgentSection {
    pub fn client_config(&self) -> AgentClientConfig {
        AgentClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

/// Schedules and knobs for the reconciliation workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Daily run time of the expiration pass, "HH:MM" UTC
    #[serde(default = "default_expiration_at")]
    pub expiration_at: String,

    #[serde(default = "default_notification_at")]
    pub notification_at: String,

    /// Reminder thresholds in days before expiry
    #[serde(default = "default_notify_days")]
    pub notify_days: Vec<u32>,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    #[serde(default = "default_provisioning_interval")]
    pub provisioning_interval_secs: u64,

    /// Recount peers from the agents and overwrite the registry counters
    #[serde(default)]
    pub peer_count_enabled: bool,

    #[serde(default = "default_peer_count_interval")]
    pub peer_count_interval_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            expiration_at: default_expiration_at(),
            notification_at: default_notification_at(),
            notify_days: default_notify_days(),
            health_interval_secs: default_health_interval(),
            health_timeout_secs: default_health_timeout(),
            provisioning_interval_secs: default_provisioning_interval(),
            peer_count_enabled: false,
            peer_count_interval_secs: default_peer_count_interval(),
        }
    }
}

impl WorkersConfig {
    pub fn expiration_schedule(&self) -> Result<Schedule, WorkerError> {
        Schedule::parse_daily(&self.expiration_at)
    }

    pub fn notification_schedule(&self) -> Result<Schedule, WorkerError> {
        Schedule::parse_daily(&self.notification_at)
    }

    pub fn health_schedule(&self) -> Schedule {
        Schedule::every(Duration::from_secs(self.health_interval_secs))
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn provisioning_schedule(&self) -> Schedule {
        Schedule::every(Duration::from_secs(self.provisioning_interval_secs))
    }

    pub fn peer_count_schedule(&self) -> Schedule {
        Schedule::every(Duration::from_secs(self.peer_count_interval_secs))
    }
}

fn default_expiration_at() -> String {
    "00:05".to_string()
}

fn default_notification_at() -> String {
    "10:00".to_string()
}

fn default_notify_days() -> Vec<u32> {
    vec![3, 1]
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_provisioning_interval() -> u64 {
    300
}

fn default_peer_count_interval() -> u64 {
    3600
}

/// Read-only status API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusConfig {
    /// e.g. "127.0.0.1:9090"; the API is off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,
}

impl FleetConfig {
    /// Environment value wins over the file when present and non-empty
    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.token = Some(token);
        }
    }

    /// Expand `~` in every node's certificate paths
    pub fn expand_paths(&mut self) {
        for node in &mut self.nodes {
            let tls = &mut node.tls;
            for path in [&mut tls.ca_cert, &mut tls.client_cert, &mut tls.client_key]
                .into_iter()
                .flatten()
            {
                let expanded = expand_path(path.as_path());
                *path = expanded;
            }
        }
    }

    pub fn validate(&self) -> ValidationResult {
        validate_config(self)
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

// ============================================================================
// SBIO: Pure parsing, then a thin I/O wrapper
// ============================================================================

pub fn parse_config(content: &str) -> Result<FleetConfig, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load a config file, expand paths and apply environment overrides
pub fn load_config_file(path: &Path) -> Result<FleetConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    config.expand_paths();
    config.apply_token_override(std::env::var(TOKEN_ENV_VAR).ok());
    Ok(config)
}
