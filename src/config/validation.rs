//! Configuration checks run before the service starts
//!
//! Errors block startup; warnings describe setups that run but are probably
//! not what the operator wanted (no admins to alert, no bot token, ...).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::FleetConfig;
use crate::fleet::TransportMode;
use crate::worker::Schedule;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ValidationSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: ValidationSeverity,
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub messages: Vec<ValidationMessage>,
    pub passed: bool,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            passed: true,
        }
    }

    pub fn add(&mut self, msg: ValidationMessage) {
        if msg.severity == ValidationSeverity::Error {
            self.passed = false;
        }
        self.messages.push(msg);
    }

    fn push(&mut self, severity: ValidationSeverity, code: &str, message: String, suggestion: Option<&str>) {
        self.add(ValidationMessage {
            severity,
            code: code.to_string(),
            message,
            suggestion: suggestion.map(String::from),
        });
    }

    pub fn warning(mut self, code: &str, message: &str, suggestion: Option<&str>) -> Self {
        self.push(ValidationSeverity::Warning, code, message.to_string(), suggestion);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == ValidationSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == ValidationSeverity::Warning)
    }

    pub fn codes(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.code.as_str()).collect()
    }
}

// ============================================================================
// SBIO: Pure validation logic (no I/O)
// ============================================================================

pub fn validate_config(config: &FleetConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    let mut seen = HashSet::new();
    for node in &config.nodes {
        if !seen.insert(node.id) {
            result.push(
                ValidationSeverity::Error,
                "DUPLICATE_NODE_ID",
                format!("Node id {} is used more than once", node.id),
                None,
            );
        }
        if node.max_peers == 0 {
            result.push(
                ValidationSeverity::Error,
                "ZERO_CAPACITY",
                format!("Node {} ({}) has max_peers = 0", node.id, node.name),
                Some("Set max_peers to the number of peers the node can hold, or disable the node"),
            );
        }
        if node.current_peers > node.max_peers {
            result.push(
                ValidationSeverity::Warning,
                "OVER_CAPACITY",
                format!(
                    "Node {} reports {} peers but max_peers is {}",
                    node.id, node.current_peers, node.max_peers
                ),
                None,
            );
        }
        if node.rpc_address.trim().is_empty() {
            result.push(
                ValidationSeverity::Error,
                "MISSING_RPC_ADDRESS",
                format!("Node {} has no rpc_address", node.id),
                None,
            );
        }

        let tls = &node.tls;
        if tls.client_cert.is_some() != tls.client_key.is_some() {
            result.push(
                ValidationSeverity::Error,
                "MTLS_HALF_CONFIGURED",
                format!("Node {} sets only one of client_cert and client_key", node.id),
                Some("Configure both files for mutual TLS, or neither"),
            );
        }
        if tls.mode() == TransportMode::Plain
            && (tls.ca_cert.is_some() || tls.client_cert.is_some() || tls.server_name.is_some())
        {
            result.push(
                ValidationSeverity::Warning,
                "TLS_SETTINGS_IGNORED",
                format!("Node {} has TLS files configured but tls.enabled is false", node.id),
                Some("Set tls.enabled: true"),
            );
        }
    }

    let workers = &config.workers;
    for (code, value) in [
        ("EXPIRATION_SCHEDULE", &workers.expiration_at),
        ("NOTIFICATION_SCHEDULE", &workers.notification_at),
    ] {
        if let Err(e) = Schedule::parse_daily(value) {
            result.push(ValidationSeverity::Error, code, e.to_string(), Some("Use HH:MM (UTC)"));
        }
    }
    for (code, secs) in [
        ("HEALTH_INTERVAL", workers.health_interval_secs),
        ("HEALTH_TIMEOUT", workers.health_timeout_secs),
        ("PROVISIONING_INTERVAL", workers.provisioning_interval_secs),
        ("PEER_COUNT_INTERVAL", workers.peer_count_interval_secs),
    ] {
        if secs == 0 {
            result.push(
                ValidationSeverity::Error,
                code,
                format!("{} must be greater than zero", code.to_lowercase()),
                None,
            );
        }
    }
    if workers.health_timeout_secs >= workers.health_interval_secs && workers.health_interval_secs > 0 {
        result.push(
            ValidationSeverity::Warning,
            "HEALTH_TIMEOUT_TOO_LONG",
            format!(
                "Health timeout ({}s) is not shorter than the interval ({}s)",
                workers.health_timeout_secs, workers.health_interval_secs
            ),
            None,
        );
    }
    if workers.notify_days.is_empty() {
        result.push(
            ValidationSeverity::Info,
            "NO_REMINDERS",
            "notify_days is empty; expiry reminders are disabled".to_string(),
            None,
        );
    }

    if config.admins.is_empty() {
        result.push(
            ValidationSeverity::Warning,
            "NO_ADMINS",
            "No admins configured; node outages will only be logged".to_string(),
            None,
        );
    }
    if config.telegram.token.is_none() {
        result.push(
            ValidationSeverity::Warning,
            "NO_BOT_TOKEN",
            "No Telegram token; messages will be written to the log".to_string(),
            Some("Set telegram.token or WGFLEET_TELEGRAM_TOKEN"),
        );
    }

    result
}

/// Format a validation report for display
pub fn format_validation_result(result: &ValidationResult) -> String {
    let mut output = String::new();

    for msg in &result.messages {
        let prefix = match msg.severity {
            ValidationSeverity::Info => "INFO",
            ValidationSeverity::Warning => "WARN",
            ValidationSeverity::Error => "ERROR",
        };

        output.push_str(&format!("  {} [{}]: {}\n", prefix, msg.code, msg.message));

        if let Some(suggestion) = &msg.suggestion {
            output.push_str(&format!("    -> {}\n", suggestion));
        }
    }

    output
}
