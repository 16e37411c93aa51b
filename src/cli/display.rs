//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use crate::config::{format_validation_result, FleetConfig, ValidationResult};
use crate::fleet::{Node, TransportMode};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No nodes configured.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

// ============================================================================
// Node display
// ============================================================================

fn transport_label(node: &Node) -> &'static str {
    match node.tls.mode() {
        TransportMode::Plain => "plain",
        TransportMode::Tls => "tls",
        TransportMode::MutualTls => "mtls",
    }
}

/// Format the node registry as a table
pub fn format_node_list(nodes: &[Node]) -> String {
    let headers = &["ID", "NAME", "RPC ADDRESS", "PEERS", "TRANSPORT", "HEALTH", "STATE"];
    let rows: Vec<Vec<String>> = nodes
        .iter()
        .map(|n| {
            let state = if n.archived {
                "archived"
            } else if n.enabled {
                "enabled"
            } else {
                "disabled"
            };
            vec![
                n.id.to_string(),
                n.name.clone(),
                n.rpc_address.clone(),
                format!("{}/{}", n.current_peers, n.max_peers),
                transport_label(n).to_string(),
                if n.health_url.is_some() { "probed" } else { "-" }.to_string(),
                state.to_string(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Summary printed by `wgfleet validate`
pub fn format_config_summary(config: &FleetConfig, result: &ValidationResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("Nodes ({}):\n", config.nodes.len()));
    output.push_str(&format_node_list(&config.nodes));
    output.push('\n');

    let w = &config.workers;
    output.push_str("Workers:\n");
    output.push_str(&format!("  expiration      daily at {} UTC\n", w.expiration_at));
    output.push_str(&format!(
        "  notification    daily at {} UTC, thresholds {:?} days\n",
        w.notification_at, w.notify_days
    ));
    output.push_str(&format!(
        "  health-check    every {}s, timeout {}s\n",
        w.health_interval_secs, w.health_timeout_secs
    ));
    output.push_str(&format!(
        "  provisioning    every {}s\n",
        w.provisioning_interval_secs
    ));
    if w.peer_count_enabled {
        output.push_str(&format!("  peer-count      every {}s\n", w.peer_count_interval_secs));
    }
    output.push_str(&format!("Admins: {}\n", config.admins.len()));

    if !result.messages.is_empty() {
        output.push_str("\nFindings:\n");
        output.push_str(&format_validation_result(result));
    }

    output.push_str(if result.passed {
        "\nConfiguration OK\n"
    } else {
        "\nConfiguration has errors\n"
    });

    output
}
