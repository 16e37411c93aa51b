//! CLI module for wgfleet
//!
//! Subcommands:
//! - `wgfleet serve` - Run the reconciliation workers (and the status API)
//! - `wgfleet validate` - Check a config file and print a summary

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod display;

pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "wgfleet")]
#[command(about = "Provision and reconcile WireGuard peers across a node fleet")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.wgfleet/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the workers until interrupted
    Serve(ServeArgs),

    /// Validate the config file
    Validate,
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Path to a .env file for loading the bot token
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Override the status API bind address (e.g. 127.0.0.1:9090)
    #[arg(long, value_name = "ADDR")]
    pub status_addr: Option<String>,
}
