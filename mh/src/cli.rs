//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// mfehost - runtime host for micro-frontend fragments
#[derive(Parser)]
#[command(
    name = "mh",
    about = "Load micro-frontend fragments at runtime and connect them over a shared bus",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured fragments
    Fragments,

    /// Load a single fragment by URL
    Load {
        /// Fragment name
        name: String,

        /// URL of the code artifact
        #[arg(value_name = "CODE_URL")]
        code_url: String,

        /// URL of the stylesheet
        #[arg(short, long, value_name = "STYLE_URL")]
        style: Option<String>,
    },

    /// Start the host, load configured fragments and print the bus activity
    Run {
        /// Load only this fragment
        #[arg(long, value_name = "NAME")]
        only: Option<String>,

        /// Send this host message once loading is done
        #[arg(short, long)]
        message: Option<String>,

        /// Switch to this theme once loading is done
        #[arg(short, long)]
        theme: Option<String>,
    },
}

/// Map a log-level name to a tracing level; None if unrecognized
pub fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

/// Get the path to the log file
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mfehost")
        .join("logs")
        .join("mfehost.log");
    debug!(?path, "get_log_path: returning path");
    path
}
