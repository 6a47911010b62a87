//! CLI definitions for the clonefinder command-line tool.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clonefinder_multicast::RECV_PORT;

/// Detect duplicate running copies of this tool on the local network segment
#[derive(Parser)]
#[command(name = "clonefinder")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Multicast group address (IPv4 or IPv6)
    pub group: String,

    /// UDP port shared by all instances
    #[arg(short = 'p', long, default_value_t = RECV_PORT)]
    pub port: u16,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, short = 'L', default_value = "info")]
    pub log_level: LogLevel,

    /// Log file path (logs to both console and file)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}
