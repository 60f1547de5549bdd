//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Label for your own lines in the transcript
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Wait for one peer to connect, then chat
    Host {
        /// Address to listen on (overrides the configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Connect to a hosting peer, then chat
    Connect {
        /// Peer address (host:port)
        address: String,
    },
    /// List nearby devices (requires the `ble` feature)
    Scan {
        /// How long to scan for
        #[arg(short, long, default_value_t = 10)]
        duration_secs: u64,
    },
    /// Print an example configuration file
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}
