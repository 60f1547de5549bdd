//! BtChat CLI library
//!
//! Components behind the `btchat` binary: argument parsing, TOML
//! configuration, command dispatch and the line-based chat console.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::ChatConsole;
pub use cli::{Cli, Commands};
pub use config::{AppConfig, CliConfig};
pub use error::{CliError, Result};
