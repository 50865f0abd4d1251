//! Pulse command-line tool
//!
//! Loads configuration, installs logging and drives
//! [`orchestrator::WorkflowOrchestrator`] runs from the terminal.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;

pub use cli::{exit_code, Cli, Commands};
pub use config::ConfigLoader;
pub use error::{PulseError, Result};
