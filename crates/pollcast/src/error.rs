//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use pollcast_config::ConfigError;
use pollcast_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const BROKER_UNREACHABLE: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Broker ───────────────────────────────────────────────────────
    #[error("Broker at {address} unreachable after {attempts} attempts")]
    #[diagnostic(
        code(pollcast::broker_unreachable),
        help(
            "Check that the broker is running and accepts adapter connections.\n\
             Last error: {last_error}\n\
             Configure with [broker] host/port, or LS_HOST / LS_PORT."
        )
    )]
    BrokerUnreachable {
        address: String,
        attempts: u32,
        last_error: String,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Missing required setting {field}")]
    #[diagnostic(
        code(pollcast::config_missing),
        help(
            "Set it in {path}\n\
             or export {env}."
        )
    )]
    MissingSetting {
        field: String,
        env: String,
        path: String,
    },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(pollcast::config),
        help("Run: pollcast config show to inspect the effective settings")
    )]
    Config(ConfigError),

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(pollcast::config))]
    Setup { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(pollcast::adapter))]
    Adapter(CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Attach the config file path to errors that need it in their help text.
    pub fn from_config(err: ConfigError, path: &std::path::Path) -> Self {
        match err {
            ConfigError::Missing { field, env } => Self::MissingSetting {
                field,
                env,
                path: path.display().to_string(),
            },
            other => Self::Config(other),
        }
    }

    /// Map an adapter failure, naming the broker address for reachability errors.
    pub fn from_core(err: CoreError, address: &str) -> Self {
        match err {
            CoreError::RetriesExhausted {
                attempts,
                last_error,
            } => Self::BrokerUnreachable {
                address: address.to_owned(),
                attempts,
                last_error,
            },
            CoreError::Config { message } => Self::Setup { message },
            other => Self::Adapter(other),
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BrokerUnreachable { .. } => exit_code::BROKER_UNREACHABLE,
            Self::MissingSetting { .. } | Self::Config(_) | Self::Setup { .. } => {
                exit_code::CONFIG
            }
            Self::Adapter(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}
