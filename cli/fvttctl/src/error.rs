//! Error handling and display for the CLI.

use colored::Colorize;
use fvtt_store::StoreError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0} not found")]
    NotFound(String),

    /// The store refused the write. The message is the store's own.
    #[error("{0}")]
    Denied(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Map a store error, naming the record when it is missing.
    pub fn from_store(err: StoreError, what: impl Into<String>) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(what.into()),
            StoreError::ValidationDenied(message) => Self::Denied(message),
            other => Self::Store(other),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NotFound(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `fvtt instances` to list instances in the namespace.".yellow()
                );
            }
            CliError::Denied(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: The active instance may still have players connected. Retry later or set the license to force mode."
                        .yellow()
                );
            }
            CliError::Store(StoreError::Transport(_) | StoreError::Config(_)) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check FVTT_API_SERVER and FVTT_TOKEN.".yellow()
                );
            }
            _ => {}
        }
    }
}
