//! Error handling and display for the CLI.

use colored::Colorize;
use labfleet_reconcile::ReconcileError;
use thiserror::Error;

/// Exit code for fatal errors.
pub const EXIT_FATAL: i32 = 1;

/// Exit code for an apply run that finished with failed actions.
pub const EXIT_PARTIAL: i32 = 2;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{failed} of {total} actions failed")]
    PartialFailure { failed: usize, total: usize },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PartialFailure { .. } => EXIT_PARTIAL,
            _ => EXIT_FATAL,
        }
    }
}

/// Exit code for any error surfaced from a command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>()
        .map(CliError::exit_code)
        .unwrap_or(EXIT_FATAL)
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let Some(cli_err) = err.downcast_ref::<CliError>() else {
        return;
    };

    match cli_err {
        CliError::Reconcile(ReconcileError::InvalidQuota { max, .. }) => {
            eprintln!(
                "\n{}",
                format!("Hint: the VM count must be a number from 0 to {}.", max).yellow()
            );
        }
        CliError::Reconcile(ReconcileError::GatewayUnavailable(_)) => {
            eprintln!(
                "\n{}",
                "Hint: nothing was changed. Check api.url, the API token and the project."
                    .yellow()
            );
        }
        CliError::Api { status: 401, .. } | CliError::Api { status: 403, .. } => {
            eprintln!(
                "\n{}",
                "Hint: the token was rejected. Check the token file.".yellow()
            );
        }
        CliError::PartialFailure { .. } => {
            eprintln!(
                "\n{}",
                "Hint: run the same command again to retry the failed actions.".yellow()
            );
        }
        CliError::Network(_) => {
            eprintln!(
                "\n{}",
                "Hint: Check your network connection and API endpoint.".yellow()
            );
        }
        _ => {}
    }
}
