//! Output formatting for CLI commands.

use colored::Colorize;
use labfleet_reconcile::{Action, ActionOutcome, ApplyReport, OutcomeStatus, ReconcileError};
use serde::Serialize;
use tabled::{Table, Tabled};

const CLI_SCHEMA_VERSION: &str = "labfleet.cli.v1";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                let table = Table::new(data).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            println!("{}", format_json(data, "[]"));
        }
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Machine-readable form of one finished action.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub kind: &'static str,
    pub student: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeRecord {
    pub fn from_outcome(outcome: &ActionOutcome) -> Self {
        let (instance, slot) = match &outcome.action {
            Action::Create { slot, .. } => (None, Some(*slot)),
            Action::Delete { instance, .. } | Action::UpdateAllowList { instance, .. } => {
                (Some(instance.to_string()), None)
            }
        };

        Self {
            kind: outcome.action.kind(),
            student: outcome.action.student().to_string(),
            instance,
            slot,
            action: outcome.action.to_string(),
            ok: outcome.is_success(),
            error: match &outcome.status {
                OutcomeStatus::Succeeded => None,
                OutcomeStatus::Failed(err) => Some(failure_message(err)),
            },
        }
    }
}

fn failure_message(err: &ReconcileError) -> String {
    match err {
        ReconcileError::ActionFailed { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// One line per finished action.
pub fn outcome_line(outcome: &ActionOutcome) -> String {
    match &outcome.status {
        OutcomeStatus::Succeeded => format!("{} {}", "✔".green(), outcome.action),
        OutcomeStatus::Failed(err) => {
            format!("{} {}: {}", "✘".red(), outcome.action, failure_message(err))
        }
    }
}

/// Print an action outcome as soon as it is known. JSON output is one
/// object per line.
pub fn print_outcome(outcome: &ActionOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", outcome_line(outcome)),
        OutputFormat::Json => {
            println!("{}", format_json_line(&OutcomeRecord::from_outcome(outcome)));
        }
    }
}

/// Final summary line for an apply run.
pub fn summary_line(report: &ApplyReport) -> String {
    if report.is_noop() {
        "Nothing to do".to_string()
    } else {
        format!(
            "Done: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        )
    }
}

/// Print the final summary of an apply run.
pub fn print_summary(report: &ApplyReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if report.failed() > 0 {
                println!("{}", summary_line(report).yellow().bold());
            } else {
                print_success(&summary_line(report));
            }
        }
        OutputFormat::Json => println!("{}", format_json_line(&summary_json(report))),
    }
}

fn summary_json(report: &ApplyReport) -> serde_json::Value {
    serde_json::json!({
        "summary": summary_line(report),
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "noop": report.is_noop(),
    })
}

fn wrap_json<T: Serialize + ?Sized>(data: &T) -> serde_json::Value {
    let value = serde_json::to_value(data).unwrap_or_else(|_| serde_json::json!({}));
    serde_json::json!({
        "schemaVersion": CLI_SCHEMA_VERSION,
        "data": value
    })
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(&wrap_json(data)).unwrap_or_else(|_| fallback.to_string())
}

// Apply runs stream their results, so every object stays on one line.
fn format_json_line<T: Serialize + ?Sized>(data: &T) -> String {
    wrap_json(data).to_string()
}
