//! CLI commands.

mod discover;
mod report;
mod set;
mod status;
mod sync_network;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use labfleet_reconcile::{ActionOutcome, ApplyReport, Fleet, Gateway, Roster};

use crate::client::{GatewayConfig, WaldurGateway};
use crate::config::Config;
use crate::discovery;
use crate::error::CliError;
use crate::output::{print_outcome, print_summary, OutputFormat};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Lab VM fleet reconciler.
#[derive(Debug, Parser)]
#[command(name = "reconcile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (defaults to the user config directory).
    #[arg(long, global = true, env = "LABFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (table or json).
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Log format on stderr (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show students, their VMs and allow-list state.
    Status(status::StatusCommand),

    /// Converge selected students to a VM count.
    Set(set::SetCommand),

    /// Make every VM's allow-list match its siblings.
    SyncNetwork(sync_network::SyncNetworkCommand),

    /// Refresh the student roster from GitHub.
    Discover(discover::DiscoverCommand),

    /// Write the plain-text VM report.
    Report(report::ReportCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, config: Config) -> Result<()> {
        let ctx = CommandContext::new(config, self.format);
        self.execute(ctx).await
    }

    /// Run the CLI command in a prepared context.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Set(cmd) => cmd.run(ctx).await,
            Commands::SyncNetwork(cmd) => cmd.run(ctx).await,
            Commands::Discover(cmd) => cmd.run(ctx).await,
            Commands::Report(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("reconcile {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    gateway: Option<Arc<dyn Gateway>>,
}

impl CommandContext {
    /// Context that talks to the marketplace API named in `config`.
    pub fn new(config: Config, format: OutputFormat) -> Self {
        Self {
            config,
            format,
            gateway: None,
        }
    }

    /// Use `gateway` instead of the marketplace API.
    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Build a fleet handle backed by the configured gateway.
    pub fn fleet(&self) -> Result<Fleet> {
        let gateway: Arc<dyn Gateway> = match &self.gateway {
            Some(gateway) => gateway.clone(),
            None => Arc::new(WaldurGateway::new(GatewayConfig::from_config(&self.config)?)?),
        };
        Ok(Fleet::new(
            gateway,
            self.config.address_plan()?,
            self.config.quota_policy(),
            self.config.apply_config(),
        ))
    }

    /// Load the roster and keys-installed set as of now.
    pub fn roster(&self) -> Result<Roster> {
        discovery::load_roster(&self.config.discovery, Utc::now())
    }
}

/// Per-action progress callback for apply runs.
fn outcome_printer(format: OutputFormat) -> impl Fn(&ActionOutcome) {
    move |outcome| print_outcome(outcome, format)
}

/// Print the run summary; any failed action makes the command fail.
fn finish(report: &ApplyReport, format: OutputFormat) -> Result<()> {
    print_summary(report, format);
    if report.failed() > 0 {
        return Err(CliError::PartialFailure {
            failed: report.failed(),
            total: report.outcomes().len(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("-1", -1)]
    #[case("0", 0)]
    #[case("4", 4)]
    fn test_set_count_reaches_validation_unclamped(#[case] raw: &str, #[case] expected: i64) {
        let cli = Cli::try_parse_from(["reconcile", "set", "dan", raw]).unwrap();
        match cli.command {
            Commands::Set(cmd) => assert_eq!(cmd.count, expected),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_set_rejects_non_numeric_count() {
        assert!(Cli::try_parse_from(["reconcile", "set", "dan", "two"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "reconcile",
            "status",
            "active",
            "--format",
            "json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_uppercase_keyword_is_a_student() {
        let cli = Cli::try_parse_from(["reconcile", "status", "ALL"]).unwrap();
        match cli.command {
            Commands::Status(cmd) => assert_eq!(
                cmd.selector,
                labfleet_reconcile::Selector::Student(labfleet_reconcile::StudentId::new_unchecked(
                    "ALL"
                ))
            ),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
