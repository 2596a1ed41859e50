//! Report command - write the plain-text VM listing.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::error::CliError;
use crate::output::print_success;
use crate::report::write_vms;

use super::CommandContext;

/// Report command.
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Output directory (defaults to `report.output_dir`).
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl ReportCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let fleet = ctx.fleet()?;
        let snapshot = fleet.snapshot(ctx.roster()?).await.map_err(CliError::from)?;

        let dir = self
            .output_dir
            .unwrap_or_else(|| ctx.config.report.output_dir.clone());
        let path = write_vms(snapshot.index(), &dir)?;

        print_success(&format!(
            "Wrote {} VMs of {} students to {}",
            snapshot.index().vm_count(),
            snapshot.index().len(),
            path.display()
        ));
        Ok(())
    }
}
