//! Sync-network command - align every VM's allow-list with its siblings.

use anyhow::Result;
use clap::Args;

use crate::error::CliError;

use super::{finish, outcome_printer, CommandContext};

/// Sync-network command.
#[derive(Debug, Args)]
pub struct SyncNetworkCommand {}

impl SyncNetworkCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let fleet = ctx.fleet()?;
        let roster = ctx.roster()?;

        let report = fleet
            .sync_network(roster, outcome_printer(ctx.format))
            .await
            .map_err(CliError::from)?;

        finish(&report, ctx.format)
    }
}
