//! Set command - converge selected students to a VM count.

use anyhow::Result;
use clap::Args;
use labfleet_reconcile::Selector;
use tracing::info;

use crate::error::CliError;

use super::{finish, outcome_printer, CommandContext};

/// Set command.
#[derive(Debug, Args)]
pub struct SetCommand {
    /// `all`, `active`, `inactive` or a student login.
    pub selector: Selector,

    /// Desired number of VMs per student.
    #[arg(allow_negative_numbers = true)]
    pub count: i64,
}

impl SetCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        // Checked before any configuration or network access.
        ctx.config
            .quota_policy()
            .validate(self.count)
            .map_err(CliError::from)?;

        let fleet = ctx.fleet()?;
        let roster = ctx.roster()?;
        info!(selector = ?self.selector, desired = self.count, "Setting VM count");

        let report = fleet
            .reconcile_quota(roster, &self.selector, self.count, outcome_printer(ctx.format))
            .await
            .map_err(CliError::from)?;

        finish(&report, ctx.format)
    }
}
