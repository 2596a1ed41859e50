//! Status command - show each selected student's VMs without changing anything.

use anyhow::Result;
use clap::Args;
use labfleet_reconcile::{QuotaPolicy, ReconcileError, Selector, StudentStatus};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::print_output;

use super::CommandContext;

/// Status command.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// `all`, `active`, `inactive` or a student login.
    #[arg(default_value = "all")]
    pub selector: Selector,

    /// Mark students whose VM count differs from this.
    #[arg(long, allow_negative_numbers = true)]
    pub desired: Option<i64>,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let desired =
            validated_desired(&ctx.config.quota_policy(), self.desired).map_err(CliError::from)?;

        let fleet = ctx.fleet()?;
        let snapshot = fleet.snapshot(ctx.roster()?).await.map_err(CliError::from)?;

        let rows: Vec<StatusRow> = snapshot
            .status(&self.selector)
            .iter()
            .map(|status| StatusRow::from_status(status, desired))
            .collect();

        print_output(&rows, ctx.format);
        Ok(())
    }
}

/// `--desired` follows the same bounds as `set`.
fn validated_desired(
    policy: &QuotaPolicy,
    desired: Option<i64>,
) -> Result<Option<u32>, ReconcileError> {
    desired.map(|d| policy.validate(d)).transpose()
}

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "STUDENT")]
    student: String,
    #[tabled(rename = "ACTIVITY")]
    activity: String,
    #[tabled(rename = "REPO")]
    repo: String,
    #[tabled(rename = "VMS")]
    vms: usize,
    #[tabled(rename = "READY")]
    ready: usize,
    #[tabled(rename = "ADDRESSES")]
    addresses: String,
    #[tabled(rename = "SSH PORTS")]
    ssh_ports: String,
    #[tabled(rename = "ALLOW-LIST")]
    allow_list: String,
    #[tabled(rename = "CONVERGED")]
    converged: String,
}

impl StatusRow {
    fn from_status(status: &StudentStatus, desired: Option<u32>) -> Self {
        let join = |items: Vec<String>| {
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join(",")
            }
        };

        Self {
            student: status.student.to_string(),
            activity: status
                .activity
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            repo: match status.repo_ready {
                Some(true) => "ready",
                Some(false) => "not ready",
                None => "-",
            }
            .to_string(),
            vms: status.vm_count(),
            ready: status.ready_count(),
            addresses: join(status.vms.iter().map(|vm| vm.address.to_string()).collect()),
            ssh_ports: join(
                status
                    .vms
                    .iter()
                    .map(|vm| vm.access.ssh_port.to_string())
                    .collect(),
            ),
            allow_list: if status.allow_lists_synced {
                "synced"
            } else {
                "stale"
            }
            .to_string(),
            converged: match desired {
                Some(d) if status.is_converged(d) => "yes".to_string(),
                Some(_) => "no".to_string(),
                None => "-".to_string(),
            },
        }
    }
}
