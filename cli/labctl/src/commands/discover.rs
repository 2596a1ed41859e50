//! Discover command - refresh the student roster from GitHub.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::discovery::{write_outputs, GithubClient, RosterEntry};
use crate::output::{print_info, print_output, print_success};

use super::CommandContext;

/// Discover command.
#[derive(Debug, Args)]
pub struct DiscoverCommand {
    /// Do not accept pending repository invitations.
    #[arg(long)]
    pub skip_invitations: bool,
}

impl DiscoverCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let settings = &ctx.config.discovery;
        let token = ctx.config.github_token()?;
        let client = GithubClient::new(
            &settings.github_api_url,
            token.as_deref(),
            ctx.config.request_timeout(),
        )?;

        if !self.skip_invitations {
            let accepted = client.accept_invitations().await?;
            if !accepted.is_empty() {
                print_info(&format!("Accepted {} invitations", accepted.len()));
            }
        }

        let entries = client.discover(&settings.bot_login).await?;
        write_outputs(&entries, &settings.roster_path, &settings.data_dir)?;

        let rows: Vec<RosterRow> = entries.iter().map(RosterRow::from).collect();
        print_output(&rows, ctx.format);

        let ready = entries.iter().filter(|e| e.is_ready()).count();
        print_success(&format!(
            "{} students found, {} ready; roster written to {}",
            entries.len(),
            ready,
            settings.roster_path.display()
        ));
        Ok(())
    }
}

#[derive(Debug, Serialize, Tabled)]
struct RosterRow {
    #[tabled(rename = "LOGIN")]
    login: String,
    #[tabled(rename = "REPOSITORY")]
    repository: String,
    #[tabled(rename = "PRIVATE")]
    private: bool,
    #[tabled(rename = "KEY")]
    key_added: bool,
    #[tabled(rename = "LAST PUSH")]
    pushed_at: String,
}

impl From<&RosterEntry> for RosterRow {
    fn from(entry: &RosterEntry) -> Self {
        Self {
            login: entry.login.clone(),
            repository: entry.repository.clone(),
            private: entry.private,
            key_added: entry.key_added,
            pushed_at: entry
                .pushed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}
