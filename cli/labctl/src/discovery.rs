//! Discovery: which students exist, whether they are set up, and whether
//! they are active.
//!
//! `discover` talks to GitHub and writes the roster file; every other
//! command only reads that file plus the keys-installed record. Activity is
//! decided here from the last push time, never by the reconciler.

use std::collections::BTreeSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use labfleet_reconcile::{Activity, KnownStudent, Roster, StudentId};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DiscoverySettings;
use crate::error::CliError;

/// Students list written next to the roster.
pub const STUDENTS_FILE: &str = "students-with-github-set-up.txt";

/// Ready repositories list written next to the roster.
pub const REPOS_FILE: &str = "github-repos.txt";

/// One student repository as recorded in the roster file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub login: String,

    /// Repository full name (`owner/name`).
    pub repository: String,

    #[serde(default)]
    pub url: Option<String>,

    pub private: bool,

    pub key_added: bool,

    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

impl RosterEntry {
    /// Private repository and a published SSH key.
    pub fn is_ready(&self) -> bool {
        self.private && self.key_added
    }

    /// Active if the last push is within `window` of `now`.
    pub fn activity(&self, now: DateTime<Utc>, window: chrono::Duration) -> Activity {
        match self.pushed_at {
            Some(pushed_at) if now - pushed_at <= window => Activity::Active,
            _ => Activity::Inactive,
        }
    }

    fn to_known(&self, now: DateTime<Utc>, window: chrono::Duration) -> Option<KnownStudent> {
        let id = StudentId::parse(&self.login).ok()?;
        Some(KnownStudent {
            id,
            activity: self.activity(now, window),
            repo_ready: self.is_ready(),
        })
    }
}

/// Parse roster JSON into entries.
pub fn parse_roster(contents: &str) -> Result<Vec<RosterEntry>> {
    serde_json::from_str(contents).context("Roster is not a list of repository entries")
}

/// Build the run's roster from the roster file and the keys-installed record.
///
/// A missing file yields an empty roster or an empty key set, so the tool
/// keeps working before the first discovery run.
pub fn load_roster(settings: &DiscoverySettings, now: DateTime<Utc>) -> Result<Roster> {
    let entries = match fs::read_to_string(&settings.roster_path) {
        Ok(contents) => parse_roster(&contents)
            .with_context(|| format!("Failed to parse roster {:?}", settings.roster_path))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = ?settings.roster_path, "Roster file not found; no students known");
            Vec::new()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {:?}", settings.roster_path))
        }
    };

    let keys_installed = load_keys_installed(&settings.keys_installed_path)?;
    let window = chrono::Duration::days(settings.activity_window_days);
    let students = entries.iter().filter_map(|e| e.to_known(now, window));

    Ok(Roster::new(students, keys_installed))
}

fn load_keys_installed(path: &Path) -> Result<BTreeSet<Ipv4Addr>> {
    match fs::read_to_string(path) {
        Ok(contents) => labfleet_networking::parse_address_list(&contents)
            .with_context(|| format!("Failed to parse {:?}", path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = ?path, "Keys-installed record not found");
            Ok(BTreeSet::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}

/// Write the roster JSON plus the plain-text student and repository lists.
pub fn write_outputs(entries: &[RosterEntry], roster_path: &Path, data_dir: &Path) -> Result<()> {
    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| a.login.cmp(&b.login));

    if let Some(parent) = roster_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(data_dir)?;

    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(roster_path, json + "\n")
        .with_context(|| format!("Failed to write {:?}", roster_path))?;

    let logins: Vec<&str> = entries.iter().map(|e| e.login.as_str()).collect();
    fs::write(data_dir.join(STUDENTS_FILE), logins.join("\n") + "\n")?;

    let ready: Vec<&str> = entries
        .iter()
        .filter(|e| e.is_ready())
        .map(|e| e.repository.as_str())
        .collect();
    fs::write(data_dir.join(REPOS_FILE), ready.join("\n") + "\n")?;

    Ok(())
}

// ============================================================================
// GitHub
// ============================================================================

#[derive(Debug, Deserialize)]
struct Invitation {
    id: u64,
    repository: InvitationRepo,
}

#[derive(Debug, Deserialize)]
struct InvitationRepo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    full_name: String,
    html_url: String,
    private: bool,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
    owner: GithubOwner,
}

#[derive(Debug, Deserialize)]
struct GithubOwner {
    login: String,
    html_url: String,
}

/// Minimal GitHub client for the course bot account.
pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
}

impl GithubClient {
    /// Create a new client. The token, if any, is sent with every request.
    pub fn new(api_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("labfleet"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("token {}", token))
                    .context("Invalid token format")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CliError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CliError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Accept every pending repository invitation. Returns the repositories joined.
    pub async fn accept_invitations(&self) -> Result<Vec<String>> {
        let invitations: Vec<Invitation> =
            self.get_json(&self.url("/user/repository_invitations")).await?;

        let mut accepted = Vec::new();
        for invitation in invitations {
            let url = self.url(&format!("/user/repository_invitations/{}", invitation.id));
            let response = self.client.patch(&url).send().await?;
            if response.status().is_success() {
                info!(repository = %invitation.repository.full_name, "Accepted invitation");
                accepted.push(invitation.repository.full_name);
            } else {
                warn!(
                    repository = %invitation.repository.full_name,
                    status = %response.status(),
                    "Failed to accept invitation"
                );
            }
        }
        Ok(accepted)
    }

    /// Whether `{owner_url}.keys` lists at least one SSH key.
    async fn has_ssh_key(&self, owner_url: &str) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}.keys", owner_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body = response.text().await?;
        Ok(body.starts_with("ssh-"))
    }

    /// List student repositories visible to the bot, skipping its own.
    pub async fn discover(&self, bot_login: &str) -> Result<Vec<RosterEntry>> {
        let repos: Vec<GithubRepo> = self.get_json(&self.url("/user/repos")).await?;

        let mut entries = Vec::new();
        for repo in repos {
            if repo.owner.login == bot_login {
                continue;
            }
            let key_added = self.has_ssh_key(&repo.owner.html_url).await?;
            debug!(
                login = %repo.owner.login,
                private = repo.private,
                key_added,
                "Checked repository"
            );
            entries.push(RosterEntry {
                login: repo.owner.login,
                repository: repo.full_name,
                url: Some(repo.html_url),
                private: repo.private,
                key_added,
                pushed_at: repo.pushed_at,
            });
        }

        entries.sort_by(|a, b| a.login.cmp(&b.login));
        Ok(entries)
    }
}
