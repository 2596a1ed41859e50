//! Configuration loading.
//!
//! Settings come from a TOML file (the `--config` path, else `config.toml`
//! in the platform config directory, else built-in defaults). A few fields
//! may be overridden from the environment:
//! - `LABFLEET_API_URL`
//! - `LABFLEET_API_TOKEN`
//! - `LABFLEET_PROJECT`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use labfleet_reconcile::{AddressPlan, ApplyConfig, QuotaPolicy, DEFAULT_MAX_VMS};
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.toml";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("ee", "labfleet", "labfleet")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSettings,
    pub provision: ProvisionSettings,
    pub quota: QuotaSettings,
    pub network: NetworkSettings,
    pub apply: ApplySettings,
    pub discovery: DiscoverySettings,
    pub report: ReportSettings,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

/// Provisioning API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL, e.g. `https://api.etais.ee/api`.
    pub url: String,

    /// API token. Prefer `token_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// File whose first line is the API token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    /// Project UUID the lab VMs live in.
    pub project: String,

    /// Per-request deadline in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: "https://api.etais.ee/api".to_string(),
            token: None,
            token_file: Some(PathBuf::from("/root/.waldur-api-token")),
            project: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Opaque references copied into every create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    pub offering: String,
    pub image: String,
    pub flavor: String,
    pub ssh_public_key: String,
    pub security_groups: Vec<String>,
    pub subnet: String,
    pub system_volume_size: u64,
    pub system_volume_type: String,
    pub data_volume_type: String,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            offering: String::new(),
            image: String::new(),
            flavor: String::new(),
            ssh_public_key: String::new(),
            security_groups: Vec::new(),
            subnet: String::new(),
            system_volume_size: 10240,
            system_volume_type: String::new(),
            data_volume_type: String::new(),
        }
    }
}

/// Quota bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub max_vms: u32,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            max_vms: DEFAULT_MAX_VMS,
        }
    }
}

/// Address plan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub virtual_prefix: String,
    pub ssh_port_base: u16,
    pub http_port_base: u16,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            virtual_prefix: "192.168.100".to_string(),
            ssh_port_base: labfleet_networking::DEFAULT_SSH_PORT_BASE,
            http_port_base: labfleet_networking::DEFAULT_HTTP_PORT_BASE,
        }
    }
}

/// Apply pacing and concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySettings {
    pub pacing_ms: u64,
    pub max_concurrent_students: usize,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            pacing_ms: 2000,
            max_concurrent_students: 1,
        }
    }
}

/// Discovery inputs and GitHub access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Roster JSON written by `discover`.
    pub roster_path: PathBuf,

    /// One address per line: VMs with the course key installed.
    pub keys_installed_path: PathBuf,

    /// Students who pushed within this many days are active.
    pub activity_window_days: i64,

    pub github_api_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token_file: Option<PathBuf>,

    /// The bot account; its own repositories are skipped.
    pub bot_login: String,

    /// Where `discover` writes its plain-text lists.
    pub data_dir: PathBuf,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            roster_path: PathBuf::from("/opt/labfleet/data/roster.json"),
            keys_installed_path: PathBuf::from("/opt/labfleet/data/keys-installed.txt"),
            activity_window_days: 14,
            github_api_url: "https://api.github.com".to_string(),
            github_token_file: Some(PathBuf::from("/root/.github-api-token")),
            bot_login: "ica0002-bot".to_string(),
            data_dir: PathBuf::from("/opt/labfleet/data"),
        }
    }
}

/// Report output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/opt/labfleet/pub"),
        }
    }
}

impl Config {
    /// Load config from `path`, or the default location, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_dir()?.join(CONFIG_FILE),
        };

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config from {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse config text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("LABFLEET_API_URL") {
            self.api.url = url;
        }
        if let Ok(token) = std::env::var("LABFLEET_API_TOKEN") {
            self.api.token = Some(token);
        }
        if let Ok(project) = std::env::var("LABFLEET_PROJECT") {
            self.api.project = project;
        }
    }

    /// Resolve the API token: inline value first, else the token file.
    pub fn api_token(&self) -> Result<String> {
        if let Some(token) = &self.api.token {
            return Ok(token.trim().to_string());
        }
        match &self.api.token_file {
            Some(path) => read_token_file(path),
            None => anyhow::bail!("No API token configured. Set api.token_file or LABFLEET_API_TOKEN."),
        }
    }

    /// Resolve the GitHub token, if one is configured.
    pub fn github_token(&self) -> Result<Option<String>> {
        self.discovery
            .github_token_file
            .as_deref()
            .map(read_token_file)
            .transpose()
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy::new(self.quota.max_vms)
    }

    pub fn address_plan(&self) -> Result<AddressPlan> {
        let prefix = labfleet_networking::parse_prefix(&self.network.virtual_prefix)
            .context("Invalid network.virtual_prefix")?;
        AddressPlan::new(
            prefix,
            self.network.ssh_port_base,
            self.network.http_port_base,
        )
        .context("Invalid network port bases")
    }

    pub fn apply_config(&self) -> ApplyConfig {
        ApplyConfig {
            pacing: Duration::from_millis(self.apply.pacing_ms),
            max_concurrent_students: self.apply.max_concurrent_students,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}

/// Read the first line of a token file.
fn read_token_file(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read token from {:?}", path))?;
    let token = contents.lines().next().unwrap_or_default().trim().to_string();
    if token.is_empty() {
        anyhow::bail!("Token file {:?} is empty", path);
    }
    Ok(token)
}
