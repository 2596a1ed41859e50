//! HTTP provisioning gateway for a Waldur-style marketplace API.
//!
//! Endpoints used:
//! - `GET  /openstacktenant-instances/?project={project}`
//! - `POST /marketplace-cart-items/` then `POST /marketplace-cart-items/submit/`
//! - `DELETE /openstacktenant-instances/{id}/force_destroy/`
//! - `POST /openstacktenant-instances/{id}/update_allowed_address_pairs/`

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use labfleet_reconcile::{Gateway, GatewayError, InstanceId, ProvisionSpec};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::config::{Config, ProvisionSettings};

/// Everything the gateway needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: String,
    pub project: String,
    pub timeout: Duration,
    pub provision: ProvisionSettings,
}

impl GatewayConfig {
    /// Build from CLI config, resolving the token.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.api.project.is_empty() {
            anyhow::bail!("No project configured. Set api.project or LABFLEET_PROJECT.");
        }
        Ok(Self {
            base_url: config.api.url.trim_end_matches('/').to_string(),
            token: config.api_token()?,
            project: config.api.project.clone(),
            timeout: config.request_timeout(),
            provision: config.provision.clone(),
        })
    }
}

/// Provisioning gateway backed by the marketplace REST API.
#[derive(Debug, Clone)]
pub struct WaldurGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Serialize)]
struct AddressPair {
    ip_address: String,
}

impl WaldurGateway {
    /// Create a new gateway.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("token {}", config.token))
                .context("Invalid token format")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// URL reference to a resource, as the API expects in payloads.
    fn resource(&self, kind: &str, uuid: &str) -> String {
        self.url(&format!("/{}/{}/", kind, uuid))
    }

    fn create_payload(&self, spec: &ProvisionSpec) -> serde_json::Value {
        let p = &self.config.provision;
        let security_groups: Vec<_> = p
            .security_groups
            .iter()
            .map(|uuid| json!({ "url": self.resource("openstacktenant-security-groups", uuid) }))
            .collect();

        json!({
            "offering": self.resource("marketplace-offerings", &p.offering),
            "project": self.resource("projects", &self.config.project),
            "attributes": {
                "name": spec.name,
                "description": spec.owner.as_str(),
                "image": self.resource("openstacktenant-images", &p.image),
                "flavor": self.resource("openstacktenant-flavors", &p.flavor),
                "ssh_public_key": self.resource("keys", &p.ssh_public_key),
                "security_groups": security_groups,
                "internal_ips_set": [
                    { "subnet": self.resource("openstacktenant-subnets", &p.subnet) }
                ],
                "floating_ips": [],
                "system_volume_size": p.system_volume_size,
                "system_volume_type": self.resource("openstacktenant-volume-types", &p.system_volume_type),
                "data_volume_type": self.resource("openstacktenant-volume-types", &p.data_volume_type),
            }
        })
    }

    fn map_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.check(response).await.map(|_| ())
    }
}

#[async_trait]
impl Gateway for WaldurGateway {
    async fn list_instances(&self) -> Result<Vec<serde_json::Value>, GatewayError> {
        let url = self.url("/openstacktenant-instances/");
        debug!(url = %url, project = %self.config.project, "Listing instances");

        let response = self
            .client
            .get(&url)
            .query(&[("project", self.config.project.as_str())])
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let response = self.check(response).await?;

        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn create_instance(&self, spec: &ProvisionSpec) -> Result<(), GatewayError> {
        debug!(name = %spec.name, owner = %spec.owner, "Ordering instance");

        self.post("/marketplace-cart-items/", &self.create_payload(spec))
            .await?;
        let submit = json!({ "project": self.resource("projects", &self.config.project) });
        self.post("/marketplace-cart-items/submit/", &submit).await
    }

    async fn force_delete_instance(&self, id: &InstanceId) -> Result<(), GatewayError> {
        let url = self.url(&format!("/openstacktenant-instances/{}/force_destroy/", id));
        debug!(url = %url, "Force-deleting instance");

        let response = self
            .client
            .delete(&url)
            .query(&[("delete_volumes", "true"), ("release_floating_ips", "true")])
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.check(response).await.map(|_| ())
    }

    async fn update_allowed_address_pairs(
        &self,
        id: &InstanceId,
        addresses: &[Ipv4Addr],
    ) -> Result<(), GatewayError> {
        let pairs: Vec<AddressPair> = addresses
            .iter()
            .map(|addr| AddressPair {
                ip_address: addr.to_string(),
            })
            .collect();
        let body = json!({
            "subnet": self.resource("openstacktenant-subnets", &self.config.provision.subnet),
            "allowed_address_pairs": pairs,
        });

        self.post(
            &format!("/openstacktenant-instances/{}/update_allowed_address_pairs/", id),
            &body,
        )
        .await
    }
}
