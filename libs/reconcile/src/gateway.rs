//! Provisioning gateway interface.
//!
//! The gateway is the only component that performs network I/O. Every call
//! is fire-and-confirm: `Ok(())` means the backend accepted the request,
//! not that the VM exists or is gone. Bounding call latency is the
//! gateway's job; a timeout surfaces as [`GatewayError::Timeout`].

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use labfleet_id::{InstanceId, StudentId};
use thiserror::Error;

/// Errors returned by a provisioning gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No response within the gateway's own deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// What the core needs to ask for a new VM.
///
/// Image, flavor and network references are the gateway's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSpec {
    /// Owning student, written to the instance description.
    pub owner: StudentId,

    /// Display name, `{owner}-{slot}`.
    pub name: String,

    /// 1-based per-student sequence number.
    pub slot: u32,
}

impl ProvisionSpec {
    /// Build the spec for a student's slot.
    pub fn for_slot(owner: StudentId, slot: u32) -> Self {
        let name = format!("{}-{}", owner, slot);
        Self { owner, name, slot }
    }
}

/// Provisioning backend interface.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// List every instance in the configured project as raw records.
    async fn list_instances(&self) -> Result<Vec<serde_json::Value>, GatewayError>;

    /// Request a new instance.
    async fn create_instance(&self, spec: &ProvisionSpec) -> Result<(), GatewayError>;

    /// Destroy an instance together with its volumes.
    async fn force_delete_instance(&self, id: &InstanceId) -> Result<(), GatewayError>;

    /// Replace the allowed address pairs of an instance's port.
    async fn update_allowed_address_pairs(
        &self,
        id: &InstanceId,
        addresses: &[Ipv4Addr],
    ) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_spec_name() {
        let spec = ProvisionSpec::for_slot(StudentId::new_unchecked("eve"), 2);
        assert_eq!(spec.name, "eve-2");
        assert_eq!(spec.slot, 2);
    }
}
