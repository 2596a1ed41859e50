//! In-memory provisioning backend.
//!
//! [`FakeGateway`] behaves like the cloud backend as far as the reconciler
//! can tell: it lists raw instance records, applies creates, deletes and
//! allow-list updates immediately, and records every call. Failures can be
//! injected per call kind or per instance/name.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use labfleet_id::InstanceId;
use labfleet_reconcile::{Gateway, GatewayError, ProvisionSpec};
use serde_json::json;
use tracing::debug;

/// A gateway call, as recorded by [`FakeGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create { owner: String, name: String },
    Delete(String),
    UpdateAllowList { id: String, addresses: Vec<Ipv4Addr> },
}

/// One instance held by the fake backend.
#[derive(Debug, Clone)]
pub struct FakeInstance {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub address: Option<Ipv4Addr>,
    pub allowed: Vec<Ipv4Addr>,
    /// Pair entries that are not IPv4 host addresses, kept verbatim.
    pub foreign_pairs: Vec<String>,
}

impl FakeInstance {
    fn to_record(&self) -> serde_json::Value {
        let internal_ips: Vec<String> = self.address.iter().map(ToString::to_string).collect();
        let pairs: Vec<serde_json::Value> = self
            .allowed
            .iter()
            .map(ToString::to_string)
            .chain(self.foreign_pairs.iter().cloned())
            .map(|entry| json!({ "ip_address": entry }))
            .collect();
        json!({
            "uuid": self.uuid,
            "name": self.name,
            "description": self.description,
            "internal_ips": internal_ips,
            "internal_ips_set": [{ "allowed_address_pairs": pairs }],
        })
    }
}

#[derive(Debug, Default)]
struct State {
    instances: Vec<FakeInstance>,
    extra_records: Vec<serde_json::Value>,
    calls: Vec<Call>,
    next_uuid: u32,
    next_host: u8,
    fail_list: bool,
    fail_creates: BTreeSet<String>,
    fail_deletes: BTreeSet<String>,
    fail_updates: BTreeSet<String>,
    boot_pending: bool,
}

/// In-memory provisioning backend.
#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<State>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    /// Create an empty backend. New VMs get addresses from `192.168.42.100` up.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_host: 100,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an instance with an address in `192.168.42.0/24`.
    pub fn with_instance(self, uuid: &str, owner: &str, host: u8) -> Self {
        self.state().instances.push(FakeInstance {
            uuid: uuid.to_string(),
            name: format!("{}-{}", owner, uuid),
            description: owner.to_string(),
            address: Some(Ipv4Addr::new(192, 168, 42, host)),
            allowed: Vec::new(),
            foreign_pairs: Vec::new(),
        });
        self
    }

    /// Seed an instance that has no address yet.
    pub fn with_booting_instance(self, uuid: &str, owner: &str) -> Self {
        self.state().instances.push(FakeInstance {
            uuid: uuid.to_string(),
            name: format!("{}-{}", owner, uuid),
            description: owner.to_string(),
            address: None,
            allowed: Vec::new(),
            foreign_pairs: Vec::new(),
        });
        self
    }

    /// Add an allowed-address-pair entry to a seeded instance. Entries that
    /// are not plain IPv4 addresses are reported verbatim.
    pub fn with_pair(self, uuid: &str, entry: &str) -> Self {
        if let Some(instance) = self.state().instances.iter_mut().find(|i| i.uuid == uuid) {
            match entry.parse() {
                Ok(address) => instance.allowed.push(address),
                Err(_) => instance.foreign_pairs.push(entry.to_string()),
            }
        }
        self
    }

    /// Seed a raw record returned verbatim by `list_instances`.
    pub fn with_raw_record(self, record: serde_json::Value) -> Self {
        self.state().extra_records.push(record);
        self
    }

    /// Make `list_instances` fail.
    pub fn failing_list(self) -> Self {
        self.state().fail_list = true;
        self
    }

    /// Make creates of the given display name fail.
    pub fn failing_create(self, name: &str) -> Self {
        self.state().fail_creates.insert(name.to_string());
        self
    }

    /// Make deletes of the given instance fail.
    pub fn failing_delete(self, uuid: &str) -> Self {
        self.state().fail_deletes.insert(uuid.to_string());
        self
    }

    /// Make allow-list updates of the given instance fail.
    pub fn failing_update(self, uuid: &str) -> Self {
        self.state().fail_updates.insert(uuid.to_string());
        self
    }

    /// New instances stay without an address until [`FakeGateway::boot_all`].
    pub fn with_slow_boot(self) -> Self {
        self.state().boot_pending = true;
        self
    }

    /// Assign addresses to every instance that has none.
    pub fn boot_all(&self) {
        let mut state = self.state();
        let mut next = state.next_host;
        for instance in state.instances.iter_mut().filter(|i| i.address.is_none()) {
            instance.address = Some(Ipv4Addr::new(192, 168, 42, next));
            next = next.wrapping_add(1);
        }
        state.next_host = next;
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Recorded calls other than `List`.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List))
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Current instances.
    pub fn instances(&self) -> Vec<FakeInstance> {
        self.state().instances.clone()
    }

    /// Instances owned by a student.
    pub fn instances_of(&self, owner: &str) -> Vec<FakeInstance> {
        self.instances()
            .into_iter()
            .filter(|i| i.description == owner)
            .collect()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn list_instances(&self) -> Result<Vec<serde_json::Value>, GatewayError> {
        let mut state = self.state();
        state.calls.push(Call::List);
        if state.fail_list {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        let mut records: Vec<_> = state.instances.iter().map(FakeInstance::to_record).collect();
        records.extend(state.extra_records.iter().cloned());
        Ok(records)
    }

    async fn create_instance(&self, spec: &ProvisionSpec) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.push(Call::Create {
            owner: spec.owner.to_string(),
            name: spec.name.clone(),
        });
        if state.fail_creates.contains(&spec.name) {
            return Err(GatewayError::Api {
                status: 400,
                body: format!("quota exceeded for {}", spec.name),
            });
        }

        state.next_uuid += 1;
        let uuid = format!("fake-{:04}", state.next_uuid);
        let address = if state.boot_pending {
            None
        } else {
            let host = state.next_host;
            state.next_host = host.wrapping_add(1);
            Some(Ipv4Addr::new(192, 168, 42, host))
        };
        debug!(uuid = %uuid, name = %spec.name, "[FAKE] Created instance");

        state.instances.push(FakeInstance {
            uuid,
            name: spec.name.clone(),
            description: spec.owner.to_string(),
            address,
            allowed: Vec::new(),
            foreign_pairs: Vec::new(),
        });
        Ok(())
    }

    async fn force_delete_instance(&self, id: &InstanceId) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.push(Call::Delete(id.to_string()));
        if state.fail_deletes.contains(id.as_str()) {
            return Err(GatewayError::Timeout(std::time::Duration::from_secs(30)));
        }
        let before = state.instances.len();
        state.instances.retain(|i| i.uuid != id.as_str());
        if state.instances.len() == before {
            return Err(GatewayError::Api {
                status: 404,
                body: format!("instance {} not found", id),
            });
        }
        Ok(())
    }

    async fn update_allowed_address_pairs(
        &self,
        id: &InstanceId,
        addresses: &[Ipv4Addr],
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.push(Call::UpdateAllowList {
            id: id.to_string(),
            addresses: addresses.to_vec(),
        });
        if state.fail_updates.contains(id.as_str()) {
            return Err(GatewayError::Api {
                status: 409,
                body: "port busy".to_string(),
            });
        }
        match state.instances.iter_mut().find(|i| i.uuid == id.as_str()) {
            Some(instance) => {
                // Backends do not promise to preserve order.
                let mut allowed = addresses.to_vec();
                allowed.reverse();
                instance.allowed = allowed;
                instance.foreign_pairs.clear();
                Ok(())
            }
            None => Err(GatewayError::Api {
                status: 404,
                body: format!("instance {} not found", id),
            }),
        }
    }
}
