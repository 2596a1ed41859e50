//! VM record normalization.
//!
//! Turns raw backend instance records into [`Vm`] values. Anything that does
//! not match the expected shape is rejected here (returns `None`) rather
//! than failing somewhere inside reconciliation.
//!
//! A record is rejected when:
//! - it has no identifier,
//! - its owner (`description`) is absent or blank,
//! - it has no internal address yet, or the first one is empty or not IPv4.
//!
//! The last rule keeps VMs that are still booting invisible, so they are
//! neither counted nor duplicated until they report an address.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use labfleet_id::{InstanceId, StudentId};
use labfleet_networking::{AccessHint, AddressPlan};
use serde::Deserialize;
use tracing::debug;

/// A provisioned VM attributed to a student.
#[derive(Debug, Clone)]
pub struct Vm {
    /// Backend identifier.
    pub id: InstanceId,

    /// Display name as reported by the backend.
    pub name: String,

    /// Owning student (free-text on the backend, not validated upstream).
    pub owner: StudentId,

    /// First internal address.
    pub address: Ipv4Addr,

    /// Address other VMs of the same student allow traffic from.
    pub virtual_address: Ipv4Addr,

    /// Allowed address pairs currently configured on the VM's port.
    pub allowed_addresses: BTreeSet<Ipv4Addr>,

    /// The port also carries pairs that are not plain IPv4 host entries
    /// (IPv6, a wider prefix, or unparseable). Such a list is never in sync.
    pub foreign_pairs: bool,

    /// True once the keys-installed record names this VM's address.
    pub ready: bool,

    /// Public port hints. Presentation only.
    pub access: AccessHint,
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    internal_ips: Option<Vec<String>>,
    #[serde(default)]
    internal_ips_set: Option<Vec<RawInternalIp>>,
}

#[derive(Debug, Deserialize)]
struct RawInternalIp {
    #[serde(default)]
    allowed_address_pairs: Vec<RawAddressPair>,
}

#[derive(Debug, Deserialize)]
struct RawAddressPair {
    #[serde(default)]
    ip_address: Option<String>,
}

/// Normalizes raw instance records against one run's address plan and
/// keys-installed record.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    plan: AddressPlan,
    keys_installed: BTreeSet<Ipv4Addr>,
}

impl Normalizer {
    /// Create a normalizer.
    pub fn new(plan: AddressPlan, keys_installed: BTreeSet<Ipv4Addr>) -> Self {
        Self {
            plan,
            keys_installed,
        }
    }

    /// Normalize one record, or `None` if it is not attributable or has no address.
    pub fn normalize(&self, raw: &serde_json::Value) -> Option<Vm> {
        let record = RawInstance::deserialize(raw).ok()?;

        let id = InstanceId::parse(record.uuid.as_deref()?).ok()?;
        let owner = StudentId::parse(record.description.as_deref()?).ok()?;
        let first = record.internal_ips.as_ref()?.first()?;
        if first.is_empty() {
            return None;
        }
        let address: Ipv4Addr = first.parse().ok()?;

        let mut allowed_addresses = BTreeSet::new();
        let mut foreign_pairs = false;
        let pairs = record
            .internal_ips_set
            .iter()
            .flatten()
            .take(1)
            .flat_map(|ip| ip.allowed_address_pairs.iter());
        for pair in pairs {
            match pair.ip_address.as_deref().and_then(parse_pair_address) {
                Some(addr) => {
                    allowed_addresses.insert(addr);
                }
                None => foreign_pairs = true,
            }
        }
        if foreign_pairs {
            debug!(instance = %id, owner = %owner, "Instance carries foreign address pairs");
        }

        Some(Vm {
            name: record.name.unwrap_or_default(),
            virtual_address: self.plan.virtual_address(address),
            ready: self.keys_installed.contains(&address),
            access: self.plan.access_hint(address),
            id,
            owner,
            address,
            allowed_addresses,
            foreign_pairs,
        })
    }

    /// Normalize a listing, dropping rejected records.
    pub fn normalize_all(&self, raws: &[serde_json::Value]) -> Vec<Vm> {
        let vms: Vec<Vm> = raws.iter().filter_map(|raw| self.normalize(raw)).collect();
        debug!(
            records = raws.len(),
            accepted = vms.len(),
            rejected = raws.len() - vms.len(),
            "Normalized instance records"
        );
        vms
    }
}

// Pairs may be written as a host route ("192.168.100.12/32"). Any other
// prefix covers more than one address and does not count as a host entry.
fn parse_pair_address(raw: &str) -> Option<Ipv4Addr> {
    let host = match raw.split_once('/') {
        Some((host, "32")) => host,
        Some(_) => return None,
        None => raw,
    };
    host.trim().parse().ok()
}
