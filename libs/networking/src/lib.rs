//! Networking utilities for the lab fleet.
//!
//! This library provides helpers for:
//! - Deriving the virtual (allowed-pair) address of a VM from its internal address
//! - Public SSH/HTTP port hints derived from the host octet
//! - Parsing address prefixes and plain-text address lists

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid address prefix.
    #[error("invalid address prefix: {0}")]
    InvalidPrefix(String),

    /// Port base too high to fit every host octet.
    #[error("port base {0} overflows when offset by a host octet")]
    PortOverflow(u16),
}

// ============================================================================
// Address plan
// ============================================================================

/// Default prefix of the virtual (allowed-pair) network.
pub const DEFAULT_VIRTUAL_PREFIX: [u8; 3] = [192, 168, 100];

/// Default base for public SSH ports.
pub const DEFAULT_SSH_PORT_BASE: u16 = 22_000;

/// Default base for public HTTP ports.
pub const DEFAULT_HTTP_PORT_BASE: u16 = 8_000;

/// Public ports a VM is reachable on through the lab gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessHint {
    /// Forwarded SSH port.
    pub ssh_port: u16,

    /// Forwarded HTTP port.
    pub http_port: u16,
}

/// How internal addresses map to virtual addresses and public ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    virtual_prefix: [u8; 3],
    ssh_port_base: u16,
    http_port_base: u16,
}

impl Default for AddressPlan {
    fn default() -> Self {
        Self {
            virtual_prefix: DEFAULT_VIRTUAL_PREFIX,
            ssh_port_base: DEFAULT_SSH_PORT_BASE,
            http_port_base: DEFAULT_HTTP_PORT_BASE,
        }
    }
}

impl AddressPlan {
    /// Create a new plan.
    ///
    /// Both port bases must leave room for every host octet (`base + 255`).
    pub fn new(
        virtual_prefix: [u8; 3],
        ssh_port_base: u16,
        http_port_base: u16,
    ) -> Result<Self, NetworkError> {
        for base in [ssh_port_base, http_port_base] {
            if base.checked_add(u8::MAX as u16).is_none() {
                return Err(NetworkError::PortOverflow(base));
            }
        }

        Ok(Self {
            virtual_prefix,
            ssh_port_base,
            http_port_base,
        })
    }

    /// Prefix of the virtual network.
    pub fn virtual_prefix(&self) -> [u8; 3] {
        self.virtual_prefix
    }

    /// Derive the virtual address: same host octet, fixed prefix.
    pub fn virtual_address(&self, internal: Ipv4Addr) -> Ipv4Addr {
        let [a, b, c] = self.virtual_prefix;
        Ipv4Addr::new(a, b, c, host_octet(internal))
    }

    /// Public port hints for an internal address.
    pub fn access_hint(&self, internal: Ipv4Addr) -> AccessHint {
        let host = host_octet(internal) as u16;
        AccessHint {
            ssh_port: self.ssh_port_base + host,
            http_port: self.http_port_base + host,
        }
    }
}

/// The trailing octet of an address.
pub fn host_octet(addr: Ipv4Addr) -> u8 {
    addr.octets()[3]
}

/// Parse a dotted three-octet prefix (e.g. "192.168.100").
///
/// A trailing `.` or `.0` is accepted, so "192.168.100.0" parses the same.
pub fn parse_prefix(s: &str) -> Result<[u8; 3], NetworkError> {
    let invalid = || NetworkError::InvalidPrefix(s.to_string());

    let mut octets: Vec<&str> = s.trim().split('.').collect();
    if octets.len() == 4 && matches!(octets[3], "" | "0") {
        octets.pop();
    }
    if octets.len() != 3 {
        return Err(invalid());
    }

    let mut out = [0u8; 3];
    for (slot, raw) in out.iter_mut().zip(octets) {
        *slot = raw.parse::<u8>().map_err(|_| invalid())?;
    }
    Ok(out)
}

/// Parse one IPv4 address per line.
///
/// Blank lines and `#` comments are skipped. Any other unparseable line is an error.
pub fn parse_address_list(text: &str) -> Result<BTreeSet<Ipv4Addr>, NetworkError> {
    let mut out = BTreeSet::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let addr = Ipv4Addr::from_str(line)
            .map_err(|_| NetworkError::InvalidAddress(line.to_string()))?;
        out.insert(addr);
    }
    Ok(out)
}
