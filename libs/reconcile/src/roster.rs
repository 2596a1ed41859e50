//! Discovery roster: who the students are, as seen this run.
//!
//! Activity and repository readiness are computed by the discovery source;
//! the core only reads them.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use labfleet_id::StudentId;
use serde::{Deserialize, Serialize};

/// Whether a student has been working recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Active,
    Inactive,
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

/// A student known from discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownStudent {
    pub id: StudentId,
    pub activity: Activity,

    /// Repository is private and the owner's SSH key is published.
    pub repo_ready: bool,
}

/// Read-only discovery snapshot for one run.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    students: BTreeMap<StudentId, KnownStudent>,
    keys_installed: BTreeSet<Ipv4Addr>,
}

impl Roster {
    /// Build a roster. A student listed twice keeps the last entry.
    pub fn new(
        students: impl IntoIterator<Item = KnownStudent>,
        keys_installed: BTreeSet<Ipv4Addr>,
    ) -> Self {
        let students = students
            .into_iter()
            .map(|student| (student.id.clone(), student))
            .collect();
        Self {
            students,
            keys_installed,
        }
    }

    /// Look up a student.
    pub fn get(&self, id: &StudentId) -> Option<&KnownStudent> {
        self.students.get(id)
    }

    /// Known students in lexicographic order.
    pub fn students(&self) -> impl Iterator<Item = &KnownStudent> {
        self.students.values()
    }

    /// Identities of known students.
    pub fn ids(&self) -> impl Iterator<Item = &StudentId> {
        self.students.keys()
    }

    /// Addresses of VMs that have the course key installed.
    pub fn keys_installed(&self) -> &BTreeSet<Ipv4Addr> {
        &self.keys_installed
    }
}
