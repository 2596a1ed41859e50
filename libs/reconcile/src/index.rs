//! Student grouping index.
//!
//! Groups normalized VMs by owner and merges in students known from
//! discovery, so a student with no VMs still has an (empty) entry and can
//! be given a first VM.

use std::collections::BTreeMap;

use labfleet_id::StudentId;

use crate::vm::Vm;

/// VMs grouped by owning student, iterated in lexicographic student order.
#[derive(Debug, Clone, Default)]
pub struct FleetIndex {
    groups: BTreeMap<StudentId, Vec<Vm>>,
}

impl FleetIndex {
    /// Build the index.
    ///
    /// Every VM owner becomes a key even if discovery does not know it; every
    /// known student becomes a key even with zero VMs. VM order within a
    /// group follows the input order.
    pub fn build<V, K>(vms: V, known: K) -> Self
    where
        V: IntoIterator<Item = Vm>,
        K: IntoIterator<Item = StudentId>,
    {
        let mut groups: BTreeMap<StudentId, Vec<Vm>> = BTreeMap::new();

        for student in known {
            groups.entry(student).or_default();
        }
        for vm in vms {
            groups.entry(vm.owner.clone()).or_default().push(vm);
        }

        Self { groups }
    }

    /// VMs owned by a student; empty if the student is not indexed.
    pub fn vms(&self, student: &StudentId) -> &[Vm] {
        self.groups.get(student).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the student has an entry.
    pub fn contains(&self, student: &StudentId) -> bool {
        self.groups.contains_key(student)
    }

    /// Indexed students in lexicographic order.
    pub fn students(&self) -> impl Iterator<Item = &StudentId> {
        self.groups.keys()
    }

    /// Iterate `(student, vms)` in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&StudentId, &[Vm])> {
        self.groups.iter().map(|(s, vms)| (s, vms.as_slice()))
    }

    /// Number of indexed students.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if no student is indexed.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of VMs across all students.
    pub fn vm_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
