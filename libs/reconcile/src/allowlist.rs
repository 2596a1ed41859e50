//! Network allow-list synchronizer.
//!
//! Every VM should allow traffic from the virtual addresses of its owner's
//! other VMs. The VM's own virtual address is not included. Comparison is
//! set-based, so the order the backend reports pairs in never triggers an
//! update, and a VM whose siblings are gone is shrunk to an empty list. A
//! port that carries pairs other than IPv4 host entries is always rewritten.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::action::Action;
use crate::index::FleetIndex;
use crate::vm::Vm;

/// Addresses `vm` should allow, given all VMs of its owner.
pub fn expected_allow_list(vm: &Vm, group: &[Vm]) -> BTreeSet<Ipv4Addr> {
    group
        .iter()
        .filter(|sibling| sibling.id != vm.id)
        .map(|sibling| sibling.virtual_address)
        .collect()
}

/// Whether `vm`'s port already holds exactly the expected pairs.
pub fn allow_list_in_sync(vm: &Vm, group: &[Vm]) -> bool {
    !vm.foreign_pairs && expected_allow_list(vm, group) == vm.allowed_addresses
}

/// One update per VM whose current allow-list differs from the expected one.
pub fn plan_allow_lists(index: &FleetIndex) -> Vec<Action> {
    let mut actions = Vec::new();

    for (student, group) in index.iter() {
        for vm in group {
            let expected = expected_allow_list(vm, group);
            if !vm.foreign_pairs && expected == vm.allowed_addresses {
                continue;
            }

            debug!(
                student = %student,
                instance = %vm.id,
                current = vm.allowed_addresses.len(),
                expected = expected.len(),
                foreign = vm.foreign_pairs,
                "Allow-list out of sync"
            );
            actions.push(Action::UpdateAllowList {
                student: student.clone(),
                instance: vm.id.clone(),
                addresses: expected.into_iter().collect(),
            });
        }
    }

    actions
}
