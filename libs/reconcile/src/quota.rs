//! Quota reconciler.
//!
//! Given a student's current VMs and a desired count, emit the minimal
//! ordered list of deletes or creates that converges the count.
//!
//! - `actual > desired`: delete the VMs at positions `[desired, actual)` in
//!   listing order. No attempt is made to pick the oldest or least active.
//! - `actual < desired`: create slots `actual + 1 ..= desired`.
//! - `actual == desired`: nothing.
//!
//! A single request only grows or only shrinks, so deletes and creates
//! never appear together.

use labfleet_id::StudentId;
use tracing::debug;

use crate::action::Action;
use crate::error::ReconcileError;
use crate::vm::Vm;

/// Maximum VMs per student in the default policy.
pub const DEFAULT_MAX_VMS: u32 = 3;

/// Bounds on the desired VM count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    max: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX_VMS,
        }
    }
}

impl QuotaPolicy {
    /// Create a policy with an inclusive upper bound.
    pub fn new(max: u32) -> Self {
        Self { max }
    }

    /// Inclusive upper bound.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Check a requested count. Out-of-range values are rejected, never clamped.
    pub fn validate(&self, desired: i64) -> Result<u32, ReconcileError> {
        match u32::try_from(desired) {
            Ok(count) if count <= self.max => Ok(count),
            _ => Err(ReconcileError::InvalidQuota {
                desired,
                max: self.max,
            }),
        }
    }
}

/// Plan the actions that bring one student to `desired` VMs.
pub fn plan_quota(
    student: &StudentId,
    vms: &[Vm],
    desired: i64,
    policy: &QuotaPolicy,
) -> Result<Vec<Action>, ReconcileError> {
    let desired = policy.validate(desired)? as usize;
    let actual = vms.len();

    debug!(student = %student, actual, desired, "Planning quota");

    let actions = if actual > desired {
        vms[desired..]
            .iter()
            .map(|vm| Action::Delete {
                student: student.clone(),
                instance: vm.id.clone(),
                name: vm.name.clone(),
            })
            .collect()
    } else {
        (actual + 1..=desired)
            .map(|slot| Action::Create {
                student: student.clone(),
                slot: slot as u32,
            })
            .collect()
    };

    Ok(actions)
}
