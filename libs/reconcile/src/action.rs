//! Reconciliation actions and plans.

use std::fmt;
use std::net::Ipv4Addr;

use labfleet_id::{InstanceId, StudentId};

/// One gateway call the reconciler decided to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Force-delete a VM.
    Delete {
        student: StudentId,
        instance: InstanceId,
        name: String,
    },

    /// Create a VM in a 1-based per-student slot.
    Create { student: StudentId, slot: u32 },

    /// Replace a VM's allowed address pairs.
    UpdateAllowList {
        student: StudentId,
        instance: InstanceId,
        addresses: Vec<Ipv4Addr>,
    },
}

impl Action {
    /// The student whose batch this action belongs to.
    pub fn student(&self) -> &StudentId {
        match self {
            Self::Delete { student, .. }
            | Self::Create { student, .. }
            | Self::UpdateAllowList { student, .. } => student,
        }
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delete { .. } => "delete",
            Self::Create { .. } => "create",
            Self::UpdateAllowList { .. } => "update_allow_list",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete {
                student,
                instance,
                name,
            } => write!(f, "delete {} ({}) of {}", name, instance, student),
            Self::Create { student, slot } => write!(f, "create {}-{}", student, slot),
            Self::UpdateAllowList {
                instance,
                addresses,
                ..
            } => {
                let list: Vec<String> = addresses.iter().map(ToString::to_string).collect();
                write!(f, "set allow-list of {} to [{}]", instance, list.join(","))
            }
        }
    }
}

/// An ordered list of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    /// Create a plan from actions in execution order.
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// Actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Append another plan.
    pub fn extend(&mut self, other: Plan) {
        self.actions.extend(other.actions);
    }

    /// Split into per-student batches.
    ///
    /// Batches are ordered by each student's first action; within a batch
    /// the original action order is kept. A student appears in exactly one
    /// batch, so its actions never run concurrently.
    pub fn batches(&self) -> Vec<(StudentId, Vec<Action>)> {
        let mut batches: Vec<(StudentId, Vec<Action>)> = Vec::new();
        for action in &self.actions {
            match batches.iter_mut().find(|(s, _)| s == action.student()) {
                Some((_, batch)) => batch.push(action.clone()),
                None => batches.push((action.student().clone(), vec![action.clone()])),
            }
        }
        batches
    }
}

impl FromIterator<Action> for Plan {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
