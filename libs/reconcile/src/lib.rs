//! VM fleet reconciliation.
//!
//! This library converges the set of lab VMs provisioned on the cloud
//! backend to the number each student should have. Key concepts:
//!
//! - **Snapshot**: one `list_instances` call plus the discovery roster,
//!   normalized and grouped by owning student.
//! - **Plan**: the ordered list of create/delete/update actions that would
//!   bring the snapshot to the desired state.
//! - **Apply**: issuing the plan against the provisioning gateway, one
//!   student batch at a time, recording per-action outcomes.
//!
//! # Invariants
//!
//! - No state survives a run; the backend is the only source of truth
//! - Planning is a pure function of the snapshot
//! - A converged student yields zero actions, and never more than
//!   `|actual - desired|` quota actions
//! - Allow-list comparison is order-insensitive, so a second sync is a no-op

pub mod action;
pub mod allowlist;
pub mod apply;
pub mod error;
pub mod fleet;
pub mod gateway;
pub mod index;
pub mod quota;
pub mod roster;
pub mod selector;
pub mod vm;

pub use action::{Action, Plan};
pub use allowlist::{allow_list_in_sync, expected_allow_list, plan_allow_lists};
pub use apply::{ActionOutcome, Applier, ApplyConfig, ApplyReport, OutcomeStatus};
pub use error::ReconcileError;
pub use fleet::{Fleet, Snapshot, StudentStatus};
pub use gateway::{Gateway, GatewayError, ProvisionSpec};
pub use index::FleetIndex;
pub use quota::{plan_quota, QuotaPolicy, DEFAULT_MAX_VMS};
pub use roster::{Activity, KnownStudent, Roster};
pub use selector::Selector;
pub use vm::{Normalizer, Vm};

pub use labfleet_id::{InstanceId, StudentId};
pub use labfleet_networking::{AccessHint, AddressPlan};
