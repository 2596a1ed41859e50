//! The reconciliation pipeline.
//!
//! ```text
//! Gateway::list_instances ─┐
//!                          ├─ Normalizer ─ FleetIndex ─┬─ plan_quota ────────┐
//! Roster (discovery) ──────┘                           └─ plan_allow_lists ──┴─ Applier
//! ```
//!
//! Each run starts from a fresh [`Snapshot`]; nothing is cached between runs.

use std::sync::Arc;

use labfleet_id::StudentId;
use labfleet_networking::AddressPlan;
use tracing::{info, instrument};

use crate::action::Plan;
use crate::allowlist::{allow_list_in_sync, plan_allow_lists};
use crate::apply::{ActionOutcome, Applier, ApplyConfig, ApplyReport};
use crate::error::ReconcileError;
use crate::gateway::Gateway;
use crate::index::FleetIndex;
use crate::quota::{plan_quota, QuotaPolicy};
use crate::roster::{Activity, Roster};
use crate::selector::Selector;
use crate::vm::{Normalizer, Vm};

/// Observed state of one student.
#[derive(Debug, Clone)]
pub struct StudentStatus {
    pub student: StudentId,

    /// `None` if discovery does not know the student.
    pub activity: Option<Activity>,

    /// `None` if discovery does not know the student.
    pub repo_ready: Option<bool>,

    pub vms: Vec<Vm>,

    /// Every VM's allow-list matches its siblings.
    pub allow_lists_synced: bool,
}

impl StudentStatus {
    /// Number of VMs.
    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    /// Number of VMs with the key installed.
    pub fn ready_count(&self) -> usize {
        self.vms.iter().filter(|vm| vm.ready).count()
    }

    /// True if the VM count equals `desired`.
    pub fn is_converged(&self, desired: u32) -> bool {
        self.vms.len() == desired as usize
    }
}

/// One run's view of the fleet.
#[derive(Debug, Clone)]
pub struct Snapshot {
    roster: Roster,
    index: FleetIndex,
}

impl Snapshot {
    /// Fetch the instance listing once and build the index.
    #[instrument(skip_all)]
    pub async fn capture(
        gateway: &dyn Gateway,
        roster: Roster,
        plan: &AddressPlan,
    ) -> Result<Self, ReconcileError> {
        let raws = gateway
            .list_instances()
            .await
            .map_err(ReconcileError::GatewayUnavailable)?;

        Ok(Self::from_records(roster, &raws, plan))
    }

    /// Build a snapshot from an already fetched listing.
    pub fn from_records(roster: Roster, raws: &[serde_json::Value], plan: &AddressPlan) -> Self {
        let normalizer = Normalizer::new(plan.clone(), roster.keys_installed().clone());
        let vms = normalizer.normalize_all(raws);
        let index = FleetIndex::build(vms, roster.ids().cloned().collect::<Vec<_>>());

        info!(
            students = index.len(),
            vms = index.vm_count(),
            "Snapshot captured"
        );

        Self { roster, index }
    }

    /// The grouped index.
    pub fn index(&self) -> &FleetIndex {
        &self.index
    }

    /// The discovery roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Resolve a selector against this snapshot.
    pub fn select(&self, selector: &Selector) -> Vec<StudentId> {
        selector.resolve(&self.roster, &self.index)
    }

    /// Per-student status for the selected students. Never mutates anything.
    pub fn status(&self, selector: &Selector) -> Vec<StudentStatus> {
        self.select(selector)
            .into_iter()
            .map(|student| {
                let vms = self.index.vms(&student).to_vec();
                let allow_lists_synced = vms.iter().all(|vm| allow_list_in_sync(vm, &vms));
                let known = self.roster.get(&student);
                StudentStatus {
                    activity: known.map(|k| k.activity),
                    repo_ready: known.map(|k| k.repo_ready),
                    student,
                    vms,
                    allow_lists_synced,
                }
            })
            .collect()
    }

    /// Quota actions for every selected student.
    ///
    /// `desired` is validated before anything else; an invalid value yields
    /// no plan at all.
    pub fn plan_quota(
        &self,
        selector: &Selector,
        desired: i64,
        policy: &QuotaPolicy,
    ) -> Result<Plan, ReconcileError> {
        policy.validate(desired)?;

        let mut plan = Plan::default();
        for student in self.select(selector) {
            let actions = plan_quota(&student, self.index.vms(&student), desired, policy)?;
            plan.extend(Plan::new(actions));
        }
        Ok(plan)
    }

    /// Allow-list updates for the whole fleet.
    pub fn plan_allow_lists(&self) -> Plan {
        Plan::new(plan_allow_lists(&self.index))
    }
}

/// Entry point binding a gateway to the run settings.
pub struct Fleet {
    gateway: Arc<dyn Gateway>,
    address_plan: AddressPlan,
    policy: QuotaPolicy,
    applier: Applier,
}

impl Fleet {
    /// Create a new fleet handle.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        address_plan: AddressPlan,
        policy: QuotaPolicy,
        apply: ApplyConfig,
    ) -> Self {
        Self {
            applier: Applier::new(Arc::clone(&gateway), apply),
            gateway,
            address_plan,
            policy,
        }
    }

    /// The quota policy in force.
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Capture a fresh snapshot.
    pub async fn snapshot(&self, roster: Roster) -> Result<Snapshot, ReconcileError> {
        Snapshot::capture(self.gateway.as_ref(), roster, &self.address_plan).await
    }

    /// Normalize, group, plan quota and apply.
    ///
    /// An out-of-range `desired` fails before the instance listing is fetched.
    #[instrument(skip(self, roster, on_outcome))]
    pub async fn reconcile_quota<F>(
        &self,
        roster: Roster,
        selector: &Selector,
        desired: i64,
        on_outcome: F,
    ) -> Result<ApplyReport, ReconcileError>
    where
        F: Fn(&ActionOutcome),
    {
        self.policy.validate(desired)?;

        let snapshot = self.snapshot(roster).await?;
        let plan = snapshot.plan_quota(selector, desired, &self.policy)?;
        info!(actions = plan.len(), "Quota plan ready");

        Ok(self.applier.apply_with(&plan, on_outcome).await)
    }

    /// Normalize, group, plan allow-lists and apply.
    #[instrument(skip_all)]
    pub async fn sync_network<F>(
        &self,
        roster: Roster,
        on_outcome: F,
    ) -> Result<ApplyReport, ReconcileError>
    where
        F: Fn(&ActionOutcome),
    {
        let snapshot = self.snapshot(roster).await?;
        let plan = snapshot.plan_allow_lists();
        info!(actions = plan.len(), "Allow-list plan ready");

        Ok(self.applier.apply_with(&plan, on_outcome).await)
    }
}
