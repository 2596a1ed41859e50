//! Applying plans through the provisioning gateway.
//!
//! Actions are split into per-student batches. A batch runs sequentially
//! in plan order; batches of different students may run concurrently up to
//! `max_concurrent_students`. Batch starts are spaced at least `pacing`
//! apart, in plan order, whether or not earlier batches are still running.
//!
//! A failed action is recorded and the next one is attempted anyway:
//! partial convergence is corrected by the next run.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use labfleet_id::StudentId;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::action::{Action, Plan};
use crate::error::ReconcileError;
use crate::gateway::{Gateway, GatewayError, ProvisionSpec};

/// Default delay between student batches.
pub const DEFAULT_PACING: Duration = Duration::from_secs(2);

/// Applier configuration.
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    /// Minimum spacing between the starts of consecutive student batches.
    pub pacing: Duration,

    /// How many student batches may be in flight at once.
    pub max_concurrent_students: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            max_concurrent_students: 1,
        }
    }
}

/// Result of one action.
#[derive(Debug)]
pub enum OutcomeStatus {
    Succeeded,
    Failed(ReconcileError),
}

/// An attempted action and how it went.
#[derive(Debug)]
pub struct ActionOutcome {
    pub action: Action,
    pub status: OutcomeStatus,
}

impl ActionOutcome {
    /// True if the gateway accepted the call.
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded)
    }
}

/// Per-action outcomes of an apply run, in plan order per student.
#[derive(Debug, Default)]
pub struct ApplyReport {
    outcomes: Vec<ActionOutcome>,
}

impl ApplyReport {
    /// All outcomes.
    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    /// Number of accepted actions.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed actions.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True if there was nothing to do.
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The errors of failed actions.
    pub fn failures(&self) -> impl Iterator<Item = &ReconcileError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            OutcomeStatus::Failed(err) => Some(err),
            OutcomeStatus::Succeeded => None,
        })
    }
}

/// Issues planned actions against a gateway.
pub struct Applier {
    gateway: Arc<dyn Gateway>,
    config: ApplyConfig,
}

impl Applier {
    /// Create a new applier.
    pub fn new(gateway: Arc<dyn Gateway>, config: ApplyConfig) -> Self {
        Self { gateway, config }
    }

    /// Apply a plan.
    pub async fn apply(&self, plan: &Plan) -> ApplyReport {
        self.apply_with(plan, |_| {}).await
    }

    /// Apply a plan, calling `on_outcome` as each action completes.
    #[instrument(skip_all, fields(actions = plan.len()))]
    pub async fn apply_with<F>(&self, plan: &Plan, on_outcome: F) -> ApplyReport
    where
        F: Fn(&ActionOutcome),
    {
        let on_outcome = &on_outcome;
        let concurrency = self.config.max_concurrent_students.max(1);
        let pacing = self.config.pacing;
        let mut next_start: Option<Instant> = None;

        // `buffered` pulls batches in plan order, so each one is scheduled
        // against the start of the batch before it.
        let batches: Vec<Vec<ActionOutcome>> = stream::iter(plan.batches())
            .map(|(student, actions)| {
                let now = Instant::now();
                let start_at = next_start.map_or(now, |at| at.max(now));
                next_start = Some(start_at + pacing);
                async move {
                    if !pacing.is_zero() {
                        tokio::time::sleep_until(start_at).await;
                    }
                    self.run_batch(&student, actions, on_outcome).await
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let report = ApplyReport {
            outcomes: batches.into_iter().flatten().collect(),
        };

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Apply complete"
        );

        report
    }

    async fn run_batch<F>(
        &self,
        student: &StudentId,
        actions: Vec<Action>,
        on_outcome: &F,
    ) -> Vec<ActionOutcome>
    where
        F: Fn(&ActionOutcome),
    {
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            let status = match self.execute(&action).await {
                Ok(()) => {
                    info!(student = %student, action = %action, "Action accepted");
                    OutcomeStatus::Succeeded
                }
                Err(source) => {
                    warn!(student = %student, action = %action, error = %source, "Action failed");
                    OutcomeStatus::Failed(ReconcileError::ActionFailed {
                        action: action.clone(),
                        source,
                    })
                }
            };

            let outcome = ActionOutcome { action, status };
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn execute(&self, action: &Action) -> Result<(), GatewayError> {
        match action {
            Action::Delete { instance, .. } => self.gateway.force_delete_instance(instance).await,
            Action::Create { student, slot } => {
                let spec = ProvisionSpec::for_slot(student.clone(), *slot);
                self.gateway.create_instance(&spec).await
            }
            Action::UpdateAllowList {
                instance,
                addresses,
                ..
            } => {
                self.gateway
                    .update_allowed_address_pairs(instance, addresses)
                    .await
            }
        }
    }
}
