use serde_json::json;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::ports::{ErasureStore, IdentityProvider};
use super::progress::{ProgressChannel, ProgressEvent};

pub const DELETE_PROFILE_MSG: &str = "Deleting user profile...";
pub const DELETE_AUTH_MSG: &str = "Finalizing account deletion...";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Criticality {
    Critical,
    Soft,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErasureMode {
    Delete,
    /// Null the user reference and overwrite `column` with the anonymization marker
    Anonymize { column: &'static str },
}

#[derive(Clone, Copy, Debug)]
pub struct ErasureStep {
    pub table: &'static str,
    pub criticality: Criticality,
    pub mode: ErasureMode,
    /// Tables that must already be erased when this step runs
    pub after: &'static [&'static str],
}

impl ErasureStep {
    const fn delete(table: &'static str) -> Self {
        Self {
            table,
            criticality: Criticality::Soft,
            mode: ErasureMode::Delete,
            after: &[],
        }
    }

    const fn critical(self) -> Self {
        Self {
            criticality: Criticality::Critical,
            ..self
        }
    }

    const fn after(self, after: &'static [&'static str]) -> Self {
        Self { after, ..self }
    }

    const fn anonymize(table: &'static str, column: &'static str) -> Self {
        Self {
            table,
            criticality: Criticality::Soft,
            mode: ErasureMode::Anonymize { column },
            after: &[],
        }
    }
}

const DEFAULT_STEPS: [ErasureStep; 13] = [
    ErasureStep::delete("sync_history"),
    ErasureStep::delete("reconciliations"),
    ErasureStep::delete("autopsy_events"),
    ErasureStep::delete("insights"),
    ErasureStep::delete("expenses"),
    ErasureStep::delete("bank_transactions"),
    ErasureStep::delete("transactions").after(&["reconciliations", "bank_transactions"]),
    ErasureStep::delete("revenue_transactions"),
    ErasureStep::delete("tax_profiles"),
    ErasureStep::delete("platform_connections")
        .critical()
        .after(&["sync_history"]),
    ErasureStep::delete("connected_platforms")
        .critical()
        .after(&["platform_connections", "revenue_transactions"]),
    ErasureStep::delete("verification_codes"),
    ErasureStep::anonymize("audit_log", "details_json"),
];

#[derive(Debug, Eq, PartialEq)]
pub enum PlanError {
    DuplicateTable(&'static str),
    UnsatisfiedDependency {
        table: &'static str,
        requires: &'static str,
    },
}

impl std::error::Error for PlanError {}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::DuplicateTable(table) => {
                write!(f, "PlanError: Table '{table}' appears more than once")
            }
            PlanError::UnsatisfiedDependency { table, requires } => write!(
                f,
                "PlanError: Table '{table}' must be erased after '{requires}'"
            ),
        }
    }
}

/// Ordered table steps. Profile deletion and identity-provider account deletion always follow
/// the table steps and are always critical.
#[derive(Clone, Debug)]
pub struct ErasurePlan {
    steps: Vec<ErasureStep>,
}

impl ErasurePlan {
    pub fn new(steps: Vec<ErasureStep>) -> Result<Self, PlanError> {
        for (i, step) in steps.iter().enumerate() {
            let earlier = &steps[..i];

            if earlier.iter().any(|s| s.table == step.table) {
                return Err(PlanError::DuplicateTable(step.table));
            }

            for requires in step.after {
                if !earlier.iter().any(|s| s.table == *requires) {
                    return Err(PlanError::UnsatisfiedDependency {
                        table: step.table,
                        requires,
                    });
                }
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ErasureStep] {
        &self.steps
    }
}

impl Default for ErasurePlan {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.to_vec(),
        }
    }
}

/// `message` is safe to show the caller. `detail` carries the underlying error for the ledger
/// and audit trail.
#[derive(Debug)]
pub struct ErasureFailure {
    pub target: String,
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct ErasureOutcome {
    pub completed_steps: Vec<String>,
    pub error: Option<ErasureFailure>,
}

pub struct Eraser {
    store: Arc<dyn ErasureStore>,
    identity: Arc<dyn IdentityProvider>,
    plan: ErasurePlan,
}

impl Eraser {
    pub fn new(
        store: Arc<dyn ErasureStore>,
        identity: Arc<dyn IdentityProvider>,
        plan: ErasurePlan,
    ) -> Self {
        Self {
            store,
            identity,
            plan,
        }
    }

    pub async fn erase(&self, user_id: Uuid, progress: &ProgressChannel) -> ErasureOutcome {
        let mut outcome = ErasureOutcome::default();
        let marker = json!({ "anonymized": true, "original_user_deleted": true });

        for step in self.plan.steps() {
            progress.emit(ProgressEvent::progress_for(
                "delete_data",
                &format!("Cleaning up {}...", step.table.replace('_', " ")),
                "table",
                step.table,
            ));

            let result = match step.mode {
                ErasureMode::Delete => self
                    .store
                    .delete_rows(step.table, user_id)
                    .await
                    .map(|_| format!("{}_deleted", step.table)),
                ErasureMode::Anonymize { column } => self
                    .store
                    .anonymize_rows(step.table, column, &marker, user_id)
                    .await
                    .map(|_| format!("{}_anonymized", step.table)),
            };

            match result {
                Ok(tag) => outcome.completed_steps.push(tag),
                Err(e) if step.criticality == Criticality::Soft => {
                    log::error!("Failed to erase rows from {}: {e}", step.table);
                    outcome.completed_steps.push(format!("{}_failed", step.table));
                }
                Err(e) => {
                    log::error!("Critical failure erasing rows from {}: {e}", step.table);
                    outcome.error = Some(ErasureFailure {
                        target: String::from(step.table),
                        message: format!("Could not delete from {}", step.table),
                        detail: format!(
                            "Critical failure: Could not delete from {}: {e}",
                            step.table
                        ),
                    });
                    return outcome;
                }
            }
        }

        progress.emit(ProgressEvent::progress("delete_profile", DELETE_PROFILE_MSG));
        if let Err(e) = self.store.delete_profile(user_id).await {
            log::error!("Failed to delete profile for user {user_id}: {e}");
            outcome.error = Some(ErasureFailure {
                target: String::from("profile"),
                message: String::from("Failed to delete user profile"),
                detail: format!("Failed to delete user profile: {e}"),
            });
            return outcome;
        }
        outcome.completed_steps.push(String::from("profile_deleted"));

        progress.emit(ProgressEvent::progress("delete_auth", DELETE_AUTH_MSG));
        if let Err(e) = self.identity.delete_account(user_id).await {
            log::error!("Failed to delete auth account for user {user_id}: {e}");
            outcome.error = Some(ErasureFailure {
                target: String::from("auth_user"),
                message: String::from("Failed to delete user account"),
                detail: format!("Failed to delete user account: {e}"),
            });
            return outcome;
        }
        outcome.completed_steps.push(String::from("auth_user_deleted"));

        outcome
    }
}
