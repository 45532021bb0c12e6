// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconcile driver
//!
//! Loads the targeted ControlledJob and its children, asks the decision
//! engine for a plan, executes the plan against the cluster, records
//! events, and writes the status back in a single call.
//!
//! Error classification decides what the runtime does next. A schedule
//! the user wrote wrong will stay wrong no matter how many times we
//! retry, so those results carry no error and the resource waits for the
//! next spec edit or event. A failed cluster call is transient, so those
//! return the error and let the runtime's backoff engage. A failed
//! status write after a successful plan is logged and swallowed.

use crate::client::{ClientError, ControlledJobClient, NamespacedName};
use crate::events::EventSink;
use cj_api::{
    coerce_condition_to_bool, find_condition, set_condition, status_mut, ConditionStatus,
    ConditionType, ControlledJob,
};
use cj_core::decision::{make_decision, Decision, DecisionOptions};
use cj_core::error::Warning;
use cj_core::history;
use cj_core::mutate::MutatorSet;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use std::time::Duration;
use thiserror::Error;

/// Operator-level configuration the driver threads into each decision
#[derive(Clone, Copy, Debug, Default)]
pub struct ReconcileOptions {
    pub enable_auto_recreate_jobs_on_spec_change: bool,
}

/// A failure from one reconcile pass, classified for the runtime
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ReconcileFailure {
    pub warning: Warning,
    pub message: String,
    pub retryable: bool,
}

/// The possible exits of one reconcile pass: processed successfully and
/// due back at a scheduled time, failed retryably (runtime backoff takes
/// over), or failed non-retryably (wait for inputs to change)
#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
    pub failure: Option<ReconcileFailure>,
}

impl ReconcileResult {
    fn success(requeue_after: Option<Duration>) -> Self {
        Self {
            requeue_after,
            failure: None,
        }
    }

    fn failure(warning: Warning, message: String, retryable: bool) -> Self {
        Self {
            requeue_after: None,
            failure: Some(ReconcileFailure {
                warning,
                message,
                retryable,
            }),
        }
    }

    /// Map to the controller runtime's vocabulary: retryable failures
    /// return an error so backoff engages, everything else waits for the
    /// requeue deadline or the next watch event
    pub fn into_action(self) -> Result<kube::runtime::controller::Action, ReconcileFailure> {
        match self.failure {
            Some(failure) if failure.retryable => Err(failure),
            Some(_) => Ok(kube::runtime::controller::Action::await_change()),
            None => match self.requeue_after {
                Some(after) => Ok(kube::runtime::controller::Action::requeue(after)),
                None => Ok(kube::runtime::controller::Action::await_change()),
            },
        }
    }
}

/// Run one reconcile pass for the targeted ControlledJob at `now`
pub async fn reconcile(
    target: &NamespacedName,
    now: DateTime<Utc>,
    client: &dyn ControlledJobClient,
    events: &dyn EventSink,
    mutators: &MutatorSet,
    options: ReconcileOptions,
) -> ReconcileResult {
    let mut controlled_job = match client.get_controlled_job(target).await {
        Ok(Some(controlled_job)) => controlled_job,
        Ok(None) => {
            tracing::info!(target = %target, "target ControlledJob not found, assuming it's been deleted");
            return ReconcileResult::success(None);
        }
        Err(err) => {
            tracing::error!(target = %target, error = %err, "failed to load ControlledJob");
            return ReconcileResult::failure(
                Warning::FailedToReconcile,
                format!("failed to find target ControlledJob {target}: {err}"),
                true,
            );
        }
    };

    let child_jobs = match client.list_jobs_for_controlled_job(target).await {
        Ok(child_jobs) => child_jobs,
        Err(err) => {
            let message = format!("failed to list jobs for controlled job {target}: {err}");
            record_failed_reconcile(
                &mut controlled_job,
                Warning::FailedToListJobs,
                &message,
                events,
                now,
            )
            .await;
            return ReconcileResult::failure(Warning::FailedToListJobs, message, true);
        }
    };

    let decision = match make_decision(
        &mut controlled_job,
        &child_jobs,
        now,
        DecisionOptions {
            enable_auto_recreate_jobs_on_spec_change: options
                .enable_auto_recreate_jobs_on_spec_change,
        },
        mutators,
    )
    .await
    {
        Ok(decision) => decision,
        Err(err) => {
            // A failed decision is a pure function of its inputs, so
            // retrying cannot help until something changes, at which point
            // the runtime requeues us anyway
            let warning = err.warning();
            let retryable = err.is_retryable();
            let message = err.to_string();
            record_failed_reconcile(&mut controlled_job, warning, &message, events, now).await;
            finish_status(&mut controlled_job, Some(&message), client, now).await;
            return ReconcileResult::failure(warning, message, retryable);
        }
    };

    if let Err(failure) =
        execute_plan(&decision, &mut controlled_job, client, events, now).await
    {
        record_failed_reconcile(
            &mut controlled_job,
            failure.warning,
            &failure.message,
            events,
            now,
        )
        .await;
        finish_status(&mut controlled_job, Some(&failure.message), client, now).await;
        return ReconcileResult {
            requeue_after: None,
            failure: Some(failure),
        };
    }

    finish_status(&mut controlled_job, None, client, now).await;

    let requeue_after = decision
        .requeue_at
        .and_then(|at| (at - now).to_std().ok());
    ReconcileResult::success(requeue_after)
}

/// Execute the plan in order: deletes, creates, suspends, unsuspends.
/// The first cluster failure halts execution and abandons the rest of
/// the plan for this reconcile; the next pass recomputes it from scratch.
pub(crate) async fn execute_plan(
    decision: &Decision,
    controlled_job: &mut ControlledJob,
    client: &dyn ControlledJobClient,
    events: &dyn EventSink,
    now: DateTime<Utc>,
) -> Result<(), ReconcileFailure> {
    for job in &decision.jobs_to_delete {
        run_step(
            controlled_job,
            job,
            client.delete_job(job).await,
            ConditionType::FailedToDeleteJob,
            Warning::FailedToDeleteJob,
            "DeletedJob",
            "Successfully deleted job",
            history::new_job_stopped_action(&job.name_any(), now),
            events,
            now,
        )
        .await?;
    }
    for job in &decision.jobs_to_create {
        run_step(
            controlled_job,
            job,
            client.create_job(job).await,
            ConditionType::FailedToCreateJob,
            Warning::FailedToCreateJob,
            "CreatedJob",
            "Successfully created job",
            history::new_job_started_action(&job.name_any(), now),
            events,
            now,
        )
        .await?;
    }
    for job in &decision.jobs_to_suspend {
        run_step(
            controlled_job,
            job,
            client.suspend_job(job).await,
            ConditionType::FailedToSuspendJob,
            Warning::FailedToSuspendJob,
            "SuspendedJob",
            "Successfully suspended job",
            history::new_job_suspended_action(&job.name_any(), now),
            events,
            now,
        )
        .await?;
    }
    for job in &decision.jobs_to_unsuspend {
        run_step(
            controlled_job,
            job,
            client.unsuspend_job(job).await,
            ConditionType::FailedToUnsuspendJob,
            Warning::FailedToUnsuspendJob,
            "UnsuspendedJob",
            "Successfully unsuspended job",
            history::new_job_unsuspended_action(&job.name_any(), now),
            events,
            now,
        )
        .await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    controlled_job: &mut ControlledJob,
    job: &Job,
    outcome: Result<(), ClientError>,
    condition_type: ConditionType,
    warning: Warning,
    success_reason: &str,
    success_message: &str,
    success_action: cj_api::ActionHistoryEntry,
    events: &dyn EventSink,
    now: DateTime<Utc>,
) -> Result<(), ReconcileFailure> {
    match outcome {
        Ok(()) => {
            events.record(controlled_job, success_action).await;
            set_condition(
                controlled_job,
                condition_type,
                ConditionStatus::False,
                success_reason,
                success_message,
                now,
            );
            Ok(())
        }
        Err(err) => {
            let message = format!(
                "failed to {} job {} in namespace {}: {err}",
                condition_verb(warning),
                job.name_any(),
                job.namespace().unwrap_or_default()
            );
            set_condition(
                controlled_job,
                condition_type,
                ConditionStatus::True,
                condition_type.as_str(),
                &message,
                now,
            );
            Err(ReconcileFailure {
                warning,
                message,
                retryable: true,
            })
        }
    }
}

fn condition_verb(warning: Warning) -> &'static str {
    match warning {
        Warning::FailedToCreateJob => "create",
        Warning::FailedToDeleteJob => "delete",
        Warning::FailedToSuspendJob => "suspend",
        Warning::FailedToUnsuspendJob => "unsuspend",
        _ => "reconcile",
    }
}

async fn record_failed_reconcile(
    controlled_job: &mut ControlledJob,
    warning: Warning,
    message: &str,
    events: &dyn EventSink,
    now: DateTime<Utc>,
) {
    tracing::error!(
        controlled_job = %controlled_job.name_any(),
        warning = warning.as_str(),
        "failed to reconcile: {message}"
    );
    events
        .record(
            controlled_job,
            history::new_failed_action(warning, message, now),
        )
        .await;
}

/// Derive the overall conditions and write the status back. A status
/// update failure is retryable in principle, but if the plan itself
/// succeeded we don't fail the reconcile over it; the next pass rewrites
/// the same status anyway.
async fn finish_status(
    controlled_job: &mut ControlledJob,
    error_message: Option<&str>,
    client: &dyn ControlledJobClient,
    now: DateTime<Utc>,
) {
    calculate_overall_conditions(controlled_job, error_message, now);
    if let Err(err) = client.update_status(controlled_job).await {
        tracing::error!(
            controlled_job = %controlled_job.name_any(),
            error = %err,
            "failed to update status"
        );
    }
}

/// Second-order conditions derived from the primary ones. Exactly one of
/// the four running/not-running conditions is True each pass and the
/// other three are Unknown, so users can alert on e.g.
/// NotRunningUnexpectedly without decoding the full condition set.
///
/// Each of the four must be written exactly once per pass. Writing one
/// twice would flip it between Unknown and True, move its transition
/// timestamp, and requeue the resource forever.
pub(crate) fn calculate_overall_conditions(
    controlled_job: &mut ControlledJob,
    error_message: Option<&str>,
    now: DateTime<Utc>,
) {
    match error_message {
        Some(message) => set_condition(
            controlled_job,
            ConditionType::Error,
            ConditionStatus::True,
            "Error",
            message,
            now,
        ),
        None => set_condition(
            controlled_job,
            ConditionType::Error,
            ConditionStatus::False,
            "NoError",
            "No error encountered",
            now,
        ),
    }

    let status = status_mut(controlled_job).clone();
    let job_exists = coerce_condition_to_bool(find_condition(&status, ConditionType::JobExists));
    let job_failed = coerce_condition_to_bool(find_condition(&status, ConditionType::JobFailed));
    let job_exists_and_not_failed = job_exists && !job_failed;
    let should_be_running =
        coerce_condition_to_bool(find_condition(&status, ConditionType::ShouldBeRunning));
    let job_manually_scheduled = coerce_condition_to_bool(find_condition(
        &status,
        ConditionType::JobManuallyScheduled,
    ));

    // (the True condition, its reason, its message)
    let (true_condition, reason, message) = if job_exists_and_not_failed {
        if should_be_running {
            (
                ConditionType::RunningExpectedly,
                "RunningBasedOnSchedule",
                "Job is running, and that's expected because of the schedule",
            )
        } else if job_manually_scheduled {
            (
                ConditionType::RunningExpectedly,
                "RunningManually",
                "Job is running, and that's expected because the user has manually scheduled a job",
            )
        } else {
            (
                ConditionType::RunningUnexpectedly,
                "RunningUnexpectedly",
                "Job is running, but it should not be - neither inside the scheduled times, nor manually scheduled",
            )
        }
    } else if should_be_running || job_manually_scheduled {
        if job_failed {
            (
                ConditionType::NotRunningUnexpectedly,
                "JobFailed",
                "Job failed, but we expect it to currently be running",
            )
        } else {
            (
                ConditionType::NotRunningUnexpectedly,
                "NoJobExists",
                "No job currently exists, but we expect one to currently be running",
            )
        }
    } else {
        (
            ConditionType::NotRunningExpectedly,
            "NotRunningExpectedly",
            "No job exists, and that's expected as we're outside the scheduled times, and the user has not manually scheduled a job",
        )
    };

    for condition_type in [
        ConditionType::RunningExpectedly,
        ConditionType::RunningUnexpectedly,
        ConditionType::NotRunningExpectedly,
        ConditionType::NotRunningUnexpectedly,
    ] {
        if condition_type == true_condition {
            set_condition(
                controlled_job,
                condition_type,
                ConditionStatus::True,
                reason,
                message,
                now,
            );
        } else {
            set_condition(
                controlled_job,
                condition_type,
                ConditionStatus::Unknown,
                "CannotDetermine",
                "See the other running/not-running conditions for details",
                now,
            );
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
