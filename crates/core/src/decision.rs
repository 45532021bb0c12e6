// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconciliation decision engine
//!
//! `make_decision` is a function of (ControlledJob, observed child Jobs,
//! now): it produces the plan of cluster mutations and updates the
//! resource's status in memory, without touching the cluster itself. The
//! driver in cj-operator executes the plan.
//!
//! Stability matters as much as correctness here. The runtime re-invokes
//! us on every observed change plus a timer, so identical inputs must
//! yield an identical plan and a zero status diff: Job names are
//! deterministic, the chosen-job tie-break is total, and every condition
//! is written exactly once per pass.

use crate::build::{build_for_controlled_job, recreate_job_with_new_spec};
use crate::error::Error;
use crate::metadata;
use crate::mutate::MutatorSet;
use crate::schedule::ScheduleState;
use cj_api::{
    job_condition_reason, set_condition, set_condition_from_flag, status_mut, ConditionStatus,
    ConditionType, ControlledJob, SpecChangePolicy,
};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Operator-level toggles that gate decision behavior
#[derive(Clone, Copy, Debug, Default)]
pub struct DecisionOptions {
    pub enable_auto_recreate_jobs_on_spec_change: bool,
}

/// The plan produced by one decision pass. Executed in the order deletes,
/// creates, suspends, unsuspends.
#[derive(Clone, Debug, Default)]
pub struct Decision {
    pub jobs_to_create: Vec<Job>,
    pub jobs_to_delete: Vec<Job>,
    pub jobs_to_suspend: Vec<Job>,
    pub jobs_to_unsuspend: Vec<Job>,
    pub requeue_at: Option<DateTime<Utc>>,
}

/// Which job, if any, is the single one allowed to be running
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Chosen {
    /// Index into the observed children
    Existing(usize),
    /// The job this decision is itself creating
    Created,
}

pub async fn make_decision(
    controlled_job: &mut ControlledJob,
    child_jobs: &[Job],
    now: DateTime<Utc>,
    options: DecisionOptions,
    mutators: &MutatorSet,
) -> Result<Decision, Error> {
    let schedule = ScheduleState::for_controlled_job(controlled_job, now)?;

    let is_suspended = controlled_job.spec.suspend.unwrap_or(false);
    let desired_hash = metadata::template_hash(&controlled_job.spec.job_template);
    let auto_restart_enabled = controlled_job.spec.restart_strategy.spec_change_policy
        == SpecChangePolicy::Recreate;
    let start_of_current_run_period = schedule.start_of_current_run_period();

    // None means "no start events at all"; reported as Unknown on the
    // condition, distinct from a plain false
    let should_be_running_state =
        start_of_current_run_period.map(|_| schedule.should_be_running());

    let name = controlled_job.metadata.name.clone().unwrap_or_default();
    tracing::debug!(
        controlled_job = %name,
        child_jobs = child_jobs.len(),
        should_be_running = ?should_be_running_state,
        "making decision"
    );

    {
        let status = status_mut(controlled_job);
        status.is_suspended = Some(is_suspended);
        status.last_scheduled_start_time = start_of_current_run_period.map(Time);
    }
    set_should_be_running_status(controlled_job, should_be_running_state, now);
    let should_be_running = should_be_running_state.unwrap_or(false);

    let mut decision = Decision::default();

    // User-level suspension deletes everything and short-circuits the rest
    // of the pass
    if is_suspended {
        tracing::debug!(controlled_job = %name, "suspended, deleting any running jobs");
        decision.jobs_to_delete = child_jobs.to_vec();
        set_condition(
            controlled_job,
            ConditionType::Suspended,
            ConditionStatus::True,
            "Suspended",
            "IsSuspended flag set",
            now,
        );
        return Ok(decision);
    }
    set_condition(
        controlled_job,
        ConditionType::Suspended,
        ConditionStatus::False,
        "NotSuspended",
        "IsSuspended flag not set",
        now,
    );

    // Recreation on spec change is gated on both the operator flag and the
    // resource's own policy
    let restart_on_spec_change =
        options.enable_auto_recreate_jobs_on_spec_change && auto_restart_enabled;

    // High watermark for run ids, so a recreated job gets a fresh one.
    // Also pick the single job to report job-level conditions against; it
    // would be confusing to report JobFailed because of a stale job when
    // the current one is fine.
    let mut max_job_run_id: i32 = -1;
    let mut metrics_job: Option<&Job> = None;
    for job in child_jobs {
        let Ok(run_id) = metadata::job_run_id(job) else {
            continue;
        };
        if run_id > max_job_run_id {
            max_job_run_id = run_id;
        }
        if metrics_job.is_none_or(|current| is_better_candidate(job, current, &desired_hash)) {
            metrics_job = Some(job);
        }
    }

    set_conditions_for_all_jobs(controlled_job, child_jobs, now);
    set_job_conditions(controlled_job, metrics_job, now);

    // The chosen job is the single job (if any) which is allowed to be
    // running; everything else gets deleted. Ties are broken
    // deterministically so repeated reconciles agree with each other.
    let mut chosen: Option<usize> = None;
    let mut potentially_running_count = 0;
    let mut expired_jobs: Vec<usize> = Vec::new();
    let mut non_expired_jobs: Vec<usize> = Vec::new();
    let mut active = Vec::new();

    for (index, job) in child_jobs.iter().enumerate() {
        if metadata::is_potentially_running(job) {
            potentially_running_count += 1;
            active.push(object_reference(job));
        }

        // A job whose scheduled time precedes the most recent stop event
        // has outlived its run period and must go
        if let Some(last_stop_time) = schedule.last_stop_time() {
            match metadata::scheduled_time(job) {
                Err(err) => {
                    tracing::warn!(
                        job = job.metadata.name.as_deref().unwrap_or_default(),
                        error = %err,
                        "could not determine start time of job, will delete it"
                    );
                    expired_jobs.push(index);
                    continue;
                }
                Ok(job_start_time) if job_start_time < last_stop_time => {
                    expired_jobs.push(index);
                    continue;
                }
                Ok(_) => {}
            }
        }

        non_expired_jobs.push(index);
        if chosen.is_none_or(|current| is_better_candidate(job, &child_jobs[current], &desired_hash))
        {
            chosen = Some(index);
        }
    }
    status_mut(controlled_job).active = active;

    // The schedule says stopped: drop the chosen job so it gets deleted
    // below. Manually scheduled jobs survive outside their window until
    // the next stop event expires them.
    if !should_be_running {
        if let Some(index) = chosen {
            if !metadata::is_manually_scheduled(&child_jobs[index]) {
                chosen = None;
            }
        }
    }
    let mut chosen = chosen.map(Chosen::Existing);

    // Out-of-date handling: the chosen job's recorded hash no longer
    // matches the desired template
    let out_of_date_index = match chosen {
        Some(Chosen::Existing(index)) => {
            let observed = metadata::observed_template_hash(&child_jobs[index]);
            (!observed.is_empty() && observed != desired_hash).then_some(index)
        }
        _ => None,
    };
    let mut is_out_of_date = out_of_date_index.is_some();
    let (mut out_of_date_reason, mut out_of_date_message) = match chosen {
        None => ("NoRunningJob", "Not currently running".to_string()),
        Some(_) => (
            "NotOutOfDate",
            "Running job matches desired spec".to_string(),
        ),
    };
    if let Some(index) = out_of_date_index {
        let chosen_job = &child_jobs[index];
        if !metadata::is_potentially_running(chosen_job)
            || metadata::was_stopped_by_user(chosen_job)
        {
            out_of_date_reason = "JobIsNotRunning";
            out_of_date_message =
                "Job is out of date, but is not running so ignoring".to_string();
        } else if metadata::is_being_deleted(chosen_job) {
            // If the job is being deleted with an out of date spec, the
            // most likely situation is a user-issued stop request, not a
            // restart request. They'd be surprised if the job started back
            // up underneath them.
            out_of_date_reason = "JobIsBeingDeleted";
            out_of_date_message =
                "Job is out of date, but is being deleted so ignoring".to_string();
        } else if !restart_on_spec_change {
            out_of_date_reason = "ShouldNotAutoRestart";
            out_of_date_message =
                "Job is out of date, but auto-recreation is not enabled so will leave it running as is"
                    .to_string();
        } else {
            tracing::debug!(
                job = chosen_job.metadata.name.as_deref().unwrap_or_default(),
                "job is out of date, will recreate it with the latest spec"
            );
            let new_job = match recreate_job_with_new_spec(
                chosen_job,
                controlled_job,
                max_job_run_id + 1,
                true,
                mutators,
            )
            .await
            {
                Ok(new_job) => new_job,
                Err(err) => {
                    status_mut(controlled_job).is_running = Some(true);
                    return Err(err.into());
                }
            };
            decision.jobs_to_create.push(new_job);
            potentially_running_count += 1;
            chosen = Some(Chosen::Created);
            is_out_of_date = false;
        }
    }
    set_condition(
        controlled_job,
        ConditionType::OutOfDate,
        is_out_of_date.into(),
        out_of_date_reason,
        &out_of_date_message,
        now,
    );

    // If we should be running according to the schedule, make sure a job
    // exists. Only existence counts: a job that completed within its run
    // period is expected, users don't necessarily want failed jobs
    // restarting themselves, and a user-suspended job must not be treated
    // as missing or we'd immediately restart it. (Users who want pod-level
    // restarts have restartPolicy and backoffLimit in the template.)
    if should_be_running && chosen.is_none() {
        if starting_deadline_exceeded(controlled_job, start_of_current_run_period, now) {
            set_condition(
                controlled_job,
                ConditionType::StartingDeadlineExceeded,
                ConditionStatus::True,
                "StartingDeadlineExceeded",
                "We expect to be running, but have exceeded the starting deadline",
                now,
            );
            status_mut(controlled_job).is_running = Some(false);
            return Err(Error::StartingDeadlineExceeded);
        }
        set_condition(
            controlled_job,
            ConditionType::StartingDeadlineExceeded,
            ConditionStatus::False,
            "StartingDeadlineNotExceeded",
            "Still in time to start a new job",
            now,
        );

        let Some(scheduled_time) = start_of_current_run_period else {
            status_mut(controlled_job).is_running = Some(false);
            return Err(Error::InvariantViolation(
                "tried to create a job, but the start of the current run period is unknown"
                    .to_string(),
            ));
        };
        let new_job =
            match build_for_controlled_job(controlled_job, scheduled_time, 0, false, true, mutators)
                .await
            {
                Ok(new_job) => new_job,
                Err(err) => {
                    status_mut(controlled_job).is_running = Some(false);
                    return Err(err.into());
                }
            };
        decision.jobs_to_create.push(new_job);
        potentially_running_count += 1;
        chosen = Some(Chosen::Created);
    } else {
        set_condition(
            controlled_job,
            ConditionType::StartingDeadlineExceeded,
            ConditionStatus::Unknown,
            "NoNewJobRequired",
            "We're not trying to start a job at the moment",
            now,
        );
    }

    // Everything but the chosen job is deleted unless it already completed.
    // Completed jobs are kept so users can inspect previous runs with
    // kubectl get jobs.
    for &index in &expired_jobs {
        if metadata::is_being_deleted(&child_jobs[index]) {
            continue;
        }
        decision.jobs_to_delete.push(child_jobs[index].clone());
    }
    for &index in &non_expired_jobs {
        let job = &child_jobs[index];
        if metadata::is_being_deleted(job) {
            continue;
        }
        if chosen == Some(Chosen::Existing(index)) || metadata::is_completed(job) {
            continue;
        }
        decision.jobs_to_delete.push(job.clone());
    }

    // Safety unsuspend. Jobs without a definite completion condition might
    // have a Pod running under the hood, and the contract allows at most
    // one Pod at any time. So every job starts suspended, and only when
    // it's provably the sole survivor do we let it run.
    if potentially_running_count == 1 {
        if let Some(slot) = chosen {
            let chosen_job = match slot {
                Chosen::Existing(index) => &child_jobs[index],
                Chosen::Created => &decision.jobs_to_create[0],
            };
            if metadata::is_suspended(chosen_job)
                && !metadata::is_being_deleted(chosen_job)
                && !metadata::was_stopped_by_user(chosen_job)
            {
                match slot {
                    // About to create this job anyway: emit it unsuspended
                    // rather than create-then-unsuspend
                    Chosen::Created => {
                        if let Some(spec) = decision.jobs_to_create[0].spec.as_mut() {
                            spec.suspend = None;
                        }
                    }
                    Chosen::Existing(index) => {
                        decision.jobs_to_unsuspend.push(child_jobs[index].clone());
                    }
                }
            }
        }
    }

    decision.requeue_at = schedule.next_event_time();
    status_mut(controlled_job).is_running = Some(chosen.is_some());

    tracing::debug!(
        controlled_job = %name,
        creates = decision.jobs_to_create.len(),
        deletes = decision.jobs_to_delete.len(),
        unsuspends = decision.jobs_to_unsuspend.len(),
        requeue_at = ?decision.requeue_at,
        "made decision"
    );

    Ok(decision)
}

fn set_should_be_running_status(
    controlled_job: &mut ControlledJob,
    should_be_running: Option<bool>,
    now: DateTime<Utc>,
) {
    // The status field never reports null, for compatibility; only the
    // condition distinguishes Unknown
    status_mut(controlled_job).should_be_running = Some(should_be_running.unwrap_or(false));

    let (status, reason, message) = match should_be_running {
        Some(true) => (
            ConditionStatus::True,
            "InsideRunPeriod",
            "Currently between a start and stop time in the schedule",
        ),
        Some(false) => (
            ConditionStatus::False,
            "OutsideRunPeriod",
            "Currently outside of a start and stop time in the schedule",
        ),
        None => (
            ConditionStatus::Unknown,
            "NoStartEvent",
            "No start events defined",
        ),
    };
    set_condition(
        controlled_job,
        ConditionType::ShouldBeRunning,
        status,
        reason,
        message,
        now,
    );
}

fn set_conditions_for_all_jobs(
    controlled_job: &mut ControlledJob,
    all_jobs: &[Job],
    now: DateTime<Utc>,
) {
    if all_jobs.is_empty() {
        set_condition(
            controlled_job,
            ConditionType::JobManuallyScheduled,
            ConditionStatus::Unknown,
            "NoCurrentJob",
            "No jobs",
            now,
        );
        set_condition(
            controlled_job,
            ConditionType::JobBeingDeleted,
            ConditionStatus::Unknown,
            "NoCurrentJob",
            "No jobs",
            now,
        );
        return;
    }

    set_condition_from_flag(
        controlled_job,
        ConditionType::JobManuallyScheduled,
        all_jobs.iter().any(metadata::is_manually_scheduled),
        "CreatedByUser",
        "The user has scheduled a job manually",
        "NoManuallyScheduledJobs",
        "There are no manually scheduled jobs",
        now,
    );
    set_condition_from_flag(
        controlled_job,
        ConditionType::JobBeingDeleted,
        all_jobs.iter().any(metadata::is_being_deleted),
        "JobBeingDeleted",
        "A job is being deleted",
        "JobNotBeingDeleted",
        "No jobs are being deleted",
        now,
    );
}

fn set_job_conditions(controlled_job: &mut ControlledJob, job: Option<&Job>, now: DateTime<Utc>) {
    let Some(job) = job else {
        set_condition(
            controlled_job,
            ConditionType::JobExists,
            ConditionStatus::False,
            "NoCurrentJob",
            "No jobs",
            now,
        );
        for condition_type in [
            ConditionType::JobRunning,
            ConditionType::JobComplete,
            ConditionType::JobFailed,
            ConditionType::JobSuspended,
            ConditionType::JobStoppedByUser,
        ] {
            set_condition(
                controlled_job,
                condition_type,
                ConditionStatus::Unknown,
                "NoCurrentJob",
                "No jobs",
                now,
            );
        }
        return;
    };

    set_condition(
        controlled_job,
        ConditionType::JobExists,
        ConditionStatus::True,
        "JobExists",
        "At least one job exists",
        now,
    );

    // The pod ready count is a beta feature; without it we can't tell
    // whether the job is really running
    if metadata::has_ready_status(job) {
        set_condition_from_flag(
            controlled_job,
            ConditionType::JobRunning,
            metadata::is_running(job),
            "ReadyCountSufficient",
            "Job has the expected number of ready pods and hasn't completed",
            "ReadyCountNotSufficient",
            "Job does not yet have the expected number of ready pods (or it's completed). It could be struggling to start",
            now,
        );
    } else {
        set_condition(
            controlled_job,
            ConditionType::JobRunning,
            ConditionStatus::Unknown,
            "CannotDetermine",
            "Job has no ready status, so we can't determine if it's running",
            now,
        );
    }

    // Relay the job's own Complete and Failed conditions
    match metadata::job_condition(job, "Complete") {
        Some(condition) => set_condition(
            controlled_job,
            ConditionType::JobComplete,
            ConditionStatus::parse(&condition.status),
            &job_condition_reason(condition, "JobComplete"),
            "Relaying JobComplete status from the Job",
            now,
        ),
        None => set_condition(
            controlled_job,
            ConditionType::JobComplete,
            ConditionStatus::Unknown,
            "JobCompleteUnknown",
            "Job has not reported a complete condition yet",
            now,
        ),
    }
    match metadata::job_condition(job, "Failed") {
        Some(condition) => set_condition(
            controlled_job,
            ConditionType::JobFailed,
            ConditionStatus::parse(&condition.status),
            &job_condition_reason(condition, "JobFailed"),
            "Relaying JobFailed status from the Job",
            now,
        ),
        None => set_condition(
            controlled_job,
            ConditionType::JobFailed,
            ConditionStatus::Unknown,
            "JobFailedUnknown",
            "Job has not reported a failed condition yet",
            now,
        ),
    }

    set_condition_from_flag(
        controlled_job,
        ConditionType::JobSuspended,
        metadata::is_suspended(job),
        "JobSuspended",
        "The current job is suspended",
        "JobNotSuspended",
        "The current job is not suspended",
        now,
    );
    set_condition_from_flag(
        controlled_job,
        ConditionType::JobStoppedByUser,
        metadata::was_stopped_by_user(job),
        "JobStoppedByUser",
        "The current job was manually stopped by a user",
        "JobNotStoppedByUser",
        "The current job was not stopped by a user",
        now,
    );
}

/// Strict preference order for the chosen job: jobs that are not being
/// deleted beat ones that are, then up-to-date hashes beat stale ones,
/// then the lexicographically greater name wins. Total and deterministic,
/// so repeated reconciles always agree, and upgrades only move from worse
/// to better.
fn is_better_candidate(job: &Job, current_candidate: &Job, desired_hash: &str) -> bool {
    if metadata::is_being_deleted(job) != metadata::is_being_deleted(current_candidate) {
        return !metadata::is_being_deleted(job);
    }

    let job_matches = metadata::observed_template_hash(job) == desired_hash;
    let candidate_matches = metadata::observed_template_hash(current_candidate) == desired_hash;
    if job_matches != candidate_matches {
        return job_matches;
    }

    job.metadata.name.as_deref().unwrap_or_default()
        > current_candidate.metadata.name.as_deref().unwrap_or_default()
}

fn starting_deadline_exceeded(
    controlled_job: &ControlledJob,
    scheduled_start_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(deadline_seconds) = controlled_job.spec.starting_deadline_seconds else {
        return false;
    };
    if deadline_seconds < 1 {
        return false;
    }
    let Some(start_time) = scheduled_start_time else {
        return false;
    };
    now > start_time + Duration::seconds(deadline_seconds)
}

fn object_reference(job: &Job) -> ObjectReference {
    ObjectReference {
        api_version: Some("batch/v1".to_string()),
        kind: Some("Job".to_string()),
        name: job.metadata.name.clone(),
        namespace: job.metadata.namespace.clone(),
        uid: job.metadata.uid.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
