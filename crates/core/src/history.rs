// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action history: a bounded ring of the recent actions taken against a
//! ControlledJob, newest first

use cj_api::{status_mut, ActionHistoryEntry, ControlledJob};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// How many history entries the status retains
pub const HISTORY_ENTRIES_TO_KEEP: usize = 16;

pub fn new_job_started_action(job_name: &str, now: DateTime<Utc>) -> ActionHistoryEntry {
    new_action_for_job("JobStarted", &format!("Created job: {job_name}"), job_name, now)
}

pub fn new_job_stopped_action(job_name: &str, now: DateTime<Utc>) -> ActionHistoryEntry {
    new_action_for_job("JobStopped", &format!("Deleted job: {job_name}"), job_name, now)
}

pub fn new_job_suspended_action(job_name: &str, now: DateTime<Utc>) -> ActionHistoryEntry {
    new_action_for_job(
        "JobSuspended",
        &format!("Suspended job: {job_name}"),
        job_name,
        now,
    )
}

pub fn new_job_unsuspended_action(job_name: &str, now: DateTime<Utc>) -> ActionHistoryEntry {
    new_action_for_job(
        "JobUnsuspended",
        &format!("Unsuspended job: {job_name}"),
        job_name,
        now,
    )
}

/// An action recording a failure, named after its warning event
pub fn new_failed_action(
    warning: crate::error::Warning,
    message: &str,
    now: DateTime<Utc>,
) -> ActionHistoryEntry {
    ActionHistoryEntry {
        type_: warning.as_str().to_string(),
        timestamp: Some(Time(now)),
        message: message.to_string(),
        job_index: None,
        job_name: String::new(),
    }
}

fn new_action_for_job(
    action_type: &str,
    message: &str,
    job_name: &str,
    now: DateTime<Utc>,
) -> ActionHistoryEntry {
    ActionHistoryEntry {
        type_: action_type.to_string(),
        timestamp: Some(Time(now)),
        message: message.to_string(),
        job_index: None,
        job_name: job_name.to_string(),
    }
}

/// Record an action against the resource's history ring
pub fn record_action(controlled_job: &mut ControlledJob, action: ActionHistoryEntry) {
    record_action_impl(controlled_job, action, false);
}

/// Record an action, skipping it if it's identical (ignoring timestamp) to
/// the most recent one. Used for failures so a persistent error doesn't
/// churn the status on every retry.
pub fn record_action_ignoring_duplicates(
    controlled_job: &mut ControlledJob,
    action: ActionHistoryEntry,
) {
    record_action_impl(controlled_job, action, true);
}

fn record_action_impl(
    controlled_job: &mut ControlledJob,
    action: ActionHistoryEntry,
    ignore_duplicates: bool,
) {
    let status = status_mut(controlled_job);

    if ignore_duplicates && is_same_action(status.most_recent_action.as_ref(), &action) {
        return;
    }

    tracing::debug!(action_type = %action.type_, job = %action.job_name, "recording action");
    status.most_recent_action = Some(action.clone());
    status.action_history.insert(0, action);
    status.action_history.truncate(HISTORY_ENTRIES_TO_KEEP);
}

fn is_same_action(existing: Option<&ActionHistoryEntry>, proposed: &ActionHistoryEntry) -> bool {
    let Some(existing) = existing else {
        return false;
    };
    let mut existing = existing.clone();
    existing.timestamp = proposed.timestamp.clone();
    existing == *proposed
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
