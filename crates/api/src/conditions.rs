// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative condition set maintenance
//!
//! Conditions are the primary observable output of a reconcile. The engine
//! writes every condition type exactly once per pass, and `set_condition`
//! only moves the transition timestamp when the status actually changes.
//! Together those two rules guarantee that two reconciles with identical
//! inputs produce a byte-identical status, which keeps the resource off the
//! work queue.

use crate::types::{status_mut, ConditionType, ControlledJob, ControlledJobStatus};
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::JobCondition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// The three-valued status of a condition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }

    /// Parse the wire representation, defaulting to Unknown
    pub fn parse(raw: &str) -> Self {
        match raw {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(flag: bool) -> Self {
        if flag {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Map an optional flag to a condition status, with None meaning Unknown
pub fn condition_status_for(flag: Option<bool>) -> ConditionStatus {
    match flag {
        Some(flag) => flag.into(),
        None => ConditionStatus::Unknown,
    }
}

/// Set the given condition type on the ControlledJob, updating in place if
/// a condition of that type already exists. The transition timestamp only
/// moves when the status value changes.
pub fn set_condition(
    controlled_job: &mut ControlledJob,
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    let observed_generation = controlled_job.metadata.generation;
    let conditions = &mut status_mut(controlled_job).conditions;

    if let Some(existing) = conditions
        .iter_mut()
        .find(|condition| condition.type_ == condition_type.as_str())
    {
        if existing.status != status.as_str() {
            existing.last_transition_time = Time(now);
            existing.observed_generation = observed_generation;
        }
        existing.status = status.as_str().to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        return;
    }

    conditions.push(Condition {
        type_: condition_type.as_str().to_string(),
        status: status.as_str().to_string(),
        last_transition_time: Time(now),
        observed_generation,
        reason: reason.to_string(),
        message: message.to_string(),
    });
}

/// Set a binary condition, choosing reason and message per branch
#[allow(clippy::too_many_arguments)]
pub fn set_condition_from_flag(
    controlled_job: &mut ControlledJob,
    condition_type: ConditionType,
    flag: bool,
    reason_when_true: &str,
    message_when_true: &str,
    reason_when_false: &str,
    message_when_false: &str,
    now: DateTime<Utc>,
) {
    if flag {
        set_condition(
            controlled_job,
            condition_type,
            ConditionStatus::True,
            reason_when_true,
            message_when_true,
            now,
        );
    } else {
        set_condition(
            controlled_job,
            condition_type,
            ConditionStatus::False,
            reason_when_false,
            message_when_false,
            now,
        );
    }
}

/// Find a condition by type, or None
pub fn find_condition<'a>(
    status: &'a ControlledJobStatus,
    condition_type: ConditionType,
) -> Option<&'a Condition> {
    status
        .conditions
        .iter()
        .find(|condition| condition.type_ == condition_type.as_str())
}

/// True only if the condition exists with status True
pub fn coerce_condition_to_bool(condition: Option<&Condition>) -> bool {
    condition.is_some_and(|condition| condition.status == "True")
}

/// Remove a condition by type, if present
pub fn remove_condition(controlled_job: &mut ControlledJob, condition_type: ConditionType) {
    status_mut(controlled_job)
        .conditions
        .retain(|condition| condition.type_ != condition_type.as_str());
}

/// Derive a reason string from a Job's own condition, e.g. "JobCompleteTrue"
pub fn job_condition_reason(condition: &JobCondition, prefix: &str) -> String {
    match condition.status.as_str() {
        "True" => format!("{prefix}True"),
        "False" => format!("{prefix}False"),
        _ => format!("{prefix}Unknown"),
    }
}

#[cfg(test)]
#[path = "conditions_tests.rs"]
mod tests;
