// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ControlledJob CRD spec and status types

use k8s_openapi::api::batch::v1::JobTemplateSpec;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// API group of the ControlledJob resource. Annotation and label keys on
/// child Jobs are derived from this, so changing it is a breaking change
/// for any tooling that reads them.
pub const GROUP: &str = "batch.alfredjean.dev";

/// API version of the ControlledJob resource
pub const VERSION: &str = "v1";

/// Timezone which governs all scheduled times of a ControlledJob
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TimezoneSpec {
    /// Name of an IANA timezone, e.g. "America/New_York"
    pub name: String,

    /// Additional offset in seconds applied on top of the named timezone.
    /// A schedule of 09:00 in America/New_York with offset -120 behaves as
    /// 09:00 in a synthetic "New York minus two minutes" zone, so the start
    /// fires at 09:02 local time.
    #[serde(default, rename = "offset")]
    pub offset_seconds: i32,
}

/// The action taken at a scheduled event
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    Stop,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Start => write!(f, "start"),
            EventType::Stop => write!(f, "stop"),
        }
    }
}

/// A more limited, human friendly alternative to a cron schedule
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyScheduleSpec {
    /// Time of day this event happens, in "hh:mm" format
    pub time_of_day: String,

    /// Days of week this event occurs on. Either a comma separated list
    /// (MON,TUE,THU) or a range (MON-FRI)
    pub days_of_week: String,
}

/// A single timed event in a ControlledJob's schedule
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventSpec {
    /// Action to take at the specified time(s)
    pub action: EventType,

    /// An arbitrary cron expression. If set, takes precedence over
    /// `schedule`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<String>,

    /// Friendly alternative to `cronSchedule`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<FriendlyScheduleSpec>,
}

/// Validation failure when lowering an EventSpec to a cron expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("must specify either cronSchedule or schedule")]
    MissingSchedule,
    #[error("timeOfDay must be in the format hh:mm")]
    InvalidTimeOfDay,
    #[error("daysOfWeek must be in the format MON-FRI or SAT,SUN,TUE,WED")]
    InvalidDaysOfWeek,
}

static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}):(\d{2})$").expect("time-of-day regex"));

static DAYS_OF_WEEK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z]{3}(?:,[a-zA-Z]{3}){0,6})$|^[a-zA-Z]{3}-[a-zA-Z]{3}$")
        .expect("days-of-week regex")
});

impl EventSpec {
    /// Lower this event to a canonical 5-field cron expression.
    ///
    /// A raw `cronSchedule` is returned unaltered and unvalidated (the cron
    /// parser is the authority on its syntax). A friendly schedule is
    /// validated against the regexes above and lowered to `MM HH * * DOW`.
    pub fn as_cron_spec(&self) -> Result<String, SpecError> {
        if let Some(cron) = &self.cron_schedule {
            if !cron.is_empty() {
                return Ok(cron.clone());
            }
        }
        let Some(schedule) = &self.schedule else {
            return Err(SpecError::MissingSchedule);
        };
        if schedule.time_of_day.is_empty() || schedule.days_of_week.is_empty() {
            return Err(SpecError::MissingSchedule);
        }
        let captures = TIME_OF_DAY
            .captures(&schedule.time_of_day)
            .ok_or(SpecError::InvalidTimeOfDay)?;
        if !DAYS_OF_WEEK.is_match(&schedule.days_of_week) {
            return Err(SpecError::InvalidDaysOfWeek);
        }
        Ok(format!(
            "{} {} * * {}",
            &captures[2], &captures[1], schedule.days_of_week
        ))
    }
}

/// Policy for handling a jobTemplate change while a Job is running.
/// The terminology consciously mirrors a Deployment's strategy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SpecChangePolicy {
    /// Leave a running Job alone; the next scheduled creation picks up the
    /// new template
    #[default]
    Ignore,
    /// Stop the running Job and start a replacement with the new template
    Recreate,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestartStrategy {
    #[serde(default)]
    pub spec_change_policy: SpecChangePolicy,
}

/// ControlledJobSpec defines the desired state of a ControlledJob
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, CustomResource)]
#[kube(
    group = "batch.alfredjean.dev",
    version = "v1",
    kind = "ControlledJob",
    namespaced,
    status = "ControlledJobStatus",
    shortname = "ctj",
    printcolumn = r#"{"name":"Is running","type":"boolean","jsonPath":".status.isRunning"}"#,
    printcolumn = r#"{"name":"Should be running","type":"boolean","jsonPath":".status.shouldBeRunning"}"#,
    printcolumn = r#"{"name":"Suspended","type":"boolean","jsonPath":".status.isSuspended"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ControlledJobSpec {
    /// Timezone which governs the timing of all events
    pub timezone: TimezoneSpec,

    /// Timings and operations to perform at those times, e.g. "start at
    /// 09:00", "stop every hour on the half hour"
    pub events: Vec<EventSpec>,

    /// Template for the Jobs created at start events
    pub job_template: JobTemplateSpec,

    /// Optional deadline in seconds for starting a Job after its scheduled
    /// start time. If a Job is expected to be running but more than this
    /// many seconds have passed since the period started, no Job will be
    /// created. Unset or < 1 disables the deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_deadline_seconds: Option<i64>,

    #[serde(default)]
    pub restart_strategy: RestartStrategy,

    /// Suspend all execution: any running Jobs are deleted and no new ones
    /// are created until the flag is cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
}

/// ControlledJobStatus is the observed state of a ControlledJob
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlledJobStatus {
    /// References to the potentially running child Jobs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active: Vec<ObjectReference>,

    /// The most recent scheduled start time that was actioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scheduled_start_time: Option<Time>,

    /// True if we're between a start and stop event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_be_running: Option<bool>,

    /// True if a chosen Job survived the last reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,

    /// Mirror of spec.suspend as observed by the last reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_suspended: Option<bool>,

    /// The most recent action taken against this ControlledJob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_action: Option<ActionHistoryEntry>,

    /// Recent actions (job started, job stopped, ...) in reverse
    /// chronological order, capped at 16 entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_history: Vec<ActionHistoryEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// One entry in the action history ring
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionHistoryEntry {
    /// The action the controller took, e.g. "JobStarted"
    #[serde(rename = "type")]
    pub type_: String,

    /// When the action was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Time>,

    /// Human-readable details about the action
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Run id of the affected Job, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_index: Option<i32>,

    /// Name of the affected Job, if any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_name: String,
}

/// Access the status of a ControlledJob, creating an empty one if the
/// resource has never been reconciled
pub fn status_mut(controlled_job: &mut ControlledJob) -> &mut ControlledJobStatus {
    controlled_job.status.get_or_insert_with(Default::default)
}

/// The set of condition types a ControlledJob reports. Every condition is
/// written exactly once per reconcile so that stable inputs produce a zero
/// status diff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionType {
    /// True between a start and stop event, False between stop and start,
    /// Unknown if the schedule has no start events
    ShouldBeRunning,
    /// True if the user has set spec.suspend
    Suspended,
    /// True if the chosen Job's template hash no longer matches the desired
    /// template and we are not able to recreate it
    OutOfDate,
    /// True if any child Job was manually scheduled by a user
    JobManuallyScheduled,
    /// True if at least one child Job exists
    JobExists,
    /// True when the current Job has reached its expected ready count
    JobRunning,
    /// Relays the Job's own Complete condition
    JobComplete,
    /// Relays the Job's own Failed condition
    JobFailed,
    /// True if any child Job is being deleted
    JobBeingDeleted,
    /// True if the current Job is suspended
    JobSuspended,
    /// True if the current Job was stopped by a user
    JobStoppedByUser,
    FailedToCreateJob,
    FailedToDeleteJob,
    FailedToSuspendJob,
    FailedToUnsuspendJob,
    /// True if a Job should be starting but the starting deadline has passed
    StartingDeadlineExceeded,
    /// Running, and expected to be (schedule or manual)
    RunningExpectedly,
    /// Running, but neither scheduled nor manual
    RunningUnexpectedly,
    /// Not running, and not expected to be
    NotRunningExpectedly,
    /// Not running, but the schedule (or a manual request) says we should be
    NotRunningUnexpectedly,
    /// Records the error from the last reconcile, if any
    Error,
}

impl ConditionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConditionType::ShouldBeRunning => "ShouldBeRunning",
            ConditionType::Suspended => "Suspended",
            ConditionType::OutOfDate => "OutOfDate",
            ConditionType::JobManuallyScheduled => "JobManuallyScheduled",
            ConditionType::JobExists => "JobExists",
            ConditionType::JobRunning => "JobRunning",
            ConditionType::JobComplete => "JobComplete",
            ConditionType::JobFailed => "JobFailed",
            ConditionType::JobBeingDeleted => "JobBeingDeleted",
            ConditionType::JobSuspended => "JobSuspended",
            ConditionType::JobStoppedByUser => "JobStoppedByUser",
            ConditionType::FailedToCreateJob => "FailedToCreateJob",
            ConditionType::FailedToDeleteJob => "FailedToDeleteJob",
            ConditionType::FailedToSuspendJob => "FailedToSuspendJob",
            ConditionType::FailedToUnsuspendJob => "FailedToUnsuspendJob",
            ConditionType::StartingDeadlineExceeded => "StartingDeadlineExceeded",
            ConditionType::RunningExpectedly => "RunningExpectedly",
            ConditionType::RunningUnexpectedly => "RunningUnexpectedly",
            ConditionType::NotRunningExpectedly => "NotRunningExpectedly",
            ConditionType::NotRunningUnexpectedly => "NotRunningUnexpectedly",
            ConditionType::Error => "Error",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
