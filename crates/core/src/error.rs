// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the decision engine
//!
//! Every error carries a retryability classification. Non-retryable errors
//! are pure functions of their inputs (a malformed schedule will stay
//! malformed until the user edits it), so the driver reports them without
//! requeueing. Retryable errors engage the runtime's backoff.

use crate::build::BuildError;
use crate::schedule::ScheduleError;
use thiserror::Error;

/// Errors produced by the decision engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to calculate schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error(
        "tried to create a job, but we have exceeded the specified \
         startingDeadlineSeconds after the scheduled start time"
    )]
    StartingDeadlineExceeded,

    #[error("failed to create job: {0}")]
    Build(#[from] BuildError),

    /// A state the engine's own invariants rule out, e.g. shouldBeRunning
    /// with no start of run period. Treated as a bug, not retried.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Whether the driver should return this error to the runtime so its
    /// backoff kicks in. Mutator failures are retried to be safe (the usual
    /// cause is a transient network error); everything else here is a pure
    /// function of the inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Schedule(_) => false,
            Error::StartingDeadlineExceeded => false,
            Error::InvariantViolation(_) => false,
            Error::Build(build) => build.is_retryable(),
        }
    }

    /// The warning event to record this error under
    pub fn warning(&self) -> Warning {
        match self {
            Error::Schedule(_) => Warning::FailedToCalculateSchedule,
            Error::Build(_) => Warning::FailedToTemplateJob,
            Error::StartingDeadlineExceeded | Error::InvariantViolation(_) => {
                Warning::FailedToReconcile
            }
        }
    }
}

/// Warning event reasons. All warning reasons start with "Failed"; the
/// event sink uses that prefix to pick the event type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Warning {
    FailedToReconcile,
    FailedToListJobs,
    FailedToUpdateStatus,
    FailedToCalculateSchedule,
    FailedToTemplateJob,
    FailedToCreateJob,
    FailedToDeleteJob,
    FailedToSuspendJob,
    FailedToUnsuspendJob,
}

impl Warning {
    pub const fn as_str(self) -> &'static str {
        match self {
            Warning::FailedToReconcile => "FailedToReconcile",
            Warning::FailedToListJobs => "FailedToListJobs",
            Warning::FailedToUpdateStatus => "FailedToUpdateStatus",
            Warning::FailedToCalculateSchedule => "FailedToCalculateSchedule",
            Warning::FailedToTemplateJob => "FailedToTemplateJob",
            Warning::FailedToCreateJob => "FailedToCreateJob",
            Warning::FailedToDeleteJob => "FailedToDeleteJob",
            Warning::FailedToSuspendJob => "FailedToSuspendJob",
            Warning::FailedToUnsuspendJob => "FailedToUnsuspendJob",
        }
    }
}

/// Action types prefixed "Failed" record as warning events
pub fn is_warning_action(action_type: &str) -> bool {
    action_type.starts_with("Failed")
}
