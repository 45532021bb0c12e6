// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cj-api: ControlledJob custom resource types
//!
//! The ControlledJob resource declares a workload that should run exactly
//! once inside each scheduled run period (e.g. "09:00-17:00 Mon-Fri
//! America/New_York") and not at all outside it. This crate holds the CRD
//! types, the friendly-schedule lowering, and the condition helpers shared
//! by the decision engine and the reconcile driver.

mod conditions;
mod types;

pub use conditions::{
    coerce_condition_to_bool, condition_status_for, find_condition, job_condition_reason,
    remove_condition, set_condition, set_condition_from_flag, ConditionStatus,
};
pub use types::{
    status_mut, ActionHistoryEntry, ConditionType, ControlledJob, ControlledJobSpec,
    ControlledJobStatus, EventSpec, EventType, FriendlyScheduleSpec, RestartStrategy,
    SpecChangePolicy, SpecError, TimezoneSpec, GROUP, VERSION,
};
