// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule evaluation for ControlledJobs
//!
//! This module answers the questions the decision engine asks of a
//! schedule: what was the nearest previous event, what is the next one,
//! when did the current run period start. Searching backwards through a
//! cron spec is the workhorse; the surrounding cron ecosystem only offers
//! "next", so `cron` implements the reverse primitive symmetrically.

mod cron;
mod nearest;
mod state;



#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;

pub use cron::{CronSpec, ParseError};
pub use nearest::{find_nearest_event, Direction, ScheduledEvent};
pub use state::{ScheduleState, TimezoneWithOffset};

use thiserror::Error;

/// Ways a ControlledJob's schedule can be unusable. All of these are user
/// errors: retrying without a spec edit cannot help.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to parse cron schedule: {0}")]
    Cron(#[from] ParseError),

    #[error(transparent)]
    Spec(#[from] cj_api::SpecError),

    #[error("failed to resolve timezone named {0}")]
    UnknownTimezone(String),

    /// A schedule with start events but no stop events could mean several
    /// different things (CronJob-like bursts, a heartbeat, restart-on-event).
    /// Rather than guess, refuse to run anything.
    #[error(
        "no previous stop events found, only start events; start-only \
         schedules are not supported (it's not clear what the semantics \
         should be)"
    )]
    StartOnlySchedule,
}
