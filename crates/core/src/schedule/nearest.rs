// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nearest-event search across a ControlledJob's event specs

use super::cron::CronSpec;
use super::state::TimezoneWithOffset;
use super::ScheduleError;
use cj_api::{EventSpec, EventType};
use chrono::{DateTime, Duration, Utc};

/// Which way to search from the reference time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// A concrete instance of a scheduled event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub event_type: EventType,
    pub scheduled_time_utc: DateTime<Utc>,
}

/// Search forward or backward from `now` for the nearest event among the
/// given specs, considering only events the filter accepts (used to find
/// e.g. the nearest stop event specifically).
///
/// Returns None if no event matches in that direction. Fails if any
/// considered event's cron or friendly spec is malformed.
pub fn find_nearest_event(
    events: &[EventSpec],
    now: DateTime<Utc>,
    timezone: &TimezoneWithOffset,
    direction: Direction,
    filter: impl Fn(&EventSpec) -> bool,
) -> Result<Option<ScheduledEvent>, ScheduleError> {
    let mut specs = Vec::new();
    for event in events.iter().filter(|event| filter(event)) {
        let cron_expr = event.as_cron_spec()?;
        // Any timezone inside the expression is overridden by the
        // ControlledJob's own timezone
        let spec = CronSpec::parse(&cron_expr)?.with_location(timezone.location);
        specs.push((spec, event.action));
    }

    // The named timezone is embedded in each spec, so the cron search
    // already handles e.g. America/New_York including its DST rules. The
    // additional offset seconds are not: shift `now` into the synthetic
    // zone before searching, then shift each candidate back.
    let offset = Duration::seconds(i64::from(timezone.offset_seconds));
    let shifted_now = now + offset;

    let mut nearest: Option<ScheduledEvent> = None;
    for (spec, action) in &specs {
        let candidate = match direction {
            Direction::Next => spec.next_after(shifted_now),
            Direction::Previous => spec.prev_at_or_before(shifted_now),
        };
        let Some(candidate) = candidate else {
            continue;
        };
        let candidate = candidate - offset;

        let is_nearer = match (&nearest, direction) {
            (None, _) => true,
            (Some(nearest), Direction::Next) => candidate < nearest.scheduled_time_utc,
            (Some(nearest), Direction::Previous) => candidate > nearest.scheduled_time_utc,
        };
        if is_nearer {
            nearest = Some(ScheduledEvent {
                event_type: *action,
                scheduled_time_utc: candidate,
            });
        }
    }

    Ok(nearest)
}
