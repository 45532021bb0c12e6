// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule state: where `now` sits relative to a ControlledJob's events

use super::nearest::{find_nearest_event, Direction, ScheduledEvent};
use super::ScheduleError;
use cj_api::{ControlledJob, EventSpec, EventType, TimezoneSpec};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// A named timezone plus the extra offset seconds that together govern a
/// ControlledJob's schedule
#[derive(Clone, Copy, Debug)]
pub struct TimezoneWithOffset {
    pub location: Tz,
    pub offset_seconds: i32,
}

impl TryFrom<&TimezoneSpec> for TimezoneWithOffset {
    type Error = ScheduleError;

    fn try_from(spec: &TimezoneSpec) -> Result<Self, Self::Error> {
        let location = spec
            .name
            .parse::<Tz>()
            .map_err(|_| ScheduleError::UnknownTimezone(spec.name.clone()))?;
        Ok(Self {
            location,
            offset_seconds: spec.offset_seconds,
        })
    }
}

/// The surrounding events in a ControlledJob's schedule, evaluated at a
/// single instant. All times are UTC.
#[derive(Clone, Debug)]
pub struct ScheduleState {
    previous_event: Option<ScheduledEvent>,
    next_event: Option<ScheduledEvent>,
    last_stop_time: Option<DateTime<Utc>>,
    start_of_current_run_period: Option<DateTime<Utc>>,
}

impl ScheduleState {
    /// Evaluate the schedule of the given ControlledJob at `now`
    pub fn for_controlled_job(
        controlled_job: &ControlledJob,
        now: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        let timezone = TimezoneWithOffset::try_from(&controlled_job.spec.timezone)?;
        Self::for_events(&controlled_job.spec.events, &timezone, now)
    }

    pub fn for_events(
        events: &[EventSpec],
        timezone: &TimezoneWithOffset,
        now: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        let previous_event =
            find_nearest_event(events, now, timezone, Direction::Previous, |_| true)?;
        let next_event = find_nearest_event(events, now, timezone, Direction::Next, |_| true)?;
        let last_stop_time = find_most_recent_stop_time(events, timezone, now)?;
        let start_of_current_run_period =
            find_start_of_current_run_period(events, timezone, last_stop_time)?;

        Ok(Self {
            previous_event,
            next_event,
            last_stop_time,
            start_of_current_run_period,
        })
    }

    /// The next time in the schedule that we'll hit. This is when the
    /// controller should wake us up to reprocess the resource.
    pub fn next_event_time(&self) -> Option<DateTime<Utc>> {
        self.next_event.map(|event| event.scheduled_time_utc)
    }

    /// True if the nearest previous event is a start event
    pub fn should_be_running(&self) -> bool {
        self.previous_event
            .is_some_and(|event| event.event_type == EventType::Start)
    }

    /// The last scheduled stop time, or None if there are no stop events
    pub fn last_stop_time(&self) -> Option<DateTime<Utc>> {
        self.last_stop_time
    }

    /// When the schedule last transitioned from stopped to started.
    ///
    /// This is not necessarily the most recent start event: for a schedule
    /// with a stop at 12:00 and starts at 13:00 and 14:00, the duplicate
    /// start at 14:00 is ignored and at 14:30 this returns 13:00. Outside a
    /// run period it returns the start of the most recent completed period
    /// (for a 9-to-5 schedule, yesterday's 09:00 right up until today's).
    ///
    /// Returns None when the schedule has no start events at all.
    pub fn start_of_current_run_period(&self) -> Option<DateTime<Utc>> {
        self.start_of_current_run_period
    }
}

fn find_most_recent_stop_time(
    events: &[EventSpec],
    timezone: &TimezoneWithOffset,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let stop = find_nearest_event(events, now, timezone, Direction::Previous, |event| {
        event.action == EventType::Stop
    })?;
    Ok(stop.map(|event| event.scheduled_time_utc))
}

/// Go back to the most recent stop event (the end of the previous period),
/// then forward from there to the first start event.
fn find_start_of_current_run_period(
    events: &[EventSpec],
    timezone: &TimezoneWithOffset,
    last_stop_time: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let Some(last_stop_time) = last_stop_time else {
        let has_any_start_event = events
            .iter()
            .any(|event| event.action == EventType::Start);
        if !has_any_start_event {
            return Ok(None);
        }
        return Err(ScheduleError::StartOnlySchedule);
    };

    let next_start = find_nearest_event(
        events,
        last_stop_time,
        timezone,
        Direction::Next,
        |event| event.action == EventType::Start,
    )?;
    Ok(next_start.map(|event| event.scheduled_time_utc))
}
