// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn friendly(time_of_day: &str, days_of_week: &str) -> EventSpec {
    EventSpec {
        action: EventType::Start,
        cron_schedule: None,
        schedule: Some(FriendlyScheduleSpec {
            time_of_day: time_of_day.to_string(),
            days_of_week: days_of_week.to_string(),
        }),
    }
}

#[test]
fn raw_cron_schedule_passes_through_unvalidated() {
    let event = EventSpec {
        action: EventType::Start,
        cron_schedule: Some("not even close to valid".to_string()),
        schedule: None,
    };
    assert_eq!(
        event.as_cron_spec().unwrap(),
        "not even close to valid".to_string()
    );
}

#[test]
fn cron_schedule_takes_precedence_over_friendly_schedule() {
    let mut event = friendly("09:00", "MON-FRI");
    event.cron_schedule = Some("0 9 * * 1-5".to_string());
    assert_eq!(event.as_cron_spec().unwrap(), "0 9 * * 1-5");
}

#[parameterized(
    range = { "09:00", "MON-FRI", "00 09 * * MON-FRI" },
    single_day = { "17:30", "SAT", "30 17 * * SAT" },
    day_list = { "08:15", "MON,WED,FRI", "15 08 * * MON,WED,FRI" },
    full_week_list = { "23:59", "MON,TUE,WED,THU,FRI,SAT,SUN", "59 23 * * MON,TUE,WED,THU,FRI,SAT,SUN" },
)]
fn friendly_schedule_lowers_to_cron(time_of_day: &str, days_of_week: &str, expected: &str) {
    assert_eq!(
        friendly(time_of_day, days_of_week).as_cron_spec().unwrap(),
        expected
    );
}

#[parameterized(
    no_leading_zero = { "9:00", "MON-FRI", SpecError::InvalidTimeOfDay },
    with_seconds = { "09:00:00", "MON-FRI", SpecError::InvalidTimeOfDay },
    empty_time = { "", "MON-FRI", SpecError::MissingSchedule },
    long_day_name = { "09:00", "MONDAY", SpecError::InvalidDaysOfWeek },
    trailing_comma = { "09:00", "MON,", SpecError::InvalidDaysOfWeek },
    open_range = { "09:00", "MON-", SpecError::InvalidDaysOfWeek },
)]
fn friendly_schedule_rejects_malformed_input(
    time_of_day: &str,
    days_of_week: &str,
    expected: SpecError,
) {
    assert_eq!(
        friendly(time_of_day, days_of_week).as_cron_spec().unwrap_err(),
        expected
    );
}

#[test]
fn event_without_any_schedule_is_rejected() {
    let event = EventSpec {
        action: EventType::Stop,
        cron_schedule: None,
        schedule: None,
    };
    assert_eq!(event.as_cron_spec().unwrap_err(), SpecError::MissingSchedule);
}

#[test]
fn spec_deserializes_wire_format() {
    let manifest = serde_json::json!({
        "timezone": {"name": "Europe/London", "offset": -120},
        "events": [
            {"action": "start", "schedule": {"timeOfDay": "09:00", "daysOfWeek": "MON-FRI"}},
            {"action": "stop", "cronSchedule": "0 17 * * MON-FRI"},
        ],
        "jobTemplate": {},
        "startingDeadlineSeconds": 3600,
        "restartStrategy": {"specChangePolicy": "Recreate"},
    });
    let spec: ControlledJobSpec = serde_json::from_value(manifest).unwrap();

    assert_eq!(spec.timezone.name, "Europe/London");
    assert_eq!(spec.timezone.offset_seconds, -120);
    assert_eq!(spec.events.len(), 2);
    assert_eq!(spec.events[0].action, EventType::Start);
    assert_eq!(
        spec.events[1].cron_schedule.as_deref(),
        Some("0 17 * * MON-FRI")
    );
    assert_eq!(spec.starting_deadline_seconds, Some(3600));
    assert_eq!(
        spec.restart_strategy.spec_change_policy,
        SpecChangePolicy::Recreate
    );
    assert_eq!(spec.suspend, None);
}

#[test]
fn spec_change_policy_defaults_to_ignore() {
    let manifest = serde_json::json!({
        "timezone": {"name": "UTC"},
        "events": [],
        "jobTemplate": {},
    });
    let spec: ControlledJobSpec = serde_json::from_value(manifest).unwrap();
    assert_eq!(
        spec.restart_strategy.spec_change_policy,
        SpecChangePolicy::Ignore
    );
}
