// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::state::{ScheduleState, TimezoneWithOffset};
use super::ScheduleError;
use cj_api::{EventSpec, EventType};
use chrono::{DateTime, TimeZone, Utc};

fn cron_event(action: EventType, expr: &str) -> EventSpec {
    EventSpec {
        action,
        cron_schedule: Some(expr.to_string()),
        schedule: None,
    }
}

fn timezone(name: &str) -> TimezoneWithOffset {
    TimezoneWithOffset {
        location: name.parse().unwrap(),
        offset_seconds: 0,
    }
}

/// Hour `h` on 2022-02-04 UTC
fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 2, 4, h, 0, 0).unwrap()
}

#[test]
fn start_only_schedule_is_rejected() {
    let events = vec![cron_event(EventType::Start, "0 0 * * *")];
    let err = ScheduleState::for_events(&events, &timezone("UTC"), hour(1)).unwrap_err();
    assert!(matches!(err, ScheduleError::StartOnlySchedule));
}

#[test]
fn no_events_means_no_run_period_and_no_expectation() {
    let state = ScheduleState::for_events(&[], &timezone("UTC"), hour(1)).unwrap();
    assert_eq!(state.start_of_current_run_period(), None);
    assert_eq!(state.last_stop_time(), None);
    assert_eq!(state.next_event_time(), None);
    assert!(!state.should_be_running());
}

#[test]
fn stop_only_schedule_has_no_run_period() {
    let events = vec![cron_event(EventType::Stop, "0 1 * * *")];
    let state = ScheduleState::for_events(&events, &timezone("UTC"), hour(2)).unwrap();
    assert_eq!(state.start_of_current_run_period(), None);
    assert_eq!(state.last_stop_time(), Some(hour(1)));
}

#[test]
fn run_period_when_now_equals_the_stop_time() {
    let events = vec![
        cron_event(EventType::Stop, "0 1 * * *"),
        cron_event(EventType::Start, "0 2 * * *"),
    ];
    let state = ScheduleState::for_events(&events, &timezone("UTC"), hour(1)).unwrap();
    assert_eq!(state.start_of_current_run_period(), Some(hour(2)));
    // The stop boundary is inclusive on the previous side
    assert!(!state.should_be_running());
}

#[test]
fn run_period_when_now_equals_the_start_time() {
    let events = vec![
        cron_event(EventType::Stop, "0 1 * * *"),
        cron_event(EventType::Start, "0 2 * * *"),
    ];
    let state = ScheduleState::for_events(&events, &timezone("UTC"), hour(2)).unwrap();
    assert_eq!(state.start_of_current_run_period(), Some(hour(2)));
    assert!(state.should_be_running());
}

#[test]
fn between_stop_and_start_the_period_start_is_in_the_future() {
    // Stop at 1am, now is 2am, start at 3am
    let events = vec![
        cron_event(EventType::Stop, "0 1 * * *"),
        cron_event(EventType::Start, "0 3 * * *"),
    ];
    let state = ScheduleState::for_events(&events, &timezone("UTC"), hour(2)).unwrap();
    assert_eq!(state.start_of_current_run_period(), Some(hour(3)));
    assert!(!state.should_be_running());
    assert_eq!(state.next_event_time(), Some(hour(3)));
}

#[test]
fn between_start_and_stop_the_period_start_is_behind_us() {
    // Start at 3am, now is 4am, stop at 5am
    let events = vec![
        cron_event(EventType::Start, "0 3 * * *"),
        cron_event(EventType::Stop, "0 5 * * *"),
    ];
    let state = ScheduleState::for_events(&events, &timezone("UTC"), hour(4)).unwrap();
    assert_eq!(state.start_of_current_run_period(), Some(hour(3)));
    assert!(state.should_be_running());
    assert_eq!(state.next_event_time(), Some(hour(5)));
}

#[test]
fn duplicate_start_events_do_not_move_the_period_start() {
    // A second start at 4am inside the 3am-5am period is ignored: the
    // period begins at the first start after the last stop
    let events = vec![
        cron_event(EventType::Stop, "0 1 * * *"),
        cron_event(EventType::Stop, "0 2 * * *"),
        cron_event(EventType::Start, "0 3 * * *"),
        cron_event(EventType::Start, "0 4 * * *"),
    ];
    let state = ScheduleState::for_events(&events, &timezone("UTC"), hour(5)).unwrap();
    assert_eq!(state.start_of_current_run_period(), Some(hour(3)));
}

#[test]
fn run_period_respects_the_named_timezone() {
    // Start at 1am, stop at 5am New York time. 7am UTC is 2am in New
    // York: inside the period that began at 1am NY (6am UTC) today
    let events = vec![
        cron_event(EventType::Start, "0 1 * * *"),
        cron_event(EventType::Stop, "0 5 * * *"),
    ];
    let state =
        ScheduleState::for_events(&events, &timezone("America/New_York"), hour(7)).unwrap();
    assert_eq!(state.start_of_current_run_period(), Some(hour(6)));
    assert!(state.should_be_running());
}

#[test]
fn state_for_controlled_job_resolves_the_timezone() {
    use cj_api::{ControlledJob, ControlledJobSpec, TimezoneSpec};

    let controlled_job = ControlledJob::new(
        "trading-engine",
        ControlledJobSpec {
            timezone: TimezoneSpec {
                name: "America/New_York".to_string(),
                offset_seconds: 0,
            },
            events: vec![
                cron_event(EventType::Start, "0 3 * * *"),
                cron_event(EventType::Stop, "0 5 * * *"),
            ],
            job_template: Default::default(),
            starting_deadline_seconds: None,
            restart_strategy: Default::default(),
            suspend: None,
        },
    );

    // 9am UTC is 4am New York: between the 3am start and 5am stop
    let state = ScheduleState::for_controlled_job(&controlled_job, hour(9)).unwrap();
    assert_eq!(state.next_event_time(), Some(hour(10)));
    assert!(state.should_be_running());
    assert_eq!(state.start_of_current_run_period(), Some(hour(8)));
}

#[test]
fn unknown_timezone_is_rejected() {
    use cj_api::{ControlledJob, ControlledJobSpec, TimezoneSpec};

    let controlled_job = ControlledJob::new(
        "trading-engine",
        ControlledJobSpec {
            timezone: TimezoneSpec {
                name: "Atlantis/Lost".to_string(),
                offset_seconds: 0,
            },
            events: vec![],
            job_template: Default::default(),
            starting_deadline_seconds: None,
            restart_strategy: Default::default(),
            suspend: None,
        },
    );

    let err = ScheduleState::for_controlled_job(&controlled_job, hour(0)).unwrap_err();
    assert!(matches!(err, ScheduleError::UnknownTimezone(name) if name == "Atlantis/Lost"));
}
