// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::Warning;
use crate::testutil::{utc, ControlledJobBuilder};

#[test]
fn actions_are_recorded_newest_first() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let now = utc(2022, 12, 12, 9, 0);

    record_action(&mut controlled_job, new_job_started_action("job-a", now));
    record_action(&mut controlled_job, new_job_stopped_action("job-a", now));

    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.action_history.len(), 2);
    assert_eq!(status.action_history[0].type_, "JobStopped");
    assert_eq!(status.action_history[1].type_, "JobStarted");
    assert_eq!(
        status.most_recent_action.as_ref().unwrap().type_,
        "JobStopped"
    );
}

#[test]
fn history_is_capped_at_sixteen_entries() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let now = utc(2022, 12, 12, 9, 0);

    for index in 0..40 {
        record_action(
            &mut controlled_job,
            new_job_started_action(&format!("job-{index}"), now),
        );
    }

    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.action_history.len(), HISTORY_ENTRIES_TO_KEEP);
    // Newest entry survives, oldest entries fall off the end
    assert_eq!(status.action_history[0].job_name, "job-39");
    assert_eq!(
        status.action_history[HISTORY_ENTRIES_TO_KEEP - 1].job_name,
        "job-24"
    );
}

#[test]
fn duplicate_failures_collapse_regardless_of_timestamp() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();

    record_action_ignoring_duplicates(
        &mut controlled_job,
        new_failed_action(
            Warning::FailedToCreateJob,
            "boom",
            utc(2022, 12, 12, 9, 0),
        ),
    );
    record_action_ignoring_duplicates(
        &mut controlled_job,
        new_failed_action(
            Warning::FailedToCreateJob,
            "boom",
            utc(2022, 12, 12, 9, 5),
        ),
    );

    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.action_history.len(), 1);
}

#[test]
fn differing_failures_are_both_recorded() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let now = utc(2022, 12, 12, 9, 0);

    record_action_ignoring_duplicates(
        &mut controlled_job,
        new_failed_action(Warning::FailedToCreateJob, "boom", now),
    );
    record_action_ignoring_duplicates(
        &mut controlled_job,
        new_failed_action(Warning::FailedToCreateJob, "different boom", now),
    );

    assert_eq!(controlled_job.status.as_ref().unwrap().action_history.len(), 2);
}

#[test]
fn plain_record_keeps_duplicates() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let now = utc(2022, 12, 12, 9, 0);

    record_action(&mut controlled_job, new_job_started_action("job-a", now));
    record_action(&mut controlled_job, new_job_started_action("job-a", now));

    assert_eq!(controlled_job.status.as_ref().unwrap().action_history.len(), 2);
}

#[test]
fn action_constructors_carry_the_job_name() {
    let now = utc(2022, 12, 12, 9, 0);

    let started = new_job_started_action("job-a", now);
    assert_eq!(started.type_, "JobStarted");
    assert_eq!(started.job_name, "job-a");
    assert_eq!(started.message, "Created job: job-a");

    let suspended = new_job_suspended_action("job-a", now);
    assert_eq!(suspended.type_, "JobSuspended");

    let unsuspended = new_job_unsuspended_action("job-a", now);
    assert_eq!(unsuspended.type_, "JobUnsuspended");

    let failed = new_failed_action(Warning::FailedToDeleteJob, "boom", now);
    assert_eq!(failed.type_, "FailedToDeleteJob");
    assert!(failed.job_name.is_empty());
}
