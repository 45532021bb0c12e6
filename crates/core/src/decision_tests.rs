// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::Error;
use crate::metadata;
use crate::mutate::MutatorSet;
use crate::testutil::{utc, ControlledJobBuilder, JobBuilder};
use cj_api::{find_condition, ConditionType, ControlledJob, SpecChangePolicy};
use k8s_openapi::api::batch::v1::Job;
use pretty_assertions::assert_eq;

async fn decide(
    controlled_job: &mut ControlledJob,
    child_jobs: &[Job],
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Decision, Error> {
    make_decision(
        controlled_job,
        child_jobs,
        now,
        DecisionOptions::default(),
        &MutatorSet::new(),
    )
    .await
}

async fn decide_with_auto_recreate(
    controlled_job: &mut ControlledJob,
    child_jobs: &[Job],
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Decision, Error> {
    make_decision(
        controlled_job,
        child_jobs,
        now,
        DecisionOptions {
            enable_auto_recreate_jobs_on_spec_change: true,
        },
        &MutatorSet::new(),
    )
    .await
}

fn condition_status(controlled_job: &ControlledJob, condition_type: ConditionType) -> String {
    find_condition(controlled_job.status.as_ref().unwrap(), condition_type)
        .map(|condition| condition.status.clone())
        .unwrap_or_else(|| "absent".to_string())
}

fn desired_hash(controlled_job: &ControlledJob) -> String {
    metadata::template_hash(&controlled_job.spec.job_template)
}

fn names(jobs: &[Job]) -> Vec<&str> {
    jobs.iter()
        .map(|job| job.metadata.name.as_deref().unwrap_or_default())
        .collect()
}

// Scenario: outside the schedule with no jobs, nothing to do but wait for
// the next start event
#[tokio::test]
async fn outside_schedule_with_no_jobs_only_requeues() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    // Monday, before the 09:00 start
    let now = utc(2022, 12, 12, 7, 12);

    let decision = decide(&mut controlled_job, &[], now).await.unwrap();

    assert!(decision.jobs_to_create.is_empty());
    assert!(decision.jobs_to_delete.is_empty());
    assert!(decision.jobs_to_suspend.is_empty());
    assert!(decision.jobs_to_unsuspend.is_empty());
    assert_eq!(decision.requeue_at, Some(utc(2022, 12, 12, 9, 0)));

    assert_eq!(condition_status(&controlled_job, ConditionType::ShouldBeRunning), "False");
    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.should_be_running, Some(false));
    assert_eq!(status.is_running, Some(false));
    assert!(status.active.is_empty());
}

// Scenario: inside the schedule with no jobs, create run 0 for the period
// start. It's the only potentially running job, so the safety unsuspend
// optimization emits it unsuspended rather than create-then-unsuspend.
#[tokio::test]
async fn inside_schedule_with_no_jobs_creates_run_zero() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &[], now).await.unwrap();

    assert_eq!(decision.jobs_to_create.len(), 1);
    assert!(decision.jobs_to_delete.is_empty());
    assert!(decision.jobs_to_unsuspend.is_empty());

    let created = &decision.jobs_to_create[0];
    let scheduled = utc(2022, 12, 12, 9, 0);
    assert_eq!(
        created.metadata.name.as_deref().unwrap(),
        format!("trading-engine-{}-0", scheduled.timestamp())
    );
    assert_eq!(metadata::scheduled_time(created).unwrap(), scheduled);
    assert_eq!(metadata::job_run_id(created).unwrap(), 0);
    assert_eq!(created.spec.as_ref().unwrap().suspend, None);

    assert_eq!(condition_status(&controlled_job, ConditionType::ShouldBeRunning), "True");
    assert_eq!(decision.requeue_at, Some(utc(2022, 12, 12, 17, 0)));

    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.is_running, Some(true));
    assert_eq!(
        status.last_scheduled_start_time.as_ref().unwrap().0,
        scheduled
    );
}

// Scenario: inside the schedule with an up-to-date running job, a steady
// state with nothing to change
#[tokio::test]
async fn inside_schedule_with_up_to_date_job_is_a_noop() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let child = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash(&hash)
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, std::slice::from_ref(&child), now)
        .await
        .unwrap();

    assert!(decision.jobs_to_create.is_empty());
    assert!(decision.jobs_to_delete.is_empty());
    assert!(decision.jobs_to_suspend.is_empty());
    assert!(decision.jobs_to_unsuspend.is_empty());

    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.is_running, Some(true));
    assert_eq!(status.active.len(), 1);
    assert_eq!(
        status.active[0].name.as_deref(),
        child.metadata.name.as_deref()
    );
    assert_eq!(condition_status(&controlled_job, ConditionType::JobExists), "True");
    assert_eq!(condition_status(&controlled_job, ConditionType::OutOfDate), "False");
}

// Scenario: the template changed under a running job with policy Recreate
// and the operator flag on. A replacement starts suspended with the next
// run id while the stale job is deleted.
#[tokio::test]
async fn recreate_on_spec_change_replaces_the_stale_job() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_container_image("registry.local/trader:2.0.0")
        .with_spec_change_policy(SpecChangePolicy::Recreate)
        .build();
    let scheduled = utc(2022, 12, 12, 9, 0);
    let stale = JobBuilder::new("trading-engine", scheduled, 1)
        .with_template_hash("stale-hash")
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide_with_auto_recreate(&mut controlled_job, std::slice::from_ref(&stale), now)
        .await
        .unwrap();

    assert_eq!(decision.jobs_to_create.len(), 1);
    let created = &decision.jobs_to_create[0];
    assert_eq!(metadata::job_run_id(created).unwrap(), 2);
    assert_eq!(metadata::scheduled_time(created).unwrap(), scheduled);
    // Two potentially running jobs now exist, so the replacement must
    // start suspended
    assert_eq!(created.spec.as_ref().unwrap().suspend, Some(true));

    assert_eq!(names(&decision.jobs_to_delete), vec![stale.metadata.name.as_deref().unwrap()]);
    assert_eq!(condition_status(&controlled_job, ConditionType::OutOfDate), "False");
}

// Scenario: a timezone with extra offset seconds shifts the whole
// schedule. 09:00 in Toronto-minus-two-minutes is 13:02 UTC on this date,
// so at 13:01 UTC nothing starts yet.
#[tokio::test]
async fn timezone_offset_shifts_the_run_period() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_timezone("America/Toronto", -120)
        .with_events(vec![
            crate::testutil::cron_event(cj_api::EventType::Start, "0 9 * * *"),
            crate::testutil::cron_event(cj_api::EventType::Stop, "0 17 * * *"),
        ])
        .build();
    let now = utc(2022, 4, 22, 13, 1);

    let decision = decide(&mut controlled_job, &[], now).await.unwrap();

    assert!(decision.jobs_to_create.is_empty());
    assert_eq!(decision.requeue_at, Some(utc(2022, 4, 22, 13, 2)));
    assert_eq!(condition_status(&controlled_job, ConditionType::ShouldBeRunning), "False");
}

// Scenario: the second reconcile after a start finds the suspended run 0
// job alone, and unsuspends it
#[tokio::test]
async fn safety_unsuspend_fires_on_the_second_pass() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let child = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash(&hash)
        .suspended()
        .with_active(0)
        .build();
    let now = utc(2022, 12, 12, 9, 1);

    let decision = decide(&mut controlled_job, std::slice::from_ref(&child), now)
        .await
        .unwrap();

    assert!(decision.jobs_to_create.is_empty());
    assert!(decision.jobs_to_delete.is_empty());
    assert_eq!(
        names(&decision.jobs_to_unsuspend),
        vec![child.metadata.name.as_deref().unwrap()]
    );
    assert_eq!(condition_status(&controlled_job, ConditionType::JobSuspended), "True");
}

#[tokio::test]
async fn unsuspend_waits_until_only_one_job_could_be_running() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let chosen = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 1)
        .with_template_hash(&hash)
        .suspended()
        .build();
    // A doomed predecessor is still terminating
    let dying = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash("stale")
        .being_deleted()
        .build();
    let now = utc(2022, 12, 12, 9, 1);

    let decision = decide(&mut controlled_job, &[chosen, dying], now)
        .await
        .unwrap();

    assert!(decision.jobs_to_unsuspend.is_empty());
    assert!(decision.jobs_to_create.is_empty());
}

#[tokio::test]
async fn user_stopped_jobs_are_never_unsuspended() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let child = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash(&hash)
        .stopped_by_user()
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &[child], now).await.unwrap();

    assert!(decision.jobs_to_unsuspend.is_empty());
    assert_eq!(condition_status(&controlled_job, ConditionType::JobStoppedByUser), "True");
}

#[tokio::test]
async fn suspend_flag_deletes_everything_and_short_circuits() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .suspended()
        .build();
    let children = [
        JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0).build(),
        JobBuilder::new("trading-engine", utc(2022, 12, 9, 9, 0), 0)
            .completed()
            .build(),
    ];
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &children, now).await.unwrap();

    assert_eq!(decision.jobs_to_delete.len(), 2);
    assert!(decision.jobs_to_create.is_empty());
    assert_eq!(decision.requeue_at, None);
    assert_eq!(condition_status(&controlled_job, ConditionType::Suspended), "True");
    // The pass short-circuits before any job-level conditions
    assert_eq!(condition_status(&controlled_job, ConditionType::JobExists), "absent");
    assert_eq!(controlled_job.status.as_ref().unwrap().is_suspended, Some(true));
}

#[tokio::test]
async fn expired_jobs_are_deleted_even_when_completed() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    // Friday's job, still around on Monday morning. Its scheduled time
    // precedes Friday's 17:00 stop, so it has outlived its run period.
    let expired = JobBuilder::new("trading-engine", utc(2022, 12, 9, 9, 0), 0)
        .completed()
        .build();
    let now = utc(2022, 12, 12, 7, 12);

    let decision = decide(&mut controlled_job, std::slice::from_ref(&expired), now)
        .await
        .unwrap();

    assert_eq!(
        names(&decision.jobs_to_delete),
        vec![expired.metadata.name.as_deref().unwrap()]
    );
}

#[tokio::test]
async fn expired_jobs_already_being_deleted_are_left_alone() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let expired = JobBuilder::new("trading-engine", utc(2022, 12, 9, 9, 0), 0)
        .being_deleted()
        .build();
    let now = utc(2022, 12, 12, 7, 12);

    let decision = decide(&mut controlled_job, &[expired], now).await.unwrap();

    assert!(decision.jobs_to_delete.is_empty());
}

#[tokio::test]
async fn a_job_with_an_unreadable_scheduled_time_is_deleted() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let broken = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .without_annotation(metadata::SCHEDULED_TIME_ANNOTATION)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, std::slice::from_ref(&broken), now)
        .await
        .unwrap();

    assert_eq!(
        names(&decision.jobs_to_delete),
        vec![broken.metadata.name.as_deref().unwrap()]
    );
    // And a fresh job takes its place, since we should be running
    assert_eq!(decision.jobs_to_create.len(), 1);
}

#[tokio::test]
async fn non_manual_jobs_are_stopped_outside_their_window() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    // Scheduled after today's stop event, so not expired, but the
    // schedule says we should be stopped
    let child = JobBuilder::new("trading-engine", utc(2022, 12, 12, 18, 0), 0)
        .with_template_hash(&hash)
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 20, 0);

    let decision = decide(&mut controlled_job, std::slice::from_ref(&child), now)
        .await
        .unwrap();

    assert_eq!(
        names(&decision.jobs_to_delete),
        vec![child.metadata.name.as_deref().unwrap()]
    );
    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.is_running, Some(false));
}

#[tokio::test]
async fn manually_scheduled_jobs_survive_outside_their_window() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let manual = JobBuilder::new("trading-engine", utc(2022, 12, 12, 18, 0), 0)
        .with_template_hash(&hash)
        .manually_scheduled()
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 20, 0);

    let decision = decide(&mut controlled_job, std::slice::from_ref(&manual), now)
        .await
        .unwrap();

    assert!(decision.jobs_to_delete.is_empty());
    let status = controlled_job.status.as_ref().unwrap();
    assert_eq!(status.is_running, Some(true));
    assert_eq!(
        condition_status(&controlled_job, ConditionType::JobManuallyScheduled),
        "True"
    );
}

#[tokio::test]
async fn completed_non_chosen_jobs_are_retained_for_inspection() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let finished = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash(&hash)
        .completed()
        .build();
    let running = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 1)
        .with_template_hash(&hash)
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &[finished, running], now)
        .await
        .unwrap();

    assert!(decision.jobs_to_delete.is_empty());
    assert!(decision.jobs_to_create.is_empty());
}

#[tokio::test]
async fn out_of_date_without_recreate_policy_only_flags_the_condition() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_container_image("registry.local/trader:2.0.0")
        .build();
    let stale = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash("stale-hash")
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    // Operator flag on, but the resource's policy is Ignore
    let decision = decide_with_auto_recreate(&mut controlled_job, std::slice::from_ref(&stale), now)
        .await
        .unwrap();

    assert!(decision.jobs_to_create.is_empty());
    assert!(decision.jobs_to_delete.is_empty());
    let condition = find_condition(
        controlled_job.status.as_ref().unwrap(),
        ConditionType::OutOfDate,
    )
    .unwrap();
    assert_eq!(condition.status, "True");
    assert_eq!(condition.reason, "ShouldNotAutoRestart");
}

#[tokio::test]
async fn out_of_date_gating_requires_the_operator_flag_too() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_container_image("registry.local/trader:2.0.0")
        .with_spec_change_policy(SpecChangePolicy::Recreate)
        .build();
    let stale = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash("stale-hash")
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &[stale], now).await.unwrap();

    assert!(decision.jobs_to_create.is_empty());
    assert_eq!(
        find_condition(
            controlled_job.status.as_ref().unwrap(),
            ConditionType::OutOfDate
        )
        .unwrap()
        .reason,
        "ShouldNotAutoRestart"
    );
}

#[tokio::test]
async fn out_of_date_job_being_deleted_is_not_recreated() {
    // A stop request looks like deletion-in-progress; recreating would
    // surprise the user with a job starting back up underneath them
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_container_image("registry.local/trader:2.0.0")
        .with_spec_change_policy(SpecChangePolicy::Recreate)
        .build();
    let dying = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash("stale-hash")
        .with_active(1)
        .being_deleted()
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide_with_auto_recreate(&mut controlled_job, &[dying], now)
        .await
        .unwrap();

    assert!(decision.jobs_to_create.is_empty());
    let condition = find_condition(
        controlled_job.status.as_ref().unwrap(),
        ConditionType::OutOfDate,
    )
    .unwrap();
    assert_eq!(condition.status, "True");
    assert_eq!(condition.reason, "JobIsBeingDeleted");
}

#[tokio::test]
async fn starting_deadline_exceeded_fails_without_creating() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_starting_deadline_seconds(3600)
        .build();
    // More than an hour past the 09:00 start, no job exists
    let now = utc(2022, 12, 12, 12, 12);

    let err = decide(&mut controlled_job, &[], now).await.unwrap_err();

    assert!(matches!(err, Error::StartingDeadlineExceeded));
    assert!(!err.is_retryable());
    assert_eq!(
        condition_status(&controlled_job, ConditionType::StartingDeadlineExceeded),
        "True"
    );
    assert_eq!(controlled_job.status.as_ref().unwrap().is_running, Some(false));
}

#[tokio::test]
async fn starting_deadline_with_time_to_spare_still_creates() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine")
        .with_starting_deadline_seconds(5 * 3600)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &[], now).await.unwrap();

    assert_eq!(decision.jobs_to_create.len(), 1);
    assert_eq!(
        condition_status(&controlled_job, ConditionType::StartingDeadlineExceeded),
        "False"
    );
}

#[tokio::test]
async fn chosen_job_tie_break_is_deterministic() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let scheduled = utc(2022, 12, 12, 9, 0);
    // Same period, higher run id sorts later by name and wins the tie
    let loser = JobBuilder::new("trading-engine", scheduled, 0)
        .with_template_hash(&hash)
        .with_active(1)
        .build();
    let winner = JobBuilder::new("trading-engine", scheduled, 1)
        .with_template_hash(&hash)
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    for children in [
        vec![loser.clone(), winner.clone()],
        vec![winner.clone(), loser.clone()],
    ] {
        let decision = decide(&mut controlled_job, &children, now).await.unwrap();
        assert_eq!(
            names(&decision.jobs_to_delete),
            vec![loser.metadata.name.as_deref().unwrap()],
            "the same loser is deleted regardless of observation order"
        );
    }
}

#[tokio::test]
async fn up_to_date_hash_beats_a_greater_name() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let scheduled = utc(2022, 12, 12, 9, 0);
    let current = JobBuilder::new("trading-engine", scheduled, 0)
        .with_template_hash(&hash)
        .with_active(1)
        .build();
    let stale = JobBuilder::new("trading-engine", scheduled, 1)
        .with_template_hash("stale-hash")
        .with_active(1)
        .build();
    let now = utc(2022, 12, 12, 12, 12);

    let decision = decide(&mut controlled_job, &[current, stale.clone()], now)
        .await
        .unwrap();

    assert_eq!(
        names(&decision.jobs_to_delete),
        vec![stale.metadata.name.as_deref().unwrap()]
    );
}

#[tokio::test]
async fn identical_inputs_produce_a_zero_status_diff() {
    let mut controlled_job = ControlledJobBuilder::new("trading-engine").build();
    let hash = desired_hash(&controlled_job);
    let child = JobBuilder::new("trading-engine", utc(2022, 12, 12, 9, 0), 0)
        .with_template_hash(&hash)
        .with_active(1)
        .build();

    let first = decide(&mut controlled_job, std::slice::from_ref(&child), utc(2022, 12, 12, 12, 12))
        .await
        .unwrap();
    let status_after_first = serde_json::to_value(controlled_job.status.as_ref().unwrap()).unwrap();

    // A minute later with identical observed state: every condition is
    // rewritten, but no transition timestamp may move
    let second = decide(&mut controlled_job, std::slice::from_ref(&child), utc(2022, 12, 12, 12, 13))
        .await
        .unwrap();
    let status_after_second = serde_json::to_value(controlled_job.status.as_ref().unwrap()).unwrap();

    assert_eq!(status_after_first, status_after_second);
    assert_eq!(names(&first.jobs_to_create), names(&second.jobs_to_create));
    assert_eq!(names(&first.jobs_to_delete), names(&second.jobs_to_delete));
}
