// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders for the ControlledJobs and child Jobs the tests exercise

use crate::metadata;
use cj_api::{
    ControlledJob, ControlledJobSpec, EventSpec, EventType, RestartStrategy, SpecChangePolicy,
    TimezoneSpec,
};
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobSpec, JobStatus};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

pub(crate) fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

pub(crate) fn cron_event(action: EventType, expr: &str) -> EventSpec {
    EventSpec {
        action,
        cron_schedule: Some(expr.to_string()),
        schedule: None,
    }
}

/// 09:00-17:00 Mon-Fri, the schedule most tests run against
pub(crate) fn office_hours() -> Vec<EventSpec> {
    vec![
        cron_event(EventType::Start, "0 9 * * MON-FRI"),
        cron_event(EventType::Stop, "0 17 * * MON-FRI"),
    ]
}

pub(crate) struct ControlledJobBuilder {
    controlled_job: ControlledJob,
}

impl ControlledJobBuilder {
    pub(crate) fn new(name: &str) -> Self {
        let mut controlled_job = ControlledJob::new(
            name,
            ControlledJobSpec {
                timezone: TimezoneSpec {
                    name: "UTC".to_string(),
                    offset_seconds: 0,
                },
                events: office_hours(),
                job_template: Default::default(),
                starting_deadline_seconds: None,
                restart_strategy: RestartStrategy::default(),
                suspend: None,
            },
        );
        controlled_job.metadata.namespace = Some("default".to_string());
        controlled_job.metadata.uid = Some("cj-uid-1".to_string());
        Self { controlled_job }
    }

    pub(crate) fn with_timezone(mut self, name: &str, offset_seconds: i32) -> Self {
        self.controlled_job.spec.timezone = TimezoneSpec {
            name: name.to_string(),
            offset_seconds,
        };
        self
    }

    pub(crate) fn with_events(mut self, events: Vec<EventSpec>) -> Self {
        self.controlled_job.spec.events = events;
        self
    }

    pub(crate) fn with_container_image(mut self, image: &str) -> Self {
        self.controlled_job.spec.job_template.spec = Some(JobSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "worker".to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    }],
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        });
        self
    }

    pub(crate) fn with_spec_change_policy(mut self, policy: SpecChangePolicy) -> Self {
        self.controlled_job.spec.restart_strategy.spec_change_policy = policy;
        self
    }

    pub(crate) fn with_starting_deadline_seconds(mut self, seconds: i64) -> Self {
        self.controlled_job.spec.starting_deadline_seconds = Some(seconds);
        self
    }

    pub(crate) fn suspended(mut self) -> Self {
        self.controlled_job.spec.suspend = Some(true);
        self
    }

    pub(crate) fn with_apply_mutations(mut self) -> Self {
        self.controlled_job
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(
                metadata::APPLY_MUTATIONS_ANNOTATION.to_string(),
                "true".to_string(),
            );
        self
    }

    pub(crate) fn build(self) -> ControlledJob {
        self.controlled_job
    }
}

pub(crate) struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    /// A child of the given ControlledJob with the mandatory annotations
    pub(crate) fn new(
        controlled_job_name: &str,
        scheduled_time: DateTime<Utc>,
        run_id: i32,
    ) -> Self {
        let mut job = Job {
            metadata: Default::default(),
            spec: Some(JobSpec::default()),
            status: Some(JobStatus::default()),
        };
        job.metadata.name = Some(metadata::job_name(
            controlled_job_name,
            scheduled_time,
            run_id,
        ));
        job.metadata.namespace = Some("default".to_string());
        let annotations = job.metadata.annotations.get_or_insert_with(Default::default);
        annotations.insert(
            metadata::SCHEDULED_TIME_ANNOTATION.to_string(),
            metadata::format_scheduled_time(scheduled_time),
        );
        annotations.insert(
            metadata::JOB_RUN_ID_ANNOTATION.to_string(),
            run_id.to_string(),
        );
        Self { job }
    }

    pub(crate) fn with_template_hash(mut self, hash: &str) -> Self {
        self.annotation(metadata::TEMPLATE_HASH_ANNOTATION, hash);
        self
    }

    pub(crate) fn manually_scheduled(mut self) -> Self {
        self.annotation(metadata::MANUAL_JOB_ANNOTATION, "true");
        self
    }

    pub(crate) fn suspended(mut self) -> Self {
        self.job.spec.get_or_insert_with(Default::default).suspend = Some(true);
        self
    }

    pub(crate) fn stopped_by_user(mut self) -> Self {
        self = self.suspended();
        self.annotation(
            metadata::SUSPEND_REASON_ANNOTATION,
            metadata::SUSPEND_REASON_USER_STOP,
        );
        self
    }

    pub(crate) fn being_deleted(mut self) -> Self {
        self.job.metadata.deletion_timestamp = Some(Time(Utc::now()));
        self
    }

    pub(crate) fn completed(mut self) -> Self {
        self.condition("Complete");
        self
    }

    pub(crate) fn failed(mut self) -> Self {
        self.condition("Failed");
        self
    }

    pub(crate) fn with_active(mut self, active: i32) -> Self {
        self.job.status.get_or_insert_with(Default::default).active = Some(active);
        self
    }

    pub(crate) fn with_ready(mut self, ready: i32) -> Self {
        self.job.status.get_or_insert_with(Default::default).ready = Some(ready);
        self
    }

    pub(crate) fn without_annotation(mut self, key: &str) -> Self {
        if let Some(annotations) = self.job.metadata.annotations.as_mut() {
            annotations.remove(key);
        }
        self
    }

    pub(crate) fn build(self) -> Job {
        self.job
    }

    fn annotation(&mut self, key: &str, value: &str) {
        self.job
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }

    fn condition(&mut self, condition_type: &str) {
        self.job
            .status
            .get_or_insert_with(Default::default)
            .conditions
            .get_or_insert_with(Default::default)
            .push(JobCondition {
                type_: condition_type.to_string(),
                status: "True".to_string(),
                ..Default::default()
            });
    }
}
