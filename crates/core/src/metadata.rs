// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child Job metadata: naming, annotations, the template hash and the
//! liveness predicates the decision engine relies on
//!
//! The annotation schema is a contract with external tooling, so the keys
//! here are wire-exact.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobTemplateSpec};
use regex::Regex;
use sha2::Digest;
use std::sync::LazyLock;
use thiserror::Error;

pub const SCHEDULED_TIME_ANNOTATION: &str = "batch.alfredjean.dev/scheduled-at";
pub const JOB_RUN_ID_ANNOTATION: &str = "batch.alfredjean.dev/job-run-id";
pub const TEMPLATE_HASH_ANNOTATION: &str = "batch.alfredjean.dev/job-template-hash";
pub const MANUAL_JOB_ANNOTATION: &str = "batch.alfredjean.dev/is-manually-scheduled";
pub const TIMEZONE_ANNOTATION: &str = "batch.alfredjean.dev/timezone";
pub const TIMEZONE_OFFSET_SECONDS_ANNOTATION: &str = "batch.alfredjean.dev/timezone-offset-seconds";
pub const SUSPEND_REASON_ANNOTATION: &str = "batch.alfredjean.dev/suspend-reason";
pub const APPLY_MUTATIONS_ANNOTATION: &str = "batch.alfredjean.dev/apply-mutations";
pub const CONTROLLED_JOB_LABEL: &str = "batch.alfredjean.dev/controlled-job";

/// Value of the suspend-reason annotation when a user stopped the Job
pub const SUSPEND_REASON_USER_STOP: &str = "user-stop";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("no {annotation} annotation found on job {job}")]
    MissingAnnotation { annotation: &'static str, job: String },
    #[error("could not parse {annotation} annotation on job {job}: {detail}")]
    InvalidAnnotation {
        annotation: &'static str,
        job: String,
        detail: String,
    },
    #[error("failed to parse {0} as a valid job name")]
    InvalidJobName(String),
}

/// Canonical name for a child Job. Deterministic so that a re-run of the
/// same decision cannot create the same Job twice.
pub fn job_name(
    controlled_job_name: &str,
    scheduled_time: DateTime<Utc>,
    job_run_id: i32,
) -> String {
    format!(
        "{}-{}-{}",
        controlled_job_name,
        scheduled_time.timestamp(),
        job_run_id
    )
}

static JOB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)-(\d+)-(\d+)$").expect("job name regex"));

/// Inverse of [`job_name`]
pub fn parse_job_name(name: &str) -> Result<(String, DateTime<Utc>, i32), MetadataError> {
    let captures = JOB_NAME
        .captures(name)
        .ok_or_else(|| MetadataError::InvalidJobName(name.to_string()))?;

    let unix_seconds: i64 = captures[2]
        .parse()
        .map_err(|_| MetadataError::InvalidJobName(name.to_string()))?;
    let scheduled_time = Utc
        .timestamp_opt(unix_seconds, 0)
        .single()
        .ok_or_else(|| MetadataError::InvalidJobName(name.to_string()))?;
    let job_run_id: i32 = captures[3]
        .parse()
        .map_err(|_| MetadataError::InvalidJobName(name.to_string()))?;

    Ok((captures[1].to_string(), scheduled_time, job_run_id))
}

/// SHA-256 of the canonical JSON of the template, hex encoded.
///
/// The template's own suspend field is cleared first: the engine toggles
/// suspend at runtime as part of its single-pod guarantee, and that must
/// not make a Job look out of date.
pub fn template_hash(template: &JobTemplateSpec) -> String {
    let mut template = template.clone();
    if let Some(spec) = template.spec.as_mut() {
        spec.suspend = None;
    }
    let canonical = serde_json::to_vec(&template).unwrap_or_default();
    hex::encode(sha2::Sha256::digest(&canonical))
}

fn annotation<'a>(job: &'a Job, key: &str) -> Option<&'a str> {
    job.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// The scheduled start time this Job was created for
pub fn scheduled_time(job: &Job) -> Result<DateTime<Utc>, MetadataError> {
    let job_name = job.metadata.name.clone().unwrap_or_default();
    let raw = annotation(job, SCHEDULED_TIME_ANNOTATION).ok_or(
        MetadataError::MissingAnnotation {
            annotation: SCHEDULED_TIME_ANNOTATION,
            job: job_name.clone(),
        },
    )?;
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| MetadataError::InvalidAnnotation {
            annotation: SCHEDULED_TIME_ANNOTATION,
            job: job_name,
            detail: err.to_string(),
        })
}

/// Format a scheduled time the way the annotation stores it
pub fn format_scheduled_time(scheduled_time: DateTime<Utc>) -> String {
    scheduled_time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The run id of this Job within its run period
pub fn job_run_id(job: &Job) -> Result<i32, MetadataError> {
    let job_name = job.metadata.name.clone().unwrap_or_default();
    let raw = annotation(job, JOB_RUN_ID_ANNOTATION).ok_or(MetadataError::MissingAnnotation {
        annotation: JOB_RUN_ID_ANNOTATION,
        job: job_name.clone(),
    })?;
    raw.parse().map_err(|_| MetadataError::InvalidAnnotation {
        annotation: JOB_RUN_ID_ANNOTATION,
        job: job_name,
        detail: format!("not an integer: {raw}"),
    })
}

/// The template hash this Job was created from, or "" if it carries none
pub fn observed_template_hash(job: &Job) -> &str {
    annotation(job, TEMPLATE_HASH_ANNOTATION).unwrap_or_default()
}

/// Whether a user scheduled this Job manually, outside the schedule
pub fn is_manually_scheduled(job: &Job) -> bool {
    annotation(job, MANUAL_JOB_ANNOTATION)
        .and_then(|raw| raw.parse::<bool>().ok())
        .unwrap_or(false)
}

/// Whether it's possible this Job has a Pod running. We are paranoid here
/// to honor the at-most-one-pod contract: anything that isn't terminally
/// Complete or Failed counts as potentially running.
pub fn is_potentially_running(job: &Job) -> bool {
    !is_completed(job)
}

/// True if the Job has a Complete or Failed condition with status True
pub fn is_completed(job: &Job) -> bool {
    has_condition(job, "Complete") || has_condition(job, "Failed")
}

pub fn is_being_deleted(job: &Job) -> bool {
    job.metadata.deletion_timestamp.is_some()
}

pub fn is_suspended(job: &Job) -> bool {
    job.spec
        .as_ref()
        .and_then(|spec| spec.suspend)
        .unwrap_or(false)
}

/// True if a user stopped this Job (suspended with the user-stop reason)
pub fn was_stopped_by_user(job: &Job) -> bool {
    is_suspended(job)
        && annotation(job, SUSPEND_REASON_ANNOTATION) == Some(SUSPEND_REASON_USER_STOP)
}

/// The ready count is a beta feature; when absent we cannot tell whether
/// the Job is really running
pub fn has_ready_status(job: &Job) -> bool {
    job.status
        .as_ref()
        .is_some_and(|status| status.ready.is_some())
}

/// True if the Job is not completed and reports live pods: a positive
/// ready count when one is advertised, otherwise any active pods
pub fn is_running(job: &Job) -> bool {
    if is_completed(job) {
        return false;
    }
    let Some(status) = job.status.as_ref() else {
        return false;
    };
    match status.ready {
        Some(ready) => ready > 0,
        None => status.active.unwrap_or(0) > 0,
    }
}

/// Find a Job condition of the given type with status True
pub fn job_condition<'a>(job: &'a Job, condition_type: &str) -> Option<&'a JobCondition> {
    job.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .find(|condition| condition.type_ == condition_type && condition.status == "True")
}

fn has_condition(job: &Job, condition_type: &str) -> bool {
    job_condition(job, condition_type).is_some()
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
