// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job construction from a ControlledJob template
//!
//! We copy the spec over from the template along with its labels and
//! annotations, stamp the scheduled-time, run-id and template-hash
//! annotations so later reconciles can recognize the Job, and set an
//! owner reference so garbage collection and the watch machinery can map
//! the Job back to its ControlledJob.

use crate::metadata::{self, MetadataError};
use crate::mutate::{MutateError, MutatorSet};
use cj_api::{ControlledJob, GROUP, VERSION};
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Mutate(#[from] MutateError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl BuildError {
    /// Mutator failures are usually transient network errors and so worth a
    /// retry; a Job whose annotations can't be read will not fix itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BuildError::Mutate(_))
    }
}

/// Build the Job for a scheduled (or manual) start of the given
/// ControlledJob
pub async fn build_for_controlled_job(
    controlled_job: &ControlledJob,
    scheduled_time: DateTime<Utc>,
    job_run_id: i32,
    manually_scheduled: bool,
    start_suspended: bool,
    mutators: &MutatorSet,
) -> Result<Job, BuildError> {
    let controlled_job_name = controlled_job.metadata.name.clone().unwrap_or_default();
    let name = metadata::job_name(&controlled_job_name, scheduled_time, job_run_id);

    let template = &controlled_job.spec.job_template;

    let mut annotations: BTreeMap<String, String> = template
        .metadata
        .as_ref()
        .and_then(|meta| meta.annotations.clone())
        .unwrap_or_default();
    annotations.insert(
        metadata::SCHEDULED_TIME_ANNOTATION.to_string(),
        metadata::format_scheduled_time(scheduled_time),
    );
    annotations.insert(
        metadata::JOB_RUN_ID_ANNOTATION.to_string(),
        job_run_id.to_string(),
    );
    annotations.insert(
        metadata::TEMPLATE_HASH_ANNOTATION.to_string(),
        metadata::template_hash(template),
    );
    if !controlled_job.spec.timezone.name.is_empty() {
        annotations.insert(
            metadata::TIMEZONE_ANNOTATION.to_string(),
            controlled_job.spec.timezone.name.clone(),
        );
    }
    if controlled_job.spec.timezone.offset_seconds != 0 {
        annotations.insert(
            metadata::TIMEZONE_OFFSET_SECONDS_ANNOTATION.to_string(),
            controlled_job.spec.timezone.offset_seconds.to_string(),
        );
    }
    if manually_scheduled {
        annotations.insert(metadata::MANUAL_JOB_ANNOTATION.to_string(), "true".to_string());
    }

    let mut labels: BTreeMap<String, String> = template
        .metadata
        .as_ref()
        .and_then(|meta| meta.labels.clone())
        .unwrap_or_default();
    labels.insert(
        metadata::CONTROLLED_JOB_LABEL.to_string(),
        controlled_job_name.clone(),
    );

    let owner_reference = OwnerReference {
        api_version: format!("{GROUP}/{VERSION}"),
        kind: "ControlledJob".to_string(),
        name: controlled_job_name,
        uid: controlled_job.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    let mut spec = template.spec.clone().unwrap_or_default();
    if start_suspended {
        spec.suspend = Some(true);
    }

    let job = Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: controlled_job.metadata.namespace.clone(),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference]),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    };

    if wants_mutations(controlled_job) {
        return Ok(mutators.apply(&job).await?);
    }
    Ok(job)
}

/// Rebuild an existing Job against the current template, keeping its
/// scheduled time and manual flag but bumping the run id
pub async fn recreate_job_with_new_spec(
    existing_job: &Job,
    controlled_job: &ControlledJob,
    job_run_id: i32,
    start_suspended: bool,
    mutators: &MutatorSet,
) -> Result<Job, BuildError> {
    let was_manually_scheduled = metadata::is_manually_scheduled(existing_job);
    let old_scheduled_time = metadata::scheduled_time(existing_job)?;
    build_for_controlled_job(
        controlled_job,
        old_scheduled_time,
        job_run_id,
        was_manually_scheduled,
        start_suspended,
        mutators,
    )
    .await
}

fn wants_mutations(controlled_job: &ControlledJob) -> bool {
    controlled_job
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(metadata::APPLY_MUTATIONS_ANNOTATION))
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
