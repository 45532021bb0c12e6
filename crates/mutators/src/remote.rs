// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AdmissionReview round trip against a remote mutation service

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cj_core::mutate::{MutateError, Mutator, MutatorSet};
use k8s_openapi::api::batch::v1::Job;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteMutateError {
    #[error("failed to send webhook request to {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("webhook request returned status code {status}: {body}")]
    BadStatus { status: u16, body: String },
    #[error("failed to read response as an AdmissionReview: {0}")]
    BadBody(#[source] reqwest::Error),
    #[error("webhook response carried no response object")]
    MissingResponse,
    #[error("failed to mutate job: {code} {reason} - {message}")]
    NotAllowed {
        code: i32,
        reason: String,
        message: String,
    },
    #[error("failed to decode patch as base64: {0}")]
    PatchNotBase64(#[source] base64::DecodeError),
    #[error("failed to decode JSON Patch: {0}")]
    PatchMalformed(#[source] serde_json::Error),
    #[error("failed to apply JSON Patch: {0}")]
    PatchFailed(#[source] json_patch::PatchError),
    #[error("failed to read patched result back as a Job: {0}")]
    PatchedJobInvalid(#[source] serde_json::Error),
}

/// The slice of the admission wire format this mutator exchanges
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionReview {
    api_version: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<AdmissionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionRequest {
    uid: String,
    kind: GroupVersionKind,
    resource: GroupVersionResource,
    name: String,
    namespace: String,
    operation: String,
    object: Job,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupVersionKind {
    group: String,
    version: String,
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupVersionResource {
    group: String,
    version: String,
    resource: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionResponse {
    #[serde(default)]
    uid: String,
    allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ResponseStatus>,
    /// Base64 of a JSON Patch, as the wire standard dictates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patch_type: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResponseStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Mutator that defers to a remote admission-webhook-style service
pub struct RemoteMutator {
    remote_url: String,
    client: reqwest::Client,
}

impl RemoteMutator {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

/// Register a remote mutator for the given URL on the mutator set
pub fn enable_remote_mutator(mutators: &MutatorSet, url: &str) -> Result<(), MutateError> {
    mutators.register(Arc::new(RemoteMutator::new(url)))
}

#[async_trait]
impl Mutator for RemoteMutator {
    fn name(&self) -> &str {
        "remote"
    }

    async fn apply(
        &self,
        job: &mut Job,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let request = build_admission_review(job);
        let response = self.post_review(&request).await?;
        apply_admission_response(&response, job)?;
        Ok(())
    }
}

impl RemoteMutator {
    async fn post_review(
        &self,
        review: &AdmissionReview,
    ) -> Result<AdmissionResponse, RemoteMutateError> {
        let request_uid = review
            .request
            .as_ref()
            .map(|request| request.uid.clone())
            .unwrap_or_default();
        tracing::info!(url = %self.remote_url, request_uid = %request_uid, "sending webhook request");

        let response = self
            .client
            .post(&self.remote_url)
            .json(review)
            .send()
            .await
            .map_err(|source| RemoteMutateError::Request {
                url: self.remote_url.clone(),
                source,
            })?;

        let status = response.status();
        tracing::info!(status = status.as_u16(), "webhook response received");
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteMutateError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let review: AdmissionReview = response
            .json()
            .await
            .map_err(RemoteMutateError::BadBody)?;
        review.response.ok_or(RemoteMutateError::MissingResponse)
    }
}

fn build_admission_review(job: &Job) -> AdmissionReview {
    AdmissionReview {
        api_version: "admission.k8s.io/v1".to_string(),
        kind: "AdmissionReview".to_string(),
        request: Some(AdmissionRequest {
            uid: uuid::Uuid::new_v4().to_string(),
            kind: GroupVersionKind {
                group: "batch".to_string(),
                version: "v1".to_string(),
                kind: "Job".to_string(),
            },
            resource: GroupVersionResource {
                group: "batch".to_string(),
                version: "v1".to_string(),
                resource: "jobs".to_string(),
            },
            name: job.metadata.name.clone().unwrap_or_default(),
            namespace: job.metadata.namespace.clone().unwrap_or_default(),
            operation: "CREATE".to_string(),
            object: job.clone(),
        }),
        response: None,
    }
}

fn apply_admission_response(
    response: &AdmissionResponse,
    job: &mut Job,
) -> Result<(), RemoteMutateError> {
    if !response.allowed {
        let status = response.status.as_ref();
        return Err(RemoteMutateError::NotAllowed {
            code: status.map(|status| status.code).unwrap_or_default(),
            reason: status.map(|status| status.reason.clone()).unwrap_or_default(),
            message: status
                .map(|status| status.message.clone())
                .unwrap_or_default(),
        });
    }

    let Some(encoded) = response.patch.as_ref().filter(|patch| !patch.is_empty()) else {
        return Ok(());
    };

    let decoded = BASE64
        .decode(encoded)
        .map_err(RemoteMutateError::PatchNotBase64)?;
    let patch: json_patch::Patch =
        serde_json::from_slice(&decoded).map_err(RemoteMutateError::PatchMalformed)?;

    let mut value = serde_json::to_value(&*job).map_err(RemoteMutateError::PatchedJobInvalid)?;
    json_patch::patch(&mut value, &patch).map_err(RemoteMutateError::PatchFailed)?;
    *job = serde_json::from_value(value).map_err(RemoteMutateError::PatchedJobInvalid)?;

    Ok(())
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
