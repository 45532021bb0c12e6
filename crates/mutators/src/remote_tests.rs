// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use super::{apply_admission_response, build_admission_review, AdmissionResponse, ResponseStatus};
use k8s_openapi::api::batch::v1::Job;

fn job_named(name: &str) -> Job {
    let mut job = Job::default();
    job.metadata.name = Some(name.to_string());
    job.metadata.namespace = Some("default".to_string());
    job
}

fn encode_patch(patch: serde_json::Value) -> String {
    BASE64.encode(serde_json::to_vec(&patch).unwrap())
}

fn allowed_with_patch(patch: Option<String>) -> AdmissionResponse {
    AdmissionResponse {
        uid: "review-1".to_string(),
        allowed: true,
        status: None,
        patch,
        patch_type: Some("JSONPatch".to_string()),
    }
}

#[test]
fn review_request_carries_the_pending_job() {
    let job = job_named("trading-engine-1670835600-0");
    let review = build_admission_review(&job);

    assert_eq!(review.api_version, "admission.k8s.io/v1");
    assert_eq!(review.kind, "AdmissionReview");

    let request = review.request.as_ref().unwrap();
    assert!(!request.uid.is_empty());
    assert_eq!(request.kind.kind, "Job");
    assert_eq!(request.resource.resource, "jobs");
    assert_eq!(request.operation, "CREATE");
    assert_eq!(request.name, "trading-engine-1670835600-0");
    assert_eq!(request.namespace, "default");
    assert_eq!(request.object.metadata.name, job.metadata.name);
}

#[test]
fn review_serializes_in_wire_casing() {
    let review = build_admission_review(&job_named("j"));
    let wire = serde_json::to_value(&review).unwrap();

    assert_eq!(wire["apiVersion"], "admission.k8s.io/v1");
    assert!(wire["request"]["uid"].is_string());
    assert!(wire.get("response").is_none());
}

#[test]
fn allowed_without_patch_leaves_the_job_alone() {
    let mut job = job_named("j");
    let before = job.clone();

    apply_admission_response(&allowed_with_patch(None), &mut job).unwrap();
    assert_eq!(serde_json::to_value(&job).unwrap(), serde_json::to_value(&before).unwrap());

    apply_admission_response(&allowed_with_patch(Some(String::new())), &mut job).unwrap();
    assert_eq!(serde_json::to_value(&job).unwrap(), serde_json::to_value(&before).unwrap());
}

#[test]
fn allowed_with_patch_rewrites_the_job() {
    let mut job = job_named("j");
    let patch = encode_patch(serde_json::json!([
        {"op": "add", "path": "/metadata/labels", "value": {"team": "markets"}}
    ]));

    apply_admission_response(&allowed_with_patch(Some(patch)), &mut job).unwrap();

    assert_eq!(
        job.metadata.labels.as_ref().unwrap().get("team"),
        Some(&"markets".to_string())
    );
    // Untouched fields survive the value round trip
    assert_eq!(job.metadata.name.as_deref(), Some("j"));
}

#[test]
fn not_allowed_fails_with_the_service_diagnostics() {
    let response = AdmissionResponse {
        uid: String::new(),
        allowed: false,
        status: Some(ResponseStatus {
            code: 403,
            reason: "Forbidden".to_string(),
            message: "jobs may not run on weekends".to_string(),
        }),
        patch: None,
        patch_type: None,
    };

    let err = apply_admission_response(&response, &mut job_named("j")).unwrap_err();
    assert!(matches!(
        err,
        RemoteMutateError::NotAllowed { code: 403, ref reason, ref message }
            if reason == "Forbidden" && message == "jobs may not run on weekends"
    ));
}

#[test]
fn not_allowed_without_a_status_object_still_fails() {
    let response = AdmissionResponse {
        uid: String::new(),
        allowed: false,
        status: None,
        patch: None,
        patch_type: None,
    };

    let err = apply_admission_response(&response, &mut job_named("j")).unwrap_err();
    assert!(matches!(err, RemoteMutateError::NotAllowed { code: 0, .. }));
}

#[test]
fn a_patch_that_is_not_base64_fails() {
    let err = apply_admission_response(
        &allowed_with_patch(Some("!!! not base64 !!!".to_string())),
        &mut job_named("j"),
    )
    .unwrap_err();
    assert!(matches!(err, RemoteMutateError::PatchNotBase64(_)));
}

#[test]
fn a_patch_that_is_not_json_patch_fails() {
    let encoded = BASE64.encode(br#"{"op": "this is not an array"}"#);
    let err = apply_admission_response(
        &allowed_with_patch(Some(encoded)),
        &mut job_named("j"),
    )
    .unwrap_err();
    assert!(matches!(err, RemoteMutateError::PatchMalformed(_)));
}

#[test]
fn a_patch_that_does_not_apply_fails() {
    // Replace on a path that doesn't exist
    let patch = encode_patch(serde_json::json!([
        {"op": "replace", "path": "/spec/parallelism", "value": 3}
    ]));
    let err =
        apply_admission_response(&allowed_with_patch(Some(patch)), &mut job_named("j")).unwrap_err();
    assert!(matches!(err, RemoteMutateError::PatchFailed(_)));
}

#[test]
fn response_parses_from_wire_casing() {
    let raw = serde_json::json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "response": {
            "uid": "abc",
            "allowed": true,
            "patchType": "JSONPatch",
            "patch": BASE64.encode(b"[]"),
        }
    });
    let review: super::AdmissionReview = serde_json::from_value(raw).unwrap();
    let response = review.response.unwrap();
    assert!(response.allowed);
    assert_eq!(response.patch_type.as_deref(), Some("JSONPatch"));
}
