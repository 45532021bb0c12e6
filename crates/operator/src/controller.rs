// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller wiring: watches ControlledJobs and their owned Jobs, and
//! funnels work-queue items into the reconcile driver

use crate::client::{KubeControlledJobClient, NamespacedName};
use crate::events::KubeEventSink;
use crate::reconcile::{reconcile, ReconcileFailure, ReconcileOptions};
use cj_api::ControlledJob;
use cj_core::clock::{Clock, SystemClock};
use cj_core::mutate::MutatorSet;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::api::Api;
use kube::runtime::controller::{Action, Config, Controller};
use kube::runtime::watcher;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;

pub const CONTROLLER_NAME: &str = "controlled-job-operator";

/// Everything a single reconcile invocation needs
pub struct Context {
    pub client: KubeControlledJobClient,
    pub events: KubeEventSink,
    pub mutators: MutatorSet,
    pub options: ReconcileOptions,
    pub clock: SystemClock,
}

async fn reconcile_resource(
    controlled_job: Arc<ControlledJob>,
    context: Arc<Context>,
) -> Result<Action, ReconcileFailure> {
    let target = NamespacedName {
        namespace: controlled_job.namespace().unwrap_or_default(),
        name: controlled_job.name_any(),
    };
    let result = reconcile(
        &target,
        context.clock.now(),
        &context.client,
        &context.events,
        &context.mutators,
        context.options,
    )
    .await;
    tracing::info!(
        target = %target,
        requeue_after = ?result.requeue_after,
        failed = result.failure.is_some(),
        "reconcile complete"
    );
    result.into_action()
}

fn error_policy(
    _controlled_job: Arc<ControlledJob>,
    _failure: &ReconcileFailure,
    _context: Arc<Context>,
) -> Action {
    // The runtime's own exponential backoff takes it from here
    Action::requeue(Duration::from_secs(5))
}

/// Run the controller until shutdown. Reconciles for distinct resources
/// run in parallel up to `concurrency`; the runtime serializes passes
/// for any single resource.
pub async fn run(
    client: kube::Client,
    mutators: MutatorSet,
    options: ReconcileOptions,
    concurrency: usize,
) -> anyhow::Result<()> {
    let context = Arc::new(Context {
        client: KubeControlledJobClient::new(client.clone()),
        events: KubeEventSink::new(client.clone(), CONTROLLER_NAME),
        mutators,
        options,
        clock: SystemClock,
    });

    let controlled_jobs: Api<ControlledJob> = Api::all(client.clone());
    let jobs: Api<Job> = Api::all(client);

    Controller::new(controlled_jobs, watcher::Config::default())
        .owns(jobs, watcher::Config::default())
        .with_config(Config::default().concurrency(concurrency as u16))
        .shutdown_on_signal()
        .run(reconcile_resource, error_policy, context)
        .for_each(|outcome| async move {
            match outcome {
                Ok((reference, _action)) => {
                    tracing::debug!(resource = %reference, "reconciled");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "reconcile failed");
                }
            }
        })
        .await;

    Ok(())
}
