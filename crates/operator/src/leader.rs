// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease-based leader election
//!
//! Blocks until this instance holds the coordination lease, then renews
//! it in the background. Losing the lease terminates the process so the
//! surrounding deployment restarts us into the follower path; that is
//! simpler and safer than trying to wind down a half-running controller.

use anyhow::Context as _;
use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use std::time::Duration;

pub const LEASE_NAME: &str = "controlled-job-operator-leader";

const LEASE_DURATION_SECONDS: i32 = 30;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// Wait until we hold the lease, then keep renewing it in a background
/// task for the life of the process
pub async fn acquire_and_hold(
    client: kube::Client,
    namespace: &str,
    identity: &str,
) -> anyhow::Result<()> {
    let leases: Api<Lease> = Api::namespaced(client, namespace);

    loop {
        match try_acquire(&leases, identity).await {
            Ok(true) => break,
            Ok(false) => {
                tracing::info!(lease = LEASE_NAME, "lease held elsewhere, waiting");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to acquire lease, will retry");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
    tracing::info!(lease = LEASE_NAME, identity, "acquired leadership");

    let renew_identity = identity.to_string();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(RENEW_INTERVAL).await;
            if let Err(err) = renew(&leases, &renew_identity).await {
                tracing::error!(error = %err, "failed to renew leadership lease, exiting");
                std::process::exit(1);
            }
        }
    });

    Ok(())
}

async fn try_acquire(leases: &Api<Lease>, identity: &str) -> anyhow::Result<bool> {
    let existing = leases.get_opt(LEASE_NAME).await?;

    let Some(existing) = existing else {
        let lease = lease_for(identity, 0);
        match leases.create(&PostParams::default(), &lease).await {
            Ok(_) => return Ok(true),
            Err(kube::Error::Api(response)) if response.code == 409 => return Ok(false),
            Err(err) => return Err(err.into()),
        }
    };

    let spec = existing.spec.clone().unwrap_or_default();
    let held_by_us = spec.holder_identity.as_deref() == Some(identity);
    let expired = spec
        .renew_time
        .as_ref()
        .map(|renewed| {
            let age = Utc::now() - renewed.0;
            age.num_seconds() > i64::from(spec.lease_duration_seconds.unwrap_or(LEASE_DURATION_SECONDS))
        })
        .unwrap_or(true);

    if !held_by_us && !expired {
        return Ok(false);
    }

    let transitions = spec.lease_transitions.unwrap_or(0) + i32::from(!held_by_us);
    let lease = lease_for(identity, transitions);
    leases
        .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&lease))
        .await
        .context("failed to take over lease")?;
    Ok(true)
}

async fn renew(leases: &Api<Lease>, identity: &str) -> anyhow::Result<()> {
    let current = leases
        .get(LEASE_NAME)
        .await
        .context("failed to read lease")?;
    let holder = current
        .spec
        .as_ref()
        .and_then(|spec| spec.holder_identity.as_deref());
    if holder != Some(identity) {
        anyhow::bail!("lease is now held by {}", holder.unwrap_or("nobody"));
    }

    let patch = serde_json::json!({
        "spec": { "renewTime": MicroTime(Utc::now()) }
    });
    leases
        .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .context("failed to renew lease")?;
    Ok(())
}

fn lease_for(identity: &str, transitions: i32) -> Lease {
    let mut lease = Lease::default();
    lease.metadata.name = Some(LEASE_NAME.to_string());
    lease.spec = Some(LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(LEASE_DURATION_SECONDS),
        acquire_time: Some(MicroTime(Utc::now())),
        renew_time: Some(MicroTime(Utc::now())),
        lease_transitions: Some(transitions),
        ..Default::default()
    });
    lease
}
