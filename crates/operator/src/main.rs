// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! controlled-job-operator entry point

use clap::Parser;
use cj_core::mutate::MutatorSet;
use cj_operator::reconcile::ReconcileOptions;
use cj_operator::{controller, health, leader};
use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "cj-operator")]
#[command(about = "Operator keeping ControlledJob workloads inside their scheduled windows")]
#[command(version)]
struct Args {
    /// The address the metric endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_bind_address: SocketAddr,

    /// The address the probe endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: SocketAddr,

    /// Enable leader election so only one operator instance is active
    #[arg(long)]
    leader_elect: bool,

    /// Maximum number of ControlledJobs to reconcile in parallel
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Recreate running jobs when their template changes (also gated per
    /// resource by restartStrategy.specChangePolicy)
    #[arg(long)]
    enable_auto_recreate_jobs_on_spec_change: bool,

    /// If set, new jobs are sent to this URL prior to creation. The
    /// remote service is expected to behave like a MutatingAdmissionWebhook
    /// and return a patch to be applied.
    #[arg(long)]
    job_admission_webhook_url: Option<String>,

    /// Namespace holding the leadership lease
    #[arg(long, default_value = "default", env = "POD_NAMESPACE")]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mutators = MutatorSet::new();
    if let Some(url) = &args.job_admission_webhook_url {
        tracing::info!(url, "enabling remote mutator");
        cj_mutators::enable_remote_mutator(&mutators, url)
            .map_err(|err| anyhow::anyhow!("unable to enable remote mutator: {err}"))?;
    }

    let client = kube::Client::try_default().await?;

    tokio::spawn(health::serve_probes(args.health_probe_bind_address));
    tokio::spawn(health::serve_metrics(args.metrics_bind_address));

    if args.leader_elect {
        let identity = format!(
            "{}-{}",
            controller::CONTROLLER_NAME,
            std::process::id()
        );
        leader::acquire_and_hold(client.clone(), &args.namespace, &identity).await?;
    }

    tracing::info!(
        concurrency = args.concurrency,
        auto_recreate = args.enable_auto_recreate_jobs_on_spec_change,
        "starting controller"
    );
    controller::run(
        client,
        mutators,
        ReconcileOptions {
            enable_auto_recreate_jobs_on_spec_change: args.enable_auto_recreate_jobs_on_spec_change,
        },
        args.concurrency,
    )
    .await
}
