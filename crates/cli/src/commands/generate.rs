// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! generate-job: offline Job rendering
//!
//! Builds exactly the Job the operator would create for the given
//! scheduled time and run id, including remote mutation when a webhook
//! URL is supplied. Useful for debugging templates and for CI checks
//! that diff rendered Jobs.

use anyhow::Context;
use cj_api::ControlledJob;
use cj_core::build_for_controlled_job;
use cj_core::mutate::MutatorSet;
use chrono::{DateTime, Utc};
use clap::Args;
use std::io::Read;

#[derive(Args)]
pub struct GenerateJobArgs {
    /// Scheduled start time of the rendered Job (RFC 3339)
    #[arg(long, value_parser = parse_rfc3339)]
    scheduled_at: DateTime<Utc>,

    /// Run id of the rendered Job within its run period
    #[arg(long)]
    job_run_id: i32,

    /// Mark the Job as manually scheduled
    #[arg(long)]
    manually_scheduled: bool,

    /// Render the Job with its suspend flag set
    #[arg(long)]
    start_suspended: bool,

    /// Send the rendered Job through this admission-webhook-style
    /// mutation service before printing
    #[arg(long)]
    job_admission_webhook_url: Option<String>,
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("not an RFC 3339 timestamp: {err}"))
}

pub async fn handle(args: GenerateJobArgs) -> anyhow::Result<()> {
    let mutators = MutatorSet::new();
    if let Some(url) = &args.job_admission_webhook_url {
        cj_mutators::enable_remote_mutator(&mutators, url)
            .map_err(|err| anyhow::anyhow!("unable to enable remote mutator: {err}"))?;
    }

    let mut manifest = String::new();
    std::io::stdin()
        .read_to_string(&mut manifest)
        .context("failed to read manifest from stdin")?;
    let controlled_job: ControlledJob = serde_json::from_str(&manifest)
        .context("failed to parse stdin as a ControlledJob manifest")?;

    let job = build_for_controlled_job(
        &controlled_job,
        args.scheduled_at,
        args.job_run_id,
        args.manually_scheduled,
        args.start_suspended,
        &mutators,
    )
    .await
    .context("failed to build job")?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
