// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cj - ControlledJob command line tooling

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cj")]
#[command(about = "ControlledJob tooling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the Job a ControlledJob manifest would produce, without a
    /// cluster. Reads the manifest as JSON on stdin and writes the Job as
    /// JSON on stdout.
    GenerateJob(commands::generate::GenerateJobArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateJob(args) => commands::generate::handle(args).await,
    }
}
