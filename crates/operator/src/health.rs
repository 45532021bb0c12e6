// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Probe and metrics endpoints

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;

/// Serve /healthz and /readyz on the probe address
pub async fn serve_probes(address: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(ok))
        .route("/readyz", get(ok));
    serve(address, app).await
}

/// Serve /metrics on the metrics address. The endpoint speaks the
/// exposition format; collectors are registered by the surrounding
/// deployment's sidecars, not by the operator itself.
pub async fn serve_metrics(address: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics));
    serve(address, app).await
}

async fn serve(address: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ok() -> &'static str {
    "ok"
}

async fn metrics() -> &'static str {
    "# controlled-job-operator metrics\n"
}
