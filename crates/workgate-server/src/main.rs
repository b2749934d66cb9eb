//! Workgate server.
//!
//! Run with: cargo run -p workgate-server -- --root Work
//!
//! Then POST JSON to http://127.0.0.1:5000/execute, /execute_ps, /save, ...

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use workgate_core::WorkspaceRoots;
use workgate_exec::{ProcessRunner, ShellBridge};
use workgate_fs::FileOps;
use workgate_server::{AppState, GatewayConfig, build_router};
use workgate_session::ExecutionSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = GatewayConfig::parse();

    let roots = WorkspaceRoots::prepare(&config.roots).context("Failed to prepare workspace roots")?;
    for root in roots.iter() {
        tracing::info!(root = %root.display(), "Workspace root");
    }

    let session = ExecutionSession::open(config.transcript_path(&roots))?;
    let runner = ProcessRunner::detect(roots.clone(), config.command_timeout()).await;
    let bridge = ShellBridge::new(config.shell_endpoint(&roots), config.command_timeout());
    tracing::info!(endpoint = %bridge.endpoint().display(), "Stateful shell endpoint");

    let state = AppState {
        files: FileOps::new(roots),
        runner,
        bridge,
        session,
    };
    let app = build_router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    tracing::info!("Server listening on http://{}", config.addr);

    axum::serve(listener, app).await?;
    Ok(())
}
