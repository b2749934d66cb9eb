//! Gateway configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use workgate_core::WorkspaceRoots;
use workgate_exec::ShellBridge;

use crate::routes::DEFAULT_BODY_LIMIT;

/// Transcript file name used when none is configured.
const DEFAULT_TRANSCRIPT: &str = "work.rhai";

/// Workgate - workspace-scoped file and execution gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "workgate")]
#[command(about = "HTTP gateway for file operations and command execution inside workspace roots")]
pub struct GatewayConfig {
    /// Workspace root directories, primary first
    #[arg(
        long = "root",
        env = "WORKGATE_ROOTS",
        value_delimiter = ',',
        default_value = "Work"
    )]
    pub roots: Vec<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "WORKGATE_ADDR", default_value = "127.0.0.1:5000")]
    pub addr: SocketAddr,

    /// Snippet transcript (defaults to `work.rhai` in the primary root)
    #[arg(long, env = "WORKGATE_TRANSCRIPT")]
    pub transcript: Option<PathBuf>,

    /// Stateful shell endpoint (Unix socket path or Windows pipe name)
    #[arg(long, env = "WORKGATE_SHELL_ENDPOINT")]
    pub shell_endpoint: Option<PathBuf>,

    /// Wall-clock limit for one command, in seconds
    #[arg(long, env = "WORKGATE_COMMAND_TIMEOUT_SECS", default_value_t = 15)]
    pub command_timeout_secs: u64,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "WORKGATE_MAX_BODY_BYTES", default_value_t = DEFAULT_BODY_LIMIT)]
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    /// Command timeout as a duration.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Transcript path, falling back to the primary root.
    #[must_use]
    pub fn transcript_path(&self, roots: &WorkspaceRoots) -> PathBuf {
        self.transcript
            .clone()
            .unwrap_or_else(|| roots.primary().join(DEFAULT_TRANSCRIPT))
    }

    /// Stateful shell endpoint, falling back to the platform default.
    #[must_use]
    pub fn shell_endpoint(&self, roots: &WorkspaceRoots) -> PathBuf {
        self.shell_endpoint
            .clone()
            .unwrap_or_else(|| ShellBridge::default_endpoint(roots.primary()))
    }
}
