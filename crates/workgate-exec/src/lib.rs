//! Command execution inside the workspace roots.
//!
//! Provides:
//! - `ProcessRunner` - One-shot shell commands with a hard timeout
//! - `ShellBridge` - Client for an external, long-lived stateful shell
//! - Shell detection utilities for Unix and Windows

pub mod bridge;
pub mod runner;
pub mod shell;

pub use bridge::{BridgeError, ShellBridge, exchange};
pub use runner::{DEFAULT_TIMEOUT, ProcessRunner};
pub use shell::{ShellCommand, resolve_executable_path};
