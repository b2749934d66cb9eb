//! Core abstractions for the workspace gateway.
//!
//! This crate provides the fundamental building blocks:
//! - `WorkspaceRoots` - The configured directory boundaries
//! - `ResolvedPath` - A canonical path proven to lie inside one root
//! - `CommandResult` - Uniform result shape for every command path

pub mod result;
pub mod roots;

pub use result::{CommandResult, NOT_EXECUTED};
pub use roots::{PathError, ResolvedPath, WorkspaceRoots};
