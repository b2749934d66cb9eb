//! Persistent execution session for submitted script snippets.
//!
//! Provides:
//! - `ExecutionSession` - Process-wide namespace shared by every `submit`
//! - `Transcript` - Append-only log replayed to rebuild the namespace

pub mod session;
pub mod transcript;

pub use session::{ExecutionSession, FAILURE_MARKER, SessionError};
pub use transcript::{SNIPPET_MARKER, Transcript};
