//! Request and response bodies.
//!
//! Every request field is optional on the wire: a missing field takes its
//! default, and a body that is not valid JSON is read as `{}`.

use serde::{Deserialize, Serialize};

/// `POST /execute`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecuteRequest {
    pub code: String,
}

/// Reply to `POST /execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub result: String,
}

/// `POST /execute_ps` and `POST /run`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandRequest {
    pub command: String,
    /// Working directory relative to the roots.
    pub cwd: Option<String>,
}

/// `POST /execute_ps_stateful`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatefulRequest {
    pub command: String,
}

/// `POST /save`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SaveRequest {
    pub path: String,
    pub content: String,
}

/// `POST /list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    pub path: Option<String>,
}

/// `POST /open`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenRequest {
    pub path: String,
}

/// `POST /peek`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeekRequest {
    pub path: String,
    pub limit: Option<usize>,
}

/// Reply to `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Successful file operation: `{"ok": true, ...body}`.
#[derive(Debug, Clone, Serialize)]
pub struct Success<T> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Success<T> {
    #[must_use]
    pub const fn new(body: T) -> Self {
        Self { ok: true, body }
    }
}

/// Failed file operation: `{"ok": false, "error": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub ok: bool,
    pub error: String,
}

impl Failure {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}
