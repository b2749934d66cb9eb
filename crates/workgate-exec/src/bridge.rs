//! Client for an external stateful shell.
//!
//! The shell host is a separate, long-lived process that owns one shell
//! session. Each call opens the host's named endpoint, writes one
//! newline-terminated JSON request and reads one JSON response, so working
//! directory, environment and aliases carry over between calls.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use workgate_core::CommandResult;

/// Named pipe served by the Windows shell host.
pub const DEFAULT_PIPE_NAME: &str = r"\\.\pipe\gptPipe";

/// Exit code reported when the bridge itself fails.
const BRIDGE_FAILURE: i32 = 1;

/// Bridge error.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Stateful shell unavailable at {endpoint}: {source}")]
    Unavailable {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Stateful shell closed the channel without responding")]
    Closed,
}

#[derive(Serialize)]
struct ShellRequest<'a> {
    cmd: &'a str,
}

/// Client for the stateful shell host.
#[derive(Debug, Clone)]
pub struct ShellBridge {
    endpoint: PathBuf,
    timeout: Duration,
}

impl ShellBridge {
    /// Create a bridge to `endpoint` (a Unix socket path or a Windows pipe name).
    #[must_use]
    pub fn new(endpoint: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Platform default endpoint for a workspace whose primary root is `root`.
    #[must_use]
    pub fn default_endpoint(root: &Path) -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(DEFAULT_PIPE_NAME)
        } else {
            root.join(".workgate").join("shell.sock")
        }
    }

    /// The endpoint this bridge connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Send one command to the stateful shell.
    ///
    /// Never fails: an unreachable host or malformed reply becomes exit code 1,
    /// a reply that does not arrive in time becomes a timeout result.
    pub async fn send(&self, command: &str) -> CommandResult {
        match tokio::time::timeout(self.timeout, self.round_trip(command)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::warn!(endpoint = %self.endpoint.display(), %err, "Stateful shell call failed");
                CommandResult::new(String::new(), err.to_string(), BRIDGE_FAILURE)
            }
            Err(_) => {
                tracing::warn!(endpoint = %self.endpoint.display(), timeout = ?self.timeout, "Stateful shell did not respond");
                CommandResult::timed_out()
            }
        }
    }

    async fn round_trip(&self, command: &str) -> Result<CommandResult, BridgeError> {
        let stream = connect(&self.endpoint)
            .await
            .map_err(|source| BridgeError::Unavailable {
                endpoint: self.endpoint.display().to_string(),
                source,
            })?;
        exchange(stream, command).await
    }
}

#[cfg(unix)]
async fn connect(endpoint: &Path) -> io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(endpoint).await
}

#[cfg(windows)]
async fn connect(
    endpoint: &Path,
) -> io::Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(endpoint.as_os_str())
}

/// Perform one request/response exchange over an established stream.
///
/// The request is `{"cmd": ...}` followed by `\n`. The response is read line
/// by line until the accumulated bytes form a complete JSON document, so a
/// host that pretty-prints its reply is still understood.
///
/// # Errors
/// Returns error on I/O failure, malformed JSON, or a channel that closes
/// before any response bytes arrive.
pub async fn exchange<S>(stream: S, command: &str) -> Result<CommandResult, BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);

    let json = serde_json::to_string(&ShellRequest { cmd: command })?;
    let writer = reader.get_mut();
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut response = Vec::new();
    loop {
        let read = reader.read_until(b'\n', &mut response).await?;
        if read == 0 {
            break; // EOF
        }
        if response.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<CommandResult>(&response) {
            Ok(result) => return Ok(result),
            Err(err) if err.is_eof() => {}
            Err(err) => return Err(err.into()),
        }
    }

    if response.iter().all(u8::is_ascii_whitespace) {
        return Err(BridgeError::Closed);
    }
    Ok(serde_json::from_slice(&response)?)
}
