//! Router and handlers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use workgate_core::CommandResult;
use workgate_exec::{ProcessRunner, ShellBridge};
use workgate_fs::{DEFAULT_PEEK_LIMIT, FileContent, FileOpError, FileOps, Listing, Preview, Saved};
use workgate_session::ExecutionSession;

use crate::protocol::{
    CommandRequest, ExecuteRequest, ExecuteResponse, Failure, ListRequest, OpenRequest,
    PeekRequest, SaveRequest, StatefulRequest, StatusResponse, Success,
};

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub files: FileOps,
    pub runner: ProcessRunner,
    pub bridge: ShellBridge,
    pub session: ExecutionSession,
}

/// Largest request body accepted when no limit is configured (32 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Build the gateway router.
///
/// Bodies larger than `body_limit` bytes are refused with 413.
pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/execute", post(execute))
        .route("/execute_ps", post(run_command))
        .route("/run", post(run_command))
        .route("/execute_ps_stateful", post(run_stateful))
        .route("/save", post(save))
        .route("/list", post(list))
        .route("/open", post(open))
        .route("/peek", post(peek))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// JSON body that tolerates bad JSON: an unparseable body becomes
/// `T::default()`.
///
/// A body that cannot be read at all (too large, connection dropped) is
/// rejected with its own status and a `{"ok": false, "error": ...}` reply.
#[derive(Debug, Clone, Default)]
pub struct LenientJson<T>(pub T);

impl<S, T> FromRequest<S> for LenientJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state).await.map_err(|rejection| {
            let status = rejection.status();
            tracing::warn!(%status, err = %rejection.body_text(), "Failed to read request body");
            (status, Json(Failure::new(rejection.body_text()))).into_response()
        })?;
        let value = serde_json::from_slice(&body).unwrap_or_else(|err| {
            if !body.is_empty() {
                tracing::debug!(%err, "Unparseable request body, using defaults");
            }
            T::default()
        });
        Ok(Self(value))
    }
}

/// A failed file operation rendered as `{"ok": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError(FileOpError);

impl From<FileOpError> for ApiError {
    fn from(err: FileOpError) -> Self {
        Self(err)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self.0 {
            FileOpError::PathEscape(_)
            | FileOpError::NotADirectory(_)
            | FileOpError::IsADirectory(_) => StatusCode::BAD_REQUEST,
            FileOpError::NotFound(_) => StatusCode::NOT_FOUND,
            FileOpError::NotDecodable(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            FileOpError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(err = %self.0, "File operation failed");
        } else {
            tracing::debug!(err = %self.0, %status, "File operation rejected");
        }
        (status, Json(Failure::new(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "running" })
}

async fn execute(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<ExecuteRequest>,
) -> Json<ExecuteResponse> {
    let result = state.session.submit(req.code).await;
    Json(ExecuteResponse { result })
}

async fn run_command(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<CommandRequest>,
) -> Json<CommandResult> {
    Json(state.runner.run(&req.command, req.cwd.as_deref()).await)
}

async fn run_stateful(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<StatefulRequest>,
) -> Json<CommandResult> {
    Json(state.bridge.send(&req.command).await)
}

async fn save(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<SaveRequest>,
) -> ApiResult<Saved> {
    let saved = state.files.write(&req.path, &req.content).await?;
    Ok(Json(Success::new(saved)))
}

async fn list(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<ListRequest>,
) -> ApiResult<Listing> {
    let path = req.path.unwrap_or_else(|| ".".to_string());
    Ok(Json(Success::new(state.files.list(&path).await?)))
}

async fn open(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<OpenRequest>,
) -> ApiResult<FileContent> {
    Ok(Json(Success::new(state.files.read(&req.path).await?)))
}

async fn peek(
    State(state): State<AppState>,
    LenientJson(req): LenientJson<PeekRequest>,
) -> ApiResult<Preview> {
    let limit = req.limit.unwrap_or(DEFAULT_PEEK_LIMIT);
    Ok(Json(Success::new(state.files.peek(&req.path, limit).await?)))
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, path::Path, time::Duration};

    use axum::body::{Body, to_bytes};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use workgate_core::WorkspaceRoots;
    use workgate_exec::ShellCommand;

    use super::*;

    struct Fixture {
        dir: TempDir,
        root: std::path::PathBuf,
        router: Router,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let roots = WorkspaceRoots::prepare([dir.path().join("ws")]).unwrap();
        let root = roots.primary().to_path_buf();
        let state = AppState {
            files: FileOps::new(roots.clone()),
            runner: ProcessRunner::new(
                roots.clone(),
                ShellCommand::new("/bin/sh", ["-c"]),
                Duration::from_secs(5),
            ),
            bridge: ShellBridge::new(dir.path().join("absent.sock"), Duration::from_secs(1)),
            session: ExecutionSession::open(dir.path().join("work.rhai")).unwrap(),
        };
        Fixture {
            dir,
            root,
            router: build_router(state, 64 * 1024),
        }
    }

    async fn call(router: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        call(router, "POST", uri, &body.to_string()).await
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn status_reports_running() {
        let fx = fixture();
        let (status, body) = call(&fx.router, "GET", "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "running"}));
    }

    #[tokio::test]
    async fn execute_keeps_namespace() {
        let fx = fixture();
        let (_, body) = post(&fx.router, "/execute", json!({"code": "let x = 1;"})).await;
        assert_eq!(body, json!({"result": "None"}));

        let (status, body) = post(&fx.router, "/execute", json!({"code": "x + 1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "2"}));
    }

    #[tokio::test]
    async fn execute_failure_is_still_ok() {
        let fx = fixture();
        let (status, body) = post(&fx.router, "/execute", json!({"code": "1 / 0"})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["result"].as_str().unwrap().starts_with("❌"));
    }

    #[tokio::test]
    async fn execute_ps_and_run_share_behavior() {
        let fx = fixture();
        for uri in ["/execute_ps", "/run"] {
            let (status, body) = post(&fx.router, uri, json!({"command": "echo hi"})).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"stdout": "hi", "stderr": "", "exitCode": 0}));
        }
    }

    #[tokio::test]
    async fn execute_ps_escape_is_ok_with_sentinel() {
        let fx = fixture();
        let (status, body) = post(
            &fx.router,
            "/execute_ps",
            json!({"command": "echo hi", "cwd": "../.."}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exitCode"], -1);
        assert_eq!(body["stdout"], "");
        assert!(body["stderr"].as_str().unwrap().starts_with("Path escape"));
    }

    #[tokio::test]
    async fn stateful_without_host_reports_failure() {
        let fx = fixture();
        let (status, body) =
            post(&fx.router, "/execute_ps_stateful", json!({"command": "pwd"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exitCode"], 1);
    }

    #[tokio::test]
    async fn save_then_open() {
        let fx = fixture();
        let (status, body) = post(
            &fx.router,
            "/save",
            json!({"path": "notes/today.md", "content": "# Today\n"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "saved": "notes/today.md"}));

        let (status, body) = post(&fx.router, "/open", json!({"path": "notes/today.md"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"ok": true, "path": "notes/today.md", "content": "# Today\n"})
        );
    }

    #[tokio::test]
    async fn save_escape_is_rejected() {
        let fx = fixture();
        let (status, body) = post(
            &fx.router,
            "/save",
            json!({"path": "../outside.txt", "content": "x"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Path escape"));
        assert!(!fx.root.parent().unwrap().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn oversized_body_is_refused_not_defaulted() {
        let fx = fixture();
        let big = "x".repeat(128 * 1024);

        let (status, body) = post(
            &fx.router,
            "/save",
            json!({"path": "big.txt", "content": big}),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["ok"], false);
        assert!(body["error"].is_string());
        assert!(!fx.root.join("big.txt").exists());

        let (status, body) = post(
            &fx.router,
            "/execute",
            json!({"code": format!("let big = \"{big}\";")}),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["ok"], false);
        let transcript = fs::read_to_string(fx.dir.path().join("work.rhai")).unwrap();
        assert!(transcript.is_empty(), "{transcript}");
    }

    #[tokio::test]
    async fn list_defaults_to_root() {
        let fx = fixture();
        write(&fx.root, "b.txt", "b");
        fs::create_dir(fx.root.join("a-dir")).unwrap();

        let (status, body) = call(&fx.router, "POST", "/list", "not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["path"], ".");
        let names: Vec<_> = body["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a-dir", "b.txt"]);
        assert_eq!(body["entries"][0]["isDirectory"], true);
    }

    #[tokio::test]
    async fn file_errors_map_to_status_codes() {
        let fx = fixture();
        write(&fx.root, "file.txt", "text");
        fs::create_dir(fx.root.join("dir")).unwrap();
        fs::write(fx.root.join("blob.bin"), [0u8, 159, 146, 150]).unwrap();

        let cases = [
            ("/list", json!({"path": "missing"}), StatusCode::NOT_FOUND),
            ("/list", json!({"path": "file.txt"}), StatusCode::BAD_REQUEST),
            ("/open", json!({"path": "missing.txt"}), StatusCode::NOT_FOUND),
            ("/open", json!({"path": "dir"}), StatusCode::BAD_REQUEST),
            ("/open", json!({"path": "blob.bin"}), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            ("/peek", json!({"path": "/etc/passwd"}), StatusCode::BAD_REQUEST),
        ];
        for (uri, body, expected) in cases {
            let (status, reply) = post(&fx.router, uri, body.clone()).await;
            assert_eq!(status, expected, "{uri} {body}");
            assert_eq!(reply["ok"], false);
            assert!(reply["error"].is_string());
        }
    }

    #[tokio::test]
    async fn peek_uses_default_limit() {
        let fx = fixture();
        let text: String = (1..=60).map(|n| format!("line {n}\n")).collect();
        write(&fx.root, "long.txt", &text);

        let (_, body) = post(&fx.router, "/peek", json!({"path": "long.txt"})).await;
        assert_eq!(body["lines"], 50);

        let (_, body) = post(&fx.router, "/peek", json!({"path": "long.txt", "limit": 3})).await;
        assert_eq!(body["lines"], 3);
        assert_eq!(body["preview"], "line 1\nline 2\nline 3");
    }
}
