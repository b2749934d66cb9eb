//! Process-wide script execution session.
//!
//! Snippets are Rhai scripts. Top-level `let`/`const` bindings and `fn`
//! definitions survive from one `submit` to the next, and every snippet is
//! logged to the transcript before it runs so the namespace can be rebuilt
//! after a restart.

use std::{
    io,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};

use crate::transcript::Transcript;

/// Prefix of every result that reports a failure.
pub const FAILURE_MARKER: &str = "❌";

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to open transcript {}: {source}", path.display())]
    Transcript {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

type EvalResult<T> = Result<T, Box<EvalAltResult>>;

/// Shared, long-lived script namespace.
///
/// Cloning is cheap and every clone sees the same namespace. All access goes
/// through one lock, so snippets never interleave and the transcript order is
/// the evaluation order.
#[derive(Clone)]
pub struct ExecutionSession {
    inner: Arc<Mutex<SessionState>>,
}

impl std::fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSession").finish_non_exhaustive()
    }
}

impl ExecutionSession {
    /// Open the transcript at `path` and replay it into a fresh namespace.
    ///
    /// Snippets that fail during replay are logged and skipped.
    ///
    /// # Errors
    /// Returns error if the transcript cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let (transcript, history) =
            Transcript::open(&path).map_err(|source| SessionError::Transcript {
                path: path.clone(),
                source,
            })?;

        let mut state = SessionState::new(transcript);
        let mut failed = 0usize;
        for (index, snippet) in history.iter().enumerate() {
            if let Err(err) = state.eval(snippet) {
                failed += 1;
                tracing::warn!(index, %err, "Skipping snippet that failed during replay");
            }
        }
        state.take_output();

        tracing::info!(
            transcript = %path.display(),
            replayed = history.len() - failed,
            failed,
            "Execution session restored"
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// Record and evaluate a snippet, returning its printed output or value.
    ///
    /// Never fails: evaluation errors come back as text starting with
    /// [`FAILURE_MARKER`]. Runs on the blocking pool while holding the session
    /// lock.
    pub async fn submit(&self, snippet: impl Into<String>) -> String {
        let session = self.clone();
        let snippet = snippet.into();
        match tokio::task::spawn_blocking(move || session.submit_blocking(&snippet)).await {
            Ok(result) => result,
            Err(err) => format!("{FAILURE_MARKER} {err}"),
        }
    }

    /// Blocking variant of [`Self::submit`].
    #[must_use]
    pub fn submit_blocking(&self, snippet: &str) -> String {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.submit(snippet)
    }
}

struct SessionState {
    engine: Engine,
    scope: Scope<'static>,
    /// Script functions defined by earlier snippets.
    library: AST,
    output: Arc<Mutex<String>>,
    transcript: Transcript,
}

impl SessionState {
    fn new(transcript: Transcript) -> Self {
        let output = Arc::new(Mutex::new(String::new()));
        let mut engine = Engine::new();

        let sink = Arc::clone(&output);
        engine.on_print(move |text| {
            let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
            out.push_str(text);
            out.push('\n');
        });
        let sink = Arc::clone(&output);
        engine.on_debug(move |text, _source, _pos| {
            let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
            out.push_str(text);
            out.push('\n');
        });

        Self {
            engine,
            scope: Scope::new(),
            library: AST::empty(),
            output,
            transcript,
        }
    }

    fn submit(&mut self, snippet: &str) -> String {
        if let Err(err) = self.transcript.append(snippet) {
            tracing::error!(transcript = %self.transcript.path().display(), %err, "Failed to record snippet");
            return format!("{FAILURE_MARKER} failed to record snippet: {err}");
        }

        self.take_output();
        if let Err(err) = self.eval(snippet) {
            self.take_output();
            tracing::debug!(%err, "Snippet failed");
            return format!("{FAILURE_MARKER} {err}");
        }

        let printed = self.take_output();
        let printed = printed.trim_end();
        if !printed.is_empty() {
            return printed.to_string();
        }

        let trailing = self.eval_trailing(snippet);
        self.take_output();
        match trailing {
            Ok(Some(value)) => value,
            Ok(None) => "None".to_string(),
            Err(err) => format!("{FAILURE_MARKER} {err}"),
        }
    }

    /// Run a snippet against the shared scope.
    ///
    /// Functions are registered as soon as the snippet parses, and bindings
    /// made before a runtime error stay in scope.
    fn eval(&mut self, snippet: &str) -> EvalResult<()> {
        let ast = self.engine.compile_with_scope(&self.scope, snippet)?;
        self.library = self.library.merge(&ast.clone_functions_only());
        let runnable = self.library.merge(&ast);
        self.engine.run_ast_with_scope(&mut self.scope, &runnable)
    }

    /// Evaluate the snippet's last line as a standalone expression.
    ///
    /// Returns `None` for unit values and for lines that are not expressions.
    fn eval_trailing(&mut self, snippet: &str) -> EvalResult<Option<String>> {
        let Some(last) = snippet.trim().lines().last() else {
            return Ok(None);
        };
        let expr = last.trim().trim_end_matches(';').trim_end();
        if expr.is_empty() {
            return Ok(None);
        }
        let Ok(ast) = self.engine.compile_expression_with_scope(&self.scope, expr) else {
            return Ok(None);
        };

        let runnable = self.library.merge(&ast);
        let value: Dynamic = self.engine.eval_ast_with_scope(&mut self.scope, &runnable)?;
        Ok((!value.is_unit()).then(|| value.to_string()))
    }

    fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
