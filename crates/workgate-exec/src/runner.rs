//! One-shot command execution with a hard wall-clock timeout.

use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::io::{AsyncRead, AsyncReadExt};
use workgate_core::{CommandResult, NOT_EXECUTED, WorkspaceRoots};

use crate::shell::ShellCommand;

/// Default wall-clock budget for one command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs a single shell command inside a workspace root.
///
/// Every call spawns a fresh shell, so no state carries over between
/// commands. Failures never surface as errors: they are folded into the
/// returned [`CommandResult`] with exit code [`NOT_EXECUTED`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    roots: WorkspaceRoots,
    shell: ShellCommand,
    timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner with an explicit shell.
    #[must_use]
    pub const fn new(roots: WorkspaceRoots, shell: ShellCommand, timeout: Duration) -> Self {
        Self {
            roots,
            shell,
            timeout,
        }
    }

    /// Create a runner using the platform's detected shell.
    pub async fn detect(roots: WorkspaceRoots, timeout: Duration) -> Self {
        let shell = ShellCommand::detect().await;
        tracing::info!(shell = %shell.program().display(), "Using command shell");
        Self::new(roots, shell, timeout)
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` in `cwd` (relative to the roots) or the primary root.
    pub async fn run(&self, command: &str, cwd: Option<&str>) -> CommandResult {
        self.run_with_timeout(command, cwd, self.timeout).await
    }

    /// Run with an explicit timeout.
    pub async fn run_with_timeout(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Duration,
    ) -> CommandResult {
        let dir = match self.working_dir(cwd).await {
            Ok(dir) => dir,
            Err(result) => {
                tracing::warn!(?cwd, stderr = %result.stderr, "Refusing to run command");
                return result;
            }
        };

        let mut cmd = self.shell.to_command(command);
        cmd.current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.group_spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(shell = %self.shell.program().display(), %err, "Failed to spawn shell");
                return CommandResult::not_executed(err.to_string());
            }
        };

        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        let outcome = tokio::time::timeout(timeout, async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            status.map(|status| (status, stdout, stderr))
        })
        .await;

        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                let result = CommandResult::new(trimmed(&stdout), trimmed(&stderr), exit_code(status));
                tracing::debug!(command, cwd = %dir.display(), exit_code = result.exit_code, "Command finished");
                result
            }
            Ok(Err(err)) => CommandResult::not_executed(err.to_string()),
            Err(_) => {
                tracing::warn!(command, ?timeout, "Command timed out, killing process group");
                terminate(&mut child).await;
                CommandResult::timed_out()
            }
        }
    }

    async fn working_dir(&self, cwd: Option<&str>) -> Result<PathBuf, CommandResult> {
        let dir = match cwd.map(str::trim).filter(|c| !c.is_empty()) {
            None => self.roots.primary().to_path_buf(),
            Some(cwd) => self
                .roots
                .resolve(cwd)
                .map_err(|_| CommandResult::not_executed(format!("Path escape: {cwd}")))?
                .into_path(),
        };

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            _ => Err(CommandResult::not_executed(format!(
                "Directory missing: {}",
                dir.display()
            ))),
        }
    }
}

async fn terminate(child: &mut AsyncGroupChild) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(%err, "Failed to kill process group");
    }
    if let Err(err) = child.wait().await {
        tracing::warn!(%err, "Failed to reap killed process");
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(err) = reader.read_to_end(&mut buf).await {
            tracing::debug!(%err, "Output stream ended with error");
        }
    }
    buf
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    NOT_EXECUTED
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, path::Path, time::Instant};

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn fixture(timeout: Duration) -> (TempDir, ProcessRunner) {
        let dir = TempDir::new().unwrap();
        let roots = WorkspaceRoots::prepare([dir.path().join("ws")]).unwrap();
        let runner = ProcessRunner::new(roots, ShellCommand::new("/bin/sh", ["-c"]), timeout);
        (dir, runner)
    }

    fn root(runner: &ProcessRunner) -> &Path {
        runner.roots.primary()
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("echo hello", None).await;
        assert_eq!(result, CommandResult::new("hello", "", 0));
    }

    #[tokio::test]
    async fn reports_real_exit_code_and_stderr() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("echo oops 1>&2; exit 3", None).await;
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr, "oops");
    }

    #[tokio::test]
    async fn trims_trailing_whitespace() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("printf '  a\\n\\n'", None).await;
        assert_eq!(result.stdout, "  a");
    }

    #[tokio::test]
    async fn runs_in_primary_root_by_default() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("pwd", None).await;
        assert_eq!(Path::new(&result.stdout), root(&runner));
    }

    #[tokio::test]
    async fn runs_in_resolved_subdirectory() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        fs::create_dir(root(&runner).join("sub")).unwrap();
        let result = runner.run("pwd", Some("sub")).await;
        assert_eq!(Path::new(&result.stdout), root(&runner).join("sub"));
    }

    #[tokio::test]
    async fn escaping_cwd_never_spawns() {
        let (dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("touch spawned.txt", Some("..")).await;

        assert_eq!(result.exit_code, NOT_EXECUTED);
        assert!(result.stderr.starts_with("Path escape"), "{}", result.stderr);
        assert!(result.stdout.is_empty());
        assert!(!dir.path().join("spawned.txt").exists());
        assert!(!root(&runner).join("spawned.txt").exists());
    }

    #[tokio::test]
    async fn absolute_cwd_is_an_escape() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("true", Some("/tmp")).await;
        assert_eq!(result.exit_code, NOT_EXECUTED);
        assert!(result.stderr.starts_with("Path escape"));
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let (_dir, runner) = fixture(DEFAULT_TIMEOUT);
        let result = runner.run("true", Some("not/here")).await;
        assert_eq!(result.exit_code, NOT_EXECUTED);
        assert!(result.stderr.starts_with("Directory missing"), "{}", result.stderr);
    }

    #[tokio::test]
    async fn launch_failure_is_not_executed() {
        let dir = TempDir::new().unwrap();
        let roots = WorkspaceRoots::prepare([dir.path()]).unwrap();
        let runner = ProcessRunner::new(
            roots,
            ShellCommand::new("/no/such/shell", ["-c"]),
            DEFAULT_TIMEOUT,
        );
        let result = runner.run("echo hi", None).await;
        assert_eq!(result.exit_code, NOT_EXECUTED);
        assert!(!result.stderr.is_empty());
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let (_dir, runner) = fixture(Duration::from_millis(750));
        let started = Instant::now();

        let result = runner.run("echo $$ > pid.txt; sleep 30", None).await;

        assert_eq!(result, CommandResult::timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = fs::read_to_string(root(&runner).join("pid.txt")).unwrap();
        let alive = std::process::Command::new("/bin/sh")
            .args(["-c", &format!("kill -0 {}", pid.trim())])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "shell {} survived the timeout", pid.trim());
    }

    #[tokio::test]
    async fn timeout_discards_partial_output() {
        let (_dir, runner) = fixture(Duration::from_millis(500));
        let result = runner.run("echo partial; sleep 30", None).await;
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "Timeout expired");
    }
}
