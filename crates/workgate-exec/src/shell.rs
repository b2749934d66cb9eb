//! Cross-platform shell command utilities.

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Flags passed to PowerShell ahead of the command text.
const POWERSHELL_ARGS: [&str; 3] = ["-NoLogo", "-NoProfile", "-Command"];

/// A shell program plus the arguments that precede the command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ShellCommand {
    /// Create a shell command from an explicit program and leading arguments.
    #[must_use]
    pub fn new<I>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Detect the interactive shell for the current platform.
    ///
    /// - Windows: `pwsh`, then `powershell`, with `-NoLogo -NoProfile -Command`;
    ///   `cmd /C` if neither is installed.
    /// - Unix-like: the user's `$SHELL` with `-c`, falling back to `/bin/sh`.
    pub async fn detect() -> Self {
        if cfg!(windows) {
            for candidate in ["pwsh", "powershell"] {
                if let Some(program) = resolve_executable_path(candidate).await {
                    return Self::new(program, POWERSHELL_ARGS);
                }
            }
            Self::new("cmd", ["/C"])
        } else {
            Self::new(current_shell(), ["-c"])
        }
    }

    /// The shell program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build a command that runs `command` as a single shell argument.
    #[must_use]
    pub fn to_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(command);
        cmd
    }
}

/// Resolve an executable by name.
///
/// Explicit absolute paths are accepted as-is when they point at a file;
/// anything else is looked up on `PATH`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// The user's shell from `$SHELL`, or `/bin/sh` when unset or not a file.
#[must_use]
pub fn current_shell() -> PathBuf {
    std::env::var_os("SHELL")
        .map(PathBuf::from)
        .filter(|path| path.is_absolute() && path.is_file())
        .unwrap_or_else(|| PathBuf::from("/bin/sh"))
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[cfg(unix)]
    #[test]
    fn current_shell_is_an_existing_absolute_file() {
        let shell = current_shell();
        assert!(shell.is_absolute());
        assert!(shell.is_file(), "{}", shell.display());
    }

    #[test]
    fn command_text_is_one_argument() {
        let shell = ShellCommand::new("/bin/sh", ["-c"]);
        let cmd = shell.to_command("echo a b; ls");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, [OsStr::new("-c"), OsStr::new("echo a b; ls")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn detect_uses_dash_c_on_unix() {
        let shell = ShellCommand::detect().await;
        assert!(shell.program().is_absolute());
        assert_eq!(shell.args, ["-c"]);
    }

    #[tokio::test]
    async fn empty_executable_is_not_resolved() {
        assert!(resolve_executable_path("  ").await.is_none());
    }
}
