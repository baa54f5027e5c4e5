//! Domain primitive types used across the dojo workspace.

use std::fmt;

/// Placeholder printed instead of an empty output stream.
const EMPTY_STREAM: &str = "<empty string>";

/// Result of a shell command whose output was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Command line handed to the shell.
    pub command: String,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status. `128 + n` when the process died from signal `n`.
    pub exit_code: i32,
    /// Whether the process was terminated by a signal.
    pub signaled: bool,
}

impl CommandOutput {
    /// Returns `true` if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns `true` if either stream contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

fn stream_or_placeholder(stream: &str) -> &str {
    let trimmed = stream.trim_end_matches('\n');
    if trimmed.is_empty() {
        EMPTY_STREAM
    } else {
        trimmed
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command: {}\n  Exit status: {}\n  StdOut: {}\n  StdErr: {}",
            self.command,
            self.exit_code,
            stream_or_placeholder(&self.stdout),
            stream_or_placeholder(&self.stderr),
        )
    }
}

/// Exit of a command that ran attached to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandExit {
    /// Exit status. `128 + n` when the process died from signal `n`.
    pub code: i32,
    /// Whether the process was terminated by a signal.
    pub signaled: bool,
}

/// Lifecycle state reported by the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    /// Created but never started.
    Created,
    /// Actively running.
    Running,
    /// Process has exited.
    Exited,
    /// Any other engine state (`paused`, `restarting`, `dead`, ...).
    Other(String),
}

impl ContainerStatus {
    /// Maps the engine's state string onto a status.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "created" => Self::Created,
            "running" => Self::Running,
            "exited" => Self::Exited,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Point-in-time view of one container, produced by a fresh inspect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Full engine ID.
    pub id: String,
    /// Container name without the leading `/`.
    pub name: String,
    /// Engine state.
    pub status: ContainerStatus,
    /// Exit code of the main process (0 while running).
    pub exit_code: i32,
    /// `false` when the engine does not know the container.
    pub exists: bool,
    /// Logs, fetched only when the print-logs policy asks for them.
    pub logs: Option<String>,
}

impl ContainerInfo {
    /// Info for a container the engine has never heard of.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            status: ContainerStatus::Other(String::new()),
            exit_code: 0,
            exists: false,
            logs: None,
        }
    }

    /// Returns `true` if the container exists and is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.exists && self.status == ContainerStatus::Running
    }

    /// Human readable state used in the post-run summary.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.status {
            ContainerStatus::Running => "which status is: running".to_owned(),
            ContainerStatus::Exited => format!("which exited with exitcode: {}", self.exit_code),
            ref other => format!("which status is: {other}, exitcode: {}", self.exit_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: &str, exit_code: i32) -> ContainerInfo {
        ContainerInfo {
            id: "1a2b".into(),
            name: "proj_redis_1".into(),
            status: ContainerStatus::parse(status),
            exit_code,
            exists: true,
            logs: None,
        }
    }

    #[test]
    fn report_uses_placeholder_for_empty_streams() {
        let out = CommandOutput {
            command: "docker stop x".into(),
            stdout: "x\n".into(),
            stderr: String::new(),
            exit_code: 0,
            signaled: false,
        };
        assert_eq!(
            out.to_string(),
            "Command: docker stop x\n  Exit status: 0\n  StdOut: x\n  StdErr: <empty string>"
        );
    }

    #[test]
    fn mentions_searches_both_streams() {
        let out = CommandOutput {
            stderr: "Error: No such object: abc".into(),
            exit_code: 1,
            ..CommandOutput::default()
        };
        assert!(out.mentions("No such object"));
        assert!(!out.success());
    }

    #[test]
    fn unknown_states_are_preserved() {
        assert_eq!(
            ContainerStatus::parse("paused"),
            ContainerStatus::Other("paused".into())
        );
        assert_eq!(ContainerStatus::parse("running").to_string(), "running");
    }

    #[test]
    fn describe_depends_on_status() {
        assert_eq!(info("running", 0).describe(), "which status is: running");
        assert_eq!(info("exited", 3).describe(), "which exited with exitcode: 3");
        assert_eq!(
            info("dead", 137).describe(),
            "which status is: dead, exitcode: 137"
        );
    }

    #[test]
    fn missing_container_is_never_running() {
        assert!(!ContainerInfo::missing("gone").is_running());
        assert!(info("running", 0).is_running());
    }
}
