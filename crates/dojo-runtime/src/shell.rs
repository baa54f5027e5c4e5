//! Running shell commands.
//!
//! Every engine command goes through a [`Shell`] so that drivers can be
//! exercised against a scripted implementation.

use std::io::IsTerminal;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus};

use dojo_common::error::{DojoError, Result};
use dojo_common::types::{CommandExit, CommandOutput};

use crate::process;

/// Command execution used by the drivers.
pub trait Shell: Send + Sync {
    /// Runs `command` attached to the terminal.
    ///
    /// With `isolate` set the command gets its own session, so a Ctrl-C
    /// aimed at dojo does not reach it.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be spawned.
    fn run_interactive(&self, command: &str, isolate: bool) -> Result<CommandExit>;

    /// Runs `command` and captures both output streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be spawned.
    fn run_captured(&self, command: &str, isolate: bool) -> Result<CommandOutput>;

    /// Whether dojo itself is attached to a terminal.
    fn is_interactive(&self) -> bool;

    /// Sends SIGINT to the first process whose command line contains every
    /// one of `needles`. Returns its PID, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the process table cannot be read or the signal
    /// cannot be delivered.
    fn interrupt_matching(&self, needles: &[&str]) -> Result<Option<u32>>;
}

/// [`Shell`] backed by `bash -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BashShell;

impl BashShell {
    /// Creates a new bash shell.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn command(command: &str, isolate: bool) -> Command {
        let mut cmd = Command::new("bash");
        let _ = cmd.arg("-c").arg(command);
        if isolate {
            // SAFETY: setsid is async-signal-safe and only touches the child.
            let _ = unsafe {
                cmd.pre_exec(|| {
                    let _ = nix::unistd::setsid()?;
                    Ok(())
                })
            };
        }
        cmd
    }
}

fn exit_of(status: ExitStatus) -> CommandExit {
    match (status.code(), status.signal()) {
        (Some(code), _) => CommandExit {
            code,
            signaled: false,
        },
        (None, Some(signal)) => CommandExit {
            code: 128 + signal,
            signaled: true,
        },
        (None, None) => CommandExit {
            code: -1,
            signaled: false,
        },
    }
}

impl Shell for BashShell {
    fn run_interactive(&self, command: &str, isolate: bool) -> Result<CommandExit> {
        tracing::debug!(command, isolate, "running interactively");
        let status = Self::command(command, isolate)
            .status()
            .map_err(|source| DojoError::Spawn {
                command: command.to_owned(),
                source,
            })?;
        let exit = exit_of(status);
        tracing::debug!(command, exit_code = exit.code, signaled = exit.signaled, "command finished");
        Ok(exit)
    }

    fn run_captured(&self, command: &str, isolate: bool) -> Result<CommandOutput> {
        tracing::debug!(command, isolate, "running with captured output");
        let output = Self::command(command, isolate)
            .output()
            .map_err(|source| DojoError::Spawn {
                command: command.to_owned(),
                source,
            })?;
        let exit = exit_of(output.status);
        Ok(CommandOutput {
            command: command.to_owned(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: exit.code,
            signaled: exit.signaled,
        })
    }

    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }

    fn interrupt_matching(&self, needles: &[&str]) -> Result<Option<u32>> {
        let Some(pid) = process::find_by_cmdline(needles)? else {
            return Ok(None);
        };
        process::interrupt(pid)?;
        Ok(Some(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_output_and_exit_code() {
        let out = BashShell::new()
            .run_captured("echo hello; echo oops >&2; exit 3", false)
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.signaled);
    }

    #[test]
    fn signaled_process_reports_128_plus_signal() {
        let out = BashShell::new().run_captured("kill -TERM $$", true).unwrap();
        assert!(out.signaled);
        assert_eq!(out.exit_code, 128 + 15);
    }

    #[test]
    fn isolated_command_runs_in_new_session() {
        let out = BashShell::new()
            .run_captured("read -r -a stat < /proc/$$/stat; echo ${stat[5]} $$", true)
            .unwrap();
        let ids: Vec<&str> = out.stdout.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "{out}");
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn interactive_run_returns_exit_code() {
        let exit = BashShell::new().run_interactive("exit 7", true).unwrap();
        assert_eq!(exit, CommandExit { code: 7, signaled: false });
    }
}
