//! Host process lookup and signalling.
//!
//! Used to interrupt a `docker run` that is still pulling its image: the
//! container does not exist yet, so `docker stop` has nothing to act on.

use std::path::{Path, PathBuf};

use dojo_common::error::{DojoError, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

const PROC_DIR: &str = "/proc";

fn read_cmdline(dir: &Path) -> Option<String> {
    let raw = std::fs::read(dir.join("cmdline")).ok()?;
    if raw.is_empty() {
        return None;
    }
    let joined = raw
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    Some(joined)
}

/// Finds a process, other than this one, whose command line contains all
/// `needles`. The lowest matching PID wins.
///
/// # Errors
///
/// Returns an error if `/proc` cannot be listed.
pub fn find_by_cmdline(needles: &[&str]) -> Result<Option<u32>> {
    let entries = std::fs::read_dir(PROC_DIR).map_err(|source| DojoError::Io {
        path: PathBuf::from(PROC_DIR),
        source,
    })?;
    let own = std::process::id();

    let mut found: Option<u32> = None;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        if pid == own {
            continue;
        }
        let Some(cmdline) = read_cmdline(&entry.path()) else {
            continue;
        };
        if needles.iter().all(|n| cmdline.contains(n)) {
            tracing::debug!(pid, cmdline, "found matching process");
            found = Some(found.map_or(pid, |f| f.min(pid)));
        }
    }
    Ok(found)
}

/// Sends SIGINT to `pid`.
///
/// # Errors
///
/// Returns an error if the signal cannot be delivered.
pub fn interrupt(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).map_err(|_| DojoError::config(format!("invalid pid: {pid}")))?;
    kill(Pid::from_raw(raw), Signal::SIGINT).map_err(|errno| DojoError::Io {
        path: PathBuf::from(PROC_DIR).join(pid.to_string()),
        source: errno.into(),
    })?;
    tracing::info!(pid, "sent SIGINT");
    Ok(())
}
