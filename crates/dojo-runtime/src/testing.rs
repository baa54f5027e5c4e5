//! Test doubles for [`Shell`] and [`FileService`].
//!
//! Enabled for unit tests and with the `testing` feature.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dojo_common::error::{DojoError, Result};
use dojo_common::types::{CommandExit, CommandOutput};

use crate::files::FileService;
use crate::shell::Shell;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
struct Reaction {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

/// [`Shell`] that answers from a script and records every command.
///
/// Each command has a queue of reactions. Reactions are consumed in order
/// and the last one repeats forever. Unscripted commands succeed silently.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    reactions: Mutex<HashMap<String, VecDeque<Reaction>>>,
    executed: Mutex<Vec<String>>,
    interrupted: Mutex<Vec<String>>,
    interactive: AtomicBool,
}

impl ScriptedShell {
    /// Creates a non-interactive shell with no script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what [`Shell::is_interactive`] reports.
    #[must_use]
    pub fn with_terminal(self, interactive: bool) -> Self {
        self.interactive.store(interactive, Ordering::SeqCst);
        self
    }

    /// Queues a reaction for `command`.
    pub fn respond(&self, command: &str, stdout: &str, stderr: &str, exit_code: i32) {
        lock(&self.reactions)
            .entry(command.to_owned())
            .or_default()
            .push_back(Reaction {
                stdout: stdout.to_owned(),
                stderr: stderr.to_owned(),
                exit_code,
            });
    }

    /// Commands run so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    /// How many times `command` ran.
    #[must_use]
    pub fn count(&self, command: &str) -> usize {
        lock(&self.executed).iter().filter(|c| *c == command).count()
    }

    /// How many commands starting with `prefix` ran.
    #[must_use]
    pub fn count_prefix(&self, prefix: &str) -> usize {
        lock(&self.executed).iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Needles passed to [`Shell::interrupt_matching`], joined by spaces.
    #[must_use]
    pub fn interrupted(&self) -> Vec<String> {
        lock(&self.interrupted).clone()
    }

    fn react(&self, command: &str) -> Reaction {
        lock(&self.executed).push(command.to_owned());
        let mut reactions = lock(&self.reactions);
        let Some(queue) = reactions.get_mut(command) else {
            return Reaction::default();
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }
}

impl Shell for ScriptedShell {
    fn run_interactive(&self, command: &str, _isolate: bool) -> Result<CommandExit> {
        let reaction = self.react(command);
        Ok(CommandExit {
            code: reaction.exit_code,
            signaled: false,
        })
    }

    fn run_captured(&self, command: &str, _isolate: bool) -> Result<CommandOutput> {
        let reaction = self.react(command);
        Ok(CommandOutput {
            command: command.to_owned(),
            stdout: reaction.stdout,
            stderr: reaction.stderr,
            exit_code: reaction.exit_code,
            signaled: false,
        })
    }

    fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }

    fn interrupt_matching(&self, needles: &[&str]) -> Result<Option<u32>> {
        lock(&self.interrupted).push(needles.join(" "));
        Ok(None)
    }
}

/// In-memory [`FileService`].
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: Mutex<BTreeMap<PathBuf, String>>,
    owners: Mutex<HashMap<PathBuf, u32>>,
    cwd: PathBuf,
}

impl MemoryFiles {
    /// Creates an empty file system whose working directory is `cwd`.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Adds a file, or a directory when `contents` is irrelevant.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: &str) {
        let _ = lock(&self.files).insert(path.into(), contents.to_owned());
    }

    /// Marks `path` as existing and owned by `uid`.
    pub fn set_owner(&self, path: impl Into<PathBuf>, uid: u32) {
        let path = path.into();
        let _ = lock(&self.files).entry(path.clone()).or_default();
        let _ = lock(&self.owners).insert(path, uid);
    }

    /// Current contents of `path`.
    #[must_use]
    pub fn contents(&self, path: &Path) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    /// All existing paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.files).keys().cloned().collect()
    }
}

impl FileService for MemoryFiles {
    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.insert(path, contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let _ = lock(&self.files).remove(path);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.contents(path).ok_or_else(|| DojoError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }

    fn owner_uid(&self, path: &Path) -> Option<u32> {
        if !self.exists(path) {
            return None;
        }
        Some(lock(&self.owners).get(path).copied().unwrap_or(1000))
    }

    fn current_dir(&self) -> Result<PathBuf> {
        Ok(self.cwd.clone())
    }
}
