//! Run ID generation.

use std::path::Path;

use chrono::{DateTime, Local};
use dojo_common::constants::TEST_RUN_ID;

/// Returns the run ID for this invocation: fixed in test mode, otherwise
/// derived from the working directory, the time and a random suffix.
#[must_use]
pub fn for_run(test: bool, cwd: &Path) -> String {
    if test {
        return TEST_RUN_ID.to_owned();
    }
    let random = uuid::Uuid::new_v4().simple().to_string();
    generate(cwd, Local::now(), &random[..8])
}

/// `dojo-<dir>-<timestamp>-<random>`, lowercased and stripped of anything
/// docker does not accept in container or project names.
///
/// The time alone is not unique: two CI agents can start the same project
/// in the same second.
#[must_use]
pub fn generate(cwd: &Path, now: DateTime<Local>, random: &str) -> String {
    let dir = cwd
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw = format!("dojo-{dir}-{}-{random}", now.format("%Y-%m-%d-%H-%M-%S"));
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
