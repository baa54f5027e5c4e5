//! Host environment propagation.
//!
//! The host environment is captured once per run and written to three files
//! that the container reads on startup:
//! - single-line variables, in `docker --env-file` format;
//! - multi-line variables, as a bash script decoding base64 values;
//! - exported bash functions, as a bash script re-exporting them.
//!
//! Blacklisted names are renamed to `DOJO_<name>` so that they do not clobber
//! the container's own `PATH`, `HOME` and friends.

use std::path::{Path, PathBuf};

use dojo_common::constants::{CONTAINER_DISPLAY, ENV_FILE_DIR, VARIABLE_PREFIX};
use dojo_common::error::Result;

use crate::files::FileService;

const BASH_FUNC_PREFIX: &str = "BASH_FUNC_";

/// Host environment at the start of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// `KEY=VALUE` entries in the order the OS reported them.
    pub variables: Vec<String>,
    /// Whether dojo runs as root.
    pub current_user_is_root: bool,
}

impl EnvSnapshot {
    /// Captures the environment of the current process.
    #[must_use]
    pub fn capture() -> Self {
        let variables = std::env::vars_os()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect();
        Self {
            variables,
            current_user_is_root: nix::unistd::Uid::effective().is_root(),
        }
    }

    /// Value of `key`, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.iter().find_map(|kv| {
            let (k, v) = kv.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// Whether `key` is set to a non-empty value.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }
}

/// One variable after blacklist filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVariable {
    /// Name as it will appear in the container.
    pub key: String,
    /// Value.
    pub value: String,
}

impl EnvVariable {
    fn is_bash_function(&self) -> bool {
        self.key.starts_with(BASH_FUNC_PREFIX) && self.value.starts_with("()")
    }

    fn is_multi_line(&self) -> bool {
        self.value.contains('\n')
    }
}

fn is_blacklisted(key: &str, blacklist: &[&str]) -> bool {
    blacklist.iter().any(|entry| match entry.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == *entry,
    })
}

/// Applies the blacklist to `variables` (`KEY=VALUE` entries).
///
/// `DISPLAY` becomes `unix:0.0`. A variable shadowed by `DOJO_<KEY>` is
/// dropped. `DOJO_*` variables and exported bash functions pass unchanged.
/// Blacklisted names (exact, or `PREFIX*`) are renamed to `DOJO_<KEY>`.
#[must_use]
pub fn filter_variables(blacklist: &str, variables: &[String]) -> Vec<EnvVariable> {
    let blacklist: Vec<&str> = blacklist
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let shadowed = |key: &str| {
        variables.iter().any(|kv| {
            kv.split_once('=')
                .and_then(|(k, _)| k.strip_prefix(VARIABLE_PREFIX))
                .is_some_and(|k| k == key)
        })
    };

    variables
        .iter()
        .filter_map(|kv| kv.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .filter_map(|(key, value)| {
            let var = EnvVariable {
                key: key.to_owned(),
                value: value.to_owned(),
            };
            if key == "DISPLAY" {
                return Some(EnvVariable {
                    value: CONTAINER_DISPLAY.to_owned(),
                    ..var
                });
            }
            if shadowed(key) {
                return None;
            }
            if key.starts_with(VARIABLE_PREFIX) || var.is_bash_function() {
                return Some(var);
            }
            if is_blacklisted(key, &blacklist) {
                return Some(EnvVariable {
                    key: format!("{VARIABLE_PREFIX}{key}"),
                    ..var
                });
            }
            Some(var)
        })
        .collect()
}

/// Renders the `--env-file` contents: one `KEY=VALUE` line per single-line variable.
#[must_use]
pub fn render_single_line(variables: &[EnvVariable]) -> String {
    variables
        .iter()
        .filter(|v| !v.is_multi_line() && !v.is_bash_function())
        .map(|v| format!("{}={}\n", v.key, v.value))
        .collect()
}

/// Renders multi-line variables as `export KEY=$(echo <base64> | base64 -d)` lines.
#[must_use]
pub fn render_multi_line(variables: &[EnvVariable]) -> String {
    variables
        .iter()
        .filter(|v| v.is_multi_line() && !v.is_bash_function())
        .map(|v| format!("export {}=$(echo {} | base64 -d)\n", v.key, base64_encode(v.value.as_bytes())))
        .collect()
}

/// Renders a bash script that redefines and exports every exported function.
///
/// Bash exports `f` as `BASH_FUNC_f%%=() { ... }`, a name no shell can
/// assign to, so the function is redefined instead.
#[must_use]
pub fn render_bash_functions(variables: &[EnvVariable]) -> String {
    let mut script = String::from("#!/bin/bash\n");
    for var in variables.iter().filter(|v| v.is_bash_function()) {
        let name = var
            .key
            .trim_start_matches(BASH_FUNC_PREFIX)
            .trim_end_matches("%%");
        script.push_str(&format!("{name}{}\nexport -f {name}\n", var.value));
    }
    script
}

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard padded base64, as decoded by `base64 -d`.
fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        let sextets = [(n >> 18) & 63, (n >> 12) & 63, (n >> 6) & 63, n & 63];
        for (i, s) in sextets.iter().enumerate() {
            if i <= chunk.len() {
                out.push(char::from(BASE64_ALPHABET[*s as usize]));
            } else {
                out.push('=');
            }
        }
    }
    out
}

/// Paths of the three generated environment files of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFiles {
    /// `--env-file` with single-line variables.
    pub single_line: PathBuf,
    /// Script with multi-line variables.
    pub multi_line: PathBuf,
    /// Script with bash functions.
    pub bash_functions: PathBuf,
}

impl EnvFiles {
    /// Paths for `run_id`. Test mode uses a `test-` prefix.
    #[must_use]
    pub fn for_run(run_id: &str, test: bool) -> Self {
        let prefix = if test { "test-dojo" } else { "dojo" };
        let dir = Path::new(ENV_FILE_DIR);
        Self {
            single_line: dir.join(format!("{prefix}-environment-{run_id}")),
            multi_line: dir.join(format!("{prefix}-environment-multiline-{run_id}")),
            bash_functions: dir.join(format!("{prefix}-environment-bash-functions-{run_id}")),
        }
    }

    /// All three paths.
    #[must_use]
    pub fn paths(&self) -> [&Path; 3] {
        [&self.single_line, &self.multi_line, &self.bash_functions]
    }

    /// Filters `snapshot` through `blacklist` and (re)writes the three files.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn write(&self, files: &dyn FileService, blacklist: &str, snapshot: &EnvSnapshot) -> Result<()> {
        let variables = filter_variables(blacklist, &snapshot.variables);
        for (path, contents) in [
            (&self.bash_functions, render_bash_functions(&variables)),
            (&self.single_line, render_single_line(&variables)),
            (&self.multi_line, render_multi_line(&variables)),
        ] {
            files.remove_file(path)?;
            files.write_file(path, &contents)?;
        }
        tracing::debug!(count = variables.len(), "environment files written");
        Ok(())
    }

    /// Removes the three files, ignoring missing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn remove(&self, files: &dyn FileService) -> Result<()> {
        for path in self.paths() {
            files.remove_file(path)?;
        }
        Ok(())
    }
}
