//! Validation of the user's docker-compose file.
//!
//! Two checks run before anything is started:
//! 1. A `version` line, if present, must be `>= 2` and `< 3`.
//! 2. A service named `default` must exist.

use std::collections::BTreeMap;

use dojo_common::constants::DEFAULT_SERVICE;
use dojo_common::error::{DojoError, Result};
use serde::Deserialize;

/// Format version declared at the top of a compose file.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeVersion {
    /// Version text as written, without quotes (`"2.2"`).
    pub raw: String,
    /// Parsed numeric value.
    pub number: f64,
}

/// Facts about a compose file that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeFile {
    /// Declared version, `None` when the file has no version line.
    pub version: Option<ComposeVersion>,
}

#[derive(Debug, Deserialize)]
struct RawComposeFile {
    #[serde(default)]
    services: BTreeMap<String, serde_yaml::Value>,
}

/// Extracts the version from the first meaningful line, if it is a version line.
///
/// # Errors
///
/// Returns an error if the version line holds something that is not a number.
pub fn parse_version(contents: &str) -> Result<Option<ComposeVersion>> {
    let Some(first) = contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
    else {
        return Ok(None);
    };
    let Some(value) = first.strip_prefix("version") else {
        return Ok(None);
    };
    let raw = value
        .trim_start()
        .trim_start_matches(':')
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_owned();
    let number = raw.parse::<f64>().map_err(|e| {
        DojoError::config(format!("cannot parse docker-compose version '{raw}': {e}"))
    })?;
    Ok(Some(ComposeVersion { raw, number }))
}

/// Validates compose file contents. `path` only appears in error messages.
///
/// # Errors
///
/// Returns a configuration error if the version is out of range, the YAML is
/// malformed, or there is no `default` service.
pub fn verify(path: &str, contents: &str) -> Result<ComposeFile> {
    let version = parse_version(contents)?;
    if let Some(ref v) = version {
        if v.number < 2.0 || v.number >= 3.0 {
            return Err(DojoError::config(format!(
                "docker-compose file: {path} should contain version number >=2 and <3, current version: {}",
                v.raw
            )));
        }
    }

    let parsed: RawComposeFile = serde_yaml::from_str(contents).map_err(|e| {
        DojoError::config(format!("docker-compose file: {path} is not valid YAML: {e}"))
    })?;
    if !parsed.services.contains_key(DEFAULT_SERVICE) {
        return Err(DojoError::config(format!(
            "docker-compose file: {path} does not contain: {DEFAULT_SERVICE}:. Please add a default service"
        )));
    }

    tracing::debug!(path, services = parsed.services.len(), "docker-compose file verified");
    Ok(ComposeFile { version })
}
