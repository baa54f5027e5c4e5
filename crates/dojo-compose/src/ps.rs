//! Parsing of `docker-compose ps` output.
//!
//! docker-compose 1.x prints a table:
//!
//! ```text
//! Name                        Command               State   Ports
//! ------------------------------------------------------------------------
//! edudocker_abc_1           /bin/sh -c while true; do  ...   Up
//! edudocker_default_run_1   sh -c echo 'will sleep' && ...   Up
//! ```
//!
//! From 2.x on, the table hides one-off containers, so dojo asks for
//! `ps --format json --all`, which prints one JSON object per line
//! (a single array on some early 2.x releases).

use dojo_common::error::{DojoError, Result};
use serde::Deserialize;

/// One container reported by `ps --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PsRecord {
    /// Short container ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Container name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Compose service.
    #[serde(rename = "Service")]
    pub service: String,
    /// Engine state (`running`, `exited`, ...).
    #[serde(rename = "State")]
    pub state: String,
    /// Exit code of the main process.
    #[serde(rename = "ExitCode")]
    pub exit_code: i32,
}

/// Returns `true` if this docker-compose version prints JSON from `ps`.
#[must_use]
pub fn supports_json(version: &str) -> bool {
    let digits = version.trim().trim_start_matches('v');
    let major = digits
        .split('.')
        .next()
        .and_then(|m| m.parse::<u32>().ok())
        .unwrap_or(0);
    major >= 2
}

/// Returns `true` for the container running the `default` service.
///
/// Compose 1.x names it `<project>_default_run_<n>`, 2.x
/// `<project>-default-run-<hash>`.
#[must_use]
pub fn is_default_container(name: &str) -> bool {
    name.contains("_default_") || name.contains("-default-")
}

/// Parses `ps --format json` output.
///
/// # Errors
///
/// Returns an error if a line is not valid JSON or a record has no state,
/// which means the output format changed.
pub fn parse_json(output: &str) -> Result<Vec<PsRecord>> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        let records: Vec<PsRecord> = serde_json::from_str(trimmed).map_err(|e| DojoError::Parse {
            message: format!("docker-compose ps returned invalid JSON: {e}; output: {trimmed}"),
        })?;
        return check_states(records);
    }

    let mut records = Vec::new();
    for line in trimmed.lines().filter(|l| !l.trim().is_empty()) {
        let record: PsRecord = serde_json::from_str(line).map_err(|e| DojoError::Parse {
            message: format!("docker-compose ps returned invalid JSON: {e}; line: {line}"),
        })?;
        records.push(record);
    }
    check_states(records)
}

fn check_states(records: Vec<PsRecord>) -> Result<Vec<PsRecord>> {
    if let Some(bad) = records.iter().find(|r| r.state.is_empty()) {
        return Err(DojoError::Parse {
            message: format!("docker-compose ps record has an empty State: {bad:?}"),
        });
    }
    Ok(records)
}

/// Parses the legacy `ps` table into container names.
///
/// Returns an empty list while no containers exist: the table then has only
/// its header, or only the header and the dashed separator.
#[must_use]
pub fn parse_table(output: &str) -> Vec<String> {
    let lines: Vec<&str> = output.trim_end_matches('\n').lines().collect();
    if lines.len() < 2 || lines.last().is_some_and(|l| l.contains("-----")) {
        tracing::debug!("containers were not yet created");
        return Vec::new();
    }
    lines[2..]
        .iter()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "Name                        Command               State   Ports
------------------------------------------------------------------------
edudocker_abc_1           /bin/sh -c while true; do  ...   Up
edudocker_def_1           /bin/sh -c while true; do  ...   Up
edudocker_default_run_1   sh -c echo 'will sleep' && ...   Up
";

    const JSON_LINES: &str = r#"{"Command":"\"/bin/sh -c 'while t…\"","ExitCode":0,"ID":"2d5c5b0343d0","Image":"alpine:3.19","Name":"testdojorunid-abc-1","Project":"testdojorunid","Publishers":null,"Service":"abc","State":"running","Status":"Up 2 seconds"}
{"Command":"\"sh -c 'sleep 10'\"","ExitCode":0,"ID":"af4817fede41","Image":"alpine:3.15","Name":"testdojorunid-default-run-742bcbb0e4bc","Project":"testdojorunid","Publishers":null,"Service":"default","State":"running","Status":"Up 1 second"}
{"ExitCode":143,"ID":"f543828473a7","Name":"testdojorunid-def-1","Publishers":[],"Service":"def","State":"exited","Status":"Exited (143) 10 seconds ago"}
"#;

    #[test]
    fn table_lists_names_in_order() {
        assert_eq!(
            parse_table(TABLE),
            vec!["edudocker_abc_1", "edudocker_def_1", "edudocker_default_run_1"]
        );
    }

    #[test]
    fn table_with_only_headers_is_empty() {
        let header = "Name   Command   State   Ports\n-----------------------------\n";
        assert!(parse_table(header).is_empty());
        assert!(parse_table("Name   Command   State   Ports\n").is_empty());
        assert!(parse_table("").is_empty());
    }

    #[test]
    fn json_lines_are_parsed() {
        let records = parse_json(JSON_LINES).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "testdojorunid-abc-1",
                "testdojorunid-default-run-742bcbb0e4bc",
                "testdojorunid-def-1"
            ]
        );
        assert_eq!(records[2].exit_code, 143);
        assert_eq!(records[2].state, "exited");
        assert_eq!(records[1].service, "default");
    }

    #[test]
    fn json_array_is_parsed() {
        let output = r#"[{"Name":"p-abc-1","State":"running"},{"Name":"p-default-run-1","State":"created"}]"#;
        assert_eq!(parse_json(output).unwrap().len(), 2);
    }

    #[test]
    fn empty_json_output_means_no_containers() {
        assert!(parse_json("\n").unwrap().is_empty());
    }

    #[test]
    fn record_without_state_is_rejected() {
        let err = parse_json(r#"{"Name":"p-abc-1"}"#).unwrap_err();
        assert!(err.to_string().contains("empty State"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_json("NAME IMAGE COMMAND").is_err());
    }

    #[test]
    fn json_support_starts_at_version_two() {
        assert!(supports_json("2.24.5"));
        assert!(supports_json("v2.31.0"));
        assert!(!supports_json("1.29.2"));
        assert!(!supports_json(""));
    }

    #[test]
    fn default_container_naming() {
        assert!(is_default_container("edudocker_default_run_1"));
        assert!(is_default_container("testdojorunid-default-run-742bcbb0e4bc"));
        assert!(!is_default_container("testdojorunid-abc-1"));
        assert!(!is_default_container("defaultish_1"));
    }
}
