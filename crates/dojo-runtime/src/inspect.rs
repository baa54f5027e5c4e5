//! Point-in-time container state via `docker inspect` and `docker logs`.

use dojo_common::error::{DojoError, Result};
use dojo_common::types::{ContainerInfo, ContainerStatus};

use crate::shell::Shell;

const NO_SUCH_OBJECT: &str = "No such object";

/// Builds the inspect command for `name_or_id`.
#[must_use]
pub fn inspect_command(name_or_id: &str) -> String {
    format!(
        "docker inspect --format='{{{{.Id}}}} {{{{.Name}}}} {{{{.State.Status}}}} {{{{.State.ExitCode}}}}' {name_or_id}"
    )
}

/// Parses the four space separated fields printed by [`inspect_command`].
///
/// # Errors
///
/// Returns an error unless there are exactly four fields and the last is an
/// integer.
pub fn parse_inspect(stdout: &str) -> Result<ContainerInfo> {
    let fields: Vec<&str> = stdout.split_whitespace().collect();
    let [id, name, status, exit_code] = fields.as_slice() else {
        return Err(DojoError::Parse {
            message: format!("expected 4 fields from docker inspect, got {}: '{}'", fields.len(), stdout.trim()),
        });
    };
    let exit_code = exit_code.parse::<i32>().map_err(|e| DojoError::Parse {
        message: format!("docker inspect exit code '{exit_code}': {e}"),
    })?;
    Ok(ContainerInfo {
        id: (*id).to_owned(),
        name: name.trim_start_matches('/').to_owned(),
        status: ContainerStatus::parse(status),
        exit_code,
        exists: true,
        logs: None,
    })
}

/// Inspects a container. A container the engine does not know about is
/// reported with `exists: false`, not as an error.
///
/// # Errors
///
/// Returns an error if inspect fails for any other reason or its output
/// cannot be parsed.
pub fn container_info(shell: &dyn Shell, name_or_id: &str) -> Result<ContainerInfo> {
    let output = shell.run_captured(&inspect_command(name_or_id), true)?;
    if !output.success() {
        if output.mentions(NO_SUCH_OBJECT) {
            tracing::debug!(container = name_or_id, "container does not exist");
            return Ok(ContainerInfo::missing(name_or_id));
        }
        return Err(DojoError::unexpected(output));
    }
    parse_inspect(&output.stdout)
}

/// Returns `true` if the container exists and is running.
///
/// # Errors
///
/// Propagates inspect failures.
pub fn is_running(shell: &dyn Shell, name_or_id: &str) -> Result<bool> {
    let info = container_info(shell, name_or_id)?;
    tracing::debug!(container = name_or_id, status = %info.status, "checked container");
    Ok(info.is_running())
}

/// Fetches a container's logs as `stderr:\n<stderr>stdout:\n<stdout>`.
///
/// # Errors
///
/// Returns an error if `docker logs` fails.
pub fn container_logs(shell: &dyn Shell, name: &str) -> Result<String> {
    let output = shell.run_captured(&format!("docker logs {name}"), true)?;
    if !output.success() {
        return Err(DojoError::unexpected(output));
    }
    Ok(format!("stderr:\n{}stdout:\n{}", output.stderr, output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedShell;

    #[test]
    fn inspect_command_uses_go_template() {
        assert_eq!(
            inspect_command("abc"),
            "docker inspect --format='{{.Id}} {{.Name}} {{.State.Status}} {{.State.ExitCode}}' abc"
        );
    }

    #[test]
    fn running_container_is_parsed() {
        let shell = ScriptedShell::new();
        shell.respond(&inspect_command("dojo-1"), "1a2b3c /dojo-1 running 0\n", "", 0);
        let info = container_info(&shell, "dojo-1").unwrap();
        assert_eq!(info.id, "1a2b3c");
        assert_eq!(info.name, "dojo-1");
        assert_eq!(info.status, ContainerStatus::Running);
        assert!(info.exists);
        assert!(info.is_running());
    }

    #[test]
    fn no_such_object_on_stderr_means_missing() {
        let shell = ScriptedShell::new();
        shell.respond(&inspect_command("gone"), "", "Error: No such object: gone\n", 1);
        let info = container_info(&shell, "gone").unwrap();
        assert!(!info.exists);
    }

    #[test]
    fn no_such_object_on_stdout_means_missing() {
        let shell = ScriptedShell::new();
        shell.respond(&inspect_command("gone"), "No such object: gone\n", "", 1);
        assert!(!container_info(&shell, "gone").unwrap().exists);
    }

    #[test]
    fn other_failures_are_errors() {
        let shell = ScriptedShell::new();
        shell.respond(&inspect_command("x"), "", "Cannot connect to the Docker daemon", 1);
        let err = container_info(&shell, "x").unwrap_err();
        assert!(err.to_string().contains("Cannot connect to the Docker daemon"));
    }

    #[test]
    fn wrong_field_count_is_a_parse_error() {
        assert!(parse_inspect("1a2b /x running").is_err());
        assert!(parse_inspect("1a2b /x exited notanumber").is_err());
    }

    #[test]
    fn exited_container_keeps_exit_code() {
        let info = parse_inspect("ff00 /proj_redis_1 exited 137").unwrap();
        assert_eq!(info.exit_code, 137);
        assert!(!info.is_running());
    }

    #[test]
    fn logs_are_prefixed_per_stream() {
        let shell = ScriptedShell::new();
        shell.respond("docker logs proj_abc_1", "out\n", "err\n", 0);
        assert_eq!(
            container_logs(&shell, "proj_abc_1").unwrap(),
            "stderr:\nerr\nstdout:\nout\n"
        );
    }
}
