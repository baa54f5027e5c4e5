//! Merged, validated run configuration.
//!
//! The CLI builds a [`Config`] once from flags, the Dojofile and defaults.
//! Everything downstream treats it as immutable and already verified.

use std::fmt;
use std::str::FromStr;

use crate::constants;
use crate::error::DojoError;

/// What dojo was asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    /// Run a command in a container.
    #[default]
    Run,
    /// Pull the image(s) and exit.
    Pull,
}

/// Which driver runs the containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriverKind {
    /// One container via `docker run`.
    #[default]
    Docker,
    /// A compose project with a `default` service.
    DockerCompose,
}

/// Reaction to a non-default container exiting while the run is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitBehavior {
    /// Keep going.
    Ignore,
    /// Stop the default container, which ends the run.
    #[default]
    Abort,
    /// Start the exited container again.
    Restart,
}

/// When to collect logs of non-default containers after the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrintLogs {
    /// After every run.
    Always,
    /// Only if some container exited non-zero.
    #[default]
    Failure,
    /// Never.
    Never,
}

impl PrintLogs {
    /// Returns `true` if logs should be fetched given the failure state.
    #[must_use]
    pub const fn wants_logs(self, any_failed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Failure => any_failed,
            Self::Never => false,
        }
    }
}

/// Where collected logs go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogsTarget {
    /// Printed through the logger.
    #[default]
    Console,
    /// One file per container in the working directory.
    File,
}

fn unsupported(what: &str, value: &str, supported: &str) -> DojoError {
    DojoError::config(format!(
        "invalid {what}: '{value}', supported values: {supported}"
    ))
}

impl FromStr for Action {
    type Err = DojoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(Self::Run),
            "pull" => Ok(Self::Pull),
            other => Err(unsupported("action", other, "run, pull")),
        }
    }
}

impl FromStr for DriverKind {
    type Err = DojoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(Self::Docker),
            "docker-compose" | "dc" => Ok(Self::DockerCompose),
            other => Err(unsupported("driver", other, "docker, docker-compose (dc)")),
        }
    }
}

impl FromStr for ExitBehavior {
    type Err = DojoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "abort" => Ok(Self::Abort),
            "restart" => Ok(Self::Restart),
            other => Err(unsupported("exit behavior", other, "ignore, abort, restart")),
        }
    }
}

impl FromStr for PrintLogs {
    type Err = DojoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "failure" => Ok(Self::Failure),
            "never" => Ok(Self::Never),
            other => Err(unsupported("print logs", other, "always, failure, never")),
        }
    }
}

impl FromStr for LogsTarget {
    type Err = DojoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" => Ok(Self::Console),
            "file" => Ok(Self::File),
            other => Err(unsupported("print logs target", other, "console, file")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::DockerCompose => write!(f, "docker-compose"),
        }
    }
}

impl fmt::Display for ExitBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Abort => write!(f, "abort"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

/// Root configuration for one dojo invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Requested action.
    pub action: Action,
    /// Driver used for the run.
    pub driver: DriverKind,
    /// Debug logging enabled.
    pub debug: bool,
    /// `Some(true)` forces `-ti`, `Some(false)` forbids it, `None` follows the terminal.
    pub interactive: Option<bool>,
    /// Remove containers and generated files after the run.
    pub remove_containers: bool,
    /// Work directory on the host.
    pub work_dir_outer: String,
    /// Work directory inside the container.
    pub work_dir_inner: String,
    /// Identity directory on the host, mounted read-only.
    pub identity_dir_outer: String,
    /// Comma separated variable names (or `PREFIX*` patterns) to rename.
    pub blacklist_variables: String,
    /// Command run inside the container. Empty means the image default.
    pub run_command: String,
    /// Image for the single container or the `default` service.
    pub docker_image: String,
    /// Extra options for `docker run`.
    pub docker_options: String,
    /// User's compose file.
    pub docker_compose_file: String,
    /// Extra options for `docker-compose run`.
    pub docker_compose_options: String,
    /// Propagate the environment to every compose service, not only `default`.
    pub preserve_env_to_all: bool,
    /// Reaction to non-default containers exiting.
    pub exit_behavior: ExitBehavior,
    /// Log collection policy.
    pub print_logs: PrintLogs,
    /// Destination of collected logs.
    pub print_logs_target: LogsTarget,
    /// Test mode: predictable run ID and file names.
    pub test: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            action: Action::default(),
            driver: DriverKind::default(),
            debug: false,
            interactive: None,
            remove_containers: true,
            work_dir_outer: String::new(),
            work_dir_inner: constants::DEFAULT_WORK_DIR_INNER.to_owned(),
            identity_dir_outer: String::new(),
            blacklist_variables: constants::DEFAULT_BLACKLIST.to_owned(),
            run_command: String::new(),
            docker_image: String::new(),
            docker_options: String::new(),
            docker_compose_file: constants::DEFAULT_COMPOSE_FILE.to_owned(),
            docker_compose_options: String::new(),
            preserve_env_to_all: true,
            exit_behavior: ExitBehavior::default(),
            print_logs: PrintLogs::default(),
            print_logs_target: LogsTarget::default(),
            test: false,
        }
    }
}
