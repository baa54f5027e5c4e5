//! Command-line flags.
//!
//! Every flag is an optional string: an unset flag falls through to the
//! Dojofile and then to the defaults, so "unset" and "false" must differ.

use std::path::Path;

use clap::Parser;

use crate::settings::{Layer, absolutize};

/// Dojo — run a command inside a docker or docker-compose environment.
#[derive(Parser, Debug, Default)]
#[command(name = "dojo", version, about, long_about = None)]
#[command(override_usage = "dojo [OPTIONS] [--] [COMMAND]...")]
pub struct Cli {
    /// Action: run, pull. Default: run
    #[arg(short, long)]
    pub action: Option<String>,

    /// Config file. Default: ./Dojofile
    #[arg(short, long)]
    pub config: Option<String>,

    /// Driver: docker or docker-compose (dc for short). Default: docker
    #[arg(short, long)]
    pub driver: Option<String>,

    /// Docker image name and tag, e.g. alpine:3.19
    #[arg(long)]
    pub image: Option<String>,

    /// Set log level to debug: true, false. Default: false
    #[arg(long)]
    pub debug: Option<String>,

    /// Set to false to force a non-interactive run, true to force one
    #[arg(short, long)]
    pub interactive: Option<String>,

    /// Set to false to keep containers after the run. Default: true
    #[arg(long = "remove-containers", visible_alias = "rm")]
    pub remove_containers: Option<String>,

    /// Directory in the container the work directory is mounted to. Default: /dojo/work
    #[arg(short = 'w', long)]
    pub work_dir_inner: Option<String>,

    /// Directory on the host mounted into the container. Default: current directory
    #[arg(long)]
    pub work_dir_outer: Option<String>,

    /// Directory on the host mounted read-only to /dojo/identity. Default: $HOME
    #[arg(long)]
    pub identity_dir_outer: Option<String>,

    /// Comma separated variables to rename to DOJO_<name> in the container
    #[arg(long)]
    pub blacklist: Option<String>,

    /// Options to the docker run command, e.g. "--init". Only for driver: docker
    #[arg(long)]
    pub docker_options: Option<String>,

    /// Docker-compose file. Default: ./docker-compose.yml. Only for driver: docker-compose
    #[arg(long, visible_alias = "dcf")]
    pub docker_compose_file: Option<String>,

    /// Options to the docker-compose run command. Only for driver: docker-compose
    #[arg(long)]
    pub docker_compose_options: Option<String>,

    /// Set to false to pass the environment only to the default container. Default: true
    #[arg(long)]
    pub preserve_env_to_all: Option<String>,

    /// Reaction to a non-default container exiting: ignore, abort, restart. Default: abort
    #[arg(long)]
    pub exit_behavior: Option<String>,

    /// When to collect logs of non-default containers: always, failure, never. Default: failure
    #[arg(long)]
    pub print_logs: Option<String>,

    /// Where collected logs go: console, file. Default: console
    #[arg(long)]
    pub print_logs_target: Option<String>,

    /// Integration testing mode: predictable run ID and file names
    #[arg(long, hide = true)]
    pub test: Option<String>,

    /// Command to run in the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// The flags as the highest-priority configuration layer. Relative
    /// directories are resolved against `cwd`.
    #[must_use]
    pub fn into_layer(self, cwd: &Path) -> Layer {
        let command = smart_join_command_args(&self.command);
        Layer {
            action: self.action,
            config_file: self.config,
            driver: self.driver,
            debug: self.debug,
            interactive: self.interactive,
            remove_containers: self.remove_containers,
            work_dir_inner: self.work_dir_inner.map(|d| absolutize(&d, cwd)),
            work_dir_outer: self.work_dir_outer.map(|d| absolutize(&d, cwd)),
            identity_dir_outer: self.identity_dir_outer.map(|d| absolutize(&d, cwd)),
            blacklist_variables: self.blacklist,
            run_command: (!command.is_empty()).then_some(command),
            docker_image: self.image,
            docker_options: self.docker_options,
            docker_compose_file: self.docker_compose_file,
            docker_compose_options: self.docker_compose_options,
            preserve_env_to_all: self.preserve_env_to_all,
            exit_behavior: self.exit_behavior,
            print_logs: self.print_logs,
            print_logs_target: self.print_logs_target,
            test: self.test,
        }
    }
}

/// Joins the trailing arguments back into one command line.
///
/// The shell already stripped the user's outer quotes, so an argument with
/// a space must have been quoted: it is quoted again, with its inner double
/// quotes escaped.
#[must_use]
pub fn smart_join_command_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.contains(' ') {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    #[test]
    fn plain_arguments_are_space_joined() {
        assert_eq!(smart_join_command_args(&args(&["bash", "-c", "ls"])), "bash -c ls");
        assert_eq!(smart_join_command_args(&[]), "");
    }

    #[test]
    fn arguments_with_spaces_are_requoted() {
        assert_eq!(
            smart_join_command_args(&args(&["bash", "-c", "echo aaa"])),
            "bash -c \"echo aaa\""
        );
    }

    #[test]
    fn inner_quotes_are_escaped() {
        assert_eq!(
            smart_join_command_args(&args(&["/bin/bash -c \"echo aaa\" && echo bbb"])),
            "\"/bin/bash -c \\\"echo aaa\\\" && echo bbb\""
        );
    }

    #[test]
    fn flags_and_trailing_command_are_separated() {
        let cli = Cli::try_parse_from([
            "dojo", "--driver=dc", "--image", "alpine:3.19", "--rm=false", "-i=false", "--",
            "bash", "-c", "echo hi",
        ])
        .unwrap();
        assert_eq!(cli.driver.as_deref(), Some("dc"));
        assert_eq!(cli.remove_containers.as_deref(), Some("false"));
        assert_eq!(cli.interactive.as_deref(), Some("false"));

        let layer = cli.into_layer(Path::new("/work"));
        assert_eq!(layer.run_command.as_deref(), Some("bash -c \"echo hi\""));
        assert_eq!(layer.docker_image.as_deref(), Some("alpine:3.19"));
    }

    #[test]
    fn relative_directories_become_absolute() {
        let cli = Cli::try_parse_from(["dojo", "--work-dir-outer", "sub", "--dcf", "dc.yml"]).unwrap();
        let layer = cli.into_layer(Path::new("/work"));
        assert_eq!(layer.work_dir_outer.as_deref(), Some("/work/sub"));
        assert_eq!(layer.docker_compose_file.as_deref(), Some("dc.yml"));
        assert_eq!(layer.run_command, None);
    }
}
