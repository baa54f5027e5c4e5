//! Configuration layers and their verification.
//!
//! Three [`Layer`]s are merged field by field (flags, then the Dojofile,
//! then defaults) and the result is verified into a typed [`Config`].

use std::path::Path;

use dojo_common::config::{Config, DriverKind};
use dojo_common::constants::{
    DEFAULT_BLACKLIST, DEFAULT_COMPOSE_FILE, DEFAULT_CONFIG_FILE, DEFAULT_WORK_DIR_INNER,
};
use dojo_common::error::{DojoError, Result};

/// One source of raw configuration values. `None` means "not set here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layer {
    pub action: Option<String>,
    pub config_file: Option<String>,
    pub driver: Option<String>,
    pub debug: Option<String>,
    pub interactive: Option<String>,
    pub remove_containers: Option<String>,
    pub work_dir_inner: Option<String>,
    pub work_dir_outer: Option<String>,
    pub identity_dir_outer: Option<String>,
    pub blacklist_variables: Option<String>,
    pub run_command: Option<String>,
    pub docker_image: Option<String>,
    pub docker_options: Option<String>,
    pub docker_compose_file: Option<String>,
    pub docker_compose_options: Option<String>,
    pub preserve_env_to_all: Option<String>,
    pub exit_behavior: Option<String>,
    pub print_logs: Option<String>,
    pub print_logs_target: Option<String>,
    pub test: Option<String>,
}

impl Layer {
    /// Built-in defaults.
    #[must_use]
    pub fn defaults(cwd: &Path, home: Option<&str>) -> Self {
        Self {
            action: Some("run".into()),
            config_file: Some(DEFAULT_CONFIG_FILE.into()),
            driver: Some("docker".into()),
            debug: Some("false".into()),
            remove_containers: Some("true".into()),
            work_dir_inner: Some(DEFAULT_WORK_DIR_INNER.into()),
            work_dir_outer: Some(cwd.display().to_string()),
            identity_dir_outer: home.map(str::to_owned),
            blacklist_variables: Some(DEFAULT_BLACKLIST.into()),
            docker_compose_file: Some(DEFAULT_COMPOSE_FILE.into()),
            preserve_env_to_all: Some("true".into()),
            exit_behavior: Some("abort".into()),
            print_logs: Some("failure".into()),
            print_logs_target: Some("console".into()),
            test: Some("false".into()),
            ..Self::default()
        }
    }

    /// Fills every field unset in `self` from `lower`.
    #[must_use]
    pub fn or(self, lower: Self) -> Self {
        Self {
            action: self.action.or(lower.action),
            config_file: self.config_file.or(lower.config_file),
            driver: self.driver.or(lower.driver),
            debug: self.debug.or(lower.debug),
            interactive: self.interactive.or(lower.interactive),
            remove_containers: self.remove_containers.or(lower.remove_containers),
            work_dir_inner: self.work_dir_inner.or(lower.work_dir_inner),
            work_dir_outer: self.work_dir_outer.or(lower.work_dir_outer),
            identity_dir_outer: self.identity_dir_outer.or(lower.identity_dir_outer),
            blacklist_variables: self.blacklist_variables.or(lower.blacklist_variables),
            run_command: self.run_command.or(lower.run_command),
            docker_image: self.docker_image.or(lower.docker_image),
            docker_options: self.docker_options.or(lower.docker_options),
            docker_compose_file: self.docker_compose_file.or(lower.docker_compose_file),
            docker_compose_options: self.docker_compose_options.or(lower.docker_compose_options),
            preserve_env_to_all: self.preserve_env_to_all.or(lower.preserve_env_to_all),
            exit_behavior: self.exit_behavior.or(lower.exit_behavior),
            print_logs: self.print_logs.or(lower.print_logs),
            print_logs_target: self.print_logs_target.or(lower.print_logs_target),
            test: self.test.or(lower.test),
        }
    }

    /// Merges flags over the Dojofile over the defaults.
    #[must_use]
    pub fn merge(cli: Self, file: Self, defaults: Self) -> Self {
        cli.or(file).or(defaults)
    }

    /// Whether debug logging was asked for.
    #[must_use]
    pub fn wants_debug(&self) -> bool {
        self.debug.as_deref() == Some("true")
    }
}

/// Makes `path` absolute against `cwd`.
#[must_use]
pub fn absolutize(path: &str, cwd: &Path) -> String {
    if path.is_empty() {
        return String::new();
    }
    cwd.join(path).display().to_string()
}

fn strip_outer_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parses Dojofile contents: `KEY=VALUE` lines, `#` comments, optional
/// outer quotes. Unknown keys and lines without `=` are ignored.
#[must_use]
pub fn parse_dojofile(contents: &str, cwd: &Path) -> Layer {
    let mut layer = Layer::default();
    for line in contents.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::debug!(line, "skipping Dojofile line without '='");
            continue;
        };
        let value = strip_outer_quotes(value);
        if value.is_empty() {
            continue;
        }
        let value = value.to_owned();
        match key {
            "DOJO_DRIVER" => layer.driver = Some(value),
            "DOJO_DOCKER_IMAGE" => layer.docker_image = Some(value),
            "DOJO_DOCKER_OPTIONS" => layer.docker_options = Some(value),
            "DOJO_DOCKER_COMPOSE_FILE" => layer.docker_compose_file = Some(value),
            "DOJO_DOCKER_COMPOSE_OPTIONS" => layer.docker_compose_options = Some(value),
            "DOJO_PRESERVE_ENV_TO_ALL_CONTAINERS" => layer.preserve_env_to_all = Some(value),
            "DOJO_WORK_OUTER" => layer.work_dir_outer = Some(absolutize(&value, cwd)),
            "DOJO_WORK_INNER" => layer.work_dir_inner = Some(absolutize(&value, cwd)),
            "DOJO_IDENTITY_OUTER" => layer.identity_dir_outer = Some(absolutize(&value, cwd)),
            "DOJO_EXIT_BEHAVIOR" => layer.exit_behavior = Some(value),
            "DOJO_BLACKLIST_VARIABLES" => layer.blacklist_variables = Some(value),
            "DOJO_PRINT_LOGS" => layer.print_logs = Some(value),
            "DOJO_PRINT_LOGS_TARGET" => layer.print_logs_target = Some(value),
            "DOJO_LOG_LEVEL" => {
                let debug = value.eq_ignore_ascii_case("debug");
                layer.debug = Some(debug.to_string());
            }
            _ => {}
        }
    }
    layer
}

/// Reads the Dojofile at `path`. `None` if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_dojofile(path: &Path, cwd: &Path) -> Result<Option<Layer>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| DojoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(parse_dojofile(&contents, cwd)))
}

fn parse_bool(what: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(DojoError::config(format!(
            "invalid {what}: '{other}', supported values: true, false"
        ))),
    }
}

fn parse_tristate(value: Option<&str>) -> Result<Option<bool>> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => parse_bool("interactive", v).map(Some),
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DojoError::config(format!("invalid configuration, {what} is unset")))
}

/// Verifies the merged layer. Relative compose file paths are checked
/// against `cwd`.
///
/// # Errors
///
/// Returns a configuration error describing the first invalid value.
pub fn resolve(layer: &Layer, cwd: &Path) -> Result<Config> {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let config = Config {
        action: required(layer.action.as_deref(), "action")?.parse()?,
        driver: required(layer.driver.as_deref(), "driver")?.parse()?,
        debug: parse_bool("debug", required(layer.debug.as_deref(), "debug")?)?,
        interactive: parse_tristate(layer.interactive.as_deref())?,
        remove_containers: parse_bool(
            "remove containers",
            required(layer.remove_containers.as_deref(), "remove containers")?,
        )?,
        work_dir_outer: text(&layer.work_dir_outer),
        work_dir_inner: text(&layer.work_dir_inner),
        identity_dir_outer: text(&layer.identity_dir_outer),
        blacklist_variables: text(&layer.blacklist_variables),
        run_command: text(&layer.run_command),
        docker_image: required(layer.docker_image.as_deref(), "docker image")?.to_owned(),
        docker_options: text(&layer.docker_options),
        docker_compose_file: text(&layer.docker_compose_file),
        docker_compose_options: text(&layer.docker_compose_options),
        preserve_env_to_all: parse_bool(
            "preserve env to all containers",
            required(layer.preserve_env_to_all.as_deref(), "preserve env to all containers")?,
        )?,
        exit_behavior: required(layer.exit_behavior.as_deref(), "exit behavior")?.parse()?,
        print_logs: required(layer.print_logs.as_deref(), "print logs")?.parse()?,
        print_logs_target: required(layer.print_logs_target.as_deref(), "print logs target")?
            .parse()?,
        test: layer.test.as_deref().map_or(Ok(false), |v| parse_bool("test", v))?,
    };

    match config.driver {
        DriverKind::Docker => {
            if !config.docker_compose_options.is_empty() {
                return Err(DojoError::config(
                    "docker compose options are unsupported for driver: docker",
                ));
            }
        }
        DriverKind::DockerCompose => {
            if !config.docker_options.is_empty() {
                return Err(DojoError::config(
                    "docker options are unsupported for driver: docker-compose",
                ));
            }
            let file = required(Some(config.docker_compose_file.as_str()), "docker compose file")?;
            if !cwd.join(file).exists() {
                return Err(DojoError::config(format!(
                    "docker-compose config file: {file} does not exist"
                )));
            }
            if !config.remove_containers {
                tracing::warn!(
                    "remove containers is false for driver docker-compose: containers, network and generated files are kept"
                );
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dojo_common::config::{Action, ExitBehavior, LogsTarget, PrintLogs};

    const CWD: &str = "/work";

    fn defaults() -> Layer {
        Layer::defaults(Path::new(CWD), Some("/home/me"))
    }

    fn with_image(layer: Layer) -> Layer {
        Layer {
            docker_image: Some("alpine:3.19".into()),
            ..layer
        }
        .or(defaults())
    }

    #[test]
    fn dojofile_keys_comments_and_quotes() {
        let layer = parse_dojofile(
            "# comment\n\
             DOJO_DOCKER_IMAGE=\"alpine:3.19\"\n\
             DOJO_DOCKER_OPTIONS='--init -e A=B'\n\
             DOJO_WORK_OUTER=project\n\
             DOJO_LOG_LEVEL=DEBUG\n\
             DOJO_PRINT_LOGS_TARGET=file\n\
             garbage line\n\
             DOJO_UNKNOWN=1\n\
             DOJO_DRIVER=\n",
            Path::new(CWD),
        );
        assert_eq!(layer.docker_image.as_deref(), Some("alpine:3.19"));
        assert_eq!(layer.docker_options.as_deref(), Some("--init -e A=B"));
        assert_eq!(layer.work_dir_outer.as_deref(), Some("/work/project"));
        assert_eq!(layer.debug.as_deref(), Some("true"));
        assert_eq!(layer.print_logs_target.as_deref(), Some("file"));
        assert_eq!(layer.driver, None);
    }

    #[test]
    fn missing_dojofile_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_dojofile(&dir.path().join("Dojofile"), dir.path()).unwrap(), None);
    }

    #[test]
    fn dojofile_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dojofile");
        std::fs::write(&path, "DOJO_DRIVER=dc\n").unwrap();
        let layer = read_dojofile(&path, dir.path()).unwrap().unwrap();
        assert_eq!(layer.driver.as_deref(), Some("dc"));
    }

    #[test]
    fn flags_beat_file_beat_defaults() {
        let cli = Layer {
            driver: Some("docker".into()),
            ..Layer::default()
        };
        let file = Layer {
            driver: Some("dc".into()),
            docker_image: Some("from-file:1".into()),
            ..Layer::default()
        };
        let merged = Layer::merge(cli, file, defaults());
        assert_eq!(merged.driver.as_deref(), Some("docker"));
        assert_eq!(merged.docker_image.as_deref(), Some("from-file:1"));
        assert_eq!(merged.exit_behavior.as_deref(), Some("abort"));
        assert_eq!(merged.identity_dir_outer.as_deref(), Some("/home/me"));
    }

    #[test]
    fn defaults_resolve_to_default_config() {
        let config = resolve(&with_image(Layer::default()), Path::new(CWD)).unwrap();
        assert_eq!(config.action, Action::Run);
        assert_eq!(config.driver, DriverKind::Docker);
        assert!(config.remove_containers);
        assert_eq!(config.interactive, None);
        assert_eq!(config.work_dir_outer, CWD);
        assert_eq!(config.work_dir_inner, "/dojo/work");
        assert_eq!(config.exit_behavior, ExitBehavior::Abort);
        assert_eq!(config.print_logs, PrintLogs::Failure);
        assert_eq!(config.print_logs_target, LogsTarget::Console);
        assert!(config.preserve_env_to_all);
    }

    #[test]
    fn image_is_required() {
        let err = resolve(&defaults(), Path::new(CWD)).unwrap_err();
        assert!(err.to_string().contains("docker image is unset"), "{err}");
    }

    #[test]
    fn invalid_booleans_and_enums_are_rejected() {
        for layer in [
            Layer {
                remove_containers: Some("yes".into()),
                ..Layer::default()
            },
            Layer {
                interactive: Some("maybe".into()),
                ..Layer::default()
            },
            Layer {
                action: Some("build".into()),
                ..Layer::default()
            },
            Layer {
                print_logs: Some("sometimes".into()),
                ..Layer::default()
            },
        ] {
            assert!(resolve(&with_image(layer), Path::new(CWD)).unwrap_err().is_config());
        }
    }

    #[test]
    fn options_must_match_driver() {
        let docker = with_image(Layer {
            docker_compose_options: Some("--service-ports".into()),
            ..Layer::default()
        });
        assert!(resolve(&docker, Path::new(CWD)).is_err());

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let compose = with_image(Layer {
            driver: Some("dc".into()),
            docker_options: Some("--init".into()),
            ..Layer::default()
        });
        assert!(resolve(&compose, dir.path()).is_err());
    }

    #[test]
    fn compose_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let layer = with_image(Layer {
            driver: Some("docker-compose".into()),
            interactive: Some("false".into()),
            ..Layer::default()
        });
        let err = resolve(&layer, dir.path()).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");

        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let config = resolve(&layer, dir.path()).unwrap();
        assert_eq!(config.driver, DriverKind::DockerCompose);
        assert_eq!(config.interactive, Some(false));
    }
}
