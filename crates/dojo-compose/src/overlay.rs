//! The generated override file (`<compose file>.dojo`).
//!
//! docker-compose merges it on top of the user's file. It pins the image of
//! the `default` service and adds the mounts and env files dojo prepared.

use std::collections::BTreeMap;

use dojo_common::constants::{
    BASH_FUNCTIONS_INNER, DEFAULT_SERVICE, IDENTITY_DIR_INNER, MULTILINE_VARS_INNER,
    OVERRIDE_SUFFIX, X11_SOCKET_DIR,
};
use dojo_common::error::{DojoError, Result};
use serde::Serialize;

use crate::file::ComposeVersion;

/// Path of the override file generated next to `compose_file`.
#[must_use]
pub fn override_path(compose_file: &str) -> String {
    format!("{compose_file}{OVERRIDE_SUFFIX}")
}

/// Host side of everything mounted into the containers.
#[derive(Debug, Clone, Default)]
pub struct Mounts {
    /// Work directory on the host.
    pub work_dir_outer: String,
    /// Work directory in the `default` container.
    pub work_dir_inner: String,
    /// Identity directory on the host.
    pub identity_dir_outer: String,
    /// Single-line variables, used as `env_file`.
    pub env_file: String,
    /// Multi-line variables script.
    pub multiline_file: String,
    /// Bash functions script.
    pub bash_functions_file: String,
    /// Share the X11 socket with the `default` container.
    pub x11: bool,
}

/// One service entry of the override file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceOverlay {
    /// Image override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Extra volumes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Extra env files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_file: Vec<String>,
}

/// Contents of the override file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overlay {
    /// Copied from the user's file so both files agree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Per-service overrides.
    pub services: BTreeMap<String, ServiceOverlay>,
}

impl Overlay {
    /// Minimal overlay that only sets the `default` image.
    ///
    /// It is enough for `config --services` and `pull`.
    #[must_use]
    pub fn initial(version: Option<&ComposeVersion>, image: &str) -> Self {
        let mut services = BTreeMap::new();
        let _ = services.insert(
            DEFAULT_SERVICE.to_owned(),
            ServiceOverlay {
                image: Some(image.to_owned()),
                ..ServiceOverlay::default()
            },
        );
        Self {
            version: version.map(|v| v.raw.clone()),
            services,
        }
    }

    /// Adds mounts and env files. The `default` service always gets them;
    /// other services in `services` only when `preserve_env_to_all` is set.
    #[must_use]
    pub fn with_environment(mut self, services: &[String], mounts: &Mounts, preserve_env_to_all: bool) -> Self {
        let default = self.services.entry(DEFAULT_SERVICE.to_owned()).or_default();
        default.volumes.extend([
            format!("{}:{IDENTITY_DIR_INNER}:ro", mounts.identity_dir_outer),
            format!("{}:{}", mounts.work_dir_outer, mounts.work_dir_inner),
            format!("{}:{MULTILINE_VARS_INNER}", mounts.multiline_file),
            format!("{}:{BASH_FUNCTIONS_INNER}", mounts.bash_functions_file),
        ]);
        if mounts.x11 {
            default.volumes.push(format!("{X11_SOCKET_DIR}:{X11_SOCKET_DIR}"));
        }
        default.env_file.push(mounts.env_file.clone());

        if preserve_env_to_all {
            for name in services.iter().filter(|s| s.as_str() != DEFAULT_SERVICE) {
                let service = self.services.entry(name.clone()).or_default();
                service.env_file.push(mounts.env_file.clone());
                service.volumes.extend([
                    format!("{}:{MULTILINE_VARS_INNER}", mounts.multiline_file),
                    format!("{}:{BASH_FUNCTIONS_INNER}", mounts.bash_functions_file),
                ]);
            }
        }
        self
    }

    /// Renders the overlay as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| DojoError::Parse {
            message: format!("cannot render docker-compose override file: {e}"),
        })
    }
}
