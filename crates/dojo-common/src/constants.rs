//! Exit codes, in-container paths, and default values.

/// Application name used in log output.
pub const APP_NAME: &str = "dojo";

/// Version reported on startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Exit codes ───────────────────────────────────────────────────────

/// Configuration errors and fatal engine errors.
pub const EXIT_FATAL: i32 = 1;
/// Run interrupted by SIGINT.
pub const EXIT_SIGINT: i32 = 130;
/// Run interrupted by SIGTERM.
pub const EXIT_SIGTERM: i32 = 2;
/// Run interrupted by any other signal.
pub const EXIT_OTHER_SIGNAL: i32 = 99;
/// A second signal arrived and containers were killed.
pub const EXIT_DOUBLE_SIGNAL: i32 = 3;

// ── Paths inside the container ───────────────────────────────────────

/// Mount point of the identity directory.
pub const IDENTITY_DIR_INNER: &str = "/dojo/identity";
/// Default mount point of the work directory.
pub const DEFAULT_WORK_DIR_INNER: &str = "/dojo/work";
/// Where the multi-line variables script is mounted.
pub const MULTILINE_VARS_INNER: &str = "/etc/dojo.d/variables/00-multiline-vars.sh";
/// Where the bash functions script is mounted.
pub const BASH_FUNCTIONS_INNER: &str = "/etc/dojo.d/variables/01-bash-functions.sh";
/// X11 socket directory shared when `DISPLAY` is set.
pub const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";
/// Value `DISPLAY` is rewritten to inside the container.
pub const CONTAINER_DISPLAY: &str = "unix:0.0";

// ── Generated files ──────────────────────────────────────────────────

/// Directory that holds the generated environment files.
pub const ENV_FILE_DIR: &str = "/tmp";
/// Suffix appended to the user's compose file to name the override file.
pub const OVERRIDE_SUFFIX: &str = ".dojo";
/// Marker file holding the bare run ID.
pub const RUN_ID_TEXT_FILE: &str = "dojorc.txt";
/// Marker file holding `DOJO_RUN_ID=<id>`.
pub const RUN_ID_ENV_FILE: &str = "dojorc";

// ── Defaults ─────────────────────────────────────────────────────────

/// Run ID used in test mode so that generated names are predictable.
pub const TEST_RUN_ID: &str = "testdojorunid";
/// Name of the compose service that runs the user command.
pub const DEFAULT_SERVICE: &str = "default";
/// Compose project name used when pulling images.
pub const PULL_PROJECT: &str = "dojo";
/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "Dojofile";
/// Default compose file name.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
/// Variables renamed to `DOJO_<name>` before entering the container.
pub const DEFAULT_BLACKLIST: &str = "BASH*,HOME,USERNAME,USER,LOGNAME,PATH,TERM,SHELL,MAIL,SUDO_*,\
WINDOWID,SSH_*,SESSION_*,GEM_HOME,GEM_PATH,GEM_ROOT,HOSTNAME,HOSTTYPE,IFS,PPID,PWD,OLDPWD,LC*,TMPDIR";
/// Prefix given to blacklisted variables.
pub const VARIABLE_PREFIX: &str = "DOJO_";
