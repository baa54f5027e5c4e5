//! # dojo
//!
//! Runs a command inside a docker container or a docker-compose project,
//! with the current directory and environment carried over, and tears
//! everything down afterwards, also when interrupted.

mod cli;
mod run_id;
mod settings;
mod signals;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dojo_common::constants::{DEFAULT_CONFIG_FILE, EXIT_FATAL, VERSION};
use dojo_runtime::context::RunContext;
use dojo_runtime::driver::create_driver;
use dojo_runtime::env::EnvSnapshot;
use dojo_runtime::files::{FileService, LocalFiles};
use dojo_runtime::shell::{BashShell, Shell};
use dojo_runtime::supervisor::supervise;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::settings::Layer;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let home = std::env::var("HOME").ok();

    let cli_layer = cli.into_layer(&cwd);
    let config_file = cwd.join(cli_layer.config_file.as_deref().unwrap_or(DEFAULT_CONFIG_FILE));
    let file_layer = settings::read_dojofile(&config_file, &cwd)?;
    let merged = Layer::merge(
        cli_layer.clone(),
        file_layer.clone().unwrap_or_default(),
        Layer::defaults(&cwd, home.as_deref()),
    );

    init_tracing(merged.wants_debug());
    tracing::info!("Dojo version {VERSION}");
    if file_layer.is_none() {
        tracing::debug!(path = %config_file.display(), "config file does not exist");
    }
    tracing::debug!(?cli_layer, "configuration from flags");
    tracing::debug!(?file_layer, "configuration from file");
    tracing::debug!(?merged, "merged configuration");

    let config = match settings::resolve(&merged, &cwd) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(EXIT_FATAL);
        }
    };
    tracing::debug!("config verified successfully");

    let run_id = run_id::for_run(config.test, &cwd);
    tracing::debug!(run_id = %run_id, "run ID generated");
    let ctx = Arc::new(RunContext::new(run_id, config, EnvSnapshot::capture()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let code = runtime.block_on(run(ctx))?;
    // Exits without dropping the runtime: after a fatal error the work may
    // still be blocked on a container.
    std::process::exit(code)
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .init();
}

async fn run(ctx: Arc<RunContext>) -> anyhow::Result<i32> {
    let (tx, rx) = mpsc::channel(8);
    signals::forward(tx).context("failed to install signal handlers")?;

    let shell: Arc<dyn Shell> = Arc::new(BashShell::new());
    let files: Arc<dyn FileService> = Arc::new(LocalFiles);
    tracing::debug!(interactive = shell.is_interactive(), "current shell");
    let driver = match create_driver(ctx.config.driver, shell, files) {
        Ok(driver) => driver,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(EXIT_FATAL);
        }
    };
    Ok(supervise(driver, ctx, rx).await)
}
