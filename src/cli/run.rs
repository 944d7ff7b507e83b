use crate::config::{self, ConfigError};
use crate::runner::{Runner, RunnerError};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Runner(#[from] RunnerError),
}

/// Loads configuration, builds and initializes the runner, runs it to
/// completion, and finalizes the backend exactly once regardless of how
/// `run` returned. The daemon always requeues workers whose source exits
/// on its own; a worker only stops being respawned once shutdown begins.
pub async fn run(config_path: &Path) -> Result<(), RunError> {
    let raw_config = config::load_config(config_path)?;
    info!(path = %config_path.display(), backend = %raw_config.backend, rules = raw_config.rules.len(), "loaded configuration");

    run_with_config(raw_config).await
}

/// Same as [`run`], but takes an already-loaded configuration. Used by the
/// binary's entrypoint, which reads the config early to pick a default
/// tracing filter before the runner exists.
pub async fn run_with_config(raw_config: config::RawConfig) -> Result<(), RunError> {
    let runner = Runner::initialize(&raw_config).await?;

    let run_result = runner.run(true).await;
    let finalize_result = runner.finalize().await;

    run_result?;

    if let Err(e) = &finalize_result {
        error!(error = %e, "backend finalize failed");
    }
    finalize_result?;

    Ok(())
}
