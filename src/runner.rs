use crate::backend::ipset::IpsetBackend;
use crate::backend::nft::NftBackend;
use crate::backend::test_backend::TestBackend;
use crate::backend::{Backend, BackendError};
use crate::config::RawConfig;
use crate::rule::{Rule, RuleError};
use crate::worker;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_RESPAWN_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("failed to initialize backend: {0}")]
    BackendInit(#[from] BackendError),

    #[error("failed to initialize rule \"{name}\": {source}")]
    RuleInit { name: String, source: RuleError },
}

/// Owns the daemon's whole runtime: the initialized rule set, the chosen
/// backend, and the cancellation/respawn machinery that keeps workers
/// running (and restarting) until shutdown.
pub struct Runner {
    rules: Vec<Arc<Rule>>,
    backend: Arc<dyn Backend>,
    respawn_delay: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("rules", &self.rules)
            .field("respawn_delay", &self.respawn_delay)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Selects and initializes a backend by tag, then initializes every
    /// configured rule. Fails fast on the first error, prefixed with the
    /// offending rule's name where applicable.
    pub async fn initialize(config: &RawConfig) -> Result<Self, RunnerError> {
        let backend: Arc<dyn Backend> = match config.backend.as_str() {
            "ipset" => Arc::new(IpsetBackend::new(config.save_file_path.clone())),
            "nft" => Arc::new(NftBackend::new(config.save_file_path.clone())),
            "test" => Arc::new(TestBackend::new()),
            other => return Err(RunnerError::UnknownBackend(other.to_string())),
        };
        backend.initialize().await?;

        let mut rules = Vec::with_capacity(config.rules.len());
        for (name, raw_rule) in &config.rules {
            let rule = Rule::initialize(name, raw_rule).map_err(|e| RunnerError::RuleInit {
                name: name.clone(),
                source: e,
            })?;
            rules.push(Arc::new(rule));
        }

        Ok(Runner {
            rules,
            backend,
            respawn_delay: DEFAULT_RESPAWN_DELAY,
            cancel: CancellationToken::new(),
        })
    }

    #[cfg(test)]
    pub fn with_respawn_delay(mut self, delay: Duration) -> Self {
        self.respawn_delay = delay;
        self
    }

    /// Spawns one worker per rule, installs INT/TERM handlers, and blocks
    /// until shutdown is signalled, respawning workers whose source exits
    /// (with `requeue = true`) after `respawn_delay`.
    pub async fn run(&self, requeue: bool) -> Result<(), RunnerError> {
        // Rendezvous handoff, mirroring the upstream daemon's unbuffered
        // `chan *rule`: a finished worker blocks in `requeue` until this
        // loop is ready to receive it. `tokio::sync::mpsc` has no capacity-0
        // option, so 1 is the closest equivalent.
        let (respawn_tx, mut respawn_rx) = mpsc::channel::<Arc<Rule>>(1);

        for rule in &self.rules {
            spawn_worker_task(
                Arc::clone(rule),
                Arc::clone(&self.backend),
                requeue,
                respawn_tx.clone(),
                self.cancel.clone(),
            );
        }

        let cancel = self.cancel.clone();
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    cancel.cancel();
                    break;
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    cancel.cancel();
                    break;
                }
                Some(rule) = respawn_rx.recv() => {
                    let delay = self.respawn_delay;
                    let tx = respawn_tx.clone();
                    let runner_cancel = self.cancel.clone();
                    let backend = Arc::clone(&self.backend);
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {
                                info!(rule = %rule.name, "respawning worker");
                            }
                            _ = runner_cancel.cancelled() => return,
                        }
                        spawn_worker_task(rule, backend, requeue, tx, runner_cancel);
                    });
                }
            }
        }

        Ok(())
    }

    /// Runs the backend's teardown exactly once. Always call this after
    /// `run` returns, regardless of why it returned.
    pub async fn finalize(&self) -> Result<(), RunnerError> {
        self.backend.finalize().await.map_err(RunnerError::BackendInit)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}


fn spawn_worker_task(
    rule: Arc<Rule>,
    backend: Arc<dyn Backend>,
    requeue: bool,
    respawn_tx: mpsc::Sender<Arc<Rule>>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        info!(rule = %rule.name, "spawned worker");
        let rule_name = rule.name.clone();
        let clean_exit = worker::run(Arc::clone(&rule), backend, cancel.clone()).await;

        if requeue && clean_exit && !cancel.is_cancelled() {
            info!(rule = %rule_name, "queuing worker for respawn");
            worker::requeue(rule, respawn_tx, cancel).await;
        }
    });
}
