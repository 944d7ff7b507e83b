pub mod ipset;
pub mod nft;
pub mod test_backend;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("{0}: insufficient privileges")]
    InsufficientPrivileges(String),

    #[error("failed to {action}: {detail}")]
    Command { action: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whatever enforces bans: ipset+iptables, nftables, or a recording stub
/// used by tests. Unlike `Action`/`Source`, this is a trait object rather
/// than a tagged enum, since the three implementations share no state or
/// behaviour beyond the interface itself and a fourth (BSD `pf`, say) could
/// plausibly be added without touching the engine.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Prepares the backend to receive bans: verifies required tooling and
    /// privileges are present, restores a previous save file if configured,
    /// and installs whatever packet-filter hooks are needed. Failure here is
    /// fatal to the whole daemon.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Bans `ip` for `duration`. Idempotent: banning an already-banned IP is
    /// a no-op. Failures are logged by the caller, not fatal.
    async fn ban(&self, rule_name: &str, ip: &str, ipv6: bool, duration: Duration) -> Result<(), BackendError>;

    /// Tears down whatever `initialize` set up, persisting state first if a
    /// save path is configured. Runs exactly once, on the way out.
    async fn finalize(&self) -> Result<(), BackendError>;
}
