use super::{Backend, BackendError};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Records every ban it receives instead of touching packet-filter state.
/// Used by the daemon's own integration tests and by rules configured with
/// `backend = "test"`.
#[derive(Default)]
pub struct TestBackend {
    bans: Mutex<Vec<(String, Duration)>>,
}

impl TestBackend {
    pub fn new() -> Self {
        TestBackend::default()
    }

    /// Snapshot of every `(ip, duration)` pair banned so far, in order.
    pub fn bans(&self) -> Vec<(String, Duration)> {
        self.bans.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for TestBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn ban(&self, rule_name: &str, ip: &str, _ipv6: bool, duration: Duration) -> Result<(), BackendError> {
        info!(rule = %rule_name, ip = %ip, "(not) banning");
        self.bans.lock().unwrap().push((ip.to_string(), duration));
        Ok(())
    }

    async fn finalize(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
