use crate::adaptor;
use crate::backend::Backend;
use crate::matcher::Match;
use crate::rule::action::{Action, LogMode};
use crate::rule::Rule;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs a single rule's lifetime: spawn its source, apply the occurrence
/// gate (if any) to every produced Match, and perform the action on the
/// ones that pass. Returns when the source's Match channel closes, which
/// happens either because the subprocess exited or shutdown was signalled.
///
/// The caller decides whether to requeue the rule for respawn; this
/// function only reports whether its exit was due to the adaptor itself
/// failing to start (fatal for this spawn attempt) or a clean channel close.
pub async fn run(rule: Arc<Rule>, backend: Arc<dyn Backend>, cancel: CancellationToken) -> bool {
    let mut rx = match adaptor::spawn(Arc::clone(&rule), cancel.clone()) {
        Ok(rx) => rx,
        Err(e) => {
            error!(rule = %rule.name, error = %e, "failed to initialize source adaptor");
            return false;
        }
    };

    while let Some(m) = rx.recv().await {
        process_match(&rule, backend.as_ref(), &m).await;
    }

    true
}

async fn process_match(rule: &Rule, backend: &dyn Backend, m: &Match) {
    if let Some(spec) = &rule.occurrences {
        if !spec.counter.add(&m.ip).await {
            return;
        }
    }

    if let Err(e) = perform(rule, backend, m).await {
        warn!(rule = %rule.name, error = %e, "failed to perform action");
    }
}

async fn perform(rule: &Rule, backend: &dyn Backend, m: &Match) -> Result<(), crate::backend::BackendError> {
    match &rule.action {
        Action::Ban(duration) => backend.ban(&rule.name, &m.ip, m.ipv6, *duration).await,
        Action::Log(LogMode::Simple) => {
            info!(rule = %rule.name, "{}", m.simple_string());
            Ok(())
        }
        Action::Log(LogMode::Extended) => {
            info!(rule = %rule.name, "{}", m.extended_string());
            Ok(())
        }
        Action::Test => {
            info!(rule = %rule.name, ip = %m.ip, "test action performed");
            Ok(())
        }
    }
}

/// Submits a rule for respawn after its worker exits, unless shutdown is in
/// progress. Mirrors the runner's respawn channel: an unbuffered handoff
/// that blocks until either the coordinator receives it or cancellation
/// wins the race.
pub async fn requeue(rule: Arc<Rule>, respawn_tx: mpsc::Sender<Arc<Rule>>, cancel: CancellationToken) {
    tokio::select! {
        _ = respawn_tx.send(rule) => {}
        _ = cancel.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_backend::TestBackend;
    use crate::config::RawRule;
    use std::time::Duration as StdDuration;

    fn raw_rule(action: &[&str]) -> RawRule {
        RawRule {
            source: vec!["test".to_string(), "echo".to_string()],
            regexp: vec!["from %ip%".to_string()],
            action: action.iter().map(|s| s.to_string()).collect(),
            aggregate: None,
            occurrences: None,
        }
    }

    #[tokio::test]
    async fn process_match_invokes_ban_backend() {
        let rule = Rule::initialize("ssh", &raw_rule(&["ban", "1h"])).unwrap();
        let backend = TestBackend::new();
        let m = Match {
            time: std::time::SystemTime::now(),
            line: "from 10.0.0.5".to_string(),
            ip: "10.0.0.5".to_string(),
            ipv6: false,
            regexp: "from %ip%".to_string(),
        };

        process_match(&rule, &backend, &m).await;
        let bans = backend.bans();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].0, "10.0.0.5");
        assert_eq!(bans[0].1, StdDuration::from_secs(3600));
    }

    #[tokio::test]
    async fn occurrences_gate_suppresses_action_until_tripped() {
        let mut raw = raw_rule(&["ban", "1h"]);
        raw.occurrences = Some(vec!["2".to_string(), "1m".to_string()]);
        let rule = Rule::initialize("ssh", &raw).unwrap();
        let backend = TestBackend::new();
        let m = Match {
            time: std::time::SystemTime::now(),
            line: "from 10.0.0.5".to_string(),
            ip: "10.0.0.5".to_string(),
            ipv6: false,
            regexp: "from %ip%".to_string(),
        };

        process_match(&rule, &backend, &m).await;
        assert!(backend.bans().is_empty());

        process_match(&rule, &backend, &m).await;
        assert_eq!(backend.bans().len(), 1);
    }
}
