use gatewatch::adaptor;
use gatewatch::backend::test_backend::TestBackend;
use gatewatch::config::RawRule;
use gatewatch::rule::Rule;
use gatewatch::worker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn rule(source: &[&str], regexp: &[&str], action: &[&str]) -> RawRule {
    RawRule {
        source: source.iter().map(|s| s.to_string()).collect(),
        regexp: regexp.iter().map(|s| s.to_string()).collect(),
        action: action.iter().map(|s| s.to_string()).collect(),
        aggregate: None,
        occurrences: None,
    }
}

async fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Runs a rule's worker to completion (its source process exits on its own)
/// against a fresh `TestBackend`, returning the bans it recorded.
async fn run_to_completion(rule: Arc<Rule>) -> Vec<(String, Duration)> {
    let backend = Arc::new(TestBackend::new());
    let cancel = CancellationToken::new();
    worker::run(rule, backend.clone(), cancel).await;
    backend.bans()
}

#[tokio::test]
async fn simple_ban() {
    let raw = rule(
        &["test", "sh", "-c", "echo 'failed from 203.0.113.9'"],
        &["failed from %ip%"],
        &["ban", "1h"],
    );
    let r = Arc::new(Rule::initialize("ssh", &raw).unwrap());

    let bans = run_to_completion(r).await;
    assert_eq!(bans, vec![("203.0.113.9".to_string(), Duration::from_secs(3600))]);
}

#[tokio::test]
async fn occurrences_threshold_met_resets_after_tripping() {
    let mut raw = rule(
        &[
            "test",
            "sh",
            "-c",
            "echo 'failed from 203.0.113.9'; sleep 0.05; \
             echo 'failed from 203.0.113.9'; sleep 0.05; \
             echo 'failed from 203.0.113.9'; sleep 0.5; \
             echo 'failed from 203.0.113.9'",
        ],
        &["failed from %ip%"],
        &["ban", "1h"],
    );
    raw.occurrences = Some(vec!["3".to_string(), "300ms".to_string()]);
    let r = Arc::new(Rule::initialize("ssh", &raw).unwrap());

    let bans = run_to_completion(r).await;
    // The first three lines (within 300ms) trip the counter once; the fourth
    // line, arriving after the window reset, starts a fresh count of one and
    // does not trip it again on its own.
    assert_eq!(bans, vec![("203.0.113.9".to_string(), Duration::from_secs(3600))]);
}

#[tokio::test]
async fn occurrences_threshold_not_met() {
    // Same count/interval shape as the "met" scenario, but only two lines
    // land inside any given 150ms window, so the count-of-3 never trips:
    // the first pair ages out of the window before the third line arrives.
    let mut raw = rule(
        &[
            "test",
            "sh",
            "-c",
            "echo 'failed from 203.0.113.9'; sleep 0.02; \
             echo 'failed from 203.0.113.9'; sleep 0.2; \
             echo 'failed from 203.0.113.9'",
        ],
        &["failed from %ip%"],
        &["ban", "1h"],
    );
    raw.occurrences = Some(vec!["3".to_string(), "150ms".to_string()]);
    let r = Arc::new(Rule::initialize("ssh", &raw).unwrap());

    let bans = run_to_completion(r).await;
    assert!(bans.is_empty());
}

#[tokio::test]
async fn aggregate_completion_resolves_the_pending_ip() {
    let mut raw = rule(
        &[
            "test",
            "sh",
            "-c",
            "echo 'login attempt from 198.51.100.4 id=abc'; sleep 0.05; \
             echo 'user abc login success'",
        ],
        &["login attempt from %ip% id=%id%"],
        &["ban", "1h"],
    );
    raw.aggregate = Some(vec!["500ms".to_string(), "user %id% login success".to_string()]);
    let r = Arc::new(Rule::initialize("ssh", &raw).unwrap());

    let bans = run_to_completion(r).await;
    assert_eq!(bans, vec![("198.51.100.4".to_string(), Duration::from_secs(3600))]);
}

#[tokio::test]
async fn aggregate_expires_before_completion_arrives() {
    let mut raw = rule(
        &[
            "test",
            "sh",
            "-c",
            "echo 'login attempt from 198.51.100.4 id=abc'; sleep 0.3; \
             echo 'user abc login success'",
        ],
        &["login attempt from %ip% id=%id%"],
        &["ban", "1h"],
    );
    // The completion line arrives 300ms later, well past the 200ms TTL, so
    // the registration has already been evicted by the time it shows up.
    raw.aggregate = Some(vec!["200ms".to_string(), "user %id% login success".to_string()]);
    let r = Arc::new(Rule::initialize("ssh", &raw).unwrap());

    let bans = run_to_completion(r).await;
    assert!(bans.is_empty());
}

#[tokio::test]
async fn shutdown_reaps_the_source_process() {
    let raw = rule(&["process", "sleep", "3600"], &["unused %ip%"], &["ban", "1h"]);
    let r = Arc::new(Rule::initialize("idle", &raw).unwrap());

    let cancel = CancellationToken::new();
    let mut rx = adaptor::spawn(Arc::clone(&r), cancel.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let closed = wait_until(Duration::from_secs(6), || {
        matches!(rx.try_recv(), Err(tokio::sync::mpsc::error::TryRecvError::Disconnected))
    })
    .await;
    assert!(closed, "source process should have been reaped and its channel closed");
}
