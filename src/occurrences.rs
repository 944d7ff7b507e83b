use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Sliding-window counter that trips once `count` hits for a single IP land
/// within `interval` of one another, then forgets that IP entirely.
///
/// The delete-on-trip behaviour means a freshly-banned IP that keeps
/// producing matching lines does not re-arm until it accumulates a whole new
/// window of evidence, rather than tripping on every single subsequent line.
#[derive(Debug)]
pub struct Occurrences {
    registry: Mutex<HashMap<String, Vec<Instant>>>,
    interval: Duration,
    count: usize,
}

impl Occurrences {
    pub fn new(interval: Duration, count: usize) -> Self {
        Occurrences {
            registry: Mutex::new(HashMap::new()),
            interval,
            count,
        }
    }

    /// Records an occurrence for `ip`. Returns `true` iff this occurrence
    /// tripped the threshold, in which case the IP's history is cleared.
    pub async fn add(&self, ip: &str) -> bool {
        let mut registry = self.registry.lock().await;
        let now = Instant::now();

        let entry = registry.entry(ip.to_string()).or_default();
        entry.push(now);
        if entry.len() > self.count {
            entry.remove(0);
        }

        if entry.len() == self.count {
            let span = entry[entry.len() - 1] - entry[0];
            if span <= self.interval {
                registry.remove(ip);
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trips_when_enough_hits_land_within_interval() {
        let o = Occurrences::new(Duration::from_secs(60), 3);
        assert!(!o.add("10.0.0.1").await);
        assert!(!o.add("10.0.0.1").await);
        assert!(o.add("10.0.0.1").await);
    }

    #[tokio::test]
    async fn forgets_ip_after_tripping() {
        let o = Occurrences::new(Duration::from_secs(60), 2);
        assert!(o.add("10.0.0.1").await);
        // history was cleared; needs a fresh run of `count` hits to trip again
        assert!(!o.add("10.0.0.1").await);
    }

    #[tokio::test]
    async fn tracks_ips_independently() {
        let o = Occurrences::new(Duration::from_secs(60), 2);
        assert!(!o.add("10.0.0.1").await);
        assert!(!o.add("10.0.0.2").await);
        assert!(o.add("10.0.0.1").await);
    }

    #[tokio::test]
    async fn drops_oldest_entry_once_window_exceeds_count() {
        let o = Occurrences::new(Duration::from_secs(60), 2);
        assert!(!o.add("10.0.0.1").await);
        assert!(o.add("10.0.0.1").await);
        // registry was cleared by the trip, so the window starts over
        assert!(!o.add("10.0.0.1").await);
    }
}
