use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A pending registration's IP, tagged with the generation it was registered
/// under. The tag lets a delayed eviction tell "the entry I scheduled this
/// for" apart from "a newer registration that reused the same id".
#[derive(Debug)]
struct Entry {
    ip: String,
    generation: u64,
}

/// Correlates a "first half" log line (which carries both an IP and an
/// opaque identifier) with a later "second half" line that carries only the
/// identifier, for rules that can only attribute an IP once two related
/// lines have both appeared.
///
/// Pending registrations self-expire after `interval` so that an identifier
/// whose second half never arrives doesn't leak forever.
#[derive(Debug, Clone)]
pub struct AggregateRegistry {
    pending: Arc<Mutex<HashMap<String, Entry>>>,
    next_generation: Arc<AtomicU64>,
    interval: Duration,
}

impl AggregateRegistry {
    pub fn new(interval: Duration) -> Self {
        AggregateRegistry {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            interval,
        }
    }

    /// Registers `id -> ip` and schedules its eviction after `interval`.
    /// A later, successful `complete` for the same id pre-empts the
    /// eviction. If `id` is re-registered before that eviction runs, the
    /// eviction only removes the entry it was scheduled for: it re-checks
    /// the stored generation under the lock and is a no-op if a newer
    /// registration has since replaced it, mirroring the upstream daemon's
    /// per-entry generation counter.
    pub async fn register(&self, id: String, ip: String) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), Entry { ip, generation });
        }

        let pending = Arc::clone(&self.pending);
        let interval = self.interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let mut pending = pending.lock().await;
            if let std::collections::hash_map::Entry::Occupied(entry) = pending.entry(id) {
                if entry.get().generation == generation {
                    entry.remove();
                }
            }
        });
    }

    /// Looks up and removes `id`, returning the IP it was registered with,
    /// if it is still pending.
    pub async fn complete(&self, id: &str) -> Option<String> {
        let mut pending = self.pending.lock().await;
        pending.remove(id).map(|entry| entry.ip)
    }
}
