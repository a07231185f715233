//! Single-slot TTL cache for externally-fetched data (team roster, labels).
//!
//! Read-mostly and shared; refresh happens on miss with no cross-process
//! coordination (single-process assumption).

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Slot<T> {
    stored_at: Instant,
    value: Arc<T>,
}

pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Slot<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Cached value, or `None` when empty or older than the TTL.
    pub async fn get(&self) -> Option<Arc<T>> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some(s) if s.stored_at.elapsed() < self.ttl => Some(s.value.clone()),
            _ => None,
        }
    }

    /// Store a freshly fetched value, resetting the TTL window.
    pub async fn put(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.slot.write().await = Some(Slot {
            stored_at: Instant::now(),
            value: value.clone(),
        });
        value
    }

    /// Drop the cached value so the next read refreshes.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}
