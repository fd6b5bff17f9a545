//! Dedup/rate gate: one event per key per sliding window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Budget of one event per key per window.
///
/// Collapses bursts (page reloads, double clicks, retried requests) into a
/// single recorded event. Production deployments back the window with shared
/// storage so the budget holds across server instances; this trait is the
/// seam for that.
#[async_trait]
pub trait DedupGate: Send + Sync {
    /// Consumes the key's slot for the current window. Returns false when
    /// the key already fired within the window.
    async fn allow(&self, key: &str) -> bool;
}

/// Entries above which `allow` prunes expired windows in place.
const PRUNE_THRESHOLD: usize = 4096;

/// In-memory sliding-window gate.
#[derive(Clone)]
pub struct InMemoryDedupGate {
    window: Duration,
    last_seen: Arc<RwLock<HashMap<String, Instant>>>,
}

impl InMemoryDedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.last_seen.read().await.len()
    }
}

#[async_trait]
impl DedupGate for InMemoryDedupGate {
    async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.last_seen.write().await;

        if let Some(last) = seen.get(key)
            && now.duration_since(*last) < self.window
        {
            return false;
        }

        if seen.len() > PRUNE_THRESHOLD {
            let window = self.window;
            seen.retain(|_, last| now.duration_since(*last) < window);
        }

        seen.insert(key.to_string(), now);
        true
    }
}
