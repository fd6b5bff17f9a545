//! Rolling usage counters for the quota guard and per-asset counts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::WorkspaceId;
use tokio::sync::RwLock;

/// Rolling event-usage and asset counters.
///
/// All writes are atomic adds; readers never observe torn counts under
/// concurrent recording. The guard itself compares usage against the
/// workspace's plan limit (or override) before an event is recorded.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Current rolling usage for a workspace.
    async fn usage(&self, workspace: WorkspaceId) -> u64;

    /// Adds one to the workspace's rolling usage.
    async fn increment_usage(&self, workspace: WorkspaceId);

    /// Adds one to an asset counter (e.g. a link's click count).
    async fn increment_asset(&self, asset_key: &str);

    /// Current value of an asset counter.
    async fn asset_count(&self, asset_key: &str) -> u64;
}

#[derive(Default)]
struct Counters {
    usage: HashMap<WorkspaceId, u64>,
    assets: HashMap<String, u64>,
}

/// In-memory usage counters.
#[derive(Clone, Default)]
pub struct InMemoryUsageStore {
    counters: Arc<RwLock<Counters>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds a workspace's usage, for tests exercising the quota guard.
    pub async fn set_usage(&self, workspace: WorkspaceId, value: u64) {
        self.counters.write().await.usage.insert(workspace, value);
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn usage(&self, workspace: WorkspaceId) -> u64 {
        self.counters
            .read()
            .await
            .usage
            .get(&workspace)
            .copied()
            .unwrap_or(0)
    }

    async fn increment_usage(&self, workspace: WorkspaceId) {
        *self
            .counters
            .write()
            .await
            .usage
            .entry(workspace)
            .or_insert(0) += 1;
    }

    async fn increment_asset(&self, asset_key: &str) {
        *self
            .counters
            .write()
            .await
            .assets
            .entry(asset_key.to_string())
            .or_insert(0) += 1;
    }

    async fn asset_count(&self, asset_key: &str) -> u64 {
        self.counters
            .read()
            .await
            .assets
            .get(asset_key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn usage_increments_per_workspace() {
        let store = InMemoryUsageStore::new();
        let a = WorkspaceId::new();
        let b = WorkspaceId::new();

        store.increment_usage(a).await;
        store.increment_usage(a).await;
        store.increment_usage(b).await;

        assert_eq!(store.usage(a).await, 2);
        assert_eq!(store.usage(b).await, 1);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = InMemoryUsageStore::new();
        let workspace = WorkspaceId::new();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_usage(workspace).await;
                store.increment_asset("link:1").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.usage(workspace).await, 32);
        assert_eq!(store.asset_count("link:1").await, 32);
    }
}
