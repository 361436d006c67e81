use std::sync::Arc;

use anyhow::{Context, Result};
use shared::domain::StarredSet;
use storage::KeyValueStore;
use tracing::warn;

/// Storage key the starred-id set is persisted under.
pub const STARRED_STORAGE_KEY: &str = "starred";

/// Loads and saves the user's starred ids against durable storage.
/// Loading is fail-open: a missing or unreadable payload yields the
/// empty set so a corrupt value can never block startup.
#[derive(Clone)]
pub struct StarredSetManager {
    store: Arc<dyn KeyValueStore>,
}

impl StarredSetManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> StarredSet {
        let raw = match self.store.get(STARRED_STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return StarredSet::default(),
            Err(err) => {
                warn!("failed to read starred set from storage: {err:#}");
                return StarredSet::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(starred) => starred,
            Err(err) => {
                warn!("discarding unparseable starred payload: {err}");
                StarredSet::default()
            }
        }
    }

    pub async fn save(&self, starred: &StarredSet) -> Result<()> {
        let payload =
            serde_json::to_string(starred).context("failed to serialize starred set")?;
        self.store.set(STARRED_STORAGE_KEY, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::RecordId;
    use storage::MemoryStore;

    #[tokio::test]
    async fn absent_payload_loads_as_empty_set() {
        let manager = StarredSetManager::new(Arc::new(MemoryStore::new()));
        assert!(manager.load().await.is_empty());
    }

    #[tokio::test]
    async fn unparseable_payload_loads_as_empty_set() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(STARRED_STORAGE_KEY, "{definitely not json]")
            .await
            .expect("seed");

        let manager = StarredSetManager::new(store);
        assert!(manager.load().await.is_empty());
    }

    #[tokio::test]
    async fn saved_set_loads_back_identically() {
        let manager = StarredSetManager::new(Arc::new(MemoryStore::new()));

        let mut starred = StarredSet::default();
        starred.toggle(RecordId(4));
        starred.toggle(RecordId(11));
        manager.save(&starred).await.expect("save");

        assert_eq!(manager.load().await, starred);
    }

    #[tokio::test]
    async fn save_overwrites_the_previous_set() {
        let manager = StarredSetManager::new(Arc::new(MemoryStore::new()));

        let mut first = StarredSet::default();
        first.toggle(RecordId(1));
        manager.save(&first).await.expect("first save");

        let mut second = first.clone();
        second.toggle(RecordId(1));
        second.toggle(RecordId(2));
        manager.save(&second).await.expect("second save");

        assert_eq!(manager.load().await, second);
    }
}
