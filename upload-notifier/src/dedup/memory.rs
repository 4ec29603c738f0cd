use crate::dedup::validate_item_id;
use crate::traits::DedupStore;
use crate::types::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Non-durable store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    seen: RwLock<HashSet<String>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn contains(&self, item_id: &str) -> Result<bool> {
        Ok(self.seen.read().await.contains(item_id))
    }

    async fn record(&self, item_id: &str) -> Result<()> {
        validate_item_id(item_id)?;
        self.seen.write().await.insert(item_id.to_string());
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.seen.read().await.len())
    }
}
