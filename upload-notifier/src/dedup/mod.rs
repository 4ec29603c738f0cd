pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileDedupStore;
pub use memory::MemoryDedupStore;
pub use sqlite::SqliteDedupStore;

use crate::traits::DedupStore;
use crate::types::{NotifierError, Result};
use std::sync::Arc;
use tracing::info;

/// Open the dedup store named by a location string.
///
/// `sqlite:<path>` selects the SQLite store, `memory` a throwaway in-memory
/// set, anything else is a path to a line-per-ID file.
pub async fn open_store(location: &str) -> Result<Arc<dyn DedupStore>> {
    let location = location.trim();
    if location.is_empty() {
        return Err(NotifierError::Config("dedup location is empty".to_string()));
    }

    let store: Arc<dyn DedupStore> = if let Some(path) = location.strip_prefix("sqlite:") {
        Arc::new(SqliteDedupStore::open(path).await?)
    } else if location == "memory" {
        Arc::new(MemoryDedupStore::new())
    } else {
        Arc::new(FileDedupStore::open(location).await?)
    };

    info!("Opened dedup store {} ({} items recorded)", location, store.len().await?);
    Ok(store)
}

/// Item IDs end up as lines in a file or keys in a table; reject anything
/// that would corrupt either.
pub(crate) fn validate_item_id(item_id: &str) -> Result<()> {
    if item_id.trim().is_empty() || item_id.contains(['\n', '\r']) {
        return Err(NotifierError::InvalidItemId(item_id.to_string()));
    }
    Ok(())
}
