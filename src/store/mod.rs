pub mod disk;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use disk::DiskCollection;
use memory::MemoryCollection;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const SESSION_COLLECTION: &str = "session";

/// A byte-oriented key-value collection owned by the caller of the engine.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Whether writes survive a restart.
    fn is_persistent(&self) -> bool;
}

/// Opens the on-disk session collection under `data_path`, falling back to an
/// in-memory one when the disk store is unavailable.
pub fn open_session_collection(data_path: Option<&Path>) -> Arc<dyn KeyValueCollection> {
    let Some(path) = data_path else {
        warn!("No data directory available, saved selection will not persist");
        return Arc::new(MemoryCollection::new());
    };

    match DiskCollection::open(&path.join("session"), SESSION_COLLECTION) {
        Ok(collection) => Arc::new(collection),
        Err(e) => {
            warn!(error = %e, "Failed to open session store, saved selection will not persist");
            Arc::new(MemoryCollection::new())
        }
    }
}
