use crate::store::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

/// Key-value collection persisted in a fjall partition.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn open(path: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;

        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open keyspace at {}", path.display()))?;
        let partition = keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .with_context(|| format!("Failed to open partition: {name}"))?;
        debug!("Opened disk collection '{}' at {}", name, path.display());

        Ok(Self {
            keyspace,
            partition,
        })
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .partition
            .get(key)
            .with_context(|| format!("Failed to read key: {key}"))?;
        debug!("Disk GET for key: {} (found: {})", key, value.is_some());
        Ok(value.map(|slice| slice.to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.partition
            .insert(key, value)
            .with_context(|| format!("Failed to write key: {key}"))?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist keyspace")?;
        debug!("Disk PUT for key: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.partition
            .remove(key)
            .with_context(|| format!("Failed to remove key: {key}"))?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist keyspace")?;
        debug!("Disk REMOVE for key: {}", key);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
