//! Saved ticker selection, kept in a caller-owned key-value collection.

use crate::core::ticker::{TickerSet, TickerSymbol};
use crate::store::KeyValueCollection;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

const SAVED_TICKERS_KEY: &str = "saved_tickers";

pub struct Session {
    store: Arc<dyn KeyValueCollection>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueCollection>) -> Self {
        Self { store }
    }

    /// Returns the saved selection, or `None` if nothing has been saved yet.
    pub async fn saved_tickers(&self) -> Result<Option<TickerSet>> {
        let Some(bytes) = self.store.get(SAVED_TICKERS_KEY).await? else {
            return Ok(None);
        };
        let tickers: Vec<TickerSymbol> =
            serde_json::from_slice(&bytes).context("Failed to decode saved selection")?;
        debug!("Loaded {} saved tickers", tickers.len());
        Ok(Some(tickers.into_iter().collect()))
    }

    pub async fn save_tickers(&self, tickers: &TickerSet) -> Result<()> {
        let list: Vec<&TickerSymbol> = tickers.iter().collect();
        let bytes = serde_json::to_vec(&list).context("Failed to encode selection")?;
        self.store.put(SAVED_TICKERS_KEY, bytes).await?;
        debug!("Saved {} tickers", tickers.len());
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(SAVED_TICKERS_KEY).await
    }

    /// False when the store fell back to memory and saves are lost on exit.
    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    pub fn ensure_persistent(&self) -> Result<()> {
        anyhow::ensure!(
            self.is_persistent(),
            "Selection cannot be saved: no writable data directory (set data_path in the config)"
        );
        Ok(())
    }
}
