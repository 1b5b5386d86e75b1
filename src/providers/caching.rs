use crate::core::cache::Cache;
use crate::core::search::{SearchCandidate, SearchProvider};
use crate::core::snapshot::{FetchError, Snapshot, SnapshotProvider};
use crate::core::ticker::TickerSymbol;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

// Caching for SnapshotProvider
pub struct CachingSnapshotProvider<T: SnapshotProvider> {
    inner: T,
    cache: Arc<dyn Cache<TickerSymbol, Snapshot>>,
    ttl: Duration,
    // One lock per ticker so concurrent callers share a single fetch.
    in_flight: Mutex<HashMap<TickerSymbol, Arc<Mutex<()>>>>,
}

impl<T: SnapshotProvider> CachingSnapshotProvider<T> {
    pub fn new(inner: T, cache: Arc<dyn Cache<TickerSymbol, Snapshot>>, ttl: Duration) -> Self {
        Self {
            inner,
            cache,
            ttl,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn ticker_lock(&self, ticker: &TickerSymbol) -> Arc<Mutex<()>> {
        let mut locks = self.in_flight.lock().await;
        Arc::clone(locks.entry(ticker.clone()).or_default())
    }

    /// Drops the ticker's lock entry once no other caller holds or awaits it.
    async fn release_lock(&self, ticker: &TickerSymbol, lock: Arc<Mutex<()>>) {
        let mut locks = self.in_flight.lock().await;
        drop(lock);
        if locks
            .get(ticker)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(ticker);
        }
    }

    /// Returns the memoized snapshot if it is younger than the TTL, fetching otherwise.
    /// Failed fetches are not cached.
    pub async fn get_or_fetch(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        let lock = self.ticker_lock(ticker).await;
        let result = {
            let _guard = lock.lock().await;
            match self.cache.get(ticker).await {
                Some(cached) => {
                    debug!("Cache hit for snapshot: {}", ticker);
                    Ok(cached)
                }
                None => {
                    debug!("Cache miss for snapshot: {}", ticker);
                    self.fetch_and_store(ticker).await
                }
            }
        };
        self.release_lock(ticker, lock).await;
        result
    }

    /// Fetches unconditionally and overwrites the cached entry on success.
    pub async fn refresh(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        let lock = self.ticker_lock(ticker).await;
        let result = {
            let _guard = lock.lock().await;
            debug!("Refreshing snapshot: {}", ticker);
            self.fetch_and_store(ticker).await
        };
        self.release_lock(ticker, lock).await;
        result
    }

    async fn fetch_and_store(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        let snapshot = self.inner.fetch_snapshot(ticker).await?;
        self.cache
            .put(ticker.clone(), snapshot.clone(), Some(self.ttl))
            .await;
        Ok(snapshot)
    }
}

#[async_trait]
impl<T: SnapshotProvider> SnapshotProvider for CachingSnapshotProvider<T> {
    async fn fetch_snapshot(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        self.get_or_fetch(ticker).await
    }

    async fn refresh_snapshot(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        self.refresh(ticker).await
    }
}

// Caching for SearchProvider
pub struct CachingSearchProvider<T: SearchProvider> {
    inner: T,
    cache: Arc<dyn Cache<String, Vec<SearchCandidate>>>,
    ttl: Duration,
}

impl<T: SearchProvider> CachingSearchProvider<T> {
    pub fn new(inner: T, cache: Arc<dyn Cache<String, Vec<SearchCandidate>>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl<T: SearchProvider> SearchProvider for CachingSearchProvider<T> {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>> {
        let key = query.trim().to_lowercase();
        if let Some(cached) = self.cache.get(&key).await {
            debug!("Cache hit for search: {}", key);
            return Ok(cached);
        }
        debug!("Cache miss for search: {}", key);
        let results = self.inner.search(query).await?;
        self.cache.put(key, results.clone(), Some(self.ttl)).await;
        Ok(results)
    }
}
