//! Collaborator contracts and the quote cache
//!
//! Market data, holdings persistence, and analytics are external to the
//! optimization core; they appear here only as trait contracts injected into
//! the orchestrator. The quote cache is an explicit object with a stated TTL
//! and eviction policy rather than ambient module state.

use crate::OptimizeResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use services_common::{Holding, PriceSeries, QuoteCacheConfig, ServiceError, Symbol};
use std::time::Instant;

/// Market-data collaborator
///
/// Implementations should return an empty or partial series on a data gap
/// where possible; the orchestrator treats per-symbol errors as degraded
/// data, never as batch failures.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    /// Daily price history covering roughly `days` calendar days
    async fn historical_prices(
        &self,
        symbol: &Symbol,
        days: u32,
    ) -> Result<PriceSeries, ServiceError>;

    /// Latest traded price
    async fn latest_quote(&self, symbol: &Symbol) -> Result<f64, ServiceError>;
}

/// Holdings persistence collaborator
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    async fn holdings(&self, user_id: u64) -> Result<Vec<Holding>, ServiceError>;
}

/// Analytics/persistence sink for finished optimizations
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_optimization(
        &self,
        user_id: u64,
        result: &OptimizeResult,
    ) -> Result<(), ServiceError>;
}

struct CachedQuote {
    price: f64,
    fetched_at: Instant,
}

/// TTL quote cache
///
/// Entries expire after the configured TTL; inserts over capacity evict
/// expired entries first and then the stalest entry.
pub struct QuoteCache {
    entries: RwLock<FxHashMap<Symbol, CachedQuote>>,
    config: QuoteCacheConfig,
}

impl QuoteCache {
    #[must_use]
    pub fn new(config: QuoteCacheConfig) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            config,
        }
    }

    /// Fresh quote if present and inside the TTL
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<f64> {
        let entries = self.entries.read();
        let quote = entries.get(symbol)?;
        if quote.fetched_at.elapsed() > self.config.ttl() {
            return None;
        }
        Some(quote.price)
    }

    pub fn insert(&self, symbol: Symbol, price: f64) {
        let mut entries = self.entries.write();
        if entries.len() >= self.config.max_entries && !entries.contains_key(&symbol) {
            let ttl = self.config.ttl();
            entries.retain(|_, quote| quote.fetched_at.elapsed() <= ttl);
            if entries.len() >= self.config.max_entries {
                let stalest = entries
                    .iter()
                    .min_by_key(|(_, quote)| quote.fetched_at)
                    .map(|(symbol, _)| symbol.clone());
                if let Some(stalest) = stalest {
                    entries.remove(&stalest);
                }
            }
        }
        entries.insert(
            symbol,
            CachedQuote {
                price,
                fetched_at: Instant::now(),
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Quote-caching decorator over a market-data provider
pub struct CachedMarketData<M> {
    inner: M,
    cache: QuoteCache,
}

impl<M: MarketDataService> CachedMarketData<M> {
    #[must_use]
    pub fn new(inner: M, config: QuoteCacheConfig) -> Self {
        Self {
            inner,
            cache: QuoteCache::new(config),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }
}

#[async_trait]
impl<M: MarketDataService> MarketDataService for CachedMarketData<M> {
    async fn historical_prices(
        &self,
        symbol: &Symbol,
        days: u32,
    ) -> Result<PriceSeries, ServiceError> {
        self.inner.historical_prices(symbol, days).await
    }

    async fn latest_quote(&self, symbol: &Symbol) -> Result<f64, ServiceError> {
        if let Some(price) = self.cache.get(symbol) {
            return Ok(price);
        }
        let price = self.inner.latest_quote(symbol).await?;
        self.cache.insert(symbol.clone(), price);
        Ok(price)
    }
}
