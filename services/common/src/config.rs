//! Service configuration

use crate::constants::cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service endpoints configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    pub market_data_service: String,
    pub portfolio_service: String,
    pub analytics_service: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            market_data_service: "http://localhost:50061".to_string(),
            portfolio_service: "http://localhost:50062".to_string(),
            analytics_service: "http://localhost:50063".to_string(),
        }
    }
}

/// Quote cache tuning
///
/// Quotes are cached by the market-data collaborator itself; services receive
/// the cache as an explicit object rather than reading ambient module state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteCacheConfig {
    /// How long a cached quote stays fresh
    pub ttl_secs: u64,
    /// Maximum entries kept before expired entries are evicted
    pub max_entries: usize,
}

impl QuoteCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for QuoteCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: cache::DEFAULT_QUOTE_TTL_SECS,
            max_entries: cache::DEFAULT_MAX_ENTRIES,
        }
    }
}
