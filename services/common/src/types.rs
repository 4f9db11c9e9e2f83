//! Core types for the portfolio platform

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Ticker symbol for a tradable instrument
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new symbol, normalized to uppercase
    #[must_use]
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(ticker.into().to_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(ticker: &str) -> Self {
        Self::new(ticker)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A position owned by a user, consumed read-only by the optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    /// Number of units held, must be positive
    pub quantity: f64,
    /// Average acquisition price per unit
    pub average_cost: f64,
    /// Latest market price, possibly stale or missing
    pub current_price: Option<f64>,
    /// Category/sector tag used for allocation grouping
    pub sector: String,
}

impl Holding {
    /// Market value using the latest price, falling back to cost basis
    #[must_use]
    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price.unwrap_or(self.average_cost)
    }
}

/// One daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered daily price history for one symbol
///
/// Bars are kept ascending by date; construction sorts and drops duplicate
/// dates so the invariant holds regardless of provider ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series from provider bars in any order
    #[must_use]
    pub fn new(symbol: Symbol, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Self { symbol, bars }
    }

    /// Empty series for a symbol with no available history
    #[must_use]
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            bars: Vec::new(),
        }
    }

    #[must_use]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Closing prices usable for return computation
    ///
    /// Zero or negative closes are treated as missing data and skipped.
    #[must_use]
    pub fn usable_closes(&self) -> Vec<f64> {
        self.bars
            .iter()
            .map(|b| b.close)
            .filter(|c| *c > 0.0)
            .collect()
    }

    /// Daily log-returns ln(P_t / P_{t-1}) over usable closes
    #[must_use]
    pub fn log_returns(&self) -> Vec<f64> {
        let closes = self.usable_closes();
        closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
    }
}
