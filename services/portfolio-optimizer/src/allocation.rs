//! Current-allocation breakdown, allocation deltas, and the trade plan
//!
//! Pure request-scoped math over holdings: nothing here talks to
//! collaborators or holds state between calls.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::constants::rebalance;
use services_common::{Holding, Symbol};

/// One category slice of the current portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub name: String,
    /// Absolute market value
    pub value: f64,
    /// Share of total portfolio value, in percent
    pub percentage: f64,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Trade urgency derived from allocation drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradePriority {
    High,
    Medium,
}

/// One leg of the implementation plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlanEntry {
    pub sector: String,
    pub action: TradeAction,
    /// Drift between target and current allocation, in percentage points
    pub change_percent: f64,
    /// Absolute value to move
    pub amount: f64,
    pub current_value: f64,
    pub target_value: f64,
    pub priority: TradePriority,
}

/// Total portfolio value across holdings
#[must_use]
pub fn total_value(holdings: &[Holding]) -> f64 {
    holdings.iter().map(Holding::market_value).sum()
}

/// Current allocation grouped by sector, largest slice first
#[must_use]
pub fn current_allocation(holdings: &[Holding]) -> Vec<AllocationSlice> {
    let total = total_value(holdings);
    let mut by_sector: FxHashMap<&str, f64> = FxHashMap::default();
    for holding in holdings {
        *by_sector.entry(holding.sector.as_str()).or_default() += holding.market_value();
    }

    let mut slices: Vec<AllocationSlice> = by_sector
        .into_iter()
        .map(|(name, value)| AllocationSlice {
            name: name.to_string(),
            value,
            percentage: if total > 0.0 { value / total * 100.0 } else { 0.0 },
        })
        .collect();
    slices.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.name.cmp(&b.name)));
    slices
}

/// Current percentage per symbol
#[must_use]
pub fn symbol_percentages(holdings: &[Holding]) -> FxHashMap<Symbol, f64> {
    let total = total_value(holdings);
    let mut percentages = FxHashMap::default();
    if total <= 0.0 {
        return percentages;
    }
    for holding in holdings {
        *percentages.entry(holding.symbol.clone()).or_insert(0.0) +=
            holding.market_value() / total * 100.0;
    }
    percentages
}

/// Roll per-symbol target weights up to sector level, in percent
#[must_use]
pub fn sector_targets(
    holdings: &[Holding],
    symbol_weights: &FxHashMap<Symbol, f64>,
) -> FxHashMap<String, f64> {
    let mut sector_of: FxHashMap<&Symbol, &str> = FxHashMap::default();
    for holding in holdings {
        sector_of.insert(&holding.symbol, holding.sector.as_str());
    }

    let mut targets: FxHashMap<String, f64> = FxHashMap::default();
    for (symbol, weight) in symbol_weights {
        let sector = sector_of.get(symbol).copied().unwrap_or("Other");
        *targets.entry(sector.to_string()).or_default() += weight * 100.0;
    }
    targets
}

/// Build the rebalancing plan from current and target sector allocations
///
/// Drift below the materiality threshold (1% of total value) is ignored;
/// drift above the high-priority threshold (5%) is flagged HIGH. Entries are
/// sorted by absolute drift, largest first.
#[must_use]
pub fn build_trade_plan(
    current: &[AllocationSlice],
    targets: &FxHashMap<String, f64>,
    total_value: f64,
) -> Vec<TradePlanEntry> {
    let current_pct: FxHashMap<&str, f64> = current
        .iter()
        .map(|slice| (slice.name.as_str(), slice.percentage))
        .collect();

    let mut sectors: Vec<&str> = current_pct.keys().copied().collect();
    for sector in targets.keys() {
        if !current_pct.contains_key(sector.as_str()) {
            sectors.push(sector.as_str());
        }
    }

    let mut plan: Vec<TradePlanEntry> = sectors
        .into_iter()
        .filter_map(|sector| {
            let current = current_pct.get(sector).copied().unwrap_or(0.0);
            let target = targets.get(sector).copied().unwrap_or(0.0);
            let delta = target - current;
            if delta.abs() <= rebalance::MATERIALITY_THRESHOLD * 100.0 {
                return None;
            }
            let priority = if delta.abs() > rebalance::HIGH_PRIORITY_THRESHOLD * 100.0 {
                TradePriority::High
            } else {
                TradePriority::Medium
            };
            Some(TradePlanEntry {
                sector: sector.to_string(),
                action: if delta > 0.0 {
                    TradeAction::Buy
                } else {
                    TradeAction::Sell
                },
                change_percent: delta,
                amount: delta.abs() / 100.0 * total_value,
                current_value: current / 100.0 * total_value,
                target_value: target / 100.0 * total_value,
                priority,
            })
        })
        .collect();

    plan.sort_by(|a, b| {
        b.change_percent
            .abs()
            .total_cmp(&a.change_percent.abs())
            .then(a.sector.cmp(&b.sector))
    });
    plan
}
