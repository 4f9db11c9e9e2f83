//! Common constants used across all services
//!
//! Single source of truth for all magic numbers

/// Market calendar constants
pub mod market {
    /// Trading days per year, used for annualization
    pub const TRADING_DAYS_PER_YEAR: usize = 252;
    /// Trading days per year as f64 for return scaling
    pub const TRADING_DAYS_F64: f64 = 252.0;
    /// sqrt(252), used to annualize daily volatility
    pub const SQRT_TRADING_DAYS: f64 = 15.874_507_866_387_544;
    /// Default estimation lookback window (~2 years of trading days)
    pub const DEFAULT_LOOKBACK_DAYS: usize = 504;
    /// Benchmark symbol used as the market proxy for CAPM betas
    pub const DEFAULT_MARKET_PROXY: &str = "SPY";
}

/// Estimation defaults
pub mod estimation {
    /// Annual risk-free rate assumption
    pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
    /// Annual broad-market return assumption for CAPM
    pub const DEFAULT_MARKET_RETURN: f64 = 0.08;
    /// EWMA decay factor (RiskMetrics convention)
    pub const DEFAULT_EWMA_LAMBDA: f64 = 0.94;
    /// Shrinkage intensity toward the constant-correlation target
    pub const DEFAULT_SHRINKAGE_INTENSITY: f64 = 0.1;
    /// Variance assigned to symbols without usable price history
    pub const DEFAULT_VARIANCE_FLOOR: f64 = 0.01;
    /// Black-Litterman uncertainty scaling (tau)
    pub const DEFAULT_BL_TAU: f64 = 0.025;
    /// Black-Litterman risk-aversion coefficient (delta)
    pub const DEFAULT_BL_RISK_AVERSION: f64 = 3.0;
}

/// Optimization defaults and solver bounds
pub mod optimization {
    /// Maximum single-position weight
    pub const DEFAULT_MAX_WEIGHT: f64 = 0.30;
    /// Minimum single-position weight
    pub const DEFAULT_MIN_WEIGHT: f64 = 0.01;
    /// Iterative solver convergence tolerance
    pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;
    /// Iterative solver iteration cap
    pub const MAX_ITERATIONS: usize = 100;
    /// CVaR tail fraction
    pub const DEFAULT_CVAR_ALPHA: f64 = 0.05;
    /// Upper bound on Monte Carlo scenario count per request
    pub const MAX_SCENARIOS: usize = 100_000;
    /// Upper bound on efficient-frontier sweep points per request
    pub const MAX_FRONTIER_POINTS: usize = 200;
    /// Default efficient-frontier sweep points
    pub const DEFAULT_FRONTIER_POINTS: usize = 20;
}

/// Trade-plan thresholds
pub mod rebalance {
    /// Allocation drift below this fraction of total value is ignored
    pub const MATERIALITY_THRESHOLD: f64 = 0.01;
    /// Allocation drift above this fraction is flagged high priority
    pub const HIGH_PRIORITY_THRESHOLD: f64 = 0.05;
}

/// Quote cache defaults
pub mod cache {
    /// Quote time-to-live in seconds
    pub const DEFAULT_QUOTE_TTL_SECS: u64 = 60;
    /// Maximum cached quotes before expired-first eviction
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
}

/// Retry constants
pub mod retry {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
    pub const MAX_RETRY_DELAY_MS: u64 = 5000;
}
