//! Portfolio Optimization Service
//!
//! Turns raw historical price series into statistical estimates (expected
//! returns, covariance matrices) and solves for asset-allocation weights
//! under classical portfolio-construction objectives: mean-variance, maximum
//! Sharpe ratio, risk parity, minimum volatility, CVaR minimization, and
//! Black-Litterman. The orchestrator ties holdings and market data
//! (external collaborators) to the two engines and turns engine output into
//! an allocation diff and a trade plan.
//!
//! All state is request-scoped; concurrent optimizations share nothing.

pub mod allocation;
pub mod errors;
pub mod estimation;
pub mod market_data;
pub mod optimization;
pub mod orchestrator;
pub mod scenario;
pub mod stats;

use allocation::{AllocationSlice, TradePlanEntry};
use optimization::FrontierPoint;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{Holding, Symbol};

pub use errors::OptimizerError;
pub use estimation::{CovarianceMethod, EstimationConfig, InputEstimator, ReturnMethod};
pub use optimization::{
    Constraints, OptimizationMethod, OptimizationOutcome, PortfolioOptimizer,
};
pub use orchestrator::{OptimizationOrchestrator, OrchestratorConfig};
pub use scenario::ScenarioGenerator;

fn default_risk_tolerance() -> f64 {
    50.0
}

fn default_max_position_size() -> f64 {
    30.0
}

/// Constraint overrides carried on the request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConstraints {
    pub allow_short_selling: Option<bool>,
    /// Minimum position size, in percent
    pub min_position_size_pct: Option<f64>,
}

/// Estimation method selection carried on the request
///
/// Methods arrive as wire strings and are resolved against the registered
/// estimators; an unknown name is a fatal `UnknownMethod` error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRequest {
    pub returns: Option<String>,
    pub covariance: Option<String>,
    pub lookback_days: Option<usize>,
}

/// Optimization request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    /// Current holdings; when empty the orchestrator fetches them from the
    /// holdings store
    #[serde(default)]
    pub holdings: Vec<Holding>,
    /// Objective wire name, e.g. "mean-variance" or "risk-parity"
    pub method: String,
    /// Risk appetite in [0, 100]; maps onto the achievable return range
    #[serde(default = "default_risk_tolerance")]
    pub risk_tolerance: f64,
    /// Maximum single-position weight, in percent of portfolio value
    #[serde(default = "default_max_position_size")]
    pub max_position_size_pct: f64,
    #[serde(default)]
    pub constraints: RequestConstraints,
    #[serde(default)]
    pub estimation: EstimationRequest,
}

/// Which estimators produced a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationMethods {
    pub returns: String,
    pub covariance: String,
    pub lookback_days: usize,
}

/// Optimized weight for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedWeight {
    /// Target share of portfolio value, in percent
    pub percentage: f64,
    /// Difference to the current share, in percentage points
    pub change: f64,
}

/// Optimization result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResult {
    pub method: String,
    pub current_allocation: Vec<AllocationSlice>,
    pub optimized_allocation: FxHashMap<Symbol, OptimizedWeight>,
    pub expected_return: f64,
    pub expected_volatility: f64,
    pub sharpe_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvar: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficient_frontier: Option<Vec<FrontierPoint>>,
    pub implementation_plan: Vec<TradePlanEntry>,
    pub estimation_methods: EstimationMethods,
}

impl OptimizeResult {
    /// True when engine failure degraded this result to the equal-weight
    /// fallback
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.estimation_methods.returns == orchestrator::SIMPLE_FALLBACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request: OptimizeRequest = serde_json::from_str(
            r#"{
                "method": "mean-variance",
                "riskTolerance": 65.0,
                "maxPositionSizePct": 25.0,
                "constraints": {"allowShortSelling": false, "minPositionSizePct": 2.0},
                "estimation": {"returns": "capm", "lookbackDays": 252}
            }"#,
        )
        .unwrap();

        assert_eq!(request.method, "mean-variance");
        assert_eq!(request.risk_tolerance, 65.0);
        assert_eq!(request.max_position_size_pct, 25.0);
        assert_eq!(request.constraints.min_position_size_pct, Some(2.0));
        assert_eq!(request.estimation.returns.as_deref(), Some("capm"));
        assert_eq!(request.estimation.lookback_days, Some(252));
        assert!(request.holdings.is_empty());
    }

    #[test]
    fn test_request_defaults() {
        let request: OptimizeRequest =
            serde_json::from_str(r#"{"method": "risk-parity"}"#).unwrap();
        assert_eq!(request.risk_tolerance, 50.0);
        assert_eq!(request.max_position_size_pct, 30.0);
        assert!(request.constraints.allow_short_selling.is_none());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = OptimizeResult {
            method: "max-sharpe".to_string(),
            current_allocation: vec![],
            optimized_allocation: FxHashMap::default(),
            expected_return: 0.08,
            expected_volatility: 0.12,
            sharpe_ratio: 0.5,
            cvar: None,
            efficient_frontier: None,
            implementation_plan: vec![],
            estimation_methods: EstimationMethods {
                returns: "historical_mean".to_string(),
                covariance: "shrinkage".to_string(),
                lookback_days: 504,
            },
        };
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["expectedReturn"], 0.08);
        assert_eq!(json["estimationMethods"]["lookbackDays"], 504);
        // Optional sections stay off the wire entirely when absent.
        assert!(json.get("cvar").is_none());
        assert!(json.get("efficientFrontier").is_none());
    }
}
