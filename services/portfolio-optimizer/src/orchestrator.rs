//! Optimization orchestrator
//!
//! Request-scoped driver tying holdings and market data (external
//! collaborators) to the estimation and optimization engines, then turning
//! engine output into a current-vs-optimized allocation comparison and a
//! trade plan. Engine failures degrade to an equal-weight fallback result
//! tagged `simple_fallback` so callers can tell a real optimization from a
//! degraded one; only malformed requests (unknown method names, no holdings)
//! surface as errors.

use crate::allocation;
use crate::errors::OptimizerError;
use crate::estimation::{CovarianceMethod, EstimationConfig, InputEstimator, ReturnMethod};
use crate::market_data::{AnalyticsSink, HoldingsStore, MarketDataService};
use crate::optimization::{
    BlackLittermanParams, Constraints, FrontierPoint, OptimizationMethod, OptimizationOutcome,
    OptimizationProblem, PortfolioOptimizer,
};
use crate::scenario::ScenarioGenerator;
use crate::{EstimationMethods, OptimizeRequest, OptimizeResult, OptimizedWeight};
use anyhow::{Context, Result};
use futures::future::join_all;
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use services_common::constants::{market, optimization};
use services_common::{Holding, PriceSeries, Symbol};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Estimation-method tag marking a degraded equal-weight result
pub const SIMPLE_FALLBACK: &str = "simple_fallback";

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub estimation: EstimationConfig,
    /// Return estimator used when the request does not pick one
    pub default_return_method: ReturnMethod,
    /// Covariance estimator used when the request does not pick one
    pub default_covariance_method: CovarianceMethod,
    /// Monte Carlo scenario count for CVaR optimization
    pub num_scenarios: usize,
    /// Scenario horizon in years
    pub scenario_horizon_years: f64,
    /// CVaR tail fraction
    pub cvar_alpha: f64,
    /// Efficient-frontier sweep size
    pub frontier_points: usize,
    /// Seed for scenario generation; fresh entropy when unset
    pub seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            estimation: EstimationConfig::default(),
            default_return_method: ReturnMethod::HistoricalMean,
            default_covariance_method: CovarianceMethod::Shrinkage,
            num_scenarios: 10_000,
            scenario_horizon_years: 1.0,
            cvar_alpha: optimization::DEFAULT_CVAR_ALPHA,
            frontier_points: optimization::DEFAULT_FRONTIER_POINTS,
            seed: None,
        }
    }
}

/// Optimization orchestrator service
pub struct OptimizationOrchestrator {
    market_data: Arc<dyn MarketDataService>,
    holdings_store: Arc<dyn HoldingsStore>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    config: OrchestratorConfig,
}

impl OptimizationOrchestrator {
    #[must_use]
    pub fn new(
        market_data: Arc<dyn MarketDataService>,
        holdings_store: Arc<dyn HoldingsStore>,
    ) -> Self {
        Self {
            market_data,
            holdings_store,
            analytics: None,
            config: OrchestratorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Optimize a user's stored portfolio and record the result
    ///
    /// Holdings come from the persistence collaborator when the request does
    /// not carry them inline. Analytics failures are logged, never fatal.
    pub async fn optimize_for_user(
        &self,
        user_id: u64,
        mut request: OptimizeRequest,
    ) -> Result<OptimizeResult> {
        if request.holdings.is_empty() {
            request.holdings = self
                .holdings_store
                .holdings(user_id)
                .await
                .context("fetching holdings for optimization")?;
        }

        let result = self.optimize(request).await?;

        if let Some(analytics) = &self.analytics {
            if let Err(error) = analytics.record_optimization(user_id, &result).await {
                tracing::warn!(user_id, %error, "failed to record optimization result");
            }
        }
        Ok(result)
    }

    /// Run one optimization over the supplied holdings
    pub async fn optimize(
        &self,
        request: OptimizeRequest,
    ) -> Result<OptimizeResult, OptimizerError> {
        if request.holdings.is_empty() {
            return Err(OptimizerError::InvalidRequest {
                detail: "no holdings to optimize".to_string(),
            });
        }

        // Unknown method names are user errors, surfaced before any work.
        let method: OptimizationMethod = request.method.parse()?;
        let return_method = match &request.estimation.returns {
            Some(name) => name.parse()?,
            None => self.config.default_return_method,
        };
        let covariance_method = match &request.estimation.covariance {
            Some(name) => name.parse()?,
            None => self.config.default_covariance_method,
        };

        let mut estimation_config = self.config.estimation.clone();
        if let Some(lookback) = request.estimation.lookback_days {
            estimation_config.lookback_days = lookback;
        }
        let constraints = Self::effective_constraints(&request);
        let risk_tolerance = request.risk_tolerance.clamp(0.0, 100.0);
        if risk_tolerance != request.risk_tolerance {
            tracing::warn!(
                requested = request.risk_tolerance,
                clamped = risk_tolerance,
                "risk tolerance outside [0, 100]"
            );
        }

        let holdings = self.refresh_prices(request.holdings).await;
        let universe: Vec<Symbol> = holdings
            .iter()
            .map(|h| h.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let histories = self
            .fetch_histories(&universe, return_method, covariance_method, &estimation_config)
            .await;

        let estimator = InputEstimator::new(estimation_config.clone());
        let market_weights = Self::value_weights(&holdings, &universe);
        let expected_returns = estimator.expected_returns(
            &universe,
            &histories,
            return_method,
            Some(&market_weights),
        );
        let covariance = estimator.covariance_matrix(&universe, &histories, covariance_method);

        let estimation_methods = EstimationMethods {
            returns: return_method.as_str().to_string(),
            covariance: covariance_method.as_str().to_string(),
            lookback_days: estimation_config.lookback_days,
        };

        let optimizer = PortfolioOptimizer::new(estimation_config.risk_free_rate);
        match self.run_engine(
            &optimizer,
            method,
            &expected_returns,
            &covariance,
            &constraints,
            risk_tolerance,
            &market_weights,
        ) {
            Ok(outcome) => {
                let frontier =
                    self.frontier_for(&optimizer, method, &expected_returns, &covariance);
                Ok(Self::assemble_result(
                    method.as_str(),
                    &holdings,
                    &universe,
                    &outcome.weights,
                    outcome.expected_return,
                    outcome.volatility,
                    outcome.sharpe_ratio,
                    outcome.cvar,
                    frontier,
                    estimation_methods,
                ))
            }
            Err(error) => {
                tracing::warn!(
                    method = method.as_str(),
                    %error,
                    "optimization failed, falling back to equal weights"
                );
                Ok(self.fallback_result(
                    method,
                    &holdings,
                    &universe,
                    &expected_returns,
                    &covariance,
                    estimation_config.lookback_days,
                ))
            }
        }
    }

    /// Merge request-level overrides into solver constraints
    fn effective_constraints(request: &OptimizeRequest) -> Constraints {
        let allow_short = request.constraints.allow_short_selling.unwrap_or(false);
        let max_pct = request.max_position_size_pct.clamp(1.0, 100.0);
        let min_pct = request
            .constraints
            .min_position_size_pct
            .unwrap_or(optimization::DEFAULT_MIN_WEIGHT * 100.0)
            .clamp(0.0, max_pct);
        Constraints {
            long_only: !allow_short,
            max_weight: max_pct / 100.0,
            min_weight: min_pct / 100.0,
            allow_short_selling: allow_short,
        }
    }

    /// Fill missing current prices from the market-data collaborator
    ///
    /// A failed quote leaves the holding on its cost basis; valuation never
    /// fails the request.
    async fn refresh_prices(&self, mut holdings: Vec<Holding>) -> Vec<Holding> {
        for holding in &mut holdings {
            if holding.current_price.is_some() {
                continue;
            }
            match self.market_data.latest_quote(&holding.symbol).await {
                Ok(price) => holding.current_price = Some(price),
                Err(error) => {
                    tracing::debug!(
                        symbol = %holding.symbol,
                        %error,
                        "quote unavailable, valuing at cost basis"
                    );
                }
            }
        }
        holdings
    }

    /// Fan-out fetch of per-symbol histories
    ///
    /// Fetches are independent reads and run concurrently; a failed or empty
    /// history degrades that symbol to estimation defaults instead of
    /// aborting the batch. The market proxy is fetched too when the chosen
    /// estimators need it.
    async fn fetch_histories(
        &self,
        universe: &[Symbol],
        return_method: ReturnMethod,
        covariance_method: CovarianceMethod,
        estimation_config: &EstimationConfig,
    ) -> FxHashMap<Symbol, PriceSeries> {
        let lookback_years = estimation_config
            .lookback_days
            .div_ceil(market::TRADING_DAYS_PER_YEAR);
        let fetch_days = (lookback_years * 365) as u32;

        let mut symbols: Vec<Symbol> = universe.to_vec();
        let needs_proxy = matches!(return_method, ReturnMethod::Capm)
            || matches!(covariance_method, CovarianceMethod::FactorModel);
        if needs_proxy && !symbols.contains(&estimation_config.market_proxy) {
            symbols.push(estimation_config.market_proxy.clone());
        }

        let fetches = symbols.iter().map(|symbol| {
            let market_data = Arc::clone(&self.market_data);
            async move {
                let series = match market_data.historical_prices(symbol, fetch_days).await {
                    Ok(series) => series,
                    Err(error) => {
                        tracing::warn!(
                            %symbol,
                            %error,
                            "history fetch failed, degrading symbol to defaults"
                        );
                        PriceSeries::empty(symbol.clone())
                    }
                };
                (symbol.clone(), series)
            }
        });

        join_all(fetches).await.into_iter().collect()
    }

    /// Current portfolio value weights ordered by universe
    fn value_weights(holdings: &[Holding], universe: &[Symbol]) -> DVector<f64> {
        let total = allocation::total_value(holdings);
        let n = universe.len();
        if total <= 0.0 || n == 0 {
            return DVector::from_element(n.max(1), 1.0 / n.max(1) as f64);
        }
        let mut by_symbol: FxHashMap<&Symbol, f64> = FxHashMap::default();
        for holding in holdings {
            *by_symbol.entry(&holding.symbol).or_default() += holding.market_value();
        }
        DVector::from_iterator(
            n,
            universe
                .iter()
                .map(|s| by_symbol.get(s).copied().unwrap_or(0.0) / total),
        )
    }

    fn run_engine(
        &self,
        optimizer: &PortfolioOptimizer,
        method: OptimizationMethod,
        expected_returns: &DVector<f64>,
        covariance: &DMatrix<f64>,
        constraints: &Constraints,
        risk_tolerance: f64,
        market_weights: &DVector<f64>,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        // Risk tolerance picks the target on the achievable return range.
        let target_return = if matches!(method, OptimizationMethod::MeanVariance) {
            let (lo, hi) = (expected_returns.min(), expected_returns.max());
            Some(lo + risk_tolerance / 100.0 * (hi - lo))
        } else {
            None
        };

        let scenarios = if matches!(method, OptimizationMethod::CvarMin) {
            let mut generator = match self.config.seed {
                Some(seed) => ScenarioGenerator::with_seed(seed),
                None => ScenarioGenerator::from_entropy(),
            };
            Some(generator.generate(
                expected_returns,
                covariance,
                self.config.num_scenarios,
                self.config.scenario_horizon_years,
            )?)
        } else {
            None
        };

        let black_litterman = BlackLittermanParams {
            market_weights: market_weights.clone(),
            views: None,
            tau: services_common::constants::estimation::DEFAULT_BL_TAU,
            risk_aversion: self.config.estimation.risk_aversion,
        };

        let problem = OptimizationProblem {
            expected_returns,
            covariance,
            constraints,
            target_return,
            black_litterman: Some(&black_litterman),
            scenarios: scenarios.as_deref(),
            cvar_alpha: self.config.cvar_alpha,
        };
        optimizer.optimize(method, &problem)
    }

    /// Frontier sweep for the methods where callers expect one
    fn frontier_for(
        &self,
        optimizer: &PortfolioOptimizer,
        method: OptimizationMethod,
        expected_returns: &DVector<f64>,
        covariance: &DMatrix<f64>,
    ) -> Option<Vec<FrontierPoint>> {
        if !matches!(
            method,
            OptimizationMethod::MeanVariance
                | OptimizationMethod::MinVolatility
                | OptimizationMethod::BlackLitterman
        ) {
            return None;
        }
        match optimizer.efficient_frontier(
            expected_returns,
            covariance,
            self.config.frontier_points,
        ) {
            Ok(points) if !points.is_empty() => Some(points),
            Ok(_) => None,
            Err(error) => {
                tracing::debug!(%error, "frontier sweep skipped");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_result(
        method: &str,
        holdings: &[Holding],
        universe: &[Symbol],
        weights: &DVector<f64>,
        expected_return: f64,
        expected_volatility: f64,
        sharpe_ratio: f64,
        cvar: Option<f64>,
        efficient_frontier: Option<Vec<FrontierPoint>>,
        estimation_methods: EstimationMethods,
    ) -> OptimizeResult {
        let total = allocation::total_value(holdings);
        let current_allocation = allocation::current_allocation(holdings);
        let current_by_symbol = allocation::symbol_percentages(holdings);

        let mut optimized_allocation = FxHashMap::default();
        let mut weight_by_symbol = FxHashMap::default();
        for (i, symbol) in universe.iter().enumerate() {
            let percentage = weights[i] * 100.0;
            let current = current_by_symbol.get(symbol).copied().unwrap_or(0.0);
            optimized_allocation.insert(
                symbol.clone(),
                OptimizedWeight {
                    percentage,
                    change: percentage - current,
                },
            );
            weight_by_symbol.insert(symbol.clone(), weights[i]);
        }

        let sector_targets = allocation::sector_targets(holdings, &weight_by_symbol);
        let implementation_plan =
            allocation::build_trade_plan(&current_allocation, &sector_targets, total);

        OptimizeResult {
            method: method.to_string(),
            current_allocation,
            optimized_allocation,
            expected_return,
            expected_volatility,
            sharpe_ratio,
            cvar,
            efficient_frontier,
            implementation_plan,
            estimation_methods,
        }
    }

    /// Equal-weight degraded result, tagged so callers can tell it apart
    fn fallback_result(
        &self,
        method: OptimizationMethod,
        holdings: &[Holding],
        universe: &[Symbol],
        expected_returns: &DVector<f64>,
        covariance: &DMatrix<f64>,
        lookback_days: usize,
    ) -> OptimizeResult {
        let n = universe.len().max(1);
        let weights = DVector::from_element(universe.len(), 1.0 / n as f64);
        let expected_return =
            PortfolioOptimizer::portfolio_return(&weights, expected_returns);
        let volatility = PortfolioOptimizer::portfolio_volatility(&weights, covariance);
        let optimizer = PortfolioOptimizer::new(self.config.estimation.risk_free_rate);
        let sharpe = optimizer.sharpe_ratio(expected_return, volatility);

        Self::assemble_result(
            method.as_str(),
            holdings,
            universe,
            &weights,
            expected_return,
            volatility,
            sharpe,
            None,
            None,
            EstimationMethods {
                returns: SIMPLE_FALLBACK.to_string(),
                covariance: SIMPLE_FALLBACK.to_string(),
                lookback_days,
            },
        )
    }
}
