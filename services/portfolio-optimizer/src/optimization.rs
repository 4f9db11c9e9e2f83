//! Portfolio optimization engine
//!
//! Consumes an expected-return vector and covariance matrix and produces a
//! weight vector summing to 1 under a selected objective, plus the derived
//! risk/return statistics. Inequality constraints (long-only, per-position
//! caps and floors) are applied as a post-processing clamp-and-renormalize
//! step, not inside the solver; the clamped result can therefore drift from
//! the unconstrained optimum. That approximation is accepted here and the
//! constraint step is kept in one place so it is easy to audit.

use crate::errors::OptimizerError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use services_common::constants::{estimation, optimization};
use std::str::FromStr;

/// Portfolio construction objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationMethod {
    /// Classical Markowitz minimum variance at a target return
    MeanVariance,
    /// Closed-form tangency portfolio
    MaxSharpe,
    /// Iterative equal-risk-contribution allocation
    RiskParity,
    /// Markowitz solve anchored just above the minimum achievable return
    MinVolatility,
    /// Expected-shortfall minimization over Monte Carlo scenarios
    CvarMin,
    /// Equilibrium prior blended with caller views
    BlackLitterman,
}

impl OptimizationMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeanVariance => "mean-variance",
            Self::MaxSharpe => "max-sharpe",
            Self::RiskParity => "risk-parity",
            Self::MinVolatility => "min-volatility",
            Self::CvarMin => "cvar-min",
            Self::BlackLitterman => "black-litterman",
        }
    }
}

impl FromStr for OptimizationMethod {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean-variance" => Ok(Self::MeanVariance),
            "max-sharpe" => Ok(Self::MaxSharpe),
            "risk-parity" => Ok(Self::RiskParity),
            "min-volatility" => Ok(Self::MinVolatility),
            "cvar-min" => Ok(Self::CvarMin),
            "black-litterman" => Ok(Self::BlackLitterman),
            other => Err(OptimizerError::UnknownMethod {
                name: other.to_string(),
            }),
        }
    }
}

/// Position-level constraints applied after the solve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraints {
    /// Zero out short positions
    pub long_only: bool,
    /// Maximum single-position weight
    pub max_weight: f64,
    /// Minimum weight for any retained position
    pub min_weight: f64,
    /// Permit negative weights (overrides `long_only` zeroing)
    pub allow_short_selling: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            long_only: true,
            max_weight: optimization::DEFAULT_MAX_WEIGHT,
            min_weight: optimization::DEFAULT_MIN_WEIGHT,
            allow_short_selling: false,
        }
    }
}

/// Caller views for Black-Litterman blending
///
/// `pick` is the K x N view matrix (one row per view), `outlook` the K
/// expected returns those views assert, `confidences` per-view confidence
/// in (0, 1].
#[derive(Debug, Clone)]
pub struct ViewSet {
    pick: DMatrix<f64>,
    outlook: DVector<f64>,
    confidences: DVector<f64>,
}

impl ViewSet {
    pub fn new(
        pick: DMatrix<f64>,
        outlook: DVector<f64>,
        confidences: DVector<f64>,
    ) -> Result<Self, OptimizerError> {
        let k = pick.nrows();
        if outlook.len() != k || confidences.len() != k {
            return Err(OptimizerError::InvalidRequest {
                detail: format!(
                    "view matrix has {k} rows but {} outlooks and {} confidences",
                    outlook.len(),
                    confidences.len()
                ),
            });
        }
        if confidences.iter().any(|c| *c <= 0.0 || *c > 1.0) {
            return Err(OptimizerError::InvalidRequest {
                detail: "view confidences must lie in (0, 1]".to_string(),
            });
        }
        Ok(Self {
            pick,
            outlook,
            confidences,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pick.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pick.nrows() == 0
    }
}

/// Black-Litterman inputs beyond returns/covariance
#[derive(Debug, Clone)]
pub struct BlackLittermanParams {
    /// Market (or current-portfolio) weights seeding the equilibrium prior
    pub market_weights: DVector<f64>,
    /// Optional caller views; without them the prior is returned unchanged
    pub views: Option<ViewSet>,
    /// Uncertainty scaling on the prior covariance
    pub tau: f64,
    /// Risk-aversion coefficient for the implied equilibrium returns
    pub risk_aversion: f64,
}

impl BlackLittermanParams {
    /// Prior-only parameters around the given market weights
    #[must_use]
    pub fn market(market_weights: DVector<f64>) -> Self {
        Self {
            market_weights,
            views: None,
            tau: estimation::DEFAULT_BL_TAU,
            risk_aversion: estimation::DEFAULT_BL_RISK_AVERSION,
        }
    }
}

/// One feasible point on the efficient frontier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub risk: f64,
    pub expected_return: f64,
    /// Weights ordered like the input universe
    pub weights: Vec<f64>,
}

/// Optimizer output: weights plus derived statistics
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub weights: DVector<f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Tail mean of scenario returns, present for CVaR optimization only
    pub cvar: Option<f64>,
}

/// Everything a single optimization needs
pub struct OptimizationProblem<'a> {
    pub expected_returns: &'a DVector<f64>,
    pub covariance: &'a DMatrix<f64>,
    pub constraints: &'a Constraints,
    /// Mean-variance target; defaults to the midpoint of the achievable range
    pub target_return: Option<f64>,
    pub black_litterman: Option<&'a BlackLittermanParams>,
    pub scenarios: Option<&'a [DVector<f64>]>,
    pub cvar_alpha: f64,
}

/// Portfolio optimization engine
pub struct PortfolioOptimizer {
    risk_free_rate: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl PortfolioOptimizer {
    #[must_use]
    pub fn new(risk_free_rate: f64) -> Self {
        Self {
            risk_free_rate,
            tolerance: optimization::CONVERGENCE_TOLERANCE,
            max_iterations: optimization::MAX_ITERATIONS,
        }
    }

    /// Dispatch to the selected objective
    pub fn optimize(
        &self,
        method: OptimizationMethod,
        problem: &OptimizationProblem<'_>,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        let mu = problem.expected_returns;
        let cov = problem.covariance;
        OptimizerError::check_dimensions(mu.len(), cov.nrows(), cov.ncols())?;
        if mu.is_empty() {
            return Err(OptimizerError::Infeasible {
                detail: "empty universe".to_string(),
            });
        }

        match method {
            OptimizationMethod::MeanVariance => {
                let target = problem
                    .target_return
                    .unwrap_or_else(|| (mu.min() + mu.max()) / 2.0);
                self.mean_variance(mu, cov, target, problem.constraints)
            }
            OptimizationMethod::MaxSharpe => self.max_sharpe(mu, cov, problem.constraints),
            OptimizationMethod::RiskParity => self.risk_parity(mu, cov, problem.constraints),
            OptimizationMethod::MinVolatility => {
                self.min_volatility(mu, cov, problem.constraints)
            }
            OptimizationMethod::CvarMin => {
                let scenarios = problem.scenarios.ok_or_else(|| {
                    OptimizerError::InvalidRequest {
                        detail: "cvar-min requires Monte Carlo scenarios".to_string(),
                    }
                })?;
                self.cvar_min(mu, cov, scenarios, problem.cvar_alpha, problem.constraints)
            }
            OptimizationMethod::BlackLitterman => {
                let default_params;
                let params = match problem.black_litterman {
                    Some(params) => params,
                    None => {
                        let n = mu.len();
                        default_params = BlackLittermanParams::market(DVector::from_element(
                            n,
                            1.0 / n as f64,
                        ));
                        &default_params
                    }
                };
                self.black_litterman(cov, params, problem.constraints)
                    .map(|(outcome, _)| outcome)
            }
        }
    }

    /// w' * mu
    #[must_use]
    pub fn portfolio_return(weights: &DVector<f64>, returns: &DVector<f64>) -> f64 {
        weights.dot(returns)
    }

    /// sqrt(w' * Sigma * w), floored at zero against rounding noise
    #[must_use]
    pub fn portfolio_volatility(weights: &DVector<f64>, covariance: &DMatrix<f64>) -> f64 {
        (covariance * weights).dot(weights).max(0.0).sqrt()
    }

    /// (return - rf) / volatility, 0.0 when volatility vanishes
    #[must_use]
    pub fn sharpe_ratio(&self, expected_return: f64, volatility: f64) -> f64 {
        if volatility <= f64::EPSILON {
            return 0.0;
        }
        (expected_return - self.risk_free_rate) / volatility
    }

    fn evaluate(
        &self,
        weights: DVector<f64>,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
    ) -> OptimizationOutcome {
        let expected_return = Self::portfolio_return(&weights, mu);
        let volatility = Self::portfolio_volatility(&weights, cov);
        let sharpe_ratio = self.sharpe_ratio(expected_return, volatility);
        OptimizationOutcome {
            weights,
            expected_return,
            volatility,
            sharpe_ratio,
            cvar: None,
        }
    }

    /// Post-hoc constraint clamp
    ///
    /// Zero shorts when long-only, cap at max weight, floor retained
    /// positions at min weight, renormalize to sum 1. Capping after the
    /// renormalize can reintroduce a small excess when `n * max_weight` is
    /// close to 1; one extra cap pass bounds that error.
    #[must_use]
    pub fn apply_constraints(weights: &DVector<f64>, constraints: &Constraints) -> DVector<f64> {
        let n = weights.len();
        if n == 0 {
            return weights.clone();
        }

        let mut w = weights.clone();
        if constraints.long_only && !constraints.allow_short_selling {
            w.apply(|x| *x = x.max(0.0));
        }
        if !Self::renormalize(&mut w) {
            return DVector::from_element(n, 1.0 / n as f64);
        }

        let feasible_cap = constraints.max_weight * n as f64 >= 1.0;
        for _ in 0..2 {
            if feasible_cap {
                w.apply(|x| *x = x.min(constraints.max_weight));
            }
            for x in w.iter_mut() {
                if *x > 0.0 && *x < constraints.min_weight {
                    *x = constraints.min_weight;
                }
            }
            if !Self::renormalize(&mut w) {
                return DVector::from_element(n, 1.0 / n as f64);
            }
            if !feasible_cap
                || w.iter().all(|x| *x <= constraints.max_weight + 1e-9)
            {
                break;
            }
        }
        w
    }

    fn renormalize(w: &mut DVector<f64>) -> bool {
        let total: f64 = w.iter().sum();
        if total.abs() <= f64::EPSILON {
            return false;
        }
        *w /= total;
        true
    }

    fn inverse(cov: &DMatrix<f64>) -> Result<DMatrix<f64>, OptimizerError> {
        cov.clone()
            .try_inverse()
            .ok_or_else(|| OptimizerError::Infeasible {
                detail: "covariance matrix is singular".to_string(),
            })
    }

    /// Equality-constrained Markowitz solve (two-fund closed form)
    ///
    /// min w'Sigma w  s.t.  1'w = 1, mu'w = target
    fn markowitz_weights(
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        target: f64,
    ) -> Result<DVector<f64>, OptimizerError> {
        let n = mu.len();
        let inv = Self::inverse(cov)?;
        let ones = DVector::from_element(n, 1.0);
        let inv_ones = &inv * &ones;
        let inv_mu = &inv * mu;

        let a = ones.dot(&inv_ones);
        let b = ones.dot(&inv_mu);
        let c = mu.dot(&inv_mu);
        let d = a * c - b * b;
        if a <= f64::EPSILON || d.abs() <= 1e-12 {
            return Err(OptimizerError::Infeasible {
                detail: "degenerate return/covariance inputs".to_string(),
            });
        }

        let lambda = (c - b * target) / d;
        let gamma = (a * target - b) / d;
        Ok(inv_ones * lambda + inv_mu * gamma)
    }

    /// Global minimum-variance weights: Sigma^-1 1 / (1' Sigma^-1 1)
    fn min_variance_weights(cov: &DMatrix<f64>) -> Result<DVector<f64>, OptimizerError> {
        let n = cov.nrows();
        let inv = Self::inverse(cov)?;
        let ones = DVector::from_element(n, 1.0);
        let inv_ones = &inv * &ones;
        let denom = ones.dot(&inv_ones);
        if denom.abs() <= f64::EPSILON {
            return Err(OptimizerError::Infeasible {
                detail: "minimum-variance denominator is zero".to_string(),
            });
        }
        Ok(inv_ones / denom)
    }

    /// Markowitz minimum variance at a caller target return
    pub fn mean_variance(
        &self,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        target: f64,
        constraints: &Constraints,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        let (lo, hi) = (mu.min(), mu.max());
        if target < lo - 1e-9 || target > hi + 1e-9 {
            return Err(OptimizerError::Infeasible {
                detail: format!("target return {target} outside achievable [{lo}, {hi}]"),
            });
        }
        let weights = if (hi - lo).abs() <= f64::EPSILON {
            // All assets share one expected return; variance alone decides.
            Self::min_variance_weights(cov)?
        } else {
            Self::markowitz_weights(mu, cov, target)?
        };
        Ok(self.evaluate(Self::apply_constraints(&weights, constraints), mu, cov))
    }

    /// Closed-form tangency portfolio: w* ~ Sigma^-1 (mu - rf 1)
    pub fn max_sharpe(
        &self,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        let n = mu.len();
        if n == 1 {
            // Only one place to put money.
            return Ok(self.evaluate(DVector::from_element(1, 1.0), mu, cov));
        }

        let inv = Self::inverse(cov)?;
        let excess = mu - DVector::from_element(n, self.risk_free_rate);
        let raw = &inv * &excess;
        let denom: f64 = raw.iter().sum();

        let weights = if denom.abs() <= 1e-10 {
            // No exploitable excess return; hold the least-risky mix.
            Self::min_variance_weights(cov)?
        } else {
            raw / denom
        };
        Ok(self.evaluate(Self::apply_constraints(&weights, constraints), mu, cov))
    }

    /// Iterative equal-risk-contribution solve
    ///
    /// Starts equal-weighted and rescales each weight by the square root of
    /// target-to-actual risk contribution until total weight movement drops
    /// below tolerance. Purely risk-driven; expected returns only feed the
    /// reported statistics.
    pub fn risk_parity(
        &self,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        let n = mu.len();
        let mut w = DVector::from_element(n, 1.0 / n as f64);

        for _ in 0..self.max_iterations {
            let vol = Self::portfolio_volatility(&w, cov);
            if vol <= f64::EPSILON {
                break;
            }
            let marginal = (cov * &w) / vol;
            let target = vol / n as f64;

            let mut next = w.clone();
            for i in 0..n {
                let contribution = w[i] * marginal[i];
                if contribution > f64::EPSILON {
                    next[i] = w[i] * (target / contribution).sqrt();
                }
            }
            if !Self::renormalize(&mut next) {
                break;
            }

            let movement: f64 = (&next - &w).iter().map(|x| x.abs()).sum();
            w = next;
            if movement < self.tolerance {
                break;
            }
        }

        Ok(self.evaluate(Self::apply_constraints(&w, constraints), mu, cov))
    }

    /// Mean-variance solve anchored just above the minimum achievable return
    ///
    /// The offset keeps the target off the degenerate bottom edge of the
    /// feasible range.
    pub fn min_volatility(
        &self,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        let (lo, hi) = (mu.min(), mu.max());
        if (hi - lo).abs() <= f64::EPSILON {
            let weights = Self::min_variance_weights(cov)?;
            return Ok(self.evaluate(Self::apply_constraints(&weights, constraints), mu, cov));
        }
        let target = lo + 0.05 * (hi - lo);
        self.mean_variance(mu, cov, target, constraints)
    }

    /// Tail mean of the worst `alpha` fraction of scenario returns
    ///
    /// Returned in return space: more negative is worse, and a narrower tail
    /// is never better than a wider one.
    #[must_use]
    pub fn cvar(weights: &DVector<f64>, scenarios: &[DVector<f64>], alpha: f64) -> f64 {
        if scenarios.is_empty() {
            return 0.0;
        }
        let mut outcomes: Vec<f64> = scenarios.iter().map(|s| weights.dot(s)).collect();
        outcomes.sort_by(|a, b| a.total_cmp(b));
        let tail = ((alpha * outcomes.len() as f64).floor() as usize).max(1);
        outcomes[..tail].iter().sum::<f64>() / tail as f64
    }

    /// Expected-shortfall minimization via projected subgradient ascent
    ///
    /// The tail mean is concave in the weights; each step moves toward the
    /// average of the current tail scenarios and projects back onto the
    /// constraint set. The best iterate by CVaR wins.
    pub fn cvar_min(
        &self,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        scenarios: &[DVector<f64>],
        alpha: f64,
        constraints: &Constraints,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        if !(0.0..=0.5).contains(&alpha) || alpha == 0.0 {
            return Err(OptimizerError::InvalidRequest {
                detail: format!("cvar alpha must be in (0, 0.5], got {alpha}"),
            });
        }
        if scenarios.is_empty() {
            return Err(OptimizerError::InvalidRequest {
                detail: "cvar-min requires at least one scenario".to_string(),
            });
        }
        let n = mu.len();
        if scenarios.iter().any(|s| s.len() != n) {
            return Err(OptimizerError::DimensionMismatch {
                returns: n,
                rows: scenarios[0].len(),
                cols: scenarios[0].len(),
            });
        }

        let tail = ((alpha * scenarios.len() as f64).floor() as usize).max(1);
        let mut w = Self::apply_constraints(&DVector::from_element(n, 1.0 / n as f64), constraints);
        let mut best = w.clone();
        let mut best_cvar = Self::cvar(&w, scenarios, alpha);

        for iteration in 0..self.max_iterations {
            // Subgradient of the tail mean: average of the worst scenarios.
            let mut indexed: Vec<(usize, f64)> = scenarios
                .iter()
                .enumerate()
                .map(|(i, s)| (i, w.dot(s)))
                .collect();
            indexed.sort_by(|a, b| a.1.total_cmp(&b.1));
            let mut gradient = DVector::zeros(n);
            for (i, _) in indexed.iter().take(tail) {
                gradient += &scenarios[*i];
            }
            gradient /= tail as f64;

            let step = 0.5 / (iteration + 1) as f64;
            let candidate = Self::apply_constraints(&(&w + gradient * step), constraints);
            let movement: f64 = (&candidate - &w).iter().map(|x| x.abs()).sum();
            w = candidate;

            let current = Self::cvar(&w, scenarios, alpha);
            if current > best_cvar {
                best_cvar = current;
                best = w.clone();
            }
            if movement < self.tolerance {
                break;
            }
        }

        let mut outcome = self.evaluate(best, mu, cov);
        outcome.cvar = Some(best_cvar);
        Ok(outcome)
    }

    /// Black-Litterman: equilibrium prior, optionally blended with views
    ///
    /// Pi = delta * Sigma * w_mkt. Without views the market weights and the
    /// prior are returned unchanged. With views the standard posterior
    /// mu = [(tau Sigma)^-1 + P' Omega^-1 P]^-1 [(tau Sigma)^-1 Pi +
    /// P' Omega^-1 Q] feeds a tangency solve, with Omega built from the
    /// diagonal of P (tau Sigma) P' scaled down by view confidence.
    pub fn black_litterman(
        &self,
        cov: &DMatrix<f64>,
        params: &BlackLittermanParams,
        constraints: &Constraints,
    ) -> Result<(OptimizationOutcome, DVector<f64>), OptimizerError> {
        let n = cov.nrows();
        if params.market_weights.len() != n {
            return Err(OptimizerError::DimensionMismatch {
                returns: params.market_weights.len(),
                rows: n,
                cols: cov.ncols(),
            });
        }

        let mut market = params.market_weights.clone();
        if !Self::renormalize(&mut market) {
            market = DVector::from_element(n, 1.0 / n as f64);
        }
        let equilibrium = cov * &market * params.risk_aversion;

        let Some(views) = params.views.as_ref().filter(|v| !v.is_empty()) else {
            // No views: the prior is the whole answer.
            let outcome = self.evaluate(market, &equilibrium, cov);
            return Ok((outcome, equilibrium));
        };
        if views.pick.ncols() != n {
            return Err(OptimizerError::DimensionMismatch {
                returns: views.pick.ncols(),
                rows: n,
                cols: n,
            });
        }

        let tau_sigma = cov * params.tau;
        let prior_precision =
            tau_sigma
                .clone()
                .try_inverse()
                .ok_or_else(|| OptimizerError::Infeasible {
                    detail: "tau-scaled covariance is singular".to_string(),
                })?;

        // Omega: view uncertainty from the prior, tightened by confidence.
        let view_cov = &views.pick * &tau_sigma * views.pick.transpose();
        let mut omega_inv = DMatrix::zeros(views.len(), views.len());
        for k in 0..views.len() {
            let variance = view_cov[(k, k)] / views.confidences[k];
            if variance <= f64::EPSILON {
                return Err(OptimizerError::Infeasible {
                    detail: "view uncertainty collapsed to zero".to_string(),
                });
            }
            omega_inv[(k, k)] = 1.0 / variance;
        }

        let posterior_precision =
            &prior_precision + views.pick.transpose() * &omega_inv * &views.pick;
        let posterior_cov =
            posterior_precision
                .try_inverse()
                .ok_or_else(|| OptimizerError::Infeasible {
                    detail: "posterior precision is singular".to_string(),
                })?;
        let posterior = &posterior_cov
            * (&prior_precision * &equilibrium
                + views.pick.transpose() * &omega_inv * &views.outlook);

        let outcome = self.max_sharpe(&posterior, cov, constraints)?;
        Ok((outcome, posterior))
    }

    /// Sweep of mean-variance solves along the efficient branch
    ///
    /// Targets run from the global minimum-variance return up to the best
    /// single-asset return; infeasible points are skipped silently. Lazy in
    /// the sense that nothing persists between calls.
    pub fn efficient_frontier(
        &self,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
        num_points: usize,
    ) -> Result<Vec<FrontierPoint>, OptimizerError> {
        OptimizerError::check_dimensions(mu.len(), cov.nrows(), cov.ncols())?;
        if num_points == 0 || num_points > optimization::MAX_FRONTIER_POINTS {
            return Err(OptimizerError::InvalidRequest {
                detail: format!(
                    "num_points must be in 1..={}, got {num_points}",
                    optimization::MAX_FRONTIER_POINTS
                ),
            });
        }
        if mu.is_empty() {
            return Ok(Vec::new());
        }

        let (lo_ret, hi_ret) = (mu.min(), mu.max());
        let start = Self::min_variance_weights(cov)
            .map(|w| Self::portfolio_return(&w, mu))
            .unwrap_or(lo_ret)
            .clamp(lo_ret, hi_ret);

        let mut points = Vec::with_capacity(num_points);
        for i in 0..num_points {
            let fraction = if num_points == 1 {
                0.0
            } else {
                i as f64 / (num_points - 1) as f64
            };
            let target = start + fraction * (hi_ret - start);
            let Ok(weights) = Self::markowitz_weights(mu, cov, target) else {
                continue;
            };
            let risk = Self::portfolio_volatility(&weights, cov);
            if !risk.is_finite() {
                continue;
            }
            points.push(FrontierPoint {
                risk,
                expected_return: Self::portfolio_return(&weights, mu),
                weights: weights.iter().copied().collect(),
            });
        }
        Ok(points)
    }
}

impl Default for PortfolioOptimizer {
    fn default() -> Self {
        Self::new(estimation::DEFAULT_RISK_FREE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_asset() -> (DVector<f64>, DMatrix<f64>) {
        (
            DVector::from_vec(vec![0.10, 0.05]),
            DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.01]),
        )
    }

    fn unconstrained() -> Constraints {
        Constraints {
            long_only: true,
            max_weight: 1.0,
            min_weight: 0.0,
            allow_short_selling: false,
        }
    }

    #[test]
    fn test_portfolio_statistics() {
        let (mu, cov) = two_asset();
        let w = DVector::from_vec(vec![0.5, 0.5]);
        assert_relative_eq!(PortfolioOptimizer::portfolio_return(&w, &mu), 0.075);
        assert_relative_eq!(
            PortfolioOptimizer::portfolio_volatility(&w, &cov),
            (0.25 * 0.04 + 0.25 * 0.01_f64).sqrt(),
            epsilon = 1e-12
        );
        let optimizer = PortfolioOptimizer::default();
        assert_eq!(optimizer.sharpe_ratio(0.10, 0.0), 0.0);
    }

    #[test]
    fn test_apply_constraints_long_only_sums_to_one() {
        let raw = DVector::from_vec(vec![1.4, -0.3, -0.1]);
        let constrained =
            PortfolioOptimizer::apply_constraints(&raw, &Constraints::default());
        assert!(constrained.iter().all(|w| *w >= 0.0));
        assert_relative_eq!(constrained.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_apply_constraints_all_negative_degrades_to_equal() {
        let raw = DVector::from_vec(vec![-0.5, -0.5]);
        let constrained =
            PortfolioOptimizer::apply_constraints(&raw, &Constraints::default());
        assert_relative_eq!(constrained[0], 0.5);
        assert_relative_eq!(constrained[1], 0.5);
    }

    #[test]
    fn test_max_sharpe_single_asset_is_fully_invested() {
        let mu = DVector::from_vec(vec![0.07]);
        let cov = DMatrix::from_row_slice(1, 1, &[0.09]);
        let tight = Constraints {
            max_weight: 0.10,
            ..Constraints::default()
        };
        let outcome = PortfolioOptimizer::default()
            .max_sharpe(&mu, &cov, &tight)
            .unwrap();
        assert_relative_eq!(outcome.weights[0], 1.0);
    }

    #[test]
    fn test_max_sharpe_matches_tangency_closed_form() {
        // Tangency weights scale with excess return over variance, so the
        // low-volatility asset dominates here: Sigma^-1 (mu - rf) = (2, 3).
        let (mu, cov) = two_asset();
        let outcome = PortfolioOptimizer::default()
            .max_sharpe(&mu, &cov, &unconstrained())
            .unwrap();
        assert_relative_eq!(outcome.weights[0], 0.4, epsilon = 1e-9);
        assert_relative_eq!(outcome.weights[1], 0.6, epsilon = 1e-9);
        assert_relative_eq!(outcome.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        // No long-only mix beats the tangency Sharpe of 0.5.
        assert_relative_eq!(outcome.sharpe_ratio, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_risk_parity_equal_vol_uncorrelated_is_half_half() {
        let mu = DVector::from_vec(vec![0.08, 0.06]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.04]);
        let outcome = PortfolioOptimizer::default()
            .risk_parity(&mu, &cov, &unconstrained())
            .unwrap();
        assert_relative_eq!(outcome.weights[0], 0.5, epsilon = 1e-4);
        assert_relative_eq!(outcome.weights[1], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_risk_parity_overweights_low_vol_asset() {
        let (mu, cov) = two_asset();
        let outcome = PortfolioOptimizer::default()
            .risk_parity(&mu, &cov, &unconstrained())
            .unwrap();
        // Asset 2 has a quarter of asset 1's variance.
        assert!(outcome.weights[1] > outcome.weights[0]);
    }

    #[test]
    fn test_mean_variance_rejects_unreachable_target() {
        let (mu, cov) = two_asset();
        let optimizer = PortfolioOptimizer::default();
        assert!(matches!(
            optimizer.mean_variance(&mu, &cov, 0.50, &unconstrained()),
            Err(OptimizerError::Infeasible { .. })
        ));
    }

    #[test]
    fn test_mean_variance_hits_target_return() {
        let (mu, cov) = two_asset();
        let outcome = PortfolioOptimizer::default()
            .mean_variance(&mu, &cov, 0.08, &unconstrained())
            .unwrap();
        assert_relative_eq!(outcome.expected_return, 0.08, epsilon = 1e-6);
    }

    #[test]
    fn test_min_volatility_sits_near_low_risk_end() {
        let (mu, cov) = two_asset();
        let optimizer = PortfolioOptimizer::default();
        let min_vol = optimizer.min_volatility(&mu, &cov, &unconstrained()).unwrap();
        let max_sharpe = optimizer.max_sharpe(&mu, &cov, &unconstrained()).unwrap();
        assert!(min_vol.volatility <= max_sharpe.volatility + 1e-9);
    }

    #[test]
    fn test_cvar_tail_ordering() {
        let (mu, cov) = two_asset();
        let scenarios = crate::scenario::ScenarioGenerator::with_seed(11)
            .generate(&mu, &cov, 5_000, 1.0)
            .unwrap();
        let w = DVector::from_vec(vec![0.6, 0.4]);
        let narrow = PortfolioOptimizer::cvar(&w, &scenarios, 0.05);
        let wide = PortfolioOptimizer::cvar(&w, &scenarios, 0.10);
        assert!(narrow <= wide);
    }

    #[test]
    fn test_cvar_min_beats_equal_weight_tail() {
        let (mu, cov) = two_asset();
        let scenarios = crate::scenario::ScenarioGenerator::with_seed(3)
            .generate(&mu, &cov, 5_000, 1.0)
            .unwrap();
        let optimizer = PortfolioOptimizer::default();
        let outcome = optimizer
            .cvar_min(&mu, &cov, &scenarios, 0.05, &unconstrained())
            .unwrap();
        let equal = DVector::from_element(2, 0.5);
        let equal_cvar = PortfolioOptimizer::cvar(&equal, &scenarios, 0.05);
        assert!(outcome.cvar.unwrap() >= equal_cvar - 1e-9);
        assert_relative_eq!(outcome.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_black_litterman_without_views_returns_market() {
        let (_, cov) = two_asset();
        let market = DVector::from_vec(vec![0.7, 0.3]);
        let params = BlackLittermanParams::market(market.clone());
        let (outcome, posterior) = PortfolioOptimizer::default()
            .black_litterman(&cov, &params, &Constraints::default())
            .unwrap();
        assert_relative_eq!(outcome.weights[0], 0.7, epsilon = 1e-12);
        // Pi = delta * Sigma * w
        assert_relative_eq!(posterior[0], 3.0 * 0.04 * 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_black_litterman_view_shifts_allocation() {
        let (_, cov) = two_asset();
        let market = DVector::from_element(2, 0.5);
        let views = ViewSet::new(
            DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
            DVector::from_vec(vec![0.10]),
            DVector::from_vec(vec![0.8]),
        )
        .unwrap();
        let params = BlackLittermanParams {
            market_weights: market,
            views: Some(views),
            tau: 0.025,
            risk_aversion: 3.0,
        };
        let (outcome, posterior) = PortfolioOptimizer::default()
            .black_litterman(&cov, &params, &unconstrained())
            .unwrap();
        // The view says asset 1 outperforms asset 2.
        assert!(posterior[0] > posterior[1]);
        assert!(outcome.weights[0] > outcome.weights[1]);
    }

    #[test]
    fn test_frontier_shape() {
        let (mu, cov) = two_asset();
        let points = PortfolioOptimizer::default()
            .efficient_frontier(&mu, &cov, 10)
            .unwrap();
        assert!(!points.is_empty());
        assert!(points.len() <= 10);
        for pair in points.windows(2) {
            assert!(pair[1].risk >= pair[0].risk - 1e-9);
            assert!(pair[0].risk >= 0.0);
        }
    }

    #[test]
    fn test_frontier_point_cap() {
        let (mu, cov) = two_asset();
        assert!(matches!(
            PortfolioOptimizer::default().efficient_frontier(&mu, &cov, 10_000),
            Err(OptimizerError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_dispatch_unknown_method_string() {
        assert!(matches!(
            "gradient-boost".parse::<OptimizationMethod>(),
            Err(OptimizerError::UnknownMethod { name }) if name == "gradient-boost"
        ));
        assert_eq!(
            "risk-parity".parse::<OptimizationMethod>().unwrap(),
            OptimizationMethod::RiskParity
        );
    }
}
