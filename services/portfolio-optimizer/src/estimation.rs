//! Input estimation engine
//!
//! Turns raw per-symbol price histories into the two inputs every portfolio
//! optimizer needs: an annualized expected-return vector and an annualized
//! covariance matrix, under a caller-selected method. A symbol with too
//! little history never aborts a batch; it degrades to a documented default
//! (zero return, floor variance) so one illiquid position cannot take down
//! the whole estimation.

use crate::errors::OptimizerError;
use crate::stats;
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::constants::{estimation, market};
use services_common::{PriceSeries, Symbol};
use std::str::FromStr;

/// Expected-return estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnMethod {
    /// Annualized mean of daily log-returns
    HistoricalMean,
    /// Exponentially weighted mean, recent days weighted higher
    ExponentialWeighted,
    /// CAPM: Rf + beta * (Rm - Rf) against the market proxy
    Capm,
    /// Implied equilibrium returns from the Black-Litterman prior
    BlackLitterman,
}

impl ReturnMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HistoricalMean => "historical_mean",
            Self::ExponentialWeighted => "exponential_weighted",
            Self::Capm => "capm",
            Self::BlackLitterman => "black_litterman",
        }
    }
}

impl FromStr for ReturnMethod {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "historical_mean" => Ok(Self::HistoricalMean),
            "exponential_weighted" => Ok(Self::ExponentialWeighted),
            "capm" => Ok(Self::Capm),
            "black_litterman" => Ok(Self::BlackLitterman),
            other => Err(OptimizerError::UnknownMethod {
                name: other.to_string(),
            }),
        }
    }
}

/// Covariance estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceMethod {
    /// Annualized pairwise sample covariance
    Sample,
    /// Sample covariance shrunk toward a constant-correlation target
    Shrinkage,
    /// Single-factor (market) model with diagonal idiosyncratic risk
    FactorModel,
}

impl CovarianceMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Shrinkage => "shrinkage",
            Self::FactorModel => "factor_model",
        }
    }
}

impl FromStr for CovarianceMethod {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sample" => Ok(Self::Sample),
            "shrinkage" => Ok(Self::Shrinkage),
            "factor_model" => Ok(Self::FactorModel),
            other => Err(OptimizerError::UnknownMethod {
                name: other.to_string(),
            }),
        }
    }
}

/// Estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Trading-day lookback window
    pub lookback_days: usize,
    /// EWMA decay factor
    pub ewma_lambda: f64,
    /// Annual risk-free rate
    pub risk_free_rate: f64,
    /// Annual market-return assumption for CAPM
    pub market_return: f64,
    /// Benchmark used for CAPM betas and the factor model
    pub market_proxy: Symbol,
    /// Shrinkage intensity delta in [0, 1]
    ///
    /// A constant default, not a computed Ledoit-Wolf optimum; callers can
    /// override per request.
    pub shrinkage_intensity: f64,
    /// Black-Litterman risk-aversion coefficient
    pub risk_aversion: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            lookback_days: market::DEFAULT_LOOKBACK_DAYS,
            ewma_lambda: estimation::DEFAULT_EWMA_LAMBDA,
            risk_free_rate: estimation::DEFAULT_RISK_FREE_RATE,
            market_return: estimation::DEFAULT_MARKET_RETURN,
            market_proxy: Symbol::new(market::DEFAULT_MARKET_PROXY),
            shrinkage_intensity: estimation::DEFAULT_SHRINKAGE_INTENSITY,
            risk_aversion: estimation::DEFAULT_BL_RISK_AVERSION,
        }
    }
}

/// Input estimation engine
pub struct InputEstimator {
    config: EstimationConfig,
}

impl InputEstimator {
    #[must_use]
    pub fn new(config: EstimationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    /// Daily log-returns over the configured lookback for one symbol
    fn windowed_returns(&self, series: &PriceSeries) -> Vec<f64> {
        let closes = series.usable_closes();
        let window = stats::tail(&closes, self.config.lookback_days);
        window.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
    }

    /// Annualized expected-return vector ordered by `universe`
    ///
    /// `market_weights` seeds the Black-Litterman equilibrium prior; when
    /// absent an equal-weighted prior is used.
    #[must_use]
    pub fn expected_returns(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
        method: ReturnMethod,
        market_weights: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        match method {
            ReturnMethod::HistoricalMean => self.historical_mean_returns(universe, histories),
            ReturnMethod::ExponentialWeighted => self.ewma_returns(universe, histories),
            ReturnMethod::Capm => self.capm_returns(universe, histories),
            ReturnMethod::BlackLitterman => {
                self.equilibrium_returns(universe, histories, market_weights)
            }
        }
    }

    fn historical_mean_returns(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
    ) -> DVector<f64> {
        let values = universe.iter().map(|symbol| {
            let returns = histories
                .get(symbol)
                .map(|s| self.windowed_returns(s))
                .unwrap_or_default();
            if returns.is_empty() {
                tracing::warn!(%symbol, "no usable history, defaulting expected return to 0");
                return 0.0;
            }
            stats::mean(&returns) * market::TRADING_DAYS_F64
        });
        DVector::from_iterator(universe.len(), values)
    }

    fn ewma_returns(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
    ) -> DVector<f64> {
        let lambda = self.config.ewma_lambda;
        let values = universe.iter().map(|symbol| {
            let returns = histories
                .get(symbol)
                .map(|s| self.windowed_returns(s))
                .unwrap_or_default();
            if returns.is_empty() {
                tracing::warn!(%symbol, "no usable history, defaulting expected return to 0");
                return 0.0;
            }
            let n = returns.len();
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for (i, r) in returns.iter().enumerate() {
                let weight = lambda.powi((n - 1 - i) as i32);
                weighted_sum += weight * r;
                weight_total += weight;
            }
            (weighted_sum / weight_total) * market::TRADING_DAYS_F64
        });
        DVector::from_iterator(universe.len(), values)
    }

    fn capm_returns(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
    ) -> DVector<f64> {
        let rf = self.config.risk_free_rate;
        let premium = self.config.market_return - rf;
        let market_returns = histories
            .get(&self.config.market_proxy)
            .map(|s| self.windowed_returns(s))
            .unwrap_or_default();

        let values = universe.iter().map(|symbol| {
            let asset_returns = histories
                .get(symbol)
                .map(|s| self.windowed_returns(s))
                .unwrap_or_default();
            let beta = Self::beta(&asset_returns, &market_returns);
            rf + beta * premium
        });
        DVector::from_iterator(universe.len(), values)
    }

    /// Beta against the market proxy over the aligned tail window
    ///
    /// Defaults to 1.0 (market neutral) when either side has under two
    /// observations or the proxy shows no variance.
    fn beta(asset_returns: &[f64], market_returns: &[f64]) -> f64 {
        let (asset, market) = stats::aligned_tails(asset_returns, market_returns);
        if asset.len() < 2 {
            return 1.0;
        }
        let market_var = stats::sample_variance(market);
        if market_var <= f64::EPSILON {
            return 1.0;
        }
        stats::sample_covariance(asset, market) / market_var
    }

    /// Black-Litterman prior: Pi = delta * Sigma * w_mkt
    ///
    /// Without caller views this is the whole estimate; views are blended in
    /// by the optimization engine.
    fn equilibrium_returns(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
        market_weights: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        let n = universe.len();
        if n == 0 {
            return DVector::zeros(0);
        }
        let cov = self.covariance_matrix(universe, histories, CovarianceMethod::Sample);
        let equal = DVector::from_element(n, 1.0 / n as f64);
        let weights = match market_weights {
            Some(w) if w.len() == n => w.clone(),
            _ => equal,
        };
        cov * weights * self.config.risk_aversion
    }

    /// Annualized covariance matrix ordered by `universe`
    #[must_use]
    pub fn covariance_matrix(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
        method: CovarianceMethod,
    ) -> DMatrix<f64> {
        match method {
            CovarianceMethod::Sample => self.sample_covariance(universe, histories),
            CovarianceMethod::Shrinkage => {
                let sample = self.sample_covariance(universe, histories);
                Self::shrink(&sample, self.config.shrinkage_intensity)
            }
            CovarianceMethod::FactorModel => self.factor_covariance(universe, histories),
        }
    }

    fn sample_covariance(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
    ) -> DMatrix<f64> {
        let n = universe.len();
        let returns: Vec<Vec<f64>> = universe
            .iter()
            .map(|symbol| {
                histories
                    .get(symbol)
                    .map(|s| self.windowed_returns(s))
                    .unwrap_or_default()
            })
            .collect();

        let mut cov = DMatrix::zeros(n, n);
        for i in 0..n {
            if returns[i].len() < 2 {
                // Floor variance keeps the matrix invertible when a symbol
                // has no usable history.
                cov[(i, i)] = estimation::DEFAULT_VARIANCE_FLOOR;
                continue;
            }
            cov[(i, i)] = stats::sample_variance(&returns[i]) * market::TRADING_DAYS_F64;
            for j in (i + 1)..n {
                if returns[j].len() < 2 {
                    continue;
                }
                let (a, b) = stats::aligned_tails(&returns[i], &returns[j]);
                let value = stats::sample_covariance(a, b) * market::TRADING_DAYS_F64;
                cov[(i, j)] = value;
                cov[(j, i)] = value;
            }
        }
        cov
    }

    /// Blend toward the constant-correlation target: (1-delta)*S + delta*T
    ///
    /// Target diagonal is the mean sample variance, target off-diagonal the
    /// mean sample covariance. delta = 0 reproduces the sample matrix bit for
    /// bit.
    fn shrink(sample: &DMatrix<f64>, delta: f64) -> DMatrix<f64> {
        let n = sample.nrows();
        if n == 0 || delta == 0.0 {
            return sample.clone();
        }

        let mean_variance = sample.diagonal().mean();
        let mut off_sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    off_sum += sample[(i, j)];
                }
            }
        }
        let mean_covariance = if n > 1 {
            off_sum / (n * (n - 1)) as f64
        } else {
            0.0
        };

        DMatrix::from_fn(n, n, |i, j| {
            let target = if i == j { mean_variance } else { mean_covariance };
            (1.0 - delta) * sample[(i, j)] + delta * target
        })
    }

    /// Single-factor market model: Sigma = beta * beta' * var_m + D
    ///
    /// Idiosyncratic variance is the sample variance left unexplained by the
    /// market factor, floored at zero. Falls back to the sample estimator
    /// when the proxy itself has no usable history.
    fn factor_covariance(
        &self,
        universe: &[Symbol],
        histories: &FxHashMap<Symbol, PriceSeries>,
    ) -> DMatrix<f64> {
        let market_returns = histories
            .get(&self.config.market_proxy)
            .map(|s| self.windowed_returns(s))
            .unwrap_or_default();
        if market_returns.len() < 2 {
            tracing::warn!(
                proxy = %self.config.market_proxy,
                "market proxy history unusable, factor model falling back to sample covariance"
            );
            return self.sample_covariance(universe, histories);
        }

        let n = universe.len();
        let market_var =
            stats::sample_variance(&market_returns) * market::TRADING_DAYS_F64;

        let mut betas = DVector::zeros(n);
        let mut idio = DVector::zeros(n);
        for (i, symbol) in universe.iter().enumerate() {
            let asset_returns = histories
                .get(symbol)
                .map(|s| self.windowed_returns(s))
                .unwrap_or_default();
            if asset_returns.len() < 2 {
                betas[i] = 0.0;
                idio[i] = estimation::DEFAULT_VARIANCE_FLOOR;
                continue;
            }
            let beta = Self::beta(&asset_returns, &market_returns);
            let total_var =
                stats::sample_variance(&asset_returns) * market::TRADING_DAYS_F64;
            betas[i] = beta;
            idio[i] = (total_var - beta * beta * market_var).max(0.0);
        }

        let mut cov = &betas * betas.transpose() * market_var;
        for i in 0..n {
            cov[(i, i)] += idio[i];
        }
        cov
    }
}

impl Default for InputEstimator {
    fn default() -> Self {
        Self::new(EstimationConfig::default())
    }
}
