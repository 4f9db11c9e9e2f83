//! Monte Carlo scenario generation for CVaR estimation
//!
//! Correlated return scenarios are drawn by Cholesky-decomposing the
//! covariance matrix and coloring independent standard-normal variates with
//! the resulting factor. The generator owns its RNG so callers can seed it
//! for reproducible tests; unseeded generators draw fresh randomness per
//! call.

use crate::errors::OptimizerError;
use crate::stats;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use services_common::constants::optimization;

/// Correlated scenario generator with injectable randomness
pub struct ScenarioGenerator {
    rng: StdRng,
}

impl ScenarioGenerator {
    /// Deterministic generator for reproducible runs
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from OS entropy
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate `num_scenarios` correlated return vectors
    ///
    /// Each scenario is `mu * horizon + sqrt(horizon) * L * z` with
    /// `z ~ N(0, I)` and `L` the Cholesky factor of the covariance matrix.
    /// `horizon_years` scales a one-year input to the simulated period.
    pub fn generate(
        &mut self,
        returns: &DVector<f64>,
        covariance: &DMatrix<f64>,
        num_scenarios: usize,
        horizon_years: f64,
    ) -> Result<Vec<DVector<f64>>, OptimizerError> {
        OptimizerError::check_dimensions(
            returns.len(),
            covariance.nrows(),
            covariance.ncols(),
        )?;
        if num_scenarios == 0 || num_scenarios > optimization::MAX_SCENARIOS {
            return Err(OptimizerError::InvalidRequest {
                detail: format!(
                    "num_scenarios must be in 1..={}, got {num_scenarios}",
                    optimization::MAX_SCENARIOS
                ),
            });
        }
        if horizon_years <= 0.0 {
            return Err(OptimizerError::InvalidRequest {
                detail: format!("horizon_years must be positive, got {horizon_years}"),
            });
        }

        let n = returns.len();
        let factor = stats::cholesky_factor(covariance)?;
        let drift = returns * horizon_years;
        let scale = horizon_years.sqrt();

        let scenarios = (0..num_scenarios)
            .map(|_| {
                let z = DVector::from_iterator(
                    n,
                    (0..n).map(|_| self.rng.sample::<f64, _>(StandardNormal)),
                );
                &drift + (&factor * z) * scale
            })
            .collect();
        Ok(scenarios)
    }
}
