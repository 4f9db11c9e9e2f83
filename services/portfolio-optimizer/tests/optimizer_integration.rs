//! Engine-level integration tests
//!
//! Exercises the estimation and optimization engines together over synthetic
//! price histories and checks the structural properties every allocation
//! must satisfy.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use portfolio_optimizer::estimation::{CovarianceMethod, EstimationConfig, ReturnMethod};
use portfolio_optimizer::optimization::{
    Constraints, OptimizationMethod, OptimizationProblem, PortfolioOptimizer,
};
use portfolio_optimizer::{InputEstimator, ScenarioGenerator};
use proptest::prelude::*;
use rstest::*;
use rustc_hash::FxHashMap;
use services_common::{PriceBar, PriceSeries, Symbol};

fn synthetic_series(symbol: &str, drift: f64, wobble: f64, days: usize) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut close = 100.0;
    let bars = (0..days)
        .map(|i| {
            let cycle = (i as f64 * 0.7).sin() * wobble;
            close *= (drift + cycle).exp();
            PriceBar {
                date: start + chrono::Days::new(i as u64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect();
    PriceSeries::new(Symbol::new(symbol), bars)
}

#[fixture]
fn histories() -> FxHashMap<Symbol, PriceSeries> {
    [
        synthetic_series("AAPL", 0.0006, 0.012, 520),
        synthetic_series("MSFT", 0.0004, 0.009, 520),
        synthetic_series("BND", 0.0001, 0.002, 520),
        synthetic_series("SPY", 0.0003, 0.008, 520),
    ]
    .into_iter()
    .map(|s| (s.symbol.clone(), s))
    .collect()
}

#[fixture]
fn universe() -> Vec<Symbol> {
    vec![Symbol::new("AAPL"), Symbol::new("MSFT"), Symbol::new("BND")]
}

fn loose_constraints() -> Constraints {
    Constraints {
        long_only: true,
        max_weight: 1.0,
        min_weight: 0.0,
        allow_short_selling: false,
    }
}

mod estimation_to_optimization {
    use super::*;

    #[rstest]
    #[case::historical(ReturnMethod::HistoricalMean)]
    #[case::ewma(ReturnMethod::ExponentialWeighted)]
    #[case::capm(ReturnMethod::Capm)]
    #[case::black_litterman(ReturnMethod::BlackLitterman)]
    fn estimated_inputs_feed_every_return_method(
        histories: FxHashMap<Symbol, PriceSeries>,
        universe: Vec<Symbol>,
        #[case] method: ReturnMethod,
    ) {
        let estimator = InputEstimator::default();
        let mu = estimator.expected_returns(&universe, &histories, method, None);
        let cov = estimator.covariance_matrix(&universe, &histories, CovarianceMethod::Shrinkage);

        assert_eq!(mu.len(), 3);
        assert!(mu.iter().all(|r| r.is_finite()));
        // Covariance must stay symmetric with non-negative variances.
        for i in 0..3 {
            assert!(cov[(i, i)] >= 0.0);
            for j in 0..3 {
                assert_relative_eq!(cov[(i, j)], cov[(j, i)], epsilon = 1e-12);
            }
        }

        let outcome = PortfolioOptimizer::default()
            .max_sharpe(&mu, &cov, &Constraints::default())
            .unwrap();
        assert_relative_eq!(outcome.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }

    #[rstest]
    #[case::sample(CovarianceMethod::Sample)]
    #[case::shrinkage(CovarianceMethod::Shrinkage)]
    #[case::factor(CovarianceMethod::FactorModel)]
    fn every_covariance_method_supports_a_solve(
        histories: FxHashMap<Symbol, PriceSeries>,
        universe: Vec<Symbol>,
        #[case] method: CovarianceMethod,
    ) {
        let estimator = InputEstimator::default();
        let mu = estimator.expected_returns(
            &universe,
            &histories,
            ReturnMethod::HistoricalMean,
            None,
        );
        let cov = estimator.covariance_matrix(&universe, &histories, method);
        let outcome = PortfolioOptimizer::default()
            .risk_parity(&mu, &cov, &loose_constraints())
            .unwrap();

        assert!(outcome.volatility >= 0.0);
        assert_relative_eq!(outcome.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }

    #[rstest]
    fn shrinkage_with_zero_intensity_is_sample(
        histories: FxHashMap<Symbol, PriceSeries>,
        universe: Vec<Symbol>,
    ) {
        let config = EstimationConfig {
            shrinkage_intensity: 0.0,
            ..EstimationConfig::default()
        };
        let estimator = InputEstimator::new(config);
        let sample = estimator.covariance_matrix(&universe, &histories, CovarianceMethod::Sample);
        let shrunk =
            estimator.covariance_matrix(&universe, &histories, CovarianceMethod::Shrinkage);
        assert_eq!(sample, shrunk);
    }
}

mod objective_properties {
    use super::*;

    fn three_asset() -> (DVector<f64>, DMatrix<f64>) {
        (
            DVector::from_vec(vec![0.10, 0.07, 0.04]),
            DMatrix::from_row_slice(
                3,
                3,
                &[0.040, 0.006, 0.001, 0.006, 0.010, 0.002, 0.001, 0.002, 0.009],
            ),
        )
    }

    #[rstest]
    #[case::mean_variance(OptimizationMethod::MeanVariance)]
    #[case::max_sharpe(OptimizationMethod::MaxSharpe)]
    #[case::risk_parity(OptimizationMethod::RiskParity)]
    #[case::min_volatility(OptimizationMethod::MinVolatility)]
    #[case::cvar_min(OptimizationMethod::CvarMin)]
    #[case::black_litterman(OptimizationMethod::BlackLitterman)]
    fn long_only_weights_are_valid(#[case] method: OptimizationMethod) {
        let (mu, cov) = three_asset();
        let constraints = Constraints::default();
        let scenarios = ScenarioGenerator::with_seed(17)
            .generate(&mu, &cov, 2_000, 1.0)
            .unwrap();

        let problem = OptimizationProblem {
            expected_returns: &mu,
            covariance: &cov,
            constraints: &constraints,
            target_return: Some(0.07),
            black_litterman: None,
            scenarios: Some(&scenarios),
            cvar_alpha: 0.05,
        };
        let outcome = PortfolioOptimizer::default()
            .optimize(method, &problem)
            .unwrap();

        assert!(
            outcome.weights.iter().all(|w| *w >= -1e-9),
            "{method:?} produced a short position under long-only"
        );
        assert_relative_eq!(outcome.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
        assert!(outcome.volatility >= 0.0);
    }

    #[rstest]
    fn risk_parity_equalizes_contributions() {
        let (mu, cov) = three_asset();
        let outcome = PortfolioOptimizer::default()
            .risk_parity(&mu, &cov, &loose_constraints())
            .unwrap();

        let w = &outcome.weights;
        let sigma_w = &cov * w;
        let vol = outcome.volatility;
        let contributions: Vec<f64> = (0..3).map(|i| w[i] * sigma_w[i] / vol).collect();

        let target = vol / 3.0;
        for contribution in contributions {
            assert_relative_eq!(contribution, target, epsilon = 1e-3);
        }
    }

    #[rstest]
    fn frontier_is_monotone_in_risk() {
        let (mu, cov) = three_asset();
        let points = PortfolioOptimizer::default()
            .efficient_frontier(&mu, &cov, 12)
            .unwrap();

        assert!(points.len() <= 12);
        assert!(points.len() >= 2);
        for pair in points.windows(2) {
            assert!(pair[1].expected_return >= pair[0].expected_return - 1e-9);
            assert!(pair[1].risk >= pair[0].risk - 1e-9);
        }
    }

    #[rstest]
    fn cvar_narrow_tail_is_no_better_than_wide() {
        let (mu, cov) = three_asset();
        let scenarios = ScenarioGenerator::with_seed(23)
            .generate(&mu, &cov, 8_000, 1.0)
            .unwrap();
        let weights = DVector::from_vec(vec![0.4, 0.35, 0.25]);

        let cvar_05 = PortfolioOptimizer::cvar(&weights, &scenarios, 0.05);
        let cvar_10 = PortfolioOptimizer::cvar(&weights, &scenarios, 0.10);
        assert!(cvar_05 <= cvar_10);
    }
}

proptest! {
    #[test]
    fn constraint_clamp_always_yields_valid_long_only_weights(
        raw in prop::collection::vec(-2.0f64..2.0, 2..12),
        max_weight in 0.1f64..1.0,
    ) {
        let weights = DVector::from_vec(raw);
        let constraints = Constraints {
            long_only: true,
            max_weight,
            min_weight: 0.01,
            allow_short_selling: false,
        };
        let clamped = PortfolioOptimizer::apply_constraints(&weights, &constraints);

        prop_assert!(clamped.iter().all(|w| *w >= 0.0));
        prop_assert!((clamped.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }
}
