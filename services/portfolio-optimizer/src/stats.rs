//! Statistics primitives shared by the estimation and optimization engines

use crate::errors::OptimizerError;
use nalgebra::DMatrix;
use statrs::statistics::Statistics;

/// Sample mean, 0.0 for an empty slice
#[must_use]
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().mean()
}

/// Sample variance with Bessel's correction, 0.0 below two points
#[must_use]
pub fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    xs.iter().variance()
}

/// Sample covariance of two equally long slices, 0.0 below two points
#[must_use]
pub fn sample_covariance(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let sum: f64 = xs[..n]
        .iter()
        .zip(&ys[..n])
        .map(|(x, y)| (x - mx) * (y - my))
        .sum();
    sum / (n - 1) as f64
}

/// Align two return series on their overlapping tail
///
/// Histories of different lengths are compared over the window both cover,
/// which is the most recent `min(len)` observations of each.
#[must_use]
pub fn aligned_tails<'a>(xs: &'a [f64], ys: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let n = xs.len().min(ys.len());
    (&xs[xs.len() - n..], &ys[ys.len() - n..])
}

/// Tail slice of at most `window` most recent observations
#[must_use]
pub fn tail(xs: &[f64], window: usize) -> &[f64] {
    let start = xs.len().saturating_sub(window);
    &xs[start..]
}

/// Lower-triangular Cholesky factor of a covariance matrix
///
/// Short histories routinely produce matrices that are only just positive
/// semi-definite; escalating diagonal jitter is applied before giving up.
pub fn cholesky_factor(cov: &DMatrix<f64>) -> Result<DMatrix<f64>, OptimizerError> {
    if let Some(chol) = nalgebra::Cholesky::new(cov.clone()) {
        return Ok(chol.l());
    }

    let scale = cov.diagonal().mean().abs().max(f64::EPSILON);
    let mut jitter = scale * 1e-10;
    for _ in 0..6 {
        let mut adjusted = cov.clone();
        for i in 0..adjusted.nrows() {
            adjusted[(i, i)] += jitter;
        }
        if let Some(chol) = nalgebra::Cholesky::new(adjusted) {
            tracing::debug!(jitter, "cholesky succeeded after diagonal jitter");
            return Ok(chol.l());
        }
        jitter *= 100.0;
    }

    Err(OptimizerError::Infeasible {
        detail: "covariance matrix is not positive semi-definite".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_variance() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(mean(&xs), 2.5);
        assert_relative_eq!(sample_variance(&xs), 5.0 / 3.0, epsilon = 1e-12);
        assert_eq!(sample_variance(&[1.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_sample_covariance_matches_variance() {
        let xs = [0.01, -0.02, 0.03, 0.005];
        assert_relative_eq!(
            sample_covariance(&xs, &xs),
            sample_variance(&xs),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_aligned_tails_takes_recent_window() {
        let long = [1.0, 2.0, 3.0, 4.0, 5.0];
        let short = [10.0, 20.0];
        let (a, b) = aligned_tails(&long, &short);
        assert_eq!(a, &[4.0, 5.0]);
        assert_eq!(b, &[10.0, 20.0]);
    }

    #[test]
    fn test_cholesky_recovers_diagonal() {
        let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.01]);
        let l = cholesky_factor(&cov).unwrap();
        assert_relative_eq!(l[(0, 0)], 0.2, epsilon = 1e-12);
        assert_relative_eq!(l[(1, 1)], 0.1, epsilon = 1e-12);
        assert_relative_eq!(l[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        // Strongly negative-definite input stays unfactorable after jitter.
        let cov = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
        assert!(cholesky_factor(&cov).is_err());
    }
}
