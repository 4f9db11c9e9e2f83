//! Optimizer error taxonomy
//!
//! Fatal errors (`UnknownMethod`, `DimensionMismatch`, `InvalidRequest`)
//! surface to the caller; `Infeasible` is fatal for a single optimization but
//! skippable inside a frontier sweep; `InsufficientData` is soft and degrades
//! the affected symbol to documented defaults instead of propagating.

use services_common::Symbol;
use thiserror::Error;

/// Errors produced by the estimation and optimization engines
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Caller requested a method name that is not registered
    #[error("unknown method: {name}")]
    UnknownMethod { name: String },

    /// A symbol has too little usable history to estimate from
    #[error("insufficient price history for {symbol}: {points} usable points")]
    InsufficientData { symbol: Symbol, points: usize },

    /// Return vector and covariance matrix sizes disagree
    #[error("return vector has {returns} entries, covariance is {rows}x{cols}")]
    DimensionMismatch {
        returns: usize,
        rows: usize,
        cols: usize,
    },

    /// The requested optimization has no solution under the given inputs
    #[error("optimization infeasible: {detail}")]
    Infeasible { detail: String },

    /// Request parameter outside the supported range
    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },
}

impl OptimizerError {
    /// Dimension check shared by every engine entry point
    pub fn check_dimensions(
        returns: usize,
        rows: usize,
        cols: usize,
    ) -> Result<(), OptimizerError> {
        if returns != rows || rows != cols {
            return Err(OptimizerError::DimensionMismatch {
                returns,
                rows,
                cols,
            });
        }
        Ok(())
    }
}
