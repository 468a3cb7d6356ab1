//! Mean-variance estimation and the long-only maximum-Sharpe solve.

use crate::error::{AppError, Result};
use crate::stocks::PriceTable;
use cvxrust::prelude::*;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Fractional portfolio weight per symbol.
pub type Weights = BTreeMap<String, f64>;

const MIN_ROWS: usize = 3;

/// Daily simple returns, one row per consecutive pair of dates and one column per symbol.
fn daily_returns(table: &PriceTable) -> Result<DMatrix<f64>> {
    if table.len() < MIN_ROWS {
        return Err(AppError::InsufficientHistory {
            needed: MIN_ROWS,
            got: table.len(),
        });
    }
    let returns = table.daily_returns();
    let width = table.symbols().len();
    Ok(DMatrix::from_fn(returns.len(), width, |r, c| returns[r][c]))
}

/// Annualized compounded mean of daily returns per symbol:
/// `(prod(1 + r)) ^ (frequency / n) - 1`.
pub fn mean_historical_return(table: &PriceTable, frequency: u32) -> Result<DVector<f64>> {
    let returns = daily_returns(table)?;
    let n = returns.nrows() as f64;

    Ok(DVector::from_iterator(
        returns.ncols(),
        returns.column_iter().map(|col| {
            let growth: f64 = col.iter().map(|r| 1.0 + r).product();
            growth.powf(frequency as f64 / n) - 1.0
        }),
    ))
}

/// Annualized sample covariance of daily returns (n - 1 denominator).
pub fn sample_cov(table: &PriceTable, frequency: u32) -> Result<DMatrix<f64>> {
    let mut returns = daily_returns(table)?;
    let n = returns.nrows();

    for mut col in returns.column_iter_mut() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
    }
    let cov = returns.transpose() * &returns;
    Ok(cov * (frequency as f64 / (n - 1) as f64))
}

/// Expected annual return, volatility and Sharpe ratio of a weight vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Performance {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

/// Long-only, fully-invested portfolio optimizer over expected returns `mu`
/// and covariance `cov`.
#[derive(Debug, Clone)]
pub struct EfficientFrontier {
    symbols: Vec<String>,
    mu: DVector<f64>,
    cov: DMatrix<f64>,
    weights: Option<DVector<f64>>,
}

impl EfficientFrontier {
    pub fn new(symbols: Vec<String>, mu: DVector<f64>, cov: DMatrix<f64>) -> Result<Self> {
        let n = symbols.len();
        if n == 0 {
            return Err(AppError::Optimization("no assets to optimize".into()));
        }
        if mu.len() != n || cov.nrows() != n || cov.ncols() != n {
            return Err(AppError::Optimization(format!(
                "dimension mismatch: {} symbols, {} returns, {}x{} covariance",
                n,
                mu.len(),
                cov.nrows(),
                cov.ncols()
            )));
        }
        if mu.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
            return Err(AppError::Optimization("expected returns or covariance contain non-finite values".into()));
        }

        Ok(Self {
            symbols,
            mu,
            cov,
            weights: None,
        })
    }

    /// Solve for the weights maximizing `(w.mu - rf) / sqrt(w' cov w)` with
    /// `w >= 0` and `sum(w) = 1`.
    pub fn max_sharpe(&mut self, risk_free_rate: f64) -> Result<Weights> {
        let w = solve_max_sharpe(&self.mu, &self.cov, risk_free_rate)?;
        let weights = self.to_map(&w);
        self.weights = Some(w);
        Ok(weights)
    }

    /// Solved weights as returned by the optimizer, before any cleaning.
    pub fn weights(&self) -> Result<Weights> {
        let w = self.solved()?;
        Ok(self.to_map(w))
    }

    /// Zero out weights below `cutoff` and round the rest to `rounding` decimals.
    /// Each weight is rounded on its own, so the result may sum to slightly
    /// more or less than 1.
    pub fn clean_weights(&self, cutoff: f64, rounding: u32) -> Result<Weights> {
        let w = self.solved()?;
        let scale = 10f64.powi(rounding as i32);
        let cleaned = w.map(|x| if x.abs() < cutoff { 0.0 } else { (x * scale).round_ties_even() / scale });
        Ok(self.to_map(&cleaned))
    }

    pub fn portfolio_performance(&self, risk_free_rate: f64) -> Result<Performance> {
        let w = self.solved()?;
        let expected_return = w.dot(&self.mu);
        let volatility = variance(w, &self.cov).max(0.0).sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            (expected_return - risk_free_rate) / volatility
        } else {
            0.0
        };

        Ok(Performance {
            expected_return,
            volatility,
            sharpe_ratio,
        })
    }

    fn solved(&self) -> Result<&DVector<f64>> {
        self.weights
            .as_ref()
            .ok_or_else(|| AppError::Optimization("weights not yet computed".into()))
    }

    fn to_map(&self, w: &DVector<f64>) -> Weights {
        self.symbols.iter().cloned().zip(w.iter().copied()).collect()
    }

    #[cfg(test)]
    pub(crate) fn solved_with(symbols: &[&str], weights: &[f64]) -> Self {
        let n = symbols.len();
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            mu: DVector::zeros(n),
            cov: DMatrix::zeros(n, n),
            weights: Some(DVector::from_column_slice(weights)),
        }
    }
}

fn variance(w: &DVector<f64>, cov: &DMatrix<f64>) -> f64 {
    w.dot(&(cov * w))
}

/// Max-Sharpe as a convex QP: minimize `y' cov y` subject to
/// `(mu - rf)' y = 1` and `y >= 0`, then `w = y / sum(y)`.
fn solve_max_sharpe(mu: &DVector<f64>, cov: &DMatrix<f64>, rf: f64) -> Result<DVector<f64>> {
    let n = mu.len();

    if mu.iter().all(|m| *m <= rf) {
        return Err(AppError::Optimization(format!(
            "at least one of the assets must have an expected return exceeding the risk-free rate ({})",
            rf
        )));
    }
    if let Some(i) = (0..n).find(|&i| mu[i] > rf && cov[(i, i)] <= 0.0) {
        return Err(AppError::Optimization(format!(
            "asset #{} has zero volatility; the Sharpe ratio is unbounded",
            i + 1
        )));
    }

    let excess = constant_vec(mu.iter().map(|m| m - rf).collect());
    // cov is symmetric, so column-major order is also row-major order
    let sigma = constant_matrix(cov.iter().copied().collect(), n, n);
    let y = variable(n);
    let risk = quad_form(&y, &sigma);

    let solution = Problem::minimize(risk)
        .subject_to([
            constraint!((dot(&excess, &y)) == 1.0),
            constraint!(y >= 0.0),
        ])
        .solve()
        .map_err(|e| AppError::Optimization(format!("max-Sharpe solve failed: {:?}", e)))?;

    let solved = &solution[&y];
    let y_star = DVector::from_fn(n, |i, _| solved[(i, 0)].max(0.0));
    let total = y_star.sum();
    if !(total > 0.0) {
        return Err(AppError::Optimization("solver returned an empty portfolio".into()));
    }
    let w = y_star / total;
    debug!("max-Sharpe solve: sum(y) = {:.6}", total);

    let var = variance(&w, cov);
    if !(var > 0.0) {
        return Err(AppError::Optimization(
            "optimal portfolio has zero volatility; the Sharpe ratio is unbounded".into(),
        ));
    }
    info!("Optimal Sharpe ratio {:.4}", (w.dot(mu) - rf) / var.sqrt());
    Ok(w)
}
