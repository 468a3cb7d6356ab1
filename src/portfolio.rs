use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::optimizer::{mean_historical_return, sample_cov, EfficientFrontier, Performance, Weights};
use crate::stocks::PriceTable;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Whole-share count per symbol.
pub type Allocation = BTreeMap<String, u64>;
/// One price per symbol.
pub type Prices = BTreeMap<String, f64>;

// Maximum number of unaffordable symbols skipped before the second round gives up
const MAX_SKIPS: usize = 10;
// Slack allowed on the total weight for floating-point error
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Last row of the aligned table, keyed by symbol.
pub fn get_latest_prices(table: &PriceTable) -> Result<Prices> {
    let row = table.last_row().ok_or(AppError::InsufficientHistory { needed: 1, got: 0 })?;
    Ok(table.symbols().iter().cloned().zip(row.iter().copied()).collect())
}

/// Calculate the total cost of an allocation at `prices`.
/// Symbols without a price contribute nothing.
pub fn calculate_portfolio_cost(allocation: &Allocation, prices: &Prices) -> f64 {
    allocation
        .iter()
        .map(|(symbol, qty)| prices.get(symbol).map_or(0.0, |p| p * (*qty as f64)))
        .sum()
}

/// Converts continuous weights into whole shares bought with a fixed amount of cash.
#[derive(Debug, Clone)]
pub struct DiscreteAllocation {
    // Positive weights only, largest first
    weights: Vec<(String, f64)>,
    prices: Vec<f64>,
    total_portfolio_value: f64,
}

impl DiscreteAllocation {
    pub fn new(weights: &Weights, latest_prices: &Prices, total_portfolio_value: f64) -> Result<Self> {
        if !total_portfolio_value.is_finite() || total_portfolio_value < 0.0 {
            return Err(AppError::InvalidBudget(total_portfolio_value));
        }

        let mut held: Vec<(String, f64)> = Vec::with_capacity(weights.len());
        for (symbol, &weight) in weights {
            if weight < 0.0 || !weight.is_finite() {
                return Err(AppError::Optimization(format!(
                    "weight for {} must be non-negative, got {}",
                    symbol, weight
                )));
            }
            if weight > 0.0 {
                held.push((symbol.clone(), weight));
            }
        }
        let total_weight: f64 = held.iter().map(|(_, w)| w).sum();
        if total_weight > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(AppError::Optimization(format!(
                "weights must sum to at most 1, got {}",
                total_weight
            )));
        }
        held.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut prices = Vec::with_capacity(held.len());
        for (symbol, _) in &held {
            match latest_prices.get(symbol) {
                Some(&p) if p.is_finite() && p > 0.0 => prices.push(p),
                other => {
                    return Err(AppError::Optimization(format!(
                        "no usable latest price for {} ({:?})",
                        symbol, other
                    )))
                }
            }
        }

        Ok(Self {
            weights: held,
            prices,
            total_portfolio_value,
        })
    }

    /// Greedy whole-share allocation; returns the shares bought and the unspent cash.
    ///
    /// The first round buys `floor(weight * total / price)` shares of each symbol,
    /// largest weight first, clipped to the cash left. The second round spends the
    /// remainder one share at a time on the symbol whose held weight lags its
    /// target the most.
    pub fn greedy_portfolio(&self) -> (Allocation, f64) {
        let n = self.weights.len();
        let mut shares = vec![0u64; n];
        let mut available = self.total_portfolio_value;

        // First round
        for i in 0..n {
            let price = self.prices[i];
            let target = self.weights[i].1 * self.total_portfolio_value / price;
            let mut qty = target.floor() as u64;
            if qty as f64 * price > available {
                qty = (available / price).floor() as u64;
                while qty > 0 && qty as f64 * price > available {
                    qty -= 1;
                }
            }
            shares[i] = qty;
            available -= qty as f64 * price;
        }

        // Second round
        let mut bought = 0usize;
        while available > 0.0 && n > 0 {
            let held_value: Vec<f64> = shares.iter().zip(&self.prices).map(|(s, p)| *s as f64 * p).collect();
            let invested: f64 = held_value.iter().sum();
            let mut deficit: Vec<f64> = self
                .weights
                .iter()
                .zip(&held_value)
                .map(|((_, ideal), value)| {
                    let current = if invested > 0.0 { value / invested } else { 0.0 };
                    ideal - current
                })
                .collect();

            let mut idx = argmax(&deficit);
            let mut skips = 0;
            while self.prices[idx] > available {
                deficit[idx] = 0.0;
                idx = argmax(&deficit);
                if deficit[idx] < 0.0 || skips == MAX_SKIPS {
                    break;
                }
                skips += 1;
            }
            if deficit[idx] <= 0.0 || skips == MAX_SKIPS || self.prices[idx] > available {
                break;
            }

            shares[idx] += 1;
            available -= self.prices[idx];
            bought += 1;
        }
        debug!("Second round bought {} extra shares", bought);

        let allocation: Allocation = self
            .weights
            .iter()
            .zip(shares)
            .filter(|(_, qty)| *qty > 0)
            .map(|((symbol, _), qty)| (symbol.clone(), qty))
            .collect();

        let spent = self.total_portfolio_value - available;
        if available < 0.0 {
            warn!("Allocation overspent by ${:.6}", -available);
        }
        info!(
            "Portfolio cost: ${:.2} / ${:.2} (${:.2} remaining)",
            spent, self.total_portfolio_value, available
        );

        (allocation, available)
    }
}

/// First index of the largest value.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Everything the optimal-allocation step produces.
#[derive(Debug, Clone)]
pub struct OptimalPortfolio {
    pub weights: Weights,
    pub performance: Performance,
    pub allocation: Allocation,
    pub leftover: f64,
    pub latest_prices: Prices,
}

/// Estimate returns and covariance from `table`, solve for the maximum-Sharpe
/// weights and buy whole shares with `budget`.
pub fn optimal_portfolio(table: &PriceTable, budget: f64, settings: &Settings) -> Result<OptimalPortfolio> {
    let mu = mean_historical_return(table, settings.frequency)?;
    let cov = sample_cov(table, settings.frequency)?;

    let mut ef = EfficientFrontier::new(table.symbols().to_vec(), mu, cov)?;
    ef.max_sharpe(settings.risk_free_rate)?;

    allocate(&ef, get_latest_prices(table)?, budget, settings)
}

/// Whole shares are bought from the solver's raw weights; the cleaned
/// weights are only reported.
fn allocate(ef: &EfficientFrontier, latest_prices: Prices, budget: f64, settings: &Settings) -> Result<OptimalPortfolio> {
    let raw_weights = ef.weights()?;
    let weights = ef.clean_weights(settings.weight_cutoff, settings.weight_rounding)?;
    let performance = ef.portfolio_performance(settings.risk_free_rate)?;

    let (allocation, leftover) = DiscreteAllocation::new(&raw_weights, &latest_prices, budget)?.greedy_portfolio();

    Ok(OptimalPortfolio {
        weights,
        performance,
        allocation,
        leftover,
        latest_prices,
    })
}
