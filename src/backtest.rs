//! Pricing an allocation on a later date, and the equal-split comparison.

use crate::error::{AppError, Result};
use crate::portfolio::{calculate_portfolio_cost, Allocation, Prices};
use crate::stocks::MarketData;
use chrono::NaiveDate;
use tracing::info;

/// Money in, money out, and the difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub invested: f64,
    pub revenue: f64,
    pub profit: f64,
}

impl Outcome {
    fn new(invested: f64, revenue: f64) -> Self {
        Self {
            invested,
            revenue,
            profit: revenue - invested,
        }
    }

    /// Profit as a percentage of the amount invested; 0 when nothing was invested.
    pub fn profit_pct(&self) -> f64 {
        if self.invested == 0.0 {
            0.0
        } else {
            self.profit * 100.0 / self.invested
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub outcome: Outcome,
    /// Price of every symbol on the validation date
    pub validation_prices: Prices,
}

/// Price `allocation` on `validation_date` and compare with what it cost.
///
/// The amount invested is `budget - leftover`. Fails with `NoValidationData`
/// when the date has no complete row of prices, e.g. a weekend or holiday.
pub async fn validation<M: MarketData + ?Sized>(
    market: &M,
    symbols: &[String],
    budget: f64,
    allocation: &Allocation,
    leftover: f64,
    validation_date: NaiveDate,
) -> Result<ValidationReport> {
    let next_day = validation_date
        .succ_opt()
        .ok_or(AppError::NoValidationData(validation_date))?;

    let table = market.history_table(symbols, validation_date, next_day).await?;
    let Some(row) = table.rows().first() else {
        return Err(AppError::NoValidationData(validation_date));
    };
    let validation_prices: Prices = table.symbols().iter().cloned().zip(row.iter().copied()).collect();

    let revenue = calculate_portfolio_cost(allocation, &validation_prices);
    let outcome = Outcome::new(budget - leftover, revenue);
    info!(
        "Validation on {}: invested ${:.2}, worth ${:.2}",
        validation_date, outcome.invested, outcome.revenue
    );

    Ok(ValidationReport {
        outcome,
        validation_prices,
    })
}

#[derive(Debug, Clone)]
pub struct BaselineReport {
    pub allocation: Allocation,
    pub outcome: Outcome,
}

/// Split `budget` evenly over `stocks` slots and buy the nearest whole number
/// of shares of each symbol at its latest price.
///
/// Share counts are rounded half-to-even, not floored, so the amount invested
/// can land above or below the budget.
pub fn equally_distributed(
    stocks: usize,
    budget: f64,
    latest_prices: &Prices,
    validation_prices: &Prices,
) -> Result<BaselineReport> {
    if stocks == 0 {
        return Err(AppError::InvalidStockCount(0));
    }
    let each_stock_budget = budget / stocks as f64;

    let allocation: Allocation = latest_prices
        .iter()
        .map(|(symbol, price)| (symbol.clone(), (each_stock_budget / price).round_ties_even() as u64))
        .collect();

    if let Some(missing) = allocation.keys().find(|s| !validation_prices.contains_key(*s)) {
        return Err(AppError::MarketData(format!("no validation price for {}", missing)));
    }

    let invested = calculate_portfolio_cost(&allocation, latest_prices);
    let revenue = calculate_portfolio_cost(&allocation, validation_prices);

    Ok(BaselineReport {
        allocation,
        outcome: Outcome::new(invested, revenue),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stocks::fake::{day, series, FakeMarket};
    use crate::stocks::PricePoint;

    fn prices(pairs: &[(&str, f64)]) -> Prices {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn symbols() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[tokio::test]
    async fn validation_prices_allocation_on_date() {
        let market = FakeMarket::default()
            .with("A", series("2024-03-01", &[12.0, 13.0]))
            .with("B", series("2024-03-01", &[40.0, 41.0]));
        let allocation: Allocation = [("A".to_string(), 10), ("B".to_string(), 5)].into();

        let report = validation(&market, &symbols(), 1000.0, &allocation, 100.0, day("2024-03-02"))
            .await
            .unwrap();

        assert_eq!(report.validation_prices, prices(&[("A", 13.0), ("B", 41.0)]));
        assert_eq!(report.outcome.invested, 900.0);
        assert_eq!(report.outcome.revenue, 130.0 + 205.0);
        assert_eq!(report.outcome.profit, 335.0 - 900.0);
        assert!(report.outcome.profit_pct() < 0.0);
    }

    #[tokio::test]
    async fn validation_fails_without_prices() {
        let market = FakeMarket::default()
            .with("A", series("2024-03-01", &[12.0]))
            .with("B", vec![PricePoint { date: day("2024-03-01"), adj_close: None }]);
        let allocation: Allocation = [("A".to_string(), 1)].into();

        // Weekend: nothing at all
        let err = validation(&market, &symbols(), 100.0, &allocation, 0.0, day("2024-03-02"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoValidationData(d) if d == day("2024-03-02")));

        // One symbol without a price drops the only row
        let err = validation(&market, &symbols(), 100.0, &allocation, 0.0, day("2024-03-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoValidationData(_)));
    }

    #[tokio::test]
    async fn validation_propagates_fetch_errors() {
        let market = FakeMarket::default().with("A", series("2024-03-01", &[1.0])).failing("B");
        let err = validation(&market, &symbols(), 100.0, &Allocation::new(), 100.0, day("2024-03-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MarketData(_)));
    }

    #[test]
    fn equal_split_rounds_share_counts() {
        let latest = prices(&[("A", 30.0), ("B", 70.0)]);
        let later = prices(&[("A", 33.0), ("B", 60.0)]);

        let report = equally_distributed(2, 1000.0, &latest, &later).unwrap();

        // 500 / 30 = 16.67 -> 17, 500 / 70 = 7.14 -> 7
        assert_eq!(report.allocation, [("A".to_string(), 17), ("B".to_string(), 7)].into());
        assert_eq!(report.outcome.invested, 17.0 * 30.0 + 7.0 * 70.0);
        assert_eq!(report.outcome.revenue, 17.0 * 33.0 + 7.0 * 60.0);
        assert_eq!(report.outcome.profit, report.outcome.revenue - report.outcome.invested);
    }

    #[test]
    fn equal_split_ties_round_to_even_and_may_overspend_slice() {
        let latest = prices(&[("A", 100.0), ("B", 40.0)]);
        let report = equally_distributed(2, 500.0, &latest, &latest).unwrap();

        // 250 / 100 = 2.5 -> 2, 250 / 40 = 6.25 -> 6
        assert_eq!(report.allocation["A"], 2);
        assert_eq!(report.allocation["B"], 6);
        assert_eq!(report.outcome.profit, 0.0);

        let report = equally_distributed(1, 95.0, &prices(&[("A", 10.0)]), &prices(&[("A", 10.0)])).unwrap();
        // 9.5 -> 10 shares, 100 invested against a 95 slice
        assert_eq!(report.allocation["A"], 10);
        assert_eq!(report.outcome.invested, 100.0);
    }

    #[test]
    fn equal_split_divides_by_stock_count() {
        // Two requested slots but one distinct symbol: only half the budget is used
        let latest = prices(&[("A", 10.0)]);
        let report = equally_distributed(2, 1000.0, &latest, &latest).unwrap();
        assert_eq!(report.allocation["A"], 50);
    }

    #[test]
    fn equal_split_requires_validation_prices_and_stocks() {
        let latest = prices(&[("A", 10.0)]);
        assert!(equally_distributed(1, 100.0, &latest, &Prices::new()).is_err());
        assert!(matches!(
            equally_distributed(0, 100.0, &latest, &latest),
            Err(AppError::InvalidStockCount(0))
        ));
    }

    #[test]
    fn percentage_is_zero_without_investment() {
        assert_eq!(Outcome::new(0.0, 0.0).profit_pct(), 0.0);
        assert_eq!(Outcome::new(200.0, 250.0).profit_pct(), 25.0);
    }
}
