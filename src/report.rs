//! Text rendering of the results shown at the end of a run.

use crate::backtest::{BaselineReport, Outcome, ValidationReport};
use crate::optimizer::{Performance, Weights};
use crate::portfolio::{Allocation, OptimalPortfolio};
use std::fmt::Write;

fn one_decimal(value: f64) -> String {
    // avoid printing "-0.0"
    format!("{:.1}", if value == 0.0 { 0.0 } else { value })
}

/// `{AAPL: 10, MSFT: 3}`
pub fn format_allocation(allocation: &Allocation) -> String {
    let body = allocation
        .iter()
        .map(|(symbol, qty)| format!("{}: {}", symbol, qty))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

/// `{AAPL: 0.61234, MSFT: 0.38766}`
pub fn format_weights(weights: &Weights) -> String {
    let body = weights
        .iter()
        .map(|(symbol, w)| format!("{}: {}", symbol, w))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

pub fn format_performance(performance: &Performance) -> String {
    format!(
        "Expected annual return: {}%\nAnnual volatility: {}%\nSharpe Ratio: {:.2}\n",
        one_decimal(performance.expected_return * 100.0),
        one_decimal(performance.volatility * 100.0),
        performance.sharpe_ratio
    )
}

/// Profit or loss in dollars and percent; losses are shown as positive amounts.
pub fn format_outcome(outcome: &Outcome) -> String {
    let (label, amount, pct) = if outcome.profit >= 0.0 {
        ("Profit", outcome.profit, outcome.profit_pct())
    } else {
        ("Loss", -outcome.profit, -outcome.profit_pct())
    };
    format!(
        "{label} ($): {}\n{label} (%): {}\n",
        one_decimal(amount),
        one_decimal(pct)
    )
}

/// Performance, allocation, amounts and profit/loss of the optimized portfolio.
pub fn format_optimal(portfolio: &OptimalPortfolio, validation: &ValidationReport) -> String {
    let mut out = String::new();
    out.push_str(&format_performance(&portfolio.performance));
    let _ = writeln!(out, "Weights: {}", format_weights(&portfolio.weights));
    let _ = writeln!(out, "Allocation: {}", format_allocation(&portfolio.allocation));
    let _ = writeln!(out, "Investment amount ($): {}", one_decimal(validation.outcome.invested));
    let _ = writeln!(out, "Leftover amount ($): {}", one_decimal(portfolio.leftover));
    out.push_str(&format_outcome(&validation.outcome));
    out
}

pub fn format_baseline(baseline: &BaselineReport) -> String {
    let mut out = String::from("\nEqually distributed investment amount:\n");
    let _ = writeln!(out, "Allocation: {}", format_allocation(&baseline.allocation));
    let _ = writeln!(out, "Investment amount ($): {}", one_decimal(baseline.outcome.invested));
    out.push_str(&format_outcome(&baseline.outcome));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Prices;

    fn outcome(invested: f64, revenue: f64) -> Outcome {
        Outcome {
            invested,
            revenue,
            profit: revenue - invested,
        }
    }

    #[test]
    fn profit_and_loss_wording() {
        assert_eq!(format_outcome(&outcome(900.0, 945.0)), "Profit ($): 45.0\nProfit (%): 5.0\n");
        assert_eq!(format_outcome(&outcome(800.0, 700.0)), "Loss ($): 100.0\nLoss (%): 12.5\n");
        assert_eq!(format_outcome(&outcome(0.0, 0.0)), "Profit ($): 0.0\nProfit (%): 0.0\n");
    }

    #[test]
    fn allocation_rendering() {
        let allocation: Allocation = [("MSFT".to_string(), 3), ("AAPL".to_string(), 10)].into();
        assert_eq!(format_allocation(&allocation), "{AAPL: 10, MSFT: 3}");
        assert_eq!(format_allocation(&Allocation::new()), "{}");
    }

    #[test]
    fn optimal_and_baseline_sections() {
        let portfolio = OptimalPortfolio {
            weights: [("A".to_string(), 1.0)].into(),
            performance: Performance {
                expected_return: 0.1234,
                volatility: 0.2,
                sharpe_ratio: 0.517,
            },
            allocation: [("A".to_string(), 9)].into(),
            leftover: 10.04,
            latest_prices: [("A".to_string(), 110.0)].into(),
        };
        let validation = ValidationReport {
            outcome: outcome(989.96, 900.0),
            validation_prices: Prices::new(),
        };

        let text = format_optimal(&portfolio, &validation);
        assert_eq!(
            text,
            "Expected annual return: 12.3%\n\
             Annual volatility: 20.0%\n\
             Sharpe Ratio: 0.52\n\
             Weights: {A: 1}\n\
             Allocation: {A: 9}\n\
             Investment amount ($): 990.0\n\
             Leftover amount ($): 10.0\n\
             Loss ($): 90.0\n\
             Loss (%): 9.1\n"
        );

        let baseline = BaselineReport {
            allocation: [("A".to_string(), 9)].into(),
            outcome: outcome(990.0, 1089.0),
        };
        let text = format_baseline(&baseline);
        assert!(text.starts_with("\nEqually distributed investment amount:\n"));
        assert!(text.contains("Investment amount ($): 990.0\n"));
        assert!(text.ends_with("Profit ($): 99.0\nProfit (%): 10.0\n"));
    }
}
