//! Command-line flags and the runtime settings derived from them.

use crate::error::{AppError, Result};
use clap::Parser;
use std::time::Duration;
use tracing::Level;

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const REQUEST_TIMEOUT_SECS: u64 = 10;
// Annual risk-free rate used in the Sharpe ratio
const RISK_FREE_RATE: f64 = 0.02;
// Trading days per year, used to annualize daily statistics
const TRADING_DAYS: u32 = 252;
const WEIGHT_CUTOFF: f64 = 1e-4;
const WEIGHT_ROUNDING: u32 = 5;
// Beyond this many decimals rounding is a no-op on f64 weights
const MAX_WEIGHT_ROUNDING: u32 = 15;

/// Interactive max-Sharpe portfolio allocator with a one-day backtest.
#[derive(Parser, Debug)]
#[command(name = "sharpe_alloc")]
#[command(version)]
#[command(about = "Allocate a budget across stocks by maximum Sharpe ratio and backtest it")]
pub struct Cli {
    /// Verbosity level (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Root URL of the Yahoo Finance chart API
    #[arg(long, default_value = YAHOO_BASE_URL)]
    pub base_url: String,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Annual risk-free rate (e.g. 0.02 for 2%)
    #[arg(long, default_value_t = RISK_FREE_RATE)]
    pub risk_free_rate: f64,

    /// Trading periods per year
    #[arg(long, default_value_t = TRADING_DAYS)]
    pub frequency: u32,

    /// Weights below this are treated as zero
    #[arg(long, default_value_t = WEIGHT_CUTOFF)]
    pub weight_cutoff: f64,

    /// Decimal places kept when cleaning weights
    #[arg(long, default_value_t = WEIGHT_ROUNDING)]
    pub weight_rounding: u32,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub timeout: Duration,
    pub risk_free_rate: f64,
    pub frequency: u32,
    pub weight_cutoff: f64,
    pub weight_rounding: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: YAHOO_BASE_URL.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            risk_free_rate: RISK_FREE_RATE,
            frequency: TRADING_DAYS,
            weight_cutoff: WEIGHT_CUTOFF,
            weight_rounding: WEIGHT_ROUNDING,
        }
    }
}

impl TryFrom<&Cli> for Settings {
    type Error = AppError;

    fn try_from(cli: &Cli) -> Result<Self> {
        if cli.timeout_secs == 0 {
            return Err(AppError::InvalidConfig("timeout must be at least 1 second".into()));
        }
        if cli.frequency == 0 {
            return Err(AppError::InvalidConfig("frequency must be positive".into()));
        }
        if !cli.risk_free_rate.is_finite() {
            return Err(AppError::InvalidConfig(format!(
                "risk-free rate must be finite, got {}",
                cli.risk_free_rate
            )));
        }
        if cli.weight_cutoff.is_nan() || cli.weight_cutoff < 0.0 {
            return Err(AppError::InvalidConfig(format!(
                "weight cutoff must be non-negative, got {}",
                cli.weight_cutoff
            )));
        }
        if cli.weight_rounding > MAX_WEIGHT_ROUNDING {
            return Err(AppError::InvalidConfig(format!(
                "weight rounding must be at most {} decimals, got {}",
                MAX_WEIGHT_ROUNDING, cli.weight_rounding
            )));
        }

        Ok(Settings {
            base_url: cli.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cli.timeout_secs),
            risk_free_rate: cli.risk_free_rate,
            frequency: cli.frequency,
            weight_cutoff: cli.weight_cutoff,
            weight_rounding: cli.weight_rounding,
        })
    }
}
