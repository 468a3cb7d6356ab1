//! Error types for the allocation pipeline.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Please input {expected}. Got {got:?}")]
    TypeMismatch { expected: &'static str, got: String },

    #[error("Budget must be a non-negative finite amount, got {0}")]
    InvalidBudget(f64),

    #[error("Number of stocks must be at least 1, got {0}")]
    InvalidStockCount(i64),

    #[error("Please input date in format YYYY-mm-dd. Got {0:?}")]
    DateFormat(String),

    #[error("The input date does not exist: {0}")]
    CalendarDate(String),

    #[error("Start date must be before end date ({start} is not before {end})")]
    DateOrder { start: NaiveDate, end: NaiveDate },

    #[error("{symbol} might not exist or data not available for the period {start} to {end}")]
    SymbolNotFound {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("The length of history data are not equal: {0}")]
    UnequalHistory(String),

    #[error("No available data for validation on {0}. Please choose another date.")]
    NoValidationData(NaiveDate),

    #[error("Not enough price history: need at least {needed} rows, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input closed before all answers were given")]
    InputClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
