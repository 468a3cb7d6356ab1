//! Historical price retrieval
//!
//! This module handles:
//! - Fetching daily adjusted closes from the Yahoo Finance chart API
//! - Checking that a symbol has data over a date range
//! - Building the date-aligned price table used by the optimizer

use crate::config::Settings;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// One daily bar; `adj_close` is `None` when the provider reported no value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub adj_close: Option<f64>,
}

/// Adjusted closes with one row per date and one column per symbol.
/// Every cell holds a price: rows with a gap in any column are dropped on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    symbols: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
}

impl PriceTable {
    /// Outer-join the series on date, then drop incomplete rows.
    /// Repeated symbols keep their first series only.
    pub fn from_series(series: Vec<(String, Vec<PricePoint>)>) -> Self {
        let mut symbols: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<PricePoint>> = Vec::new();
        for (symbol, points) in series {
            if symbols.contains(&symbol) {
                continue;
            }
            symbols.push(symbol);
            columns.push(points);
        }

        let width = symbols.len();
        let mut joined: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for (col, points) in columns.iter().enumerate() {
            for point in points {
                let cell = point.adj_close.filter(|p| p.is_finite());
                joined.entry(point.date).or_insert_with(|| vec![None; width])[col] = cell;
            }
        }

        let total = joined.len();
        let mut dates = Vec::with_capacity(total);
        let mut rows = Vec::with_capacity(total);
        for (date, cells) in joined {
            if let Some(row) = cells.into_iter().collect::<Option<Vec<f64>>>() {
                dates.push(date);
                rows.push(row);
            }
        }

        if rows.len() < total {
            debug!("Dropped {} rows with missing prices", total - rows.len());
        }

        Self { symbols, dates, rows }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent price per symbol, or `None` for an empty table.
    pub fn last_row(&self) -> Option<&[f64]> {
        self.rows.last().map(Vec::as_slice)
    }

    /// Simple day-over-day returns, one row per consecutive pair of dates.
    pub fn daily_returns(&self) -> Vec<Vec<f64>> {
        self.rows
            .windows(2)
            .map(|pair| {
                pair[0]
                    .iter()
                    .zip(&pair[1])
                    .map(|(prev, next)| next / prev - 1.0)
                    .collect()
            })
            .collect()
    }
}

/// Source of daily price history.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Daily bars for `symbol` on dates in `[start, end)`. An unknown symbol may
    /// yield an error or an empty series.
    async fn daily_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>>;

    /// Combined fetch of every symbol, aligned on date.
    async fn history_table(&self, symbols: &[String], start: NaiveDate, end: NaiveDate) -> Result<PriceTable> {
        let mut seen = HashSet::new();
        let mut series = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !seen.insert(symbol.as_str()) {
                continue;
            }
            let points = self.daily_history(symbol, start, end).await?;
            series.push((symbol.clone(), points));
        }
        Ok(PriceTable::from_series(series))
    }
}

/// Yahoo Finance v8 chart API client.
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    fn chart_url(&self, symbol: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!("{}/v8/finance/chart/", self.base_url))
            .map_err(|e| AppError::MarketData(format!("invalid base url '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::MarketData(format!("base url '{}' cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .push(symbol);
        Ok(url)
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn daily_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        let url = self.chart_url(symbol)?;
        let period1 = start.and_time(NaiveTime::default()).and_utc().timestamp();
        let period2 = end.and_time(NaiveTime::default()).and_utc().timestamp();
        debug!("GET {} [{} .. {})", url, start, end);

        let resp = self
            .client
            .get(url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,split".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let points = read_history(symbol, status, &text, start, end)?;
        debug!("{}: {} daily bars", symbol, points.len());
        Ok(points)
    }
}

/// Turn a chart response into bars dated in `[start, end)`.
///
/// Yahoo reports unknown symbols as a 404 carrying a chart error body, so the
/// body is parsed before the status is judged.
fn read_history(
    symbol: &str,
    status: StatusCode,
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PricePoint>> {
    match parse_chart(body) {
        Ok(points) if status.is_success() => Ok(points
            .into_iter()
            .filter(|p| p.date >= start && p.date < end)
            .collect()),
        Ok(_) => Err(AppError::MarketData(format!(
            "something went wrong when requesting {} [CODE: {}]",
            symbol, status
        ))),
        Err(e) => {
            if !status.is_success() {
                warn!("{} request failed with status {}", symbol, status);
            }
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default, rename = "gmtoffset")]
    gmt_offset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
    #[serde(default)]
    adjclose: Option<Vec<AdjCloseColumn>>,
}

#[derive(Debug, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseColumn {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Extract daily adjusted closes from a chart API body.
/// Falls back to the raw close when no adjusted column is present.
fn parse_chart(body: &str) -> Result<Vec<PricePoint>> {
    let response: ChartResponse = serde_json::from_str(body)?;

    if let Some(error) = response.chart.error {
        return Err(AppError::MarketData(format!("{}: {}", error.code, error.description)));
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };

    let prices = match result.indicators.adjclose.and_then(|a| a.into_iter().next()) {
        Some(column) => column.adjclose,
        None => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = DateTime::from_timestamp(ts + result.meta.gmt_offset, 0)
            .ok_or_else(|| AppError::MarketData(format!("invalid timestamp {}", ts)))?
            .date_naive();
        points.push(PricePoint {
            date,
            adj_close: prices.get(i).copied().flatten(),
        });
    }
    Ok(points)
}

/// Fail unless `symbol` has at least one price in `[start, end)`.
/// Returns the symbol, upper-cased and trimmed, on success.
pub async fn check_symbol_existence<M: MarketData + ?Sized>(
    market: &M,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    let not_found = || AppError::SymbolNotFound {
        symbol: symbol.clone(),
        start,
        end,
    };

    if symbol.is_empty() {
        return Err(not_found());
    }

    match market.daily_history(&symbol, start, end).await {
        Ok(points) if points.iter().any(|p| p.adj_close.is_some()) => Ok(symbol),
        Ok(_) => Err(not_found()),
        Err(e) => {
            debug!("{} lookup failed: {}", symbol, e);
            Err(not_found())
        }
    }
}

/// Fetch the aligned adjusted-close table for `symbols`.
///
/// Every symbol must report the same number of bars over the range; unequal
/// histories are rejected instead of being aligned.
pub async fn extract_stock_price<M: MarketData + ?Sized>(
    market: &M,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceTable> {
    if symbols.is_empty() {
        return Err(AppError::InvalidStockCount(0));
    }

    let mut lengths = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let points = market.daily_history(symbol, start, end).await?;
        lengths.push((symbol.as_str(), points.len()));
    }

    let first = lengths[0].1;
    if lengths.iter().any(|(_, len)| *len != first) {
        let detail = lengths
            .iter()
            .map(|(s, len)| format!("{}={}", s, len))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AppError::UnequalHistory(detail));
    }

    let table = market.history_table(symbols, start, end).await?;
    if table.is_empty() {
        warn!("No date between {} and {} has a price for every symbol", start, end);
    } else {
        info!(
            "Loaded {} aligned rows for {} symbols ({} .. {})",
            table.len(),
            table.symbols().len(),
            table.dates()[0],
            table.dates()[table.len() - 1]
        );
    }
    Ok(table)
}
