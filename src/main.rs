mod backtest;
mod config;
mod error;
mod input;
mod optimizer;
mod portfolio;
mod report;
mod stocks;

use crate::backtest::{equally_distributed, validation};
use crate::config::{Cli, Settings};
use crate::error::Result;
use crate::input::{check_valid_start_end_date, Prompter};
use crate::portfolio::optimal_portfolio;
use crate::stocks::{check_symbol_existence, extract_stock_price, MarketData, YahooClient};
use chrono::NaiveDate;
use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

/// Ask for `stocks` symbols, rejecting the run at the first one with no data in range.
async fn input_each_stock_symbol<M, R, W>(
    prompter: &mut Prompter<R, W>,
    market: &M,
    stocks: usize,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<String>>
where
    M: MarketData + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut symbols = Vec::with_capacity(stocks);
    for i in 0..stocks {
        let answer = prompter.ask(&format!("Enter stock symbol #{}: ", i + 1))?;
        symbols.push(check_symbol_existence(market, &answer, start_date, end_date).await?);
    }
    Ok(symbols)
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::try_from(&cli)?;
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let budget = prompter.ask_budget()?;
    let stocks = prompter.ask_stock_count()?;
    let start_date = prompter.ask_date("Enter the start date for your calculations (YYYY-MM-DD): ")?;
    let end_date = prompter.ask_date("Enter the deadline for your purchases (YYYY-MM-DD): ")?;
    let (start_date, end_date) = check_valid_start_end_date(start_date, end_date)?;
    let validation_date = prompter.ask_date("Enter the date you want to validate data against (YYYY-MM-DD): ")?;
    let (end_date, validation_date) = check_valid_start_end_date(end_date, validation_date)?;

    let market = YahooClient::new(&settings)?;
    let symbols = input_each_stock_symbol(&mut prompter, &market, stocks, start_date, end_date).await?;
    info!("Symbols: {}", symbols.join(", "));

    println!("\nLoading ...");
    let table = extract_stock_price(&market, &symbols, start_date, end_date).await?;
    let portfolio = optimal_portfolio(&table, budget, &settings)?;

    println!("\nLoading ...");
    let validation_report = validation(
        &market,
        &symbols,
        budget,
        &portfolio.allocation,
        portfolio.leftover,
        validation_date,
    )
    .await?;
    println!("\nOptimal Portfolio:");
    print!("{}", report::format_optimal(&portfolio, &validation_report));

    let baseline = equally_distributed(
        stocks,
        budget,
        &portfolio.latest_prices,
        &validation_report.validation_prices,
    )?;
    print!("{}", report::format_baseline(&baseline));

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level())
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        debug!("{:?}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
