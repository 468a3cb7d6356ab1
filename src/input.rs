//! Parsing and validation of the answers typed at the interactive prompts.

use crate::error::{AppError, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{BufRead, Write};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is a valid regex")
});

/// Parse the budget as a real number.
///
/// Any finite, non-negative number comes back unchanged. A budget is an amount
/// of cash to spend, so negative, infinite and NaN values are rejected.
pub fn check_budget_input(budget: &str) -> Result<f64> {
    let value: f64 = budget.trim().parse().map_err(|_| AppError::TypeMismatch {
        expected: "a number",
        got: budget.to_string(),
    })?;

    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidBudget(value));
    }
    Ok(value)
}

/// Parse the number of stocks. Only exact integers are accepted, so "10.0" fails.
pub fn check_number_of_stocks(stocks: &str) -> Result<usize> {
    let value: i64 = stocks.trim().parse().map_err(|_| AppError::TypeMismatch {
        expected: "an integer number",
        got: stocks.to_string(),
    })?;

    if value < 1 {
        return Err(AppError::InvalidStockCount(value));
    }
    usize::try_from(value).map_err(|_| AppError::InvalidStockCount(value))
}

/// Check that `date_string` is literally `YYYY-MM-DD` and names a real calendar day.
pub fn is_valid_date_format(date_string: &str) -> Result<NaiveDate> {
    if !DATE_PATTERN.is_match(date_string) {
        return Err(AppError::DateFormat(date_string.to_string()));
    }

    NaiveDate::parse_from_str(date_string, DATE_FORMAT)
        .map_err(|_| AppError::CalendarDate(date_string.to_string()))
}

/// Require `start` strictly before `end`; equal dates are rejected.
pub fn check_valid_start_end_date(start: NaiveDate, end: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    if start < end {
        Ok((start, end))
    } else {
        Err(AppError::DateOrder { start, end })
    }
}

/// Line-based question/answer over any reader and writer.
pub struct Prompter<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Print `question` without a newline and return the trimmed answer.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.writer, "{}", question)?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(AppError::InputClosed);
        }
        Ok(line.trim().to_string())
    }

    pub fn ask_budget(&mut self) -> Result<f64> {
        check_budget_input(&self.ask("Please input your budget amount ($): ")?)
    }

    pub fn ask_stock_count(&mut self) -> Result<usize> {
        check_number_of_stocks(&self.ask(
            "Specify the number of stocks you'll be entering symbols for: ",
        )?)
    }

    pub fn ask_date(&mut self, question: &str) -> Result<NaiveDate> {
        is_valid_date_format(&self.ask(question)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn budget_is_identity_for_numbers() {
        assert_eq!(check_budget_input("10000.2").unwrap(), 10000.2);
        assert_eq!(check_budget_input("10000.0").unwrap(), 10000.0);
        assert_eq!(check_budget_input("10000").unwrap(), 10000.0);
        assert_eq!(check_budget_input(" 250.5 ").unwrap(), 250.5);
        assert_eq!(check_budget_input("1e3").unwrap(), 1000.0);
    }

    #[test]
    fn budget_rejects_non_numbers() {
        for bad in ["abc", "", "12abc", "$100"] {
            assert!(
                matches!(check_budget_input(bad), Err(AppError::TypeMismatch { .. })),
                "{bad:?} should be a type mismatch"
            );
        }
    }

    #[test]
    fn budget_rejects_negative_and_non_finite() {
        assert!(matches!(check_budget_input("-5"), Err(AppError::InvalidBudget(_))));
        assert!(matches!(check_budget_input("inf"), Err(AppError::InvalidBudget(_))));
        assert!(matches!(check_budget_input("NaN"), Err(AppError::InvalidBudget(_))));
    }

    #[test]
    fn stock_count_requires_exact_integer() {
        assert_eq!(check_number_of_stocks("10").unwrap(), 10);
        assert_eq!(check_number_of_stocks(" 3\n").unwrap(), 3);

        for bad in ["abc", "10.2", "10.0", ""] {
            assert!(
                matches!(check_number_of_stocks(bad), Err(AppError::TypeMismatch { .. })),
                "{bad:?} should be a type mismatch"
            );
        }
    }

    #[test]
    fn stock_count_must_be_positive() {
        assert!(matches!(check_number_of_stocks("0"), Err(AppError::InvalidStockCount(0))));
        assert!(matches!(check_number_of_stocks("-2"), Err(AppError::InvalidStockCount(-2))));
    }

    #[test]
    fn date_format_and_calendar() {
        assert_eq!(is_valid_date_format("2024-02-15").unwrap().to_string(), "2024-02-15");
        assert_eq!(is_valid_date_format("2024-02-29").unwrap(), date("2024-02-29"));

        assert!(matches!(is_valid_date_format("abc"), Err(AppError::DateFormat(_))));
        assert!(matches!(is_valid_date_format("02/01/2023"), Err(AppError::DateFormat(_))));
        assert!(matches!(is_valid_date_format("2024-2-15"), Err(AppError::DateFormat(_))));
        assert!(matches!(is_valid_date_format("2024-02-15x"), Err(AppError::DateFormat(_))));

        assert!(matches!(is_valid_date_format("2024-03-32"), Err(AppError::CalendarDate(_))));
        assert!(matches!(is_valid_date_format("2023-02-29"), Err(AppError::CalendarDate(_))));
        assert!(matches!(is_valid_date_format("2024-13-01"), Err(AppError::CalendarDate(_))));
    }

    #[test]
    fn start_must_precede_end() {
        let (a, b) = (date("2024-02-01"), date("2024-02-15"));
        assert_eq!(check_valid_start_end_date(a, b).unwrap(), (a, b));
        assert!(matches!(check_valid_start_end_date(b, a), Err(AppError::DateOrder { .. })));
        assert!(matches!(check_valid_start_end_date(a, a), Err(AppError::DateOrder { .. })));
    }

    #[test]
    fn prompter_reads_answers_in_order() {
        let input = Cursor::new("1500\n2\n2024-01-02\n");
        let mut out = Vec::new();
        let mut prompter = Prompter::new(input, &mut out);

        assert_eq!(prompter.ask_budget().unwrap(), 1500.0);
        assert_eq!(prompter.ask_stock_count().unwrap(), 2);
        assert_eq!(prompter.ask_date("Date: ").unwrap(), date("2024-01-02"));
        assert!(matches!(prompter.ask("More? "), Err(AppError::InputClosed)));

        let shown = String::from_utf8(out).unwrap();
        assert!(shown.starts_with("Please input your budget amount ($): "));
        assert!(shown.ends_with("More? "));
    }
}
