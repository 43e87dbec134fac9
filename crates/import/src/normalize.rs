//! Canonical comparison keys for free-form table fields.
//!
//! Everything here is a pure function of its input. Codes become digit
//! strings, free text becomes accent-free upper case, money becomes a
//! 2-decimal `Decimal`.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use quitus_core::Money;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Marker appended to every amount that passed through reconciliation.
pub const MONEY_SENTINEL: &str = "4444";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid amount: '{0}'")]
    Amount(String),
    #[error("Invalid date: '{0}'")]
    Date(String),
}

pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strips diacritics, upper-cases, drops punctuation other than `/ & -` and
/// collapses whitespace.
pub fn clean_text(text: &str) -> String {
    let kept: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_uppercase)
        .filter_map(|c| {
            if c.is_alphanumeric() || matches!(c, '/' | '&' | '-') {
                Some(c)
            } else if c.is_whitespace() {
                Some(' ')
            } else {
                None
            }
        })
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Branch codes exported with a stray fifth digit are cut back to four:
/// leading `0` drops the first digit, a code not starting with `1` drops the
/// last digit, anything else keeps the first four. Other lengths are left
/// alone. This is an empirical rule, not a banking standard.
// TODO: confirm the rule against the bank's branch directory once we have
// one; until then every five-digit hit is logged at debug level.
pub fn normalize_branch_code(text: &str) -> String {
    let digits = digits_only(text);
    if digits.len() != 5 {
        return digits;
    }

    // "drop the last digit" and "keep the first four" coincide at length 5.
    let fixed = if digits.starts_with('0') {
        digits[1..].to_string()
    } else {
        digits[..4].to_string()
    };
    tracing::debug!(raw = %digits, normalized = %fixed, "five-digit branch code heuristic applied");
    fixed
}

/// Canonical join key: digits without leading zeros, `"0"` when nothing is left.
pub fn account_key_primary(text: &str) -> String {
    let digits = digits_only(text);
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fallback join key: the last eight digits.
pub fn account_key_fallback(text: &str) -> String {
    let digits = digits_only(text);
    let start = digits.len().saturating_sub(8);
    digits[start..].to_string()
}

/// Parses `1.234,56`, `1234.56`, `1,234.56` and `R$ 1.234,56`, rounded to
/// two decimal places.
pub fn money_to_decimal(text: &str) -> Result<Decimal, ParseError> {
    let err = || ParseError::Amount(text.to_string());

    let compact: String = text
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let (negative, body) = match compact.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, compact.as_str()),
    };

    if body.is_empty()
        || !body.starts_with(|c: char| c.is_ascii_digit())
        || !body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return Err(err());
    }

    let last_comma = body.rfind(',');
    let last_dot = body.rfind('.');
    let canonical = match (last_comma, last_dot) {
        // Both present: the rightmost separator is the decimal one.
        (Some(c), Some(d)) if c > d => body.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => body.replace(',', ""),
        (Some(_), None) if body.matches(',').count() == 1 => body.replace(',', "."),
        (Some(_), None) => body.replace(',', ""),
        (None, Some(_)) if body.matches('.').count() > 1 => body.replace('.', ""),
        _ => body.to_string(),
    };

    let value = Decimal::from_str(&canonical).map_err(|_| err())?;
    let value = if negative { -value } else { value };
    Ok(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Whole cents of an amount, `None` when it does not fit.
pub fn decimal_to_cents(value: Decimal) -> Option<i64> {
    Money::from_decimal(value).to_cents()
}

/// Two-decimal text with the [`MONEY_SENTINEL`] appended:
/// `"18645.97"` becomes `"18645.974444"`.
pub fn money_sentinel_suffix(text: &str) -> Result<String, ParseError> {
    let value = money_to_decimal(text)?;
    Ok(format!("{value:.2}{MONEY_SENTINEL}"))
}

/// Numeric value written to exports for a sentinel-suffixed amount.
pub fn sentinel_to_export_value(text: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(text.trim()).map_err(|_| ParseError::Amount(text.to_string()))
}

/// Strips the sentinel back off and returns the real 2-decimal amount.
pub fn sentinel_to_amount(text: &str) -> Result<Decimal, ParseError> {
    Ok(sentinel_to_export_value(text)?.round_dp_with_strategy(2, RoundingStrategy::ToZero))
}

const FOUR_DIGIT_YEAR_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"];
const TWO_DIGIT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

/// Any accepted date spelling, rendered as `dd/mm/yyyy`.
pub fn normalize_date(text: &str) -> Result<String, ParseError> {
    parse_date(text)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .ok_or_else(|| ParseError::Date(text.to_string()))
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();

    for fmt in FOUR_DIGIT_YEAR_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if date.year() >= 1000 {
                return Some(date);
            }
        }
    }
    for fmt in TWO_DIGIT_YEAR_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    // Spreadsheet exports often carry a midnight timestamp.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}
