use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::Decimal;
use std::str::FromStr as _;
use thiserror::Error;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum AmountError {
    /// The value is not a delimited number, an integer, or a float.
    #[error("Invalid amount type: `{0}`")]
    InvalidAmountType(String),

    /// The converted amount does not fit in an integer currency amount.
    #[error("Amount out of range: `{0}`")]
    OutOfRange(String),
}

/// A monetary (or share count) value as it was found in a source file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawAmount<'a> {
    /// Delimited numeric text, e.g. `"1,234,567"` or `" 12 "`.
    Text(&'a str),
    Integer(i64),
    Float(f64),
    /// An empty cell.
    Missing,
}

impl<'a> RawAmount<'a> {
    /// Classify a CSV cell. Blank cells are `Missing`, everything else is `Text`.
    pub fn from_cell(cell: &'a str) -> Self {
        if cell.trim().is_empty() {
            Self::Missing
        } else {
            Self::Text(cell)
        }
    }
}

/// Normalize a raw amount into integer currency units.
///
/// Fractions are truncated toward zero. This is a fixed policy: banker's rounding is only ever
/// applied to the final tax figure, see [`TaxSummary`](crate::model::TaxSummary).
pub fn normalize(raw: RawAmount<'_>) -> Result<i64, AmountError> {
    match raw {
        RawAmount::Integer(value) => Ok(value),
        RawAmount::Float(value) if value.is_finite() => {
            let truncated = value.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                Err(AmountError::OutOfRange(value.to_string()))
            } else {
                Ok(truncated as i64)
            }
        }
        RawAmount::Float(value) => Err(AmountError::InvalidAmountType(value.to_string())),
        RawAmount::Text(text) => {
            let cleaned = strip_delimiters(text, &[]);
            if let Ok(value) = cleaned.parse::<i64>() {
                return Ok(value);
            }

            let decimal = Decimal::from_str(&cleaned)
                .map_err(|_| AmountError::InvalidAmountType(text.to_string()))?;
            decimal
                .trunc()
                .to_i64()
                .ok_or_else(|| AmountError::OutOfRange(text.to_string()))
        }
        RawAmount::Missing => Err(AmountError::InvalidAmountType(String::new())),
    }
}

/// Parse a US dollar amount such as `"$1,234.56"` without losing precision.
pub fn parse_usd(text: &str) -> Result<Decimal, AmountError> {
    let cleaned = strip_delimiters(text, &['$']);

    Decimal::from_str(&cleaned).map_err(|_| AmountError::InvalidAmountType(text.to_string()))
}

/// Convert a foreign amount to integer local currency units, truncating toward zero.
///
/// This is the single place where the product of an amount and an exchange rate is rounded.
pub fn convert(amount: Decimal, rate: Decimal) -> Result<i64, AmountError> {
    amount
        .checked_mul(rate)
        .and_then(|product| product.trunc().to_i64())
        .ok_or_else(|| AmountError::OutOfRange(format!("{amount} * {rate}")))
}

fn strip_delimiters(text: &str, extra: &[char]) -> String {
    text.chars()
        .filter(|ch| *ch != ',' && !ch.is_whitespace() && !extra.contains(ch))
        .collect()
}
