//! Price text normalization.
//!
//! Listing pages render prices as free text (`"1.234,56 TL"`, `"₺24.900"`,
//! `"1,299"`). [`normalize_price`] turns either that text or an already
//! parsed number into a whole currency-unit integer, truncating any fraction.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("invalid price: no digits in {0:?}")]
    NoDigits(String),

    #[error("invalid price: malformed number {0:?}")]
    Malformed(String),

    #[error("invalid price: {0} is not positive")]
    NonPositive(i64),

    #[error("invalid price: {value} outside bounds {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

/// Sanity bounds that reject scraping garbage. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    pub min: i64,
    pub max: i64,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: 1,
            max: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PriceInput<'a> {
    Text(&'a str),
    Number(f64),
}

impl<'a> From<&'a str> for PriceInput<'a> {
    fn from(value: &'a str) -> Self {
        PriceInput::Text(value)
    }
}

impl From<f64> for PriceInput<'_> {
    fn from(value: f64) -> Self {
        PriceInput::Number(value)
    }
}

impl From<i64> for PriceInput<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        PriceInput::Number(value as f64)
    }
}

/// Parse a price into whole currency units.
///
/// # Errors
///
/// Returns [`PriceError`] when no digit is present, the number is malformed,
/// the value is not positive, or it falls outside `bounds`.
pub fn normalize_price<'a>(
    input: impl Into<PriceInput<'a>>,
    bounds: &PriceBounds,
) -> Result<i64, PriceError> {
    let value = match input.into() {
        PriceInput::Text(text) => parse_price_text(text)?,
        PriceInput::Number(n) => number_to_units(n)?,
    };

    if value <= 0 {
        return Err(PriceError::NonPositive(value));
    }
    if value < bounds.min || value > bounds.max {
        return Err(PriceError::OutOfRange {
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(value)
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_units(n: f64) -> Result<i64, PriceError> {
    if !n.is_finite() {
        return Err(PriceError::Malformed(n.to_string()));
    }
    let truncated = n.trunc();
    // i64::MAX as f64 rounds up, so compare against a safe ceiling.
    if truncated.abs() >= 9.0e18 {
        return Err(PriceError::Malformed(n.to_string()));
    }
    Ok(truncated as i64)
}

fn parse_price_text(text: &str) -> Result<i64, PriceError> {
    let upper = text.to_uppercase();
    let stripped = upper.replace("TRY", "").replace("TL", "");
    let negative = stripped.trim_start().starts_with('-');

    let cleaned: String = stripped
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err(PriceError::NoDigits(text.to_string()));
    }

    let integer_part = integer_digits(&cleaned)
        .ok_or_else(|| PriceError::Malformed(text.to_string()))?;

    let magnitude = if integer_part.is_empty() {
        0
    } else {
        integer_part
            .parse::<i64>()
            .map_err(|_| PriceError::Malformed(text.to_string()))?
    };

    Ok(if negative { -magnitude } else { magnitude })
}

/// Returns the digits of the whole-unit part, dropping thousands separators
/// and any decimal fraction.
fn integer_digits(cleaned: &str) -> Option<String> {
    let dots = cleaned.matches('.').count();
    let commas = cleaned.matches(',').count();

    let decimal_sep = match (dots, commas) {
        (0, 0) => None,
        // Both present: whichever comes last is the decimal separator.
        (d, c) if d > 0 && c > 0 => {
            let last_dot = cleaned.rfind('.')?;
            let last_comma = cleaned.rfind(',')?;
            Some(if last_comma > last_dot { ',' } else { '.' })
        }
        (1, 0) => single_separator_role(cleaned, '.'),
        (0, 1) => single_separator_role(cleaned, ','),
        // The same separator repeated can only group thousands.
        _ => None,
    };

    let whole = match decimal_sep {
        Some(sep) => {
            let idx = cleaned.rfind(sep)?;
            &cleaned[..idx]
        }
        None => cleaned,
    };

    Some(whole.chars().filter(char::is_ascii_digit).collect())
}

/// A single separator followed by exactly three digits is a thousands group.
fn single_separator_role(cleaned: &str, sep: char) -> Option<char> {
    let idx = cleaned.rfind(sep)?;
    let trailing = &cleaned[idx + sep.len_utf8()..];
    if trailing.len() == 3 && trailing.chars().all(|c| c.is_ascii_digit()) && idx > 0 {
        None
    } else {
        Some(sep)
    }
}
