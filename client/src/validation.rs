//! Price Data Validation
//!
//! Pure checks applied at the boundary of the oracle. Nothing here touches
//! the cache, the network or any shared state; the timestamp check only
//! reads the clock.
//!
//! # Checks
//! - Price: finite, non-negative, not NaN
//! - Trading pair: member of the supported set
//! - Confidence: within [0, 1] and above `MIN_CONFIDENCE`
//! - Timestamp: not in the future, not older than `STALENESS_THRESHOLD_MS`
//!   (or a caller-supplied maximum age)

use crate::{
    error::{OracleError, Result},
    types::{now_millis, PriceData, TradingPair, ValidationResult},
};

/// Lowest confidence score accepted for a quote
pub const MIN_CONFIDENCE: f64 = 0.5;

/// Maximum age of a quote timestamp (milliseconds)
pub const STALENESS_THRESHOLD_MS: i64 = 60_000;

/// Check a numeric price without raising
pub fn validate_price_data(price: f64) -> ValidationResult {
    if price.is_nan() {
        return ValidationResult::invalid("Price cannot be NaN");
    }

    if price < 0.0 {
        return ValidationResult::invalid("Price cannot be negative");
    }

    if !price.is_finite() {
        return ValidationResult::invalid("Price must be finite");
    }

    ValidationResult::valid()
}

/// Raising form of [`validate_price_data`]
pub fn validate_price(price: f64) -> Result<()> {
    validate_price_data(price).into_result()
}

/// Narrow a raw symbol to a supported [`TradingPair`]
///
/// Fails with a `Validation` error whose details list the supported pairs.
pub fn validate_trading_pair(pair: &str) -> Result<TradingPair> {
    TradingPair::ALL
        .into_iter()
        .find(|supported| supported.as_str() == pair)
        .ok_or_else(|| {
            OracleError::validation_with(
                "Invalid trading pair",
                serde_json::json!({ "supported": TradingPair::supported_symbols() }),
            )
        })
}

pub fn validate_confidence(confidence: f64) -> ValidationResult {
    if confidence.is_nan() {
        return ValidationResult::invalid("Confidence must be a number");
    }

    if !(0.0..=1.0).contains(&confidence) {
        return ValidationResult::invalid("Confidence must be between 0 and 1");
    }

    if confidence < MIN_CONFIDENCE {
        return ValidationResult::invalid(format!(
            "Confidence below minimum threshold ({})",
            MIN_CONFIDENCE
        ));
    }

    ValidationResult::valid()
}

pub fn validate_timestamp(timestamp: i64) -> ValidationResult {
    validate_timestamp_at(timestamp, now_millis())
}

/// [`validate_timestamp`] against an explicit "now"
pub fn validate_timestamp_at(timestamp: i64, now: i64) -> ValidationResult {
    validate_timestamp_within(timestamp, now, STALENESS_THRESHOLD_MS)
}

/// Timestamp check with an explicit maximum age
///
/// # Arguments
/// * `timestamp` - Unix time (ms) being checked
/// * `now` - Reference unix time (ms)
/// * `max_age_ms` - Oldest accepted age, inclusive
pub fn validate_timestamp_within(timestamp: i64, now: i64, max_age_ms: i64) -> ValidationResult {
    if timestamp > now {
        return ValidationResult::invalid("Timestamp cannot be in the future");
    }

    if now - timestamp > max_age_ms {
        return ValidationResult::invalid("Data is too old");
    }

    ValidationResult::valid()
}

/// Run every quote-level check against a freshly produced quote
pub fn validate_quote(quote: &PriceData) -> Result<()> {
    validate_quote_within(quote, STALENESS_THRESHOLD_MS)
}

/// [`validate_quote`] with the staleness limit taken from the caller,
/// usually the configured cache duration
///
/// # Errors
/// * `Validation` - the first failing check, with its message
pub fn validate_quote_within(quote: &PriceData, max_age_ms: i64) -> Result<()> {
    validate_price(quote.price)?;
    validate_confidence(quote.confidence).into_result()?;
    validate_timestamp_within(quote.timestamp, now_millis(), max_age_ms).into_result()
}
