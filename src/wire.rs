//! JSON wire helpers shared by the request types.
//!
//! The browser frontend sends numbers either as JSON numbers or as strings
//! (`"2,5"` included) and dates either as `YYYY-MM-DD` or `DD/MM/YYYY`.

use crate::error::ServiceError;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Parse decimal text, accepting a comma as decimal separator and exponents
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let text = raw.trim().replace(',', ".");
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// `Option<Decimal>` from a JSON number, numeric string, empty string or null
pub fn decimal_opt<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => parse_decimal(&n.to_string())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_decimal(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number {s:?}"))),
        Some(other) => Err(serde::de::Error::custom(format!("expected a number, got {other}"))),
    }
}

/// `Option<i64>` from a JSON integer or a numeric string
pub fn id_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid id {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid id {s:?}"))),
        Some(other) => Err(serde::de::Error::custom(format!("expected an id, got {other}"))),
    }
}

/// Parse `YYYY-MM-DD` or `DD/MM/YYYY`
pub fn parse_date(raw: &str) -> Result<NaiveDate, ServiceError> {
    let text = raw.trim();
    // Timestamps from the date picker carry a time part after the date
    let text = text.split('T').next().unwrap_or(text);
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
        .map_err(|_| ServiceError::invalid(format!("Data non valida: {raw}")))
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time(raw: &str) -> Result<NaiveTime, ServiceError> {
    let text = raw.trim();
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|_| ServiceError::invalid(format!("Orario non valido: {raw}")))
}

/// Reject a decimal that a `NUMERIC(int_digits + scale, scale)` column would
/// round or overflow
pub fn numeric_fits(
    value: Decimal,
    field: &str,
    int_digits: u32,
    scale: u32,
) -> Result<Decimal, ServiceError> {
    if value.normalize().scale() > scale {
        return Err(ServiceError::invalid(format!(
            "{field} ammette al massimo {scale} decimali"
        )));
    }
    if value.abs() >= Decimal::from(10u64.pow(int_digits)) {
        return Err(ServiceError::invalid(format!(
            "{field} fuori scala (massimo {int_digits} cifre intere)"
        )));
    }
    Ok(value)
}

/// Trimmed, non-empty string or `None`
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Required trimmed string
pub fn required(value: Option<String>, message: &str) -> Result<String, ServiceError> {
    non_blank(value).ok_or_else(|| ServiceError::invalid(message))
}

/// Reject strings longer than `max` characters
pub fn max_len(value: Option<String>, max: usize, field: &str) -> Result<Option<String>, ServiceError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ServiceError::invalid(format!(
            "{field} troppo lungo (massimo {max} caratteri)"
        ))),
        other => Ok(other),
    }
}
