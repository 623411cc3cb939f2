use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Safely coerce an extracted JSON value to a [`Decimal`]. Returns `None` on any failure -
/// LLM output is untrusted and a bad number must never abort a whole document.
pub fn parse_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            Decimal::from_str(raw).ok()
        }
        _ => None,
    }
}

/// Validate an extracted value as a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: Option<&Value>) -> Option<NaiveDate> {
    let raw = value?.as_str()?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Extract a non-empty trimmed string.
pub fn parse_string(value: Option<&Value>) -> Option<String> {
    let raw = value?.as_str()?.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

/// First value present under any of the given keys.
pub fn first_of<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(key))
        .find(|value| !value.is_null())
}
