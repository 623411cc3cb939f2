use carteira_instrument::currency::Currency;
use chrono::NaiveDate;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A dated rate converting one unit of `from` into `to`. Unique on (date, from, to).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct ExchangeRate {
    pub date: NaiveDate,
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
    pub source: SmolStr,
}

/// A dated mid-rate as returned by an [`FxProvider`](crate::provider::FxProvider).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct RateRecord {
    pub date: NaiveDate,
    pub rate: Decimal,
}

/// The result of converting an amount between currencies at a date.
///
/// When no rate could be found within the fallback window the amount passes through unchanged
/// with `rate_used = None`; callers decide whether to surface the partial result.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Converted {
    pub amount: Decimal,
    pub rate_used: Option<Decimal>,
}
