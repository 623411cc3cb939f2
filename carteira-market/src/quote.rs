use carteira_instrument::{currency::Currency, ticker::Ticker, AssetId};
use chrono::NaiveDate;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A dated OHLCV price row for an asset. Unique on (asset_id, date).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Quote {
    pub asset_id: AssetId,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub adjusted_close: Option<Decimal>,
    pub volume: Option<u64>,
    pub source: SmolStr,
}

impl Quote {
    /// The effective price of this [`Quote`] - the adjusted close when available, else the close.
    pub fn effective_price(&self) -> Decimal {
        self.adjusted_close.unwrap_or(self.close)
    }
}

/// A price row as returned by a [`QuoteProvider`](crate::provider::QuoteProvider), before the
/// ticker has been resolved to an [`AssetId`].
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct QuoteRecord {
    pub ticker: Ticker,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub adjusted_close: Option<Decimal>,
    pub volume: Option<u64>,
    pub currency: Option<Currency>,
}

impl QuoteRecord {
    /// Attach the resolved [`AssetId`] and provider name, producing a storable [`Quote`].
    pub fn into_quote(self, asset_id: AssetId, source: &'static str) -> Quote {
        Quote {
            asset_id,
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            adjusted_close: self.adjusted_close,
            volume: self.volume,
            source: SmolStr::new_static(source),
        }
    }
}
