use crate::{
    fx::{Converted, ExchangeRate},
    quote::Quote,
    MarketError,
};
use async_trait::async_trait;
use carteira_instrument::{asset::Asset, currency::Currency, ticker::Ticker, AssetId};
use chrono::{Duration, NaiveDate};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Handles the reading & writing of [`Quote`]s to/from the persistence layer.
///
/// Quotes are unique on (asset_id, date); `upsert_quote` updates in place on conflict.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Upsert the [`Quote`] at its (asset_id, date) key.
    async fn upsert_quote(&self, quote: Quote) -> Result<(), MarketError>;

    /// For each asset, the row with the greatest date.
    async fn latest_quotes(&self, asset_ids: &[AssetId]) -> Result<Vec<Quote>, MarketError>;

    /// For each asset, the row with the greatest date `<= date`.
    async fn quotes_at(
        &self,
        asset_ids: &[AssetId],
        date: NaiveDate,
    ) -> Result<Vec<Quote>, MarketError>;

    /// Price history for one asset, descending by date, at most `limit` rows.
    async fn quote_history(
        &self,
        asset_id: AssetId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<Quote>, MarketError>;

    /// Latest effective price per asset.
    async fn latest_prices(
        &self,
        asset_ids: &[AssetId],
    ) -> Result<HashMap<AssetId, Decimal>, MarketError> {
        Ok(self
            .latest_quotes(asset_ids)
            .await?
            .into_iter()
            .map(|quote| (quote.asset_id, quote.effective_price()))
            .collect())
    }

    /// Effective price per asset at (or before) the target date.
    async fn prices_at(
        &self,
        asset_ids: &[AssetId],
        date: NaiveDate,
    ) -> Result<HashMap<AssetId, Decimal>, MarketError> {
        Ok(self
            .quotes_at(asset_ids, date)
            .await?
            .into_iter()
            .map(|quote| (quote.asset_id, quote.effective_price()))
            .collect())
    }
}

/// Handles the reading & writing of dated [`ExchangeRate`]s to/from the persistence layer.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Upsert the [`ExchangeRate`] at its (date, from, to) key.
    async fn upsert_rate(&self, rate: ExchangeRate) -> Result<(), MarketError>;

    /// Most recent rate for the exact pair with `min_date <= date <= max_date`.
    async fn rate_in_window(
        &self,
        from: &Currency,
        to: &Currency,
        max_date: NaiveDate,
        min_date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, MarketError>;

    /// Most recent rate for the exact pair, regardless of date.
    async fn latest_rate(
        &self,
        from: &Currency,
        to: &Currency,
    ) -> Result<Option<ExchangeRate>, MarketError>;

    /// Rate converting `from` into `to` at `date`, falling back to the most recent rate within
    /// `fallback_days`. An inverse rate is derived if only the reverse pair exists. Identity
    /// pairs return 1.
    async fn rate(
        &self,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
        fallback_days: i64,
    ) -> Result<Option<Decimal>, MarketError> {
        if from == to {
            return Ok(Some(Decimal::ONE));
        }

        let min_date = date - Duration::days(fallback_days);

        if let Some(found) = self.rate_in_window(from, to, date, min_date).await? {
            return Ok(Some(found.rate));
        }

        if let Some(inverse) = self.rate_in_window(to, from, date, min_date).await? {
            if !inverse.rate.is_zero() {
                return Ok(Some(Decimal::ONE / inverse.rate));
            }
        }

        Ok(None)
    }

    /// Convert `amount` from `from` into `to` at `date`. On a missing pair the amount passes
    /// through unchanged with `rate_used = None`.
    async fn convert(
        &self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
        fallback_days: i64,
    ) -> Result<Converted, MarketError> {
        match self.rate(from, to, date, fallback_days).await? {
            Some(rate) => Ok(Converted::new(amount * rate, Some(rate))),
            None => {
                warn!(
                    %from,
                    %to,
                    %date,
                    fallback_days,
                    "no exchange rate within fallback window - amount passed through unconverted"
                );
                Ok(Converted::new(amount, None))
            }
        }
    }

    /// The official USD->BRL mid-rate at `date`, within the fallback window.
    async fn ptax(
        &self,
        date: NaiveDate,
        fallback_days: i64,
    ) -> Result<Option<Decimal>, MarketError> {
        self.rate(&Currency::USD, &Currency::BRL, date, fallback_days)
            .await
    }
}

/// Resolves tickers to [`Asset`]s, auto-creating unknown tickers with the B3 shape heuristic.
///
/// Implemented by the engine's asset repository; market-data sync depends only on this trait.
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Fetch the [`Asset`] for `ticker`, creating a minimal heuristic-classified record if the
    /// ticker is unknown.
    async fn resolve_or_create(&self, ticker: &Ticker) -> Result<Asset, MarketError>;

    /// Tickers of every active asset.
    async fn active_tickers(&self) -> Result<Vec<Ticker>, MarketError>;
}

/// In-memory [`QuoteStore`] & [`RateStore`].
///
/// Used standalone in tests, and embedded by the engine's in-memory store. No fault-tolerance
/// guarantees.
#[derive(Debug, Default)]
pub struct InMemoryMarketStore {
    quotes: RwLock<BTreeMap<(AssetId, NaiveDate), Quote>>,
    rates: RwLock<BTreeMap<(Currency, Currency, NaiveDate), ExchangeRate>>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteStore for InMemoryMarketStore {
    async fn upsert_quote(&self, quote: Quote) -> Result<(), MarketError> {
        self.quotes
            .write()
            .insert((quote.asset_id, quote.date), quote);
        Ok(())
    }

    async fn latest_quotes(&self, asset_ids: &[AssetId]) -> Result<Vec<Quote>, MarketError> {
        let quotes = self.quotes.read();
        Ok(asset_ids
            .iter()
            .filter_map(|asset_id| {
                quotes
                    .range((*asset_id, NaiveDate::MIN)..=(*asset_id, NaiveDate::MAX))
                    .next_back()
                    .map(|(_, quote)| quote.clone())
            })
            .collect())
    }

    async fn quotes_at(
        &self,
        asset_ids: &[AssetId],
        date: NaiveDate,
    ) -> Result<Vec<Quote>, MarketError> {
        let quotes = self.quotes.read();
        Ok(asset_ids
            .iter()
            .filter_map(|asset_id| {
                quotes
                    .range((*asset_id, NaiveDate::MIN)..=(*asset_id, date))
                    .next_back()
                    .map(|(_, quote)| quote.clone())
            })
            .collect())
    }

    async fn quote_history(
        &self,
        asset_id: AssetId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<Quote>, MarketError> {
        let quotes = self.quotes.read();
        Ok(quotes
            .range((asset_id, NaiveDate::MIN)..=(asset_id, NaiveDate::MAX))
            .rev()
            .map(|(_, quote)| quote)
            .filter(|quote| from.is_none_or(|from| quote.date >= from))
            .filter(|quote| to.is_none_or(|to| quote.date <= to))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RateStore for InMemoryMarketStore {
    async fn upsert_rate(&self, rate: ExchangeRate) -> Result<(), MarketError> {
        self.rates
            .write()
            .insert((rate.from.clone(), rate.to.clone(), rate.date), rate);
        Ok(())
    }

    async fn rate_in_window(
        &self,
        from: &Currency,
        to: &Currency,
        max_date: NaiveDate,
        min_date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, MarketError> {
        let rates = self.rates.read();
        Ok(rates
            .range(
                (from.clone(), to.clone(), min_date)..=(from.clone(), to.clone(), max_date),
            )
            .next_back()
            .map(|(_, rate)| rate.clone()))
    }

    async fn latest_rate(
        &self,
        from: &Currency,
        to: &Currency,
    ) -> Result<Option<ExchangeRate>, MarketError> {
        let rates = self.rates.read();
        Ok(rates
            .range(
                (from.clone(), to.clone(), NaiveDate::MIN)
                    ..=(from.clone(), to.clone(), NaiveDate::MAX),
            )
            .next_back()
            .map(|(_, rate)| rate.clone()))
    }
}
