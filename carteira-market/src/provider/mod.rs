use crate::{fx::RateRecord, quote::QuoteRecord, MarketError};
use async_trait::async_trait;
use carteira_instrument::{currency::Currency, ticker::Ticker};
use chrono::NaiveDate;
use futures::StreamExt;
use tracing::debug;

/// BCB PTAX odata adapter - the official USD/BRL mid-rate.
pub mod bcb;

/// CVM open-data adapter - investment fund quota values.
pub mod cvm;

/// Tesouro Direto adapter - Brazilian treasury bond unit prices.
pub mod tesouro;

/// Chart-API adapter - listed equity quotes, with `.SA` wire-suffix handling.
pub mod yahoo;

/// Fetches dated OHLCV batches for a ticker from an external source.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch all available quotes for `ticker` with `from <= date <= to`.
    async fn fetch(
        &self,
        ticker: &Ticker,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<QuoteRecord>, MarketError>;
}

/// Fetches dated mid-rates for a currency pair from an external source.
#[async_trait]
pub trait FxProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch daily mid-rates converting `from` into `to` over the date range.
    async fn fetch(
        &self,
        from: &Currency,
        to: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateRecord>, MarketError>;
}

/// Fetch quotes for many tickers with a bounded worker pool.
///
/// Per-ticker failures are returned alongside successes and never fail the batch.
pub async fn fetch_batch<Provider>(
    provider: &Provider,
    tickers: Vec<Ticker>,
    from: NaiveDate,
    to: NaiveDate,
    parallelism: usize,
) -> Vec<(Ticker, Result<Vec<QuoteRecord>, MarketError>)>
where
    Provider: QuoteProvider,
{
    debug!(
        provider = provider.name(),
        tickers = tickers.len(),
        %from,
        %to,
        parallelism,
        "fetching quote batch"
    );

    futures::stream::iter(tickers.into_iter().map(|ticker| async move {
        let result = provider.fetch(&ticker, from, to).await;
        (ticker, result)
    }))
    .buffer_unordered(parallelism.max(1))
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct StubProvider;

    #[async_trait]
    impl QuoteProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch(
            &self,
            ticker: &Ticker,
            from: NaiveDate,
            _: NaiveDate,
        ) -> Result<Vec<QuoteRecord>, MarketError> {
            if ticker.as_str() == "FAIL1" {
                return Err(MarketError::provider("stub", "boom"));
            }
            Ok(vec![QuoteRecord::new(
                ticker.clone(),
                from,
                None,
                None,
                None,
                dec!(10.0),
                None,
                None,
                None,
            )])
        }
    }

    #[tokio::test]
    async fn test_fetch_batch_collects_per_ticker_errors() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let results = fetch_batch(
            &StubProvider,
            vec![Ticker::new("PETR4"), Ticker::new("FAIL1"), Ticker::new("VALE3")],
            day,
            day,
            2,
        )
        .await;

        assert_eq!(results.len(), 3);
        let failures = results.iter().filter(|(_, result)| result.is_err()).count();
        assert_eq!(failures, 1);
    }
}
