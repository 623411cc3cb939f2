use crate::{
    provider::{fetch_batch, FxProvider, QuoteProvider},
    store::{AssetCatalog, QuoteStore, RateStore},
    fx::ExchangeRate,
    MarketError,
};
use carteira_instrument::{currency::Currency, ticker::Ticker};
use chrono::NaiveDate;
use smol_str::SmolStr;
use tracing::{info, warn};

/// Outcome of one quote synchronisation run.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct QuoteSyncOutcome {
    pub tickers: usize,
    pub quotes_saved: usize,
    /// Per-ticker failures; these never abort the batch.
    pub failures: Vec<(Ticker, String)>,
}

/// Fetch quotes for `tickers` over the date range and upsert them into the store.
///
/// Unknown tickers are auto-created through the [`AssetCatalog`] using the B3 shape heuristic.
/// Per-ticker provider failures are collected into the outcome.
pub async fn sync_quotes<Store, Provider>(
    store: &Store,
    provider: &Provider,
    tickers: Vec<Ticker>,
    from: NaiveDate,
    to: NaiveDate,
    parallelism: usize,
) -> Result<QuoteSyncOutcome, MarketError>
where
    Store: QuoteStore + AssetCatalog,
    Provider: QuoteProvider,
{
    if tickers.is_empty() {
        return Err(MarketError::Validation(
            "at least one ticker must be provided".to_string(),
        ));
    }

    info!(
        provider = provider.name(),
        tickers = tickers.len(),
        %from,
        %to,
        "quote sync started"
    );

    let mut outcome = QuoteSyncOutcome {
        tickers: tickers.len(),
        ..Default::default()
    };

    for (ticker, result) in fetch_batch(provider, tickers, from, to, parallelism).await {
        let records = match result {
            Ok(records) => records,
            Err(error) => {
                warn!(%ticker, %error, "quote fetch failed");
                outcome.failures.push((ticker, error.to_string()));
                continue;
            }
        };

        if records.is_empty() {
            continue;
        }

        let asset = store.resolve_or_create(&ticker).await?;
        for record in records {
            store
                .upsert_quote(record.into_quote(asset.id, provider.name()))
                .await?;
            outcome.quotes_saved += 1;
        }
    }

    info!(
        quotes_saved = outcome.quotes_saved,
        failures = outcome.failures.len(),
        "quote sync complete"
    );

    Ok(outcome)
}

/// Fetch daily mid-rates for a pair over the date range and upsert them into the store.
/// Returns the number of rates stored.
pub async fn sync_rates<Store, Provider>(
    store: &Store,
    provider: &Provider,
    from_currency: &Currency,
    to_currency: &Currency,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize, MarketError>
where
    Store: RateStore,
    Provider: FxProvider,
{
    let records = provider.fetch(from_currency, to_currency, start, end).await?;
    let count = records.len();

    for record in records {
        store
            .upsert_rate(ExchangeRate::new(
                record.date,
                from_currency.clone(),
                to_currency.clone(),
                record.rate,
                SmolStr::new(provider.name()),
            ))
            .await?;
    }

    info!(
        provider = provider.name(),
        %from_currency,
        %to_currency,
        rates_stored = count,
        "rate sync complete"
    );

    Ok(count)
}
