use crate::{provider::QuoteProvider, quote::QuoteRecord, MarketError};
use async_trait::async_trait;
use carteira_instrument::{currency::Currency, ticker::Ticker};
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

const PROVIDER: &str = "yahoo_chart";
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Daily-bar client for the Yahoo Finance chart API.
///
/// B3 listed symbols are requested with the `.SA` suffix on the wire; the canonical ticker is
/// kept suffix-free.
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for YahooChartClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooChartClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl QuoteProvider for YahooChartClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(
        &self,
        ticker: &Ticker,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<QuoteRecord>, MarketError> {
        let symbol = ticker.wire_symbol();
        let period1 = from
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc()
            .timestamp();
        // period2 is exclusive, so advance one day to include `to`
        let period2 = (to + chrono::Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc()
            .timestamp();

        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        debug!(%ticker, %symbol, %from, %to, "fetching chart data");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,split".to_string()),
            ])
            .send()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?
            .error_for_status()
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        let result = body
            .chart
            .result
            .and_then(|mut results| (!results.is_empty()).then(|| results.remove(0)))
            .ok_or_else(|| MarketError::invalid_response(PROVIDER, "empty chart result"))?;

        let currency = result
            .meta
            .as_ref()
            .and_then(|meta| meta.currency.as_deref())
            .map(Currency::new);

        let timestamps = result.timestamp.unwrap_or_default();
        let quote_block = result
            .indicators
            .quote
            .into_iter()
            .next()
            .unwrap_or_default();
        let adjclose = result
            .indicators
            .adjclose
            .and_then(|mut blocks| (!blocks.is_empty()).then(|| blocks.remove(0)))
            .map(|block| block.adjclose)
            .unwrap_or_default();

        let mut records = Vec::with_capacity(timestamps.len());
        for (index, timestamp) in timestamps.iter().enumerate() {
            let Some(date) = DateTime::from_timestamp(*timestamp, 0).map(|ts| ts.date_naive())
            else {
                continue;
            };

            let Some(close) = value_at(&quote_block.close, index) else {
                // Rows without a close are holiday/halted placeholders
                continue;
            };

            records.push(QuoteRecord {
                ticker: ticker.clone(),
                date,
                open: value_at(&quote_block.open, index),
                high: value_at(&quote_block.high, index),
                low: value_at(&quote_block.low, index),
                close,
                adjusted_close: value_at(&adjclose, index),
                volume: quote_block.volume.get(index).copied().flatten(),
                currency: currency.clone(),
            });
        }

        if records.is_empty() {
            warn!(%ticker, %symbol, "chart response contained no usable bars");
        }

        Ok(records)
    }
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<Decimal> {
    values
        .get(index)
        .copied()
        .flatten()
        .filter(|value| value.is_finite())
        .and_then(|value| Decimal::try_from(value).ok())
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    adjclose: Option<Vec<AdjCloseBlock>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_response_deserialise() {
        let payload = r#"{
            "chart": {
                "result": [{
                    "meta": {"currency": "BRL"},
                    "timestamp": [1704153600, 1704240000],
                    "indicators": {
                        "quote": [{
                            "open": [36.1, null],
                            "high": [36.9, 37.2],
                            "low": [35.8, 36.4],
                            "close": [36.5, 37.0],
                            "volume": [1000, 2000]
                        }],
                        "adjclose": [{"adjclose": [36.2, 36.8]}]
                    }
                }]
            }
        }"#;

        let response: ChartResponse = serde_json::from_str(payload).unwrap();
        let result = &response.chart.result.as_ref().unwrap()[0];
        assert_eq!(result.timestamp.as_ref().unwrap().len(), 2);
        assert_eq!(result.indicators.quote[0].close[0], Some(36.5));
    }

    #[test]
    fn test_value_at_skips_non_finite() {
        let values = vec![Some(1.5), None, Some(f64::NAN)];
        assert!(value_at(&values, 0).is_some());
        assert!(value_at(&values, 1).is_none());
        assert!(value_at(&values, 2).is_none());
        assert!(value_at(&values, 3).is_none());
    }
}
