use crate::{fx::RateRecord, provider::FxProvider, MarketError};
use async_trait::async_trait;
use carteira_instrument::currency::Currency;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

const PROVIDER: &str = "bcb_ptax";
const DEFAULT_BASE_URL: &str = "https://olinda.bcb.gov.br/olinda/servico/PTAX/versao/v1/odata";

/// Client for the Brazilian central bank PTAX odata service.
///
/// Serves the official USD/BRL rate; the published buy and sell quotes are collapsed into a
/// mid-rate. One rate per date is kept (the service may publish several bulletins per day).
#[derive(Debug, Clone)]
pub struct BcbPtaxClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for BcbPtaxClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BcbPtaxClient {
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
impl FxProvider for BcbPtaxClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(
        &self,
        from: &Currency,
        to: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateRecord>, MarketError> {
        if *from != Currency::USD || *to != Currency::BRL {
            return Err(MarketError::Validation(format!(
                "bcb ptax serves only USD->BRL, requested {from}->{to}"
            )));
        }

        // The odata service expects MM-DD-YYYY, quoted
        let start_param = format!("'{}'", start.format("%m-%d-%Y"));
        let end_param = format!("'{}'", end.format("%m-%d-%Y"));

        let url = format!(
            "{}/CotacaoDolarPeriodo(dataInicial=@dataInicial,dataFinalCotacao=@dataFinalCotacao)",
            self.base_url
        );

        debug!(%start, %end, "fetching ptax rates");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("@dataInicial", start_param.as_str()),
                ("@dataFinalCotacao", end_param.as_str()),
                ("$format", "json"),
                ("$select", "cotacaoCompra,cotacaoVenda,dataHoraCotacao"),
            ])
            .send()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?
            .error_for_status()
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        let body: PtaxResponse = response
            .json()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        Ok(collapse_bulletins(body.value))
    }
}

/// Reduce the per-bulletin quotes to one mid-rate per date, keeping the last bulletin of each
/// day.
fn collapse_bulletins(entries: Vec<PtaxEntry>) -> Vec<RateRecord> {
    let mut by_date = BTreeMap::new();

    for entry in entries {
        let Some(date) = entry
            .timestamp
            .get(..10)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        else {
            continue;
        };

        let (Ok(buy), Ok(sell)) = (
            Decimal::try_from(entry.buy),
            Decimal::try_from(entry.sell),
        ) else {
            continue;
        };

        let mid = (buy + sell) / Decimal::TWO;
        by_date.insert(date, mid);
    }

    by_date
        .into_iter()
        .map(|(date, rate)| RateRecord::new(date, rate))
        .collect()
}

#[derive(Debug, Deserialize)]
struct PtaxResponse {
    #[serde(default)]
    value: Vec<PtaxEntry>,
}

#[derive(Debug, Deserialize)]
struct PtaxEntry {
    #[serde(rename = "cotacaoCompra")]
    buy: f64,
    #[serde(rename = "cotacaoVenda")]
    sell: f64,
    #[serde(rename = "dataHoraCotacao")]
    timestamp: String,
}
