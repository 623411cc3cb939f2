use crate::{quote::QuoteRecord, MarketError};
use carteira_instrument::{currency::Currency, ticker::Ticker};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

const PROVIDER: &str = "cvm";
const DEFAULT_BASE_URL: &str = "https://dados.cvm.gov.br/dados/FI";

/// Client for the CVM open-data portal (investment fund registry and daily quota reports).
///
/// The daily report (`inf_diario`) is published as monthly zipped CSVs; this adapter parses an
/// already-extracted report via [`CvmFundClient::quotes_from_inf_diario`] and fetches the fund
/// registry (`cad_fi.csv`) directly.
#[derive(Debug, Clone)]
pub struct CvmFundClient {
    http: reqwest::Client,
    base_url: String,
}

/// A fund registry entry from `cad_fi.csv`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FundRegistryEntry {
    pub cnpj: String,
    pub name: String,
    pub situation: String,
}

impl Default for CvmFundClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CvmFundClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Search the CVM fund registry for funds whose name contains `pattern`
    /// (case-insensitive).
    pub async fn search_funds(
        &self,
        pattern: &str,
    ) -> Result<Vec<FundRegistryEntry>, MarketError> {
        let url = format!("{}/CAD/DADOS/cad_fi.csv", self.base_url);
        debug!(pattern, "searching cvm fund registry");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?
            .error_for_status()
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?;
        let text: String = bytes.iter().map(|&byte| byte as char).collect();

        Ok(search_registry(&text, pattern))
    }

    /// Parse the quota values for one fund (by CNPJ) out of an extracted `inf_diario` daily
    /// report. The fund's quota is exposed as a daily close price under the given ticker.
    pub fn quotes_from_inf_diario(
        &self,
        report_csv: &str,
        cnpj: &str,
        ticker: &Ticker,
    ) -> Result<Vec<QuoteRecord>, MarketError> {
        parse_inf_diario(report_csv, cnpj, ticker)
    }
}

fn search_registry(text: &str, pattern: &str) -> Vec<FundRegistryEntry> {
    let pattern = pattern.to_uppercase();
    let mut lines = text.lines();

    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split(';').map(str::trim).collect();
    let (Some(cnpj_col), Some(name_col), Some(situation_col)) = (
        columns.iter().position(|c| *c == "CNPJ_FUNDO"),
        columns.iter().position(|c| *c == "DENOM_SOCIAL"),
        columns.iter().position(|c| *c == "SIT"),
    ) else {
        return Vec::new();
    };

    lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(';').collect();
            let name = fields.get(name_col)?.trim();
            if !name.to_uppercase().contains(&pattern) {
                return None;
            }
            Some(FundRegistryEntry {
                cnpj: fields.get(cnpj_col)?.trim().to_string(),
                name: name.to_string(),
                situation: fields
                    .get(situation_col)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_inf_diario(
    text: &str,
    cnpj: &str,
    ticker: &Ticker,
) -> Result<Vec<QuoteRecord>, MarketError> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| MarketError::invalid_response(PROVIDER, "empty report"))?;

    let columns: Vec<&str> = header.split(';').map(str::trim).collect();
    let cnpj_col = column(&columns, "CNPJ_FUNDO")?;
    let date_col = column(&columns, "DT_COMPTC")?;
    let quota_col = column(&columns, "VL_QUOTA")?;

    let mut records = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if fields.len() <= quota_col.max(date_col).max(cnpj_col) {
            continue;
        }
        if fields[cnpj_col] != cnpj {
            continue;
        }

        let Ok(date) = NaiveDate::parse_from_str(fields[date_col], "%Y-%m-%d") else {
            continue;
        };
        let Ok(quota) = fields[quota_col].parse::<Decimal>() else {
            continue;
        };

        records.push(QuoteRecord {
            ticker: ticker.clone(),
            date,
            open: None,
            high: None,
            low: None,
            close: quota,
            adjusted_close: None,
            volume: None,
            currency: Some(Currency::BRL),
        });
    }

    records.sort_by_key(|record| record.date);
    Ok(records)
}

fn column(columns: &[&str], name: &str) -> Result<usize, MarketError> {
    columns
        .iter()
        .position(|candidate| *candidate == name)
        .ok_or_else(|| MarketError::invalid_response(PROVIDER, format!("missing column {name}")))
}
