use crate::{provider::QuoteProvider, quote::QuoteRecord, MarketError};
use async_trait::async_trait;
use carteira_instrument::{currency::Currency, ticker::Ticker};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

const PROVIDER: &str = "tesouro_direto";
const DEFAULT_PRICES_URL: &str = "https://www.tesourotransparente.gov.br/ckan/dataset/df56aa42-484a-4a59-8184-7676580c81e3/resource/796d2059-14e9-44e3-80c9-2d9e30b405c1/download/PrecoTaxaTesouroDireto.csv";

/// Client for the Tesouro Transparente historical price dataset.
///
/// The dataset is a latin-1, semicolon-separated CSV with Brazilian number formatting, covering
/// every bond series. Internal tickers name a series and maturity (eg/ `NTNB-AGO28`); the
/// matching rows become daily unit-price quotes (`PU Base Manha`).
#[derive(Debug, Clone)]
pub struct TesouroDiretoClient {
    http: reqwest::Client,
    prices_url: String,
}

impl Default for TesouroDiretoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TesouroDiretoClient {
    pub fn new() -> Self {
        Self::with_prices_url(DEFAULT_PRICES_URL)
    }

    pub fn with_prices_url(prices_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            prices_url: prices_url.into(),
        }
    }
}

#[async_trait]
impl QuoteProvider for TesouroDiretoClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(
        &self,
        ticker: &Ticker,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<QuoteRecord>, MarketError> {
        let (series, maturity) = parse_ticker_maturity(ticker).ok_or_else(|| {
            MarketError::Validation(format!(
                "ticker {ticker} does not name a treasury series and maturity"
            ))
        })?;

        debug!(%ticker, series, %maturity, "fetching treasury prices");

        let response = self
            .http
            .get(&self.prices_url)
            .send()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?
            .error_for_status()
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|error| MarketError::provider(PROVIDER, error))?;

        // The dataset is latin-1; map bytes straight to chars
        let text: String = bytes.iter().map(|&byte| byte as char).collect();

        parse_prices_csv(&text, series, maturity, ticker, from, to)
    }
}

/// Parse an internal treasury ticker into the Tesouro Direto series name and maturity date.
///
/// eg/ `LFT-MAR23` -> ("Tesouro Selic", 2023-03-01), `NTNB-AGO28` -> ("Tesouro IPCA+", 2028-08-01)
pub fn parse_ticker_maturity(ticker: &Ticker) -> Option<(&'static str, NaiveDate)> {
    let mut parts = ticker.as_str().split('-');
    let series = match parts.next()? {
        "LFT" => "Tesouro Selic",
        "LTN" => "Tesouro Prefixado",
        "NTNF" => "Tesouro Prefixado com Juros Semestrais",
        "NTNB" => "Tesouro IPCA+",
        _ => return None,
    };

    let maturity = parts.next()?;
    if maturity.len() != 5 {
        return None;
    }

    let month = match &maturity[..3] {
        "JAN" => 1,
        "FEV" => 2,
        "MAR" => 3,
        "ABR" => 4,
        "MAI" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AGO" => 8,
        "SET" => 9,
        "OUT" => 10,
        "NOV" => 11,
        "DEZ" => 12,
        _ => return None,
    };

    let year = 2000 + maturity[3..].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1).map(|date| (series, date))
}

fn parse_prices_csv(
    text: &str,
    series: &str,
    maturity: NaiveDate,
    ticker: &Ticker,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<QuoteRecord>, MarketError> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| MarketError::invalid_response(PROVIDER, "empty dataset"))?;

    let columns: Vec<&str> = header.split(';').map(str::trim).collect();
    let series_col = column(&columns, "Tipo Titulo")?;
    let maturity_col = column(&columns, "Data Vencimento")?;
    let base_date_col = column(&columns, "Data Base")?;
    let unit_price_col = column(&columns, "PU Base Manha")?;

    let mut records = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if fields.len() <= unit_price_col.max(base_date_col) {
            continue;
        }

        if fields[series_col] != series {
            continue;
        }
        if parse_br_date(fields[maturity_col]) != Some(maturity) {
            continue;
        }

        let Some(date) = parse_br_date(fields[base_date_col]) else {
            continue;
        };
        if date < from || date > to {
            continue;
        }

        let Some(unit_price) = parse_br_decimal(fields[unit_price_col]) else {
            continue;
        };

        records.push(QuoteRecord {
            ticker: ticker.clone(),
            date,
            open: None,
            high: None,
            low: None,
            close: unit_price,
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

/// Parse `DD/MM/YYYY`.
fn parse_br_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}

/// Parse a Brazilian-formatted decimal: `.` thousands separator, `,` decimal separator.
fn parse_br_decimal(raw: &str) -> Option<Decimal> {
    let normalized: String = raw
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    normalized.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_ticker_maturity() {
        struct TestCase {
            input: &'static str,
            expected: Option<(&'static str, NaiveDate)>,
        }

        let cases = vec![
            TestCase {
                input: "LFT-MAR23",
                expected: Some(("Tesouro Selic", NaiveDate::from_ymd_opt(2023, 3, 1).unwrap())),
            },
            TestCase {
                input: "NTNB-AGO28",
                expected: Some(("Tesouro IPCA+", NaiveDate::from_ymd_opt(2028, 8, 1).unwrap())),
            },
            TestCase {
                input: "NTNF-JAN27",
                expected: Some((
                    "Tesouro Prefixado com Juros Semestrais",
                    NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
                )),
            },
            TestCase {
                input: "PETR4",
                expected: None,
            },
            TestCase {
                input: "LFT-XXX23",
                expected: None,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                parse_ticker_maturity(&Ticker::new(test.input)),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_parse_prices_csv_filters_series_and_range() {
        let csv = "\
Tipo Titulo;Data Vencimento;Data Base;Taxa Compra Manha;Taxa Venda Manha;PU Compra Manha;PU Venda Manha;PU Base Manha
Tesouro Selic;01/03/2023;02/01/2023;0,05;0,09;13.500,10;13.498,22;13.499,16
Tesouro Selic;01/03/2023;03/01/2023;0,05;0,09;13.510,00;13.508,00;13.509,00
Tesouro IPCA+;15/08/2028;02/01/2023;5,90;6,02;3.100,00;3.090,00;3.095,00
Tesouro Selic;01/03/2025;02/01/2023;0,05;0,09;12.000,00;11.990,00;11.995,00
";

        let ticker = Ticker::new("LFT-MAR23");
        let records = parse_prices_csv(
            csv,
            "Tesouro Selic",
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
            &ticker,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, dec!(13499.16));
        assert_eq!(records[0].currency, Some(Currency::BRL));
    }

    #[test]
    fn test_parse_br_decimal() {
        assert_eq!(parse_br_decimal("13.499,16"), Some(dec!(13499.16)));
        assert_eq!(parse_br_decimal("0,05"), Some(dec!(0.05)));
        assert_eq!(parse_br_decimal("garbage"), None);
    }
}
