use carteira_instrument::currency::Currency;
use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine configuration. Every option has a default; adapters populate it from their own
/// named-options source (environment, file) via serde.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CarteiraConfig {
    /// Target currency for NAV and consolidated snapshots.
    pub base_currency: Currency,
    /// Window for dated FX rate fallback lookups.
    pub fx_fallback_days: i64,
    /// Bootstrap share price for the first fund-share row.
    pub initial_share_value: Decimal,
    /// TTL of the optional latest-price cache, in seconds.
    pub price_cache_ttl_seconds: u64,
    /// Worker count for batch quote fetching.
    pub quote_fetch_parallelism: usize,
    /// Upload size cap for ingested PDFs, in bytes.
    pub max_pdf_bytes: u64,
    /// Cron-like times of the periodic jobs.
    pub schedule: JobSchedule,
}

impl Default for CarteiraConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::BRL,
            fx_fallback_days: 7,
            initial_share_value: Decimal::ONE_HUNDRED,
            price_cache_ttl_seconds: 300,
            quote_fetch_parallelism: 5,
            max_pdf_bytes: 20 * 1024 * 1024,
            schedule: JobSchedule::default(),
        }
    }
}

/// Times of day the pluggable task runner is expected to trigger each job, in `timezone`.
/// The engine only exposes the pure entry points (see [`crate::scheduler`]); nothing here
/// schedules anything by itself.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JobSchedule {
    pub timezone: Tz,
    pub quote_sync_times: Vec<NaiveTime>,
    pub nav_time: NaiveTime,
    pub snapshot_time: NaiveTime,
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Sao_Paulo,
            quote_sync_times: vec![time(10, 30), time(14, 0), time(18, 30)],
            nav_time: time(19, 0),
            snapshot_time: time(19, 30),
        }
    }
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("static times are valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = CarteiraConfig::default();
        assert_eq!(config.base_currency, Currency::BRL);
        assert_eq!(config.fx_fallback_days, 7);
        assert_eq!(config.initial_share_value, dec!(100));
        assert_eq!(config.schedule.timezone, chrono_tz::America::Sao_Paulo);
        assert_eq!(config.schedule.quote_sync_times.len(), 3);
    }

    #[test]
    fn test_partial_overrides_deserialise() {
        let config: CarteiraConfig =
            serde_json::from_str(r#"{"base_currency": "USD", "fx_fallback_days": 3}"#).unwrap();
        assert_eq!(config.base_currency, Currency::USD);
        assert_eq!(config.fx_fallback_days, 3);
        // Untouched options keep their defaults
        assert_eq!(config.quote_fetch_parallelism, 5);
    }
}
