#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Carteira-Market
//! Dated market data for the Carteira portfolio engine: the per-(asset, date) OHLCV
//! [`Quote`](quote::Quote) store, the dated [`ExchangeRate`](fx::ExchangeRate) store with
//! fallback-window lookup, the pluggable [`QuoteProvider`](provider::QuoteProvider) /
//! [`FxProvider`](provider::FxProvider) adapters (equities, PTAX, treasury bonds, fund quotas),
//! and the bounded-parallelism quote synchronisation pipeline.

use thiserror::Error;

/// Optional TTL cache over latest prices. All operations remain correct with the cache empty.
pub mod cache;

/// Dated currency [`ExchangeRate`](fx::ExchangeRate) data structures.
pub mod fx;

/// Provider adapters fetching [`quote::QuoteRecord`] / [`fx::RateRecord`] batches.
pub mod provider;

/// Per-(asset, date) [`Quote`](quote::Quote) data structures.
pub mod quote;

/// [`QuoteStore`](store::QuoteStore) / [`RateStore`](store::RateStore) traits and the in-memory
/// implementation.
pub mod store;

/// Quote & FX synchronisation pipelines feeding providers into the stores.
pub mod sync;

/// Errors generated by market data stores and provider adapters.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MarketError {
    #[error("provider {provider}: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("validation: {0}")]
    Validation(String),

    #[error("store: {0}")]
    Store(String),
}

impl MarketError {
    pub fn provider(provider: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider,
            message: error.to_string(),
        }
    }

    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: message.into(),
        }
    }
}
