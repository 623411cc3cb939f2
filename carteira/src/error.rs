use crate::store::StoreError;
use carteira_ingest::IngestError;
use carteira_market::MarketError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level engine error.
///
/// User-input failures (`Validation`, `NotFound`, `Conflict`, `InsufficientShares`) surface
/// unchanged and are never retried. Provider failures are retried only in scheduled contexts.
/// `InvariantViolated` signals a broken netting invariant and is fatal.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CarteiraError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient shares: need {requested}, have {outstanding}")]
    InsufficientShares {
        requested: Decimal,
        outstanding: Decimal,
    },

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("market data: {0}")]
    Market(#[from] MarketError),

    #[error("ingest: {0}")]
    Ingest(#[from] IngestError),
}

impl CarteiraError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
