use crate::position::replay::RealizedPnlEntry;
use carteira_instrument::{AccountId, AssetId, DocumentId, RealizedTradeId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A permanent, append-only record of a closed quantity.
///
/// Two writers feed this table with disjoint provenance: replay persists its closing fills
/// (no `document_id`), and statement reconciliation records positions that disappeared from a
/// statement (`document_id` set). Aggregation APIs recompute from replay and never read this
/// table back.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RealizedTrade {
    pub id: RealizedTradeId,
    pub account_id: AccountId,
    pub asset_id: AssetId,
    pub open_quantity: Decimal,
    pub open_avg_price: Decimal,
    pub open_date: Option<NaiveDate>,
    pub close_quantity: Decimal,
    pub close_avg_price: Decimal,
    pub close_date: NaiveDate,
    pub realized_pnl: Decimal,
    pub realized_pnl_pct: Option<Decimal>,
    pub document_id: Option<DocumentId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RealizedTrade {
    /// Key that makes replay persistence idempotent: a re-run of the same transaction set
    /// maps onto the same keys and inserts nothing new.
    pub fn dedup_key(&self) -> (AccountId, AssetId, NaiveDate, Decimal, Decimal) {
        (
            self.account_id,
            self.asset_id,
            self.close_date,
            self.close_quantity,
            self.close_avg_price,
        )
    }

    /// Build the persistent record for a replay-closed fill.
    pub fn from_entry(entry: &RealizedPnlEntry) -> Self {
        let pct = (!entry.cost_basis.is_zero())
            .then(|| (entry.realized_pnl / entry.cost_basis * Decimal::ONE_HUNDRED).round_dp(4));

        Self {
            id: RealizedTradeId::random(),
            account_id: entry.account_id,
            asset_id: entry.asset_id,
            open_quantity: entry.quantity.round_dp(8),
            open_avg_price: entry.avg_open_price.round_dp(6),
            open_date: entry.open_date.map(|date| date.date_naive()),
            close_quantity: entry.quantity.round_dp(8),
            close_avg_price: entry.close_price.round_dp(6),
            close_date: entry.executed_at.date_naive(),
            realized_pnl: entry.realized_pnl.round_dp(2),
            realized_pnl_pct: pct,
            document_id: None,
            notes: None,
            created_at: Utc::now(),
        }
    }
}
