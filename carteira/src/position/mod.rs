use crate::{
    error::CarteiraError,
    store::{AssetStore, PositionStore},
};
use carteira_instrument::{
    asset::AssetKind,
    category::{Category, CategoryBreakdown},
    ticker::Ticker,
    AccountId, AssetId, PositionId, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

pub mod replay;

/// Direction of an open position.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    Long,
    Short,
    DayTrade,
}

impl Display for PositionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PositionKind::Long => "long",
            PositionKind::Short => "short",
            PositionKind::DayTrade => "day_trade",
        };
        write!(f, "{name}")
    }
}

/// Provenance of a position row.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// Derived by replaying the transaction log.
    Calculated,
    /// Set by statement reconciliation. Subsequent replays must treat this row as the
    /// authoritative opening state and only apply transactions after its `updated_at`.
    Statement,
}

/// The current open exposure for one (account, asset) pair.
///
/// Netting invariant: at most one row per (account_id, asset_id) - a long and a short never
/// coexist. `total_cost` is the cost basis for a LONG and the proceeds basis for a SHORT.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub asset_id: AssetId,
    pub kind: PositionKind,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub total_cost: Decimal,
    pub source: PositionSource,
    pub opened_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Market value at `price`, always positive; the short sign is applied where exposure is
    /// aggregated.
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }
}

/// One asset held across several accounts, aggregated with a weighted average price.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ConsolidatedPosition {
    pub asset_id: AssetId,
    pub ticker: Ticker,
    pub asset_name: String,
    pub kind: AssetKind,
    pub total_quantity: Decimal,
    pub weighted_avg_price: Decimal,
    pub total_cost: Decimal,
    pub accounts_count: usize,
}

/// Aggregate a user's open LONG positions across accounts, one row per asset.
pub async fn consolidated_positions<S>(
    store: &S,
    user_id: UserId,
) -> Result<Vec<ConsolidatedPosition>, CarteiraError>
where
    S: PositionStore + AssetStore,
{
    let positions = store.positions_for_user(user_id).await?;

    let mut by_asset: HashMap<AssetId, (Decimal, Decimal, usize)> = HashMap::new();
    for position in positions
        .iter()
        .filter(|position| position.kind != PositionKind::Short)
    {
        let entry = by_asset
            .entry(position.asset_id)
            .or_insert((Decimal::ZERO, Decimal::ZERO, 0));
        entry.0 += position.quantity;
        entry.1 += position.total_cost;
        entry.2 += 1;
    }

    let asset_ids: Vec<AssetId> = by_asset.keys().copied().collect();
    let assets = store.assets(&asset_ids).await?;

    let mut consolidated: Vec<ConsolidatedPosition> = assets
        .into_iter()
        .filter_map(|asset| {
            let (total_quantity, total_cost, accounts_count) = by_asset.get(&asset.id)?;
            Some(ConsolidatedPosition {
                asset_id: asset.id,
                ticker: asset.ticker,
                asset_name: asset.name,
                kind: asset.kind,
                total_quantity: *total_quantity,
                weighted_avg_price: if total_quantity.is_zero() {
                    Decimal::ZERO
                } else {
                    (total_cost / total_quantity).round_dp(6)
                },
                total_cost: *total_cost,
                accounts_count: *accounts_count,
            })
        })
        .collect();

    consolidated.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    Ok(consolidated)
}

/// Counts and cost totals of a set of open positions, with a cost-basis category breakdown.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct PositionSummary {
    pub positions_count: usize,
    pub long_count: usize,
    pub short_count: usize,
    pub total_cost: Decimal,
    pub breakdown: CategoryBreakdown,
}

/// Summarise open positions by direction and category. `kinds` maps each asset to its kind;
/// unknown assets count as variable income.
pub fn summarize(positions: &[Position], kinds: &HashMap<AssetId, AssetKind>) -> PositionSummary {
    let mut summary = PositionSummary::default();

    for position in positions {
        if position.quantity <= Decimal::ZERO {
            continue;
        }

        summary.positions_count += 1;
        match position.kind {
            PositionKind::Short => summary.short_count += 1,
            _ => summary.long_count += 1,
        }
        summary.total_cost += position.total_cost;

        let category = kinds
            .get(&position.asset_id)
            .copied()
            .map(Category::from)
            .unwrap_or(Category::RendaVariavel);
        summary.breakdown.add(category, position.total_cost);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(kind: PositionKind, quantity: Decimal, total_cost: Decimal) -> Position {
        Position {
            id: PositionId::random(),
            account_id: AccountId::random(),
            asset_id: AssetId::random(),
            kind,
            quantity,
            avg_price: Decimal::ZERO,
            total_cost,
            source: PositionSource::Calculated,
            opened_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_counts_and_breakdown() {
        let long = position(PositionKind::Long, dec!(100), dec!(1000.00));
        let short = position(PositionKind::Short, dec!(10), dec!(600.00));
        let mut kinds = HashMap::new();
        kinds.insert(long.asset_id, AssetKind::Fii);

        let summary = summarize(&[long, short], &kinds);

        assert_eq!(summary.positions_count, 2);
        assert_eq!(summary.long_count, 1);
        assert_eq!(summary.short_count, 1);
        assert_eq!(summary.total_cost, dec!(1600.00));
        // Both FII and the unknown asset land in variable income
        assert_eq!(summary.breakdown.renda_variavel, dec!(1600.00));
    }
}
