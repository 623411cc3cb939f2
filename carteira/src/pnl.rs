use crate::{
    error::CarteiraError,
    position::{
        replay::{PositionState, RealizedPnlEntry},
        Position, PositionKind,
    },
    store::{TransactionFilter, TransactionStore},
};
use carteira_instrument::{ticker::Ticker, AccountId, AssetId, UserId};
use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Scope of a realized-P&L aggregation.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PnlFilter {
    pub account_id: Option<AccountId>,
    pub asset_id: Option<AssetId>,
    pub user_id: Option<UserId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Aggregated realized P&L over a scope.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct RealizedPnlSummary {
    pub total_realized_pnl: Decimal,
    pub total_proceeds: Decimal,
    pub total_cost_basis: Decimal,
    pub total_fees: Decimal,
    pub entry_count: usize,
    pub entries: Vec<RealizedPnlEntry>,
}

impl RealizedPnlSummary {
    fn from_entries(entries: Vec<RealizedPnlEntry>) -> Self {
        Self {
            total_realized_pnl: entries.iter().map(|entry| entry.realized_pnl).sum(),
            total_proceeds: entries.iter().map(|entry| entry.gross_proceeds).sum(),
            total_cost_basis: entries.iter().map(|entry| entry.cost_basis).sum(),
            total_fees: entries.iter().map(|entry| entry.fees).sum(),
            entry_count: entries.len(),
            entries,
        }
    }
}

/// Realized P&L over the filtered scope, computed by re-running the replay state machine
/// per (account, asset) group.
///
/// The aggregation deliberately re-derives from the journal instead of reading the persisted
/// realized-trade records, which are a physical log and may lag.
pub async fn realized_pnl<S>(
    store: &S,
    filter: &PnlFilter,
) -> Result<RealizedPnlSummary, CarteiraError>
where
    S: TransactionStore,
{
    let transactions = store
        .transactions(&TransactionFilter {
            account_id: filter.account_id,
            asset_id: filter.asset_id,
            user_id: filter.user_id,
            kind: None,
            from: filter.from,
            to: filter.to,
        })
        .await?;

    // Group by (account, asset); the global (executed_at, id) ordering is preserved within
    // each group
    let mut groups: IndexMap<(AccountId, AssetId), Vec<&crate::ledger::Transaction>> =
        IndexMap::new();
    for transaction in &transactions {
        groups
            .entry((transaction.account_id, transaction.asset_id))
            .or_default()
            .push(transaction);
    }

    let mut entries = Vec::new();
    for group in groups.into_values() {
        let mut state = PositionState::empty();
        for transaction in group {
            entries.extend(state.apply(transaction));
        }
    }

    entries.sort_by_key(|entry| (entry.executed_at, entry.transaction_id));

    debug!(
        entries = entries.len(),
        "realized pnl aggregation complete"
    );

    Ok(RealizedPnlSummary::from_entries(entries))
}

/// Realized P&L grouped by asset.
pub async fn realized_pnl_by_asset<S>(
    store: &S,
    filter: &PnlFilter,
) -> Result<HashMap<AssetId, RealizedPnlSummary>, CarteiraError>
where
    S: TransactionStore,
{
    let summary = realized_pnl(store, filter).await?;

    let mut by_asset: HashMap<AssetId, Vec<RealizedPnlEntry>> = HashMap::new();
    for entry in summary.entries {
        by_asset.entry(entry.asset_id).or_default().push(entry);
    }

    Ok(by_asset
        .into_iter()
        .map(|(asset_id, entries)| (asset_id, RealizedPnlSummary::from_entries(entries)))
        .collect())
}

/// Unrealized P&L of one open position joined with a price.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct UnrealizedPnlEntry {
    pub position_id: carteira_instrument::PositionId,
    pub asset_id: AssetId,
    pub ticker: Option<Ticker>,
    pub kind: PositionKind,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub total_cost: Decimal,
    pub current_price: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pnl_pct: Option<Decimal>,
}

/// Aggregated unrealized P&L with long/short separation.
///
/// Positions without a known price contribute their cost to `total_cost` but nothing to the
/// market-value totals.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct UnrealizedPnlSummary {
    /// Net market value: long value minus short value.
    pub total_market_value: Decimal,
    pub total_cost: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_unrealized_pnl_pct: Option<Decimal>,
    pub long_value: Decimal,
    pub short_value: Decimal,
    /// long + short.
    pub gross_exposure: Decimal,
    /// long - short.
    pub net_exposure: Decimal,
    pub positions_count: usize,
    pub positions_with_prices: usize,
    pub entries: Vec<UnrealizedPnlEntry>,
}

/// Join open positions with current prices.
///
/// LONG: `unrealized = market_value - total_cost`. SHORT: the basis is the proceeds received,
/// so `unrealized = total_cost - market_value` (cheaper to buy back is a gain).
pub fn unrealized(
    positions: &[Position],
    prices: &HashMap<AssetId, Decimal>,
    tickers: &HashMap<AssetId, Ticker>,
) -> UnrealizedPnlSummary {
    let mut summary = UnrealizedPnlSummary::default();

    for position in positions {
        if position.quantity <= Decimal::ZERO {
            continue;
        }

        let current_price = prices.get(&position.asset_id).copied();
        let (market_value, unrealized_pnl, unrealized_pnl_pct) = match current_price {
            Some(price) => {
                let market_value = position.market_value(price);
                let pnl = match position.kind {
                    PositionKind::Short => position.total_cost - market_value,
                    _ => market_value - position.total_cost,
                };
                let pct = (position.total_cost > Decimal::ZERO)
                    .then(|| pnl / position.total_cost * Decimal::ONE_HUNDRED);

                match position.kind {
                    PositionKind::Short => summary.short_value += market_value,
                    _ => summary.long_value += market_value,
                }
                summary.total_unrealized_pnl += pnl;
                summary.positions_with_prices += 1;

                (Some(market_value), Some(pnl), pct)
            }
            None => (None, None, None),
        };

        summary.total_cost += position.total_cost;

        summary.entries.push(UnrealizedPnlEntry {
            position_id: position.id,
            asset_id: position.asset_id,
            ticker: tickers.get(&position.asset_id).cloned(),
            kind: position.kind,
            quantity: position.quantity,
            avg_price: position.avg_price,
            total_cost: position.total_cost,
            current_price,
            market_value,
            unrealized_pnl,
            unrealized_pnl_pct,
        });
    }

    summary.positions_count = summary.entries.len();
    summary.gross_exposure = summary.long_value + summary.short_value;
    summary.net_exposure = summary.long_value - summary.short_value;
    summary.total_market_value = summary.net_exposure;
    summary.total_unrealized_pnl_pct = (summary.total_cost > Decimal::ZERO
        && summary.positions_with_prices > 0)
        .then(|| summary.total_unrealized_pnl / summary.total_cost * Decimal::ONE_HUNDRED);

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionSource;
    use carteira_instrument::PositionId;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(kind: PositionKind, quantity: Decimal, total_cost: Decimal) -> Position {
        Position {
            id: PositionId::random(),
            account_id: AccountId::random(),
            asset_id: AssetId::random(),
            kind,
            quantity,
            avg_price: if quantity.is_zero() {
                Decimal::ZERO
            } else {
                total_cost / quantity
            },
            total_cost,
            source: PositionSource::Calculated,
            opened_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unrealized_long_and_short_totals() {
        let long = position(PositionKind::Long, dec!(100), dec!(1000.00));
        let short = position(PositionKind::Short, dec!(10), dec!(600.00));

        let mut prices = HashMap::new();
        prices.insert(long.asset_id, dec!(12.00)); // MV 1200, pnl +200
        prices.insert(short.asset_id, dec!(55.00)); // MV 550, pnl +50 (short gains)

        let summary = unrealized(&[long, short], &prices, &HashMap::new());

        assert_eq!(summary.long_value, dec!(1200.00));
        assert_eq!(summary.short_value, dec!(550.00));
        assert_eq!(summary.gross_exposure, dec!(1750.00));
        assert_eq!(summary.net_exposure, dec!(650.00));
        assert_eq!(summary.total_market_value, dec!(650.00));
        assert_eq!(summary.total_unrealized_pnl, dec!(250.00));
        assert_eq!(summary.positions_with_prices, 2);
    }

    #[test]
    fn test_unrealized_missing_price_contributes_cost_only() {
        let priced = position(PositionKind::Long, dec!(10), dec!(100.00));
        let unpriced = position(PositionKind::Long, dec!(5), dec!(50.00));

        let mut prices = HashMap::new();
        prices.insert(priced.asset_id, dec!(11.00));

        let summary = unrealized(&[priced, unpriced], &prices, &HashMap::new());

        assert_eq!(summary.positions_count, 2);
        assert_eq!(summary.positions_with_prices, 1);
        assert_eq!(summary.total_cost, dec!(150.00));
        assert_eq!(summary.total_market_value, dec!(110.00));
        assert_eq!(summary.total_unrealized_pnl, dec!(10.00));

        let entry = &summary.entries[1];
        assert_eq!(entry.market_value, None);
        assert_eq!(entry.unrealized_pnl, None);
        assert_eq!(entry.unrealized_pnl_pct, None);
    }

    #[test]
    fn test_unrealized_pct() {
        let long = position(PositionKind::Long, dec!(100), dec!(1000.00));
        let mut prices = HashMap::new();
        prices.insert(long.asset_id, dec!(11.00));

        let summary = unrealized(&[long], &prices, &HashMap::new());
        assert_eq!(summary.entries[0].unrealized_pnl_pct, Some(dec!(10.00)));
        assert_eq!(summary.total_unrealized_pnl_pct, Some(dec!(10.00)));
    }
}
