use crate::{
    error::CarteiraError,
    ledger::TransactionKind,
    position::{Position, PositionKind, PositionSource},
    store::{AssetStore, PositionStore, RealizedTradeStore, TransactionStore},
    trade::RealizedTrade,
};
use carteira_ingest::parsed::RawStatementPosition;
use carteira_instrument::{ticker::Ticker, AccountId, DocumentId, PositionId, RealizedTradeId};
use carteira_market::store::AssetCatalog;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// A statement position normalized for reconciliation: quantity sign resolved into the
/// direction, zero-quantity rows dropped, total cost defaulted to quantity × average price.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NormalizedStatementPosition {
    pub ticker: Ticker,
    pub kind: PositionKind,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub total_cost: Decimal,
    pub current_price: Option<Decimal>,
}

/// Outcome counts of one reconciliation run. Per-ticker failures land in `warnings` and never
/// abort the run.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ReconciliationReport {
    pub positions_created: usize,
    pub positions_updated: usize,
    pub positions_closed: usize,
    pub realized_trades_created: usize,
    pub warnings: Vec<String>,
}

/// Normalize raw statement positions. Entries with an empty ticker or zero quantity are
/// dropped; a negative quantity marks a SHORT and is stored absolute.
pub fn normalize_statement_positions(
    raw: &[RawStatementPosition],
) -> Vec<NormalizedStatementPosition> {
    raw.iter()
        .filter(|position| !position.ticker.is_empty())
        .filter(|position| !position.quantity.is_zero())
        .map(|position| {
            let (kind, quantity) = if position.quantity < Decimal::ZERO {
                (PositionKind::Short, position.quantity.abs())
            } else {
                (PositionKind::Long, position.quantity)
            };

            let total_cost = position
                .total_cost
                .map(|amount| amount.abs())
                .unwrap_or(quantity * position.avg_price);

            NormalizedStatementPosition {
                ticker: position.ticker.clone(),
                kind,
                quantity,
                avg_price: position.avg_price,
                total_cost,
                current_price: position.current_price,
            }
        })
        .collect()
}

/// Reconcile an account's stored positions against a statement.
///
/// The statement is the source of truth for the account at its period end:
/// * only in the statement -> create the position with `source = STATEMENT`, auto-creating
///   the asset when the ticker is unknown;
/// * in both -> overwrite the stored row with the statement values;
/// * only in the store -> the position was closed before the statement: record a
///   [`RealizedTrade`] dated at the statement end and delete the row. The close price comes
///   from the document's matching SELL (LONG) or BUY (SHORT), else the stored average price.
pub async fn reconcile<S>(
    store: &S,
    account_id: AccountId,
    document_id: DocumentId,
    statement_positions: &[RawStatementPosition],
    statement_date: Option<NaiveDate>,
) -> Result<ReconciliationReport, CarteiraError>
where
    S: PositionStore + TransactionStore + RealizedTradeStore + AssetStore + AssetCatalog,
{
    let close_date = statement_date.unwrap_or_else(|| Utc::now().date_naive());
    let normalized = normalize_statement_positions(statement_positions);

    info!(
        %account_id,
        %document_id,
        statement_positions = normalized.len(),
        "reconciliation started"
    );

    let mut report = ReconciliationReport::default();

    let current = store.positions_for_account(account_id).await?;
    let mut current_by_ticker: HashMap<Ticker, Position> = HashMap::new();
    for position in current {
        match store_ticker(store, &position).await {
            Ok(ticker) => {
                current_by_ticker.insert(ticker, position);
            }
            Err(error) => report
                .warnings
                .push(format!("asset lookup failed for {}: {error}", position.asset_id)),
        }
    }

    let statement_by_ticker: HashMap<Ticker, NormalizedStatementPosition> = normalized
        .into_iter()
        .map(|position| (position.ticker.clone(), position))
        .collect();

    // The anchor timestamp replay seeds from: transactions after the statement period end
    // apply on top of the statement state
    let anchor = crate::fund::end_of_day(close_date) - chrono::Duration::seconds(1);

    for (ticker, statement_position) in &statement_by_ticker {
        match current_by_ticker.get(ticker) {
            // In both: overwrite with the statement values
            Some(existing) => {
                let mut updated = existing.clone();
                updated.kind = statement_position.kind;
                updated.quantity = statement_position.quantity;
                updated.avg_price = statement_position.avg_price;
                updated.total_cost = statement_position.total_cost;
                updated.source = PositionSource::Statement;
                updated.updated_at = anchor;

                match store.upsert_position(updated).await {
                    Ok(()) => report.positions_updated += 1,
                    Err(error) => report
                        .warnings
                        .push(format!("failed to update position for {ticker}: {error}")),
                }
            }
            // Only in the statement: create
            None => match create_from_statement(
                store,
                account_id,
                statement_position,
                anchor,
            )
            .await
            {
                Ok(()) => report.positions_created += 1,
                Err(error) => report
                    .warnings
                    .push(format!("failed to create position for {ticker}: {error}")),
            },
        }
    }

    // Only in the store: closed before this statement
    for (ticker, position) in &current_by_ticker {
        if statement_by_ticker.contains_key(ticker) {
            continue;
        }

        match close_position(store, position, document_id, close_date).await {
            Ok(()) => {
                report.positions_closed += 1;
                report.realized_trades_created += 1;
            }
            Err(error) => report
                .warnings
                .push(format!("failed to close position for {ticker}: {error}")),
        }
    }

    info!(
        %account_id,
        created = report.positions_created,
        updated = report.positions_updated,
        closed = report.positions_closed,
        warnings = report.warnings.len(),
        "reconciliation complete"
    );

    Ok(report)
}

/// First-import variant: delete every position of the account and insert the statement
/// positions verbatim. No realized trades are recorded.
pub async fn migrate<S>(
    store: &S,
    account_id: AccountId,
    statement_positions: &[RawStatementPosition],
    statement_date: Option<NaiveDate>,
) -> Result<ReconciliationReport, CarteiraError>
where
    S: PositionStore + AssetCatalog,
{
    let normalized = normalize_statement_positions(statement_positions);
    let mut report = ReconciliationReport::default();

    if normalized.is_empty() {
        warn!(%account_id, "migration received no usable statement positions");
        return Ok(report);
    }

    store.remove_account_positions(account_id).await?;

    let anchor = crate::fund::end_of_day(
        statement_date.unwrap_or_else(|| Utc::now().date_naive()),
    ) - chrono::Duration::seconds(1);

    for statement_position in &normalized {
        match create_from_statement(store, account_id, statement_position, anchor).await {
            Ok(()) => report.positions_created += 1,
            Err(error) => report.warnings.push(format!(
                "failed to create position for {}: {error}",
                statement_position.ticker
            )),
        }
    }

    info!(
        %account_id,
        created = report.positions_created,
        warnings = report.warnings.len(),
        "position migration complete"
    );

    Ok(report)
}

async fn create_from_statement<S>(
    store: &S,
    account_id: AccountId,
    statement_position: &NormalizedStatementPosition,
    anchor: chrono::DateTime<Utc>,
) -> Result<(), CarteiraError>
where
    S: PositionStore + AssetCatalog,
{
    let asset = store.resolve_or_create(&statement_position.ticker).await?;

    store
        .upsert_position(Position {
            id: PositionId::random(),
            account_id,
            asset_id: asset.id,
            kind: statement_position.kind,
            quantity: statement_position.quantity,
            avg_price: statement_position.avg_price,
            total_cost: statement_position.total_cost,
            source: PositionSource::Statement,
            opened_at: None,
            updated_at: anchor,
        })
        .await?;

    Ok(())
}

async fn close_position<S>(
    store: &S,
    position: &Position,
    document_id: DocumentId,
    close_date: NaiveDate,
) -> Result<(), CarteiraError>
where
    S: PositionStore + TransactionStore + RealizedTradeStore,
{
    // Prefer the actual closing fill recorded in the same document
    let close_kind = match position.kind {
        PositionKind::Short => TransactionKind::Buy,
        _ => TransactionKind::Sell,
    };
    let close_price = store
        .latest_document_transaction(position.account_id, position.asset_id, document_id, close_kind)
        .await?
        .map(|transaction| transaction.price)
        .filter(|price| !price.is_zero())
        .unwrap_or(position.avg_price);

    let realized_pnl = match position.kind {
        PositionKind::Short => (position.avg_price - close_price) * position.quantity,
        _ => (close_price - position.avg_price) * position.quantity,
    };
    let realized_pnl_pct = (!position.total_cost.is_zero()).then(|| {
        (realized_pnl / position.total_cost.abs() * Decimal::ONE_HUNDRED).round_dp(4)
    });

    store
        .insert_realized_trade(RealizedTrade {
            id: RealizedTradeId::random(),
            account_id: position.account_id,
            asset_id: position.asset_id,
            open_quantity: position.quantity,
            open_avg_price: position.avg_price,
            open_date: position.opened_at.map(|opened| opened.date_naive()),
            close_quantity: position.quantity,
            close_avg_price: close_price.round_dp(6),
            close_date,
            realized_pnl: realized_pnl.round_dp(2),
            realized_pnl_pct,
            document_id: Some(document_id),
            notes: Some(format!(
                "Position closed - not present in statement dated {close_date}"
            )),
            created_at: Utc::now(),
        })
        .await?;

    store
        .remove_position(position.account_id, position.asset_id)
        .await?;

    Ok(())
}

/// Positions only carry asset ids; the ticker is the reconciliation key.
async fn store_ticker<S>(store: &S, position: &Position) -> Result<Ticker, CarteiraError>
where
    S: AssetStore,
{
    Ok(store.asset(position.asset_id).await?.ticker)
}
