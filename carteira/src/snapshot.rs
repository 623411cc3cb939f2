use crate::{
    error::CarteiraError,
    pnl::{self, PnlFilter},
    position::PositionKind,
    store::{
        AccountStore, AssetStore, FundShareStore, PositionStore, SnapshotStore, TransactionStore,
    },
    CarteiraConfig,
};
use carteira_instrument::{
    account::Account,
    category::{Category, CategoryBreakdown},
    currency::Currency,
    AccountId, AssetId, DocumentId, UserId,
};
use carteira_market::store::{QuoteStore, RateStore};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Materialized daily totals of a portfolio. Unique on (user_id, date, account_id); the
/// consolidated row carries `account_id = None` and sums the per-account rows in base
/// currency.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PortfolioSnapshot {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub account_id: Option<AccountId>,
    pub currency: Currency,
    pub nav: Decimal,
    pub total_cost: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub breakdown: CategoryBreakdown,
    /// Source statement, when this snapshot was overwritten by one.
    pub document_id: Option<DocumentId>,
}

/// Materialise the consolidated and per-account snapshots of one user at `date` from the
/// store's positions and prices. Returns how many snapshot rows were written.
pub async fn materialize_for_user<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    date: NaiveDate,
) -> Result<usize, CarteiraError>
where
    S: PositionStore
        + AssetStore
        + AccountStore
        + TransactionStore
        + SnapshotStore
        + QuoteStore
        + RateStore,
{
    let positions = store.positions_for_user(user_id).await?;
    if positions.is_empty() {
        return Ok(0);
    }

    let asset_ids: Vec<AssetId> = positions.iter().map(|position| position.asset_id).collect();
    let prices = store.prices_at(&asset_ids, date).await?;
    let assets = store.assets(&asset_ids).await?;
    let categories: HashMap<AssetId, Category> = assets
        .iter()
        .map(|asset| (asset.id, Category::from(asset.kind)))
        .collect();

    let accounts: HashMap<AccountId, Account> = store
        .accounts_for_user(user_id)
        .await?
        .into_iter()
        .map(|account| (account.id, account))
        .collect();

    // Group positions per account
    let mut by_account: HashMap<AccountId, Vec<&crate::position::Position>> = HashMap::new();
    for position in &positions {
        by_account.entry(position.account_id).or_default().push(position);
    }

    let mut written = 0;
    let mut consolidated = PortfolioSnapshot {
        user_id,
        date,
        account_id: None,
        currency: config.base_currency.clone(),
        nav: Decimal::ZERO,
        total_cost: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
        unrealized_pnl: Decimal::ZERO,
        breakdown: CategoryBreakdown::default(),
        document_id: None,
    };

    for (account_id, account_positions) in by_account {
        let mut snapshot = PortfolioSnapshot {
            user_id,
            date,
            account_id: Some(account_id),
            currency: accounts
                .get(&account_id)
                .map(|account| account.currency.clone())
                .unwrap_or_else(|| config.base_currency.clone()),
            nav: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            breakdown: CategoryBreakdown::default(),
            document_id: None,
        };

        for position in account_positions {
            let sign = if position.kind == PositionKind::Short {
                Decimal::NEGATIVE_ONE
            } else {
                Decimal::ONE
            };

            let market_value = match prices.get(&position.asset_id) {
                Some(price) => {
                    let market_value = position.market_value(*price);
                    let pnl = match position.kind {
                        PositionKind::Short => position.total_cost - market_value,
                        _ => market_value - position.total_cost,
                    };
                    snapshot.unrealized_pnl += pnl;
                    market_value
                }
                // Carry the position at cost when no price is known
                None => position.total_cost,
            };

            snapshot.nav += sign * market_value;
            snapshot.total_cost += position.total_cost;

            let category = categories
                .get(&position.asset_id)
                .copied()
                .unwrap_or(Category::RendaVariavel);
            snapshot.breakdown.add(category, sign * market_value);
        }

        snapshot.realized_pnl = pnl::realized_pnl(
            store,
            &PnlFilter {
                account_id: Some(account_id),
                ..Default::default()
            },
        )
        .await?
        .total_realized_pnl;

        // Fold into the consolidated row, converting account currency to base
        let rate = store
            .rate(
                &snapshot.currency,
                &config.base_currency,
                date,
                config.fx_fallback_days,
            )
            .await?
            .unwrap_or(Decimal::ONE);

        fold_scaled(&mut consolidated, &snapshot, rate);

        store.upsert_snapshot(round_snapshot(snapshot)).await?;
        written += 1;
    }

    store.upsert_snapshot(round_snapshot(consolidated)).await?;
    written += 1;

    info!(%user_id, %date, snapshots = written, "snapshots materialised");
    Ok(written)
}

/// Overwrite the account snapshot with the statement's own consolidated totals - the
/// authoritative values for that date - then rebuild the consolidated row from the stored
/// per-account rows.
pub async fn apply_statement_snapshot<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    account_id: AccountId,
    date: NaiveDate,
    breakdown: &CategoryBreakdown,
    document_id: DocumentId,
) -> Result<(), CarteiraError>
where
    S: AccountStore + SnapshotStore + RateStore,
{
    let account = store.account(account_id).await?;

    let existing = store.snapshot(user_id, date, Some(account_id)).await?;
    let statement_snapshot = PortfolioSnapshot {
        user_id,
        date,
        account_id: Some(account_id),
        currency: account.currency,
        nav: breakdown.total().round_dp(2),
        total_cost: existing
            .as_ref()
            .map(|snapshot| snapshot.total_cost)
            .unwrap_or(Decimal::ZERO),
        realized_pnl: existing
            .as_ref()
            .map(|snapshot| snapshot.realized_pnl)
            .unwrap_or(Decimal::ZERO),
        unrealized_pnl: existing
            .as_ref()
            .map(|snapshot| snapshot.unrealized_pnl)
            .unwrap_or(Decimal::ZERO),
        breakdown: breakdown.clone(),
        document_id: Some(document_id),
    };
    store.upsert_snapshot(statement_snapshot).await?;

    // Rebuild the consolidated row as the sum of per-account rows in base currency
    let account_rows = store.account_snapshots(user_id, date).await?;
    let mut consolidated = PortfolioSnapshot {
        user_id,
        date,
        account_id: None,
        currency: config.base_currency.clone(),
        nav: Decimal::ZERO,
        total_cost: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
        unrealized_pnl: Decimal::ZERO,
        breakdown: CategoryBreakdown::default(),
        document_id: Some(document_id),
    };

    for row in account_rows {
        let rate = store
            .rate(&row.currency, &config.base_currency, date, config.fx_fallback_days)
            .await?
            .unwrap_or(Decimal::ONE);

        fold_scaled(&mut consolidated, &row, rate);
    }

    store.upsert_snapshot(round_snapshot(consolidated)).await?;

    info!(%user_id, %account_id, %date, "statement snapshot applied");
    Ok(())
}

/// One point of a portfolio value series.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub nav: Decimal,
}

/// Daily portfolio value history, newest first. The quota ledger is preferred; dates without
/// fund-share rows fall back to the materialised consolidated snapshots.
pub async fn portfolio_history<S>(
    store: &S,
    user_id: UserId,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: usize,
) -> Result<Vec<HistoryPoint>, CarteiraError>
where
    S: FundShareStore + SnapshotStore,
{
    let shares = store.fund_share_history(user_id, from, to, limit).await?;
    if !shares.is_empty() {
        return Ok(shares
            .into_iter()
            .map(|share| HistoryPoint {
                date: share.date,
                nav: share.nav,
            })
            .collect());
    }

    Ok(store
        .snapshot_history(user_id, from, to, limit)
        .await?
        .into_iter()
        .map(|snapshot| HistoryPoint {
            date: snapshot.date,
            nav: snapshot.nav,
        })
        .collect())
}

/// Fold an account row into the consolidated row, scaled by the FX rate to base currency.
fn fold_scaled(consolidated: &mut PortfolioSnapshot, row: &PortfolioSnapshot, rate: Decimal) {
    consolidated.nav += row.nav * rate;
    consolidated.total_cost += row.total_cost * rate;
    consolidated.realized_pnl += row.realized_pnl * rate;
    consolidated.unrealized_pnl += row.unrealized_pnl * rate;

    consolidated.breakdown.add(Category::RendaFixa, row.breakdown.renda_fixa * rate);
    consolidated
        .breakdown
        .add(Category::FundosInvestimento, row.breakdown.fundos_investimento * rate);
    consolidated
        .breakdown
        .add(Category::RendaVariavel, row.breakdown.renda_variavel * rate);
    consolidated.breakdown.add(Category::Derivativos, row.breakdown.derivativos * rate);
    consolidated.breakdown.add(Category::ContaCorrente, row.breakdown.conta_corrente * rate);
    consolidated.breakdown.add(Category::Coe, row.breakdown.coe * rate);
}

fn round_snapshot(mut snapshot: PortfolioSnapshot) -> PortfolioSnapshot {
    snapshot.nav = snapshot.nav.round_dp(2);
    snapshot.total_cost = snapshot.total_cost.round_dp(2);
    snapshot.realized_pnl = snapshot.realized_pnl.round_dp(2);
    snapshot.unrealized_pnl = snapshot.unrealized_pnl.round_dp(2);
    snapshot
}
