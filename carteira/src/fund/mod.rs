use crate::{
    config::CarteiraConfig,
    error::CarteiraError,
    position::PositionKind,
    store::{
        AssetStore, CashFlowStore, FundShareStore, PositionStore,
    },
};
use carteira_instrument::{currency::Currency, CashFlowId, FundShareId, UserId};
use carteira_market::store::{QuoteStore, RateStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

pub mod performance;

/// One row of the quota ledger: the fund-share state of a user at a date.
/// Unique on (user_id, date).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct FundShare {
    pub id: FundShareId,
    pub user_id: UserId,
    pub date: NaiveDate,
    /// NAV in base currency.
    pub nav: Decimal,
    pub shares_outstanding: Decimal,
    pub share_value: Decimal,
    pub daily_return: Option<Decimal>,
    pub cumulative_return: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Result of a NAV computation.
///
/// `nav` sums market values in each asset's own currency; the `_base` variants convert every
/// position through the dated FX rate into the configured base currency. LONG positions add,
/// SHORT positions subtract.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct NavResult {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub total_market_value: Decimal,
    pub total_cash: Decimal,
    pub nav: Decimal,
    pub long_value: Decimal,
    pub short_value: Decimal,
    pub positions_count: usize,
    pub positions_with_prices: usize,
    pub total_market_value_base: Decimal,
    pub total_cash_base: Decimal,
    pub nav_base: Decimal,
    /// The USD->base mid-rate applied, when one was needed and found.
    pub ptax_rate: Option<Decimal>,
}

/// Result of a share issuance or redemption.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SharesResult {
    pub cash_flow_id: CashFlowId,
    pub amount: Decimal,
    /// The previous day's share value the operation was priced at.
    pub share_value: Decimal,
    /// Positive for issuance, negative for redemption.
    pub shares_affected: Decimal,
    pub new_shares_outstanding: Decimal,
}

/// Compute the NAV of a user's portfolio at `target_date`.
///
/// NAV = Σ (position quantity × price at date, signed by direction) + cash balance. Positions
/// without a price at the date fall back to their cost basis. Cash is the signed sum of the
/// user's cash flows up to the end of the date.
pub async fn nav<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    target_date: NaiveDate,
    convert: bool,
) -> Result<NavResult, CarteiraError>
where
    S: PositionStore + AssetStore + CashFlowStore + QuoteStore + RateStore,
{
    let positions = store.positions_for_user(user_id).await?;
    let asset_ids: Vec<_> = positions
        .iter()
        .filter(|position| position.quantity > Decimal::ZERO)
        .map(|position| position.asset_id)
        .collect();

    let prices = store.prices_at(&asset_ids, target_date).await?;
    let assets = store.assets(&asset_ids).await?;
    let currencies: HashMap<_, _> = assets
        .into_iter()
        .map(|asset| (asset.id, asset.currency))
        .collect();

    let ptax_rate = if convert {
        store.ptax(target_date, config.fx_fallback_days).await?
    } else {
        None
    };

    let mut result = NavResult {
        user_id,
        date: target_date,
        total_market_value: Decimal::ZERO,
        total_cash: Decimal::ZERO,
        nav: Decimal::ZERO,
        long_value: Decimal::ZERO,
        short_value: Decimal::ZERO,
        positions_count: 0,
        positions_with_prices: 0,
        total_market_value_base: Decimal::ZERO,
        total_cash_base: Decimal::ZERO,
        nav_base: Decimal::ZERO,
        ptax_rate,
    };

    for position in &positions {
        if position.quantity <= Decimal::ZERO {
            continue;
        }
        result.positions_count += 1;

        let market_value = match prices.get(&position.asset_id) {
            Some(price) => {
                result.positions_with_prices += 1;
                position.market_value(*price)
            }
            // No price at the date: carry the position at cost
            None => position.total_cost,
        };

        let currency = currencies
            .get(&position.asset_id)
            .cloned()
            .unwrap_or_else(|| config.base_currency.clone());

        let market_value_base = if convert && currency != config.base_currency {
            store
                .convert(
                    market_value,
                    &currency,
                    &config.base_currency,
                    target_date,
                    config.fx_fallback_days,
                )
                .await?
                .amount
        } else {
            market_value
        };

        if position.kind == PositionKind::Short {
            result.short_value += market_value;
            result.total_market_value -= market_value;
            result.total_market_value_base -= market_value_base;
        } else {
            result.long_value += market_value;
            result.total_market_value += market_value;
            result.total_market_value_base += market_value_base;
        }
    }

    // Cash flows already carry their rate to base at execution time
    let cash = cash_balance(store, user_id, target_date).await?;
    result.total_cash = cash;
    result.total_cash_base = cash;

    result.nav = result.total_market_value + result.total_cash;
    result.nav_base = result.total_market_value_base + result.total_cash_base;

    info!(
        %user_id,
        date = %target_date,
        nav = %result.nav,
        nav_base = %result.nav_base,
        long_value = %result.long_value,
        short_value = %result.short_value,
        cash = %result.total_cash,
        positions = result.positions_count,
        positions_with_prices = result.positions_with_prices,
        "nav computed"
    );

    Ok(result)
}

/// Net cash balance from the user's cash flows up to the end of `as_of`: deposits add,
/// withdrawals subtract, everything else folds into position cost.
pub async fn cash_balance<S>(
    store: &S,
    user_id: UserId,
    as_of: NaiveDate,
) -> Result<Decimal, CarteiraError>
where
    S: CashFlowStore,
{
    let flows = store
        .cash_flows_for_user(user_id, Some(end_of_day(as_of)))
        .await?;

    Ok(flows.iter().map(|flow| flow.balance_contribution()).sum())
}

/// Total shares outstanding as of the end of `as_of`: the sum of `shares_affected` over the
/// user's cash flows.
pub async fn shares_outstanding<S>(
    store: &S,
    user_id: UserId,
    as_of: NaiveDate,
) -> Result<Decimal, CarteiraError>
where
    S: CashFlowStore,
{
    let flows = store
        .cash_flows_for_user(user_id, Some(end_of_day(as_of)))
        .await?;

    Ok(flows
        .iter()
        .filter_map(|flow| flow.shares_affected)
        .sum())
}

/// Issue fund shares for a deposit at the previous day's share value.
pub async fn issue_shares<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    cash_flow_id: CashFlowId,
    amount: Decimal,
    date: NaiveDate,
) -> Result<SharesResult, CarteiraError>
where
    S: CashFlowStore + FundShareStore,
{
    if amount <= Decimal::ZERO {
        return Err(CarteiraError::validation("amount must be positive"));
    }

    let share_value = previous_share_value(store, config, user_id, date).await?;
    let new_shares = (amount / share_value).round_dp(8);

    let outstanding = shares_outstanding(store, user_id, date).await?;
    store.set_shares_affected(cash_flow_id, new_shares).await?;

    info!(
        %user_id,
        %cash_flow_id,
        amount = %amount,
        share_value = %share_value,
        shares_issued = %new_shares,
        "shares issued"
    );

    Ok(SharesResult {
        cash_flow_id,
        amount,
        share_value,
        shares_affected: new_shares,
        new_shares_outstanding: outstanding + new_shares,
    })
}

/// Redeem fund shares for a withdrawal at the previous day's share value. Fails when the
/// redemption exceeds the shares outstanding.
pub async fn redeem_shares<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    cash_flow_id: CashFlowId,
    amount: Decimal,
    date: NaiveDate,
) -> Result<SharesResult, CarteiraError>
where
    S: CashFlowStore + FundShareStore,
{
    if amount <= Decimal::ZERO {
        return Err(CarteiraError::validation("amount must be positive"));
    }

    let share_value = previous_share_value(store, config, user_id, date).await?;
    let shares_redeemed = (amount / share_value).round_dp(8);

    let outstanding = shares_outstanding(store, user_id, date).await?;
    if shares_redeemed > outstanding {
        return Err(CarteiraError::InsufficientShares {
            requested: shares_redeemed,
            outstanding,
        });
    }

    store
        .set_shares_affected(cash_flow_id, -shares_redeemed)
        .await?;

    info!(
        %user_id,
        %cash_flow_id,
        amount = %amount,
        share_value = %share_value,
        shares_redeemed = %shares_redeemed,
        "shares redeemed"
    );

    Ok(SharesResult {
        cash_flow_id,
        amount,
        share_value,
        shares_affected: -shares_redeemed,
        new_shares_outstanding: outstanding - shares_redeemed,
    })
}

/// Create or update the daily [`FundShare`] row for (user, date). Returns `None` when the
/// NAV is zero (nothing to value).
pub async fn create_daily_fund_share<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    target_date: NaiveDate,
) -> Result<Option<FundShare>, CarteiraError>
where
    S: PositionStore + AssetStore + CashFlowStore + FundShareStore + QuoteStore + RateStore,
{
    let nav_result = nav(store, config, user_id, target_date, true).await?;
    if nav_result.nav_base.is_zero() {
        debug!(%user_id, date = %target_date, "zero nav - no fund share created");
        return Ok(None);
    }

    let mut outstanding = shares_outstanding(store, user_id, target_date).await?;
    if outstanding <= Decimal::ZERO {
        // First valuation with no priced flows yet: bootstrap so the first share value is
        // exactly the initial share value
        outstanding = (nav_result.nav_base / config.initial_share_value).round_dp(8);
    }

    let share_value = (nav_result.nav_base / outstanding).round_dp(8);

    let previous = store.fund_share_before(user_id, target_date).await?;
    let daily_return = previous.as_ref().and_then(|previous| {
        (previous.share_value > Decimal::ZERO).then(|| {
            ((share_value - previous.share_value) / previous.share_value).round_dp(8)
        })
    });
    let cumulative_return = Some(
        ((share_value - config.initial_share_value) / config.initial_share_value).round_dp(8),
    );

    let share = FundShare {
        id: FundShareId::random(),
        user_id,
        date: target_date,
        nav: nav_result.nav_base.round_dp(2),
        shares_outstanding: outstanding,
        share_value,
        daily_return,
        cumulative_return,
        created_at: Utc::now(),
    };

    store.upsert_fund_share(share.clone()).await?;

    info!(
        %user_id,
        date = %target_date,
        nav = %share.nav,
        share_value = %share.share_value,
        shares_outstanding = %share.shares_outstanding,
        "daily fund share upserted"
    );

    Ok(Some(share))
}

/// Recompute the fund-share ledger for every date in `[from, to]`, in order. Returns how
/// many rows were written.
pub async fn backfill_fund_shares<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<usize, CarteiraError>
where
    S: PositionStore + AssetStore + CashFlowStore + FundShareStore + QuoteStore + RateStore,
{
    let mut written = 0;
    let mut date = from;
    while date <= to {
        if create_daily_fund_share(store, config, user_id, date).await?.is_some() {
            written += 1;
        }
        date += Duration::days(1);
    }

    info!(%user_id, %from, %to, written, "fund share backfill complete");
    Ok(written)
}

/// The share value priced into issuance/redemption: the most recent row before `date`, or
/// the configured initial value on the fund's first day.
async fn previous_share_value<S>(
    store: &S,
    config: &CarteiraConfig,
    user_id: UserId,
    date: NaiveDate,
) -> Result<Decimal, CarteiraError>
where
    S: FundShareStore,
{
    Ok(store
        .fund_share_before(user_id, date)
        .await?
        .map(|share| share.share_value)
        .filter(|value| *value > Decimal::ZERO)
        .unwrap_or(config.initial_share_value))
}

/// Exclusive upper bound covering the whole of `date`.
pub(crate) fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    (date + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}
