use crate::{error::CarteiraError, fund::FundShare, store::FundShareStore};
use carteira_instrument::UserId;
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Rolling window (trading days) for drawdown and volatility.
const METRIC_WINDOW: usize = 252;

/// Minimum daily-return samples before a volatility is reported.
const MIN_VOLATILITY_SAMPLES: usize = 20;

/// Fund performance metrics derived from the quota ledger.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct FundPerformance {
    pub current_nav: Decimal,
    pub current_share_value: Decimal,
    pub shares_outstanding: Decimal,
    /// Cumulative return since inception.
    pub total_return: Option<Decimal>,
    pub daily_return: Option<Decimal>,
    pub mtd_return: Option<Decimal>,
    pub ytd_return: Option<Decimal>,
    pub one_year_return: Option<Decimal>,
    pub max_drawdown: Option<Decimal>,
    /// Annualized standard deviation of daily returns.
    pub volatility: Option<Decimal>,
}

/// Compute the fund performance of a user as of `today`. Returns `None` when the quota
/// ledger is empty.
pub async fn performance<S>(
    store: &S,
    user_id: UserId,
    today: NaiveDate,
) -> Result<Option<FundPerformance>, CarteiraError>
where
    S: FundShareStore,
{
    let Some(latest) = store.latest_fund_share(user_id).await? else {
        return Ok(None);
    };

    let start_of_month = today.with_day(1).expect("day 1 always exists");
    let start_of_year =
        NaiveDate::from_ymd_opt(today.year(), 1, 1).expect("january 1st always exists");

    let mtd_anchor = store
        .fund_share_at_or_before(user_id, start_of_month - Duration::days(1))
        .await?;
    let ytd_anchor = store
        .fund_share_at_or_before(user_id, start_of_year - Duration::days(1))
        .await?;
    let one_year_anchor = store
        .fund_share_at_or_before(user_id, today - Duration::days(365))
        .await?;

    let history = store
        .fund_share_history(user_id, None, None, METRIC_WINDOW)
        .await?;

    Ok(Some(FundPerformance {
        current_nav: latest.nav,
        current_share_value: latest.share_value,
        shares_outstanding: latest.shares_outstanding,
        total_return: latest.cumulative_return,
        daily_return: latest.daily_return,
        mtd_return: return_since(&latest, mtd_anchor.as_ref()),
        ytd_return: return_since(&latest, ytd_anchor.as_ref()),
        one_year_return: return_since(&latest, one_year_anchor.as_ref()),
        max_drawdown: max_drawdown(&history),
        volatility: annualized_volatility(&history),
    }))
}

fn return_since(latest: &FundShare, anchor: Option<&FundShare>) -> Option<Decimal> {
    let anchor = anchor?;
    (anchor.share_value > Decimal::ZERO)
        .then(|| ((latest.share_value - anchor.share_value) / anchor.share_value).round_dp(8))
}

/// Maximum peak-to-trough decline of the share value over the window. `None` until at least
/// two rows exist or when no decline ever occurred.
pub fn max_drawdown(history: &[FundShare]) -> Option<Decimal> {
    if history.len() < 2 {
        return None;
    }

    let mut rows: Vec<&FundShare> = history.iter().collect();
    rows.sort_by_key(|share| share.date);

    let mut peak = Decimal::ZERO;
    let mut max_dd = Decimal::ZERO;

    for share in rows {
        if share.share_value > peak {
            peak = share.share_value;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - share.share_value) / peak;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }
    }

    (max_dd > Decimal::ZERO).then(|| max_dd.round_dp(8))
}

/// Population standard deviation of the daily returns, annualized by √252. `None` below
/// [`MIN_VOLATILITY_SAMPLES`] samples.
pub fn annualized_volatility(history: &[FundShare]) -> Option<Decimal> {
    let returns: Vec<Decimal> = history
        .iter()
        .filter_map(|share| share.daily_return)
        .collect();

    if returns.len() < MIN_VOLATILITY_SAMPLES {
        return None;
    }

    let count = Decimal::from(returns.len());
    let mean = returns.iter().sum::<Decimal>() / count;
    let variance = returns
        .iter()
        .map(|value| (*value - mean) * (*value - mean))
        .sum::<Decimal>()
        / count;

    let std_dev = variance.sqrt()?;
    let annualization = Decimal::from(252u32).sqrt()?;

    Some((std_dev * annualization).round_dp(6))
}
