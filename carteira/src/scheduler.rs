use crate::{
    error::CarteiraError,
    fund, snapshot,
    store::Store,
    CarteiraConfig,
};
use carteira_market::{
    provider::QuoteProvider,
    sync::{sync_quotes, QuoteSyncOutcome},
};
use chrono::NaiveDate;
use tracing::{error, info};

/// Outcome of one per-user batch job. Individual user failures are collected, never fatal.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct JobReport {
    pub users_processed: usize,
    pub rows_written: usize,
    pub errors: Vec<String>,
}

/// Quote synchronisation entry point, triggered by the external task runner (three times per
/// trading day by default). Fetches today's quotes for every active asset.
pub async fn sync_all_quotes<S, P>(
    store: &S,
    provider: &P,
    config: &CarteiraConfig,
    today: NaiveDate,
) -> Result<QuoteSyncOutcome, CarteiraError>
where
    S: Store,
    P: QuoteProvider,
{
    let tickers = store.active_tickers().await?;
    if tickers.is_empty() {
        info!("no active assets - quote sync skipped");
        return Ok(QuoteSyncOutcome::default());
    }

    Ok(sync_quotes(
        store,
        provider,
        tickers,
        today,
        today,
        config.quote_fetch_parallelism,
    )
    .await?)
}

/// Daily NAV entry point: write the fund-share row of every user for `date`.
pub async fn nav_for_all_users<S>(
    store: &S,
    config: &CarteiraConfig,
    date: NaiveDate,
) -> Result<JobReport, CarteiraError>
where
    S: Store,
{
    let mut report = JobReport::default();

    for user_id in store.user_ids().await? {
        match fund::create_daily_fund_share(store, config, user_id, date).await {
            Ok(share) => {
                report.users_processed += 1;
                if share.is_some() {
                    report.rows_written += 1;
                }
            }
            Err(job_error) => {
                error!(%user_id, %date, error = %job_error, "daily fund share failed");
                report.errors.push(format!("{user_id}: {job_error}"));
            }
        }
    }

    info!(
        %date,
        users = report.users_processed,
        rows = report.rows_written,
        errors = report.errors.len(),
        "nav job complete"
    );

    Ok(report)
}

/// Daily snapshot entry point: materialise consolidated and per-account snapshots of every
/// user for `date`. Runs after the NAV job.
pub async fn snapshot_for_all_users<S>(
    store: &S,
    config: &CarteiraConfig,
    date: NaiveDate,
) -> Result<JobReport, CarteiraError>
where
    S: Store,
{
    let mut report = JobReport::default();

    for user_id in store.user_ids().await? {
        match snapshot::materialize_for_user(store, config, user_id, date).await {
            Ok(written) => {
                report.users_processed += 1;
                report.rows_written += written;
            }
            Err(job_error) => {
                error!(%user_id, %date, error = %job_error, "snapshot generation failed");
                report.errors.push(format!("{user_id}: {job_error}"));
            }
        }
    }

    info!(
        %date,
        users = report.users_processed,
        rows = report.rows_written,
        errors = report.errors.len(),
        "snapshot job complete"
    );

    Ok(report)
}
