use crate::{
    error::CarteiraError,
    fund,
    holdings::{FixedIncomePosition, InvestmentFundPosition},
    ledger::{CashFlow, CashFlowKind, Transaction, TransactionKind},
    position::replay::{replay_after_change, ReplayGate},
    reconcile::{self, ReconciliationReport},
    snapshot,
    store::Store,
    CarteiraConfig,
};
use carteira_ingest::{
    document::Document,
    parsed::{ParsedStatement, ParsedTransaction, ParsedTransactionKind},
};
use carteira_instrument::{AccountId, AssetId, CashFlowId, TransactionId};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::info;

/// Outcome of committing one parsed document to the ledger.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommitOutcome {
    pub transactions_created: usize,
    pub cash_flows_created: usize,
    pub fixed_income_created: usize,
    pub fund_positions_created: usize,
    pub replayed_pairs: usize,
    pub reconciliation: Option<ReconciliationReport>,
    /// Non-fatal problems (per-row mapping failures, reconciliation warnings).
    pub warnings: Vec<String>,
}

/// Apply a parsed document to the store as one logical commit:
///
/// 1. insert its transactions and cash movements into the ledger (deposits and withdrawals
///    issue/redeem fund shares);
/// 2. replace the account's fixed-income and investment-fund holdings at the statement
///    reference date;
/// 3. reconcile the account's stock positions against the statement;
/// 4. replay every touched (account, asset) pair;
/// 5. write the statement-sourced snapshot when the document carries consolidated totals.
pub async fn commit_document<S>(
    store: &S,
    gate: &ReplayGate,
    config: &CarteiraConfig,
    document: &Document,
    statement: &ParsedStatement,
    account_id: AccountId,
) -> Result<CommitOutcome, CarteiraError>
where
    S: Store,
{
    let account = store.account(account_id).await?;
    let reference_date = statement
        .period
        .as_ref()
        .and_then(|period| period.end_date)
        .unwrap_or_else(|| Utc::now().date_naive());

    info!(
        document_id = %document.id,
        %account_id,
        %reference_date,
        transactions = statement.transactions.len(),
        cash_movements = statement.cash_movements.len(),
        "document commit started"
    );

    let mut outcome = CommitOutcome::default();
    let mut touched: BTreeSet<AssetId> = BTreeSet::new();

    // 1. Ledger entries
    for parsed in statement.all_transactions() {
        let executed_at = parsed
            .date
            .and_hms_opt(12, 0, 0)
            .expect("noon is always a valid time")
            .and_utc();
        let exchange_rate = store
            .rate(
                &account.currency,
                &config.base_currency,
                parsed.date,
                config.fx_fallback_days,
            )
            .await?
            .unwrap_or(Decimal::ONE);

        match classify(parsed) {
            ParsedRow::Ledger(kind) => {
                let Some(ticker) = parsed.ticker.as_ref() else {
                    outcome
                        .warnings
                        .push(format!("{} on {} has no ticker", parsed.kind, parsed.date));
                    continue;
                };
                let asset = store.resolve_or_create(ticker).await?;

                let transaction = Transaction {
                    id: TransactionId::random(),
                    account_id,
                    asset_id: asset.id,
                    document_id: Some(document.id),
                    kind,
                    quantity: parsed.quantity.unwrap_or(Decimal::ZERO),
                    price: parsed.price.unwrap_or(Decimal::ZERO),
                    fees: parsed.fees.unwrap_or(Decimal::ZERO),
                    currency: account.currency.clone(),
                    exchange_rate,
                    executed_at,
                    notes: parsed.notes.clone(),
                };

                if let Err(error) = transaction.validate() {
                    outcome
                        .warnings
                        .push(format!("{ticker} {}: {error}", parsed.date));
                    continue;
                }

                store.insert_transaction(transaction).await?;
                outcome.transactions_created += 1;
                if kind.affects_position() {
                    touched.insert(asset.id);
                }
            }
            ParsedRow::Cash(kind) => {
                let Some(amount) = parsed
                    .total
                    .map(|amount| amount.abs())
                    .filter(|amount| !amount.is_zero())
                else {
                    continue;
                };

                let flow = CashFlow {
                    id: CashFlowId::random(),
                    account_id,
                    kind,
                    amount,
                    currency: account.currency.clone(),
                    exchange_rate,
                    executed_at,
                    shares_affected: None,
                    notes: parsed.notes.clone(),
                };
                flow.validate()?;
                let flow_id = flow.id;
                store.insert_cash_flow(flow).await?;
                outcome.cash_flows_created += 1;

                // Deposits issue shares at D-1, withdrawals redeem
                match kind {
                    CashFlowKind::Deposit => {
                        fund::issue_shares(
                            store,
                            config,
                            account.user_id,
                            flow_id,
                            amount * exchange_rate,
                            parsed.date,
                        )
                        .await?;
                    }
                    CashFlowKind::Withdrawal => {
                        fund::redeem_shares(
                            store,
                            config,
                            account.user_id,
                            flow_id,
                            amount * exchange_rate,
                            parsed.date,
                        )
                        .await?;
                    }
                    _ => {}
                }
            }
            ParsedRow::Journal => {
                // Lending, applications and the like stay on the document record only
            }
        }
    }

    // 2. Statement-sourced holdings replace the account's rows wholesale
    if !statement.fixed_income_positions.is_empty() {
        let rows: Vec<FixedIncomePosition> = statement
            .fixed_income_positions
            .iter()
            .map(|parsed| {
                FixedIncomePosition::from_parsed(
                    parsed,
                    account_id,
                    Some(document.id),
                    reference_date,
                )
            })
            .collect();
        outcome.fixed_income_created = rows.len();
        store.replace_fixed_income(account_id, rows).await?;
    }

    if !statement.investment_fund_positions.is_empty() {
        let rows: Vec<InvestmentFundPosition> = statement
            .investment_fund_positions
            .iter()
            .map(|parsed| {
                InvestmentFundPosition::from_parsed(
                    parsed,
                    account_id,
                    Some(document.id),
                    reference_date,
                )
            })
            .collect();
        outcome.fund_positions_created = rows.len();
        store.replace_fund_positions(account_id, rows).await?;
    }

    // 3. The statement is the source of truth for the account's stock positions
    if !statement.stock_positions.is_empty() {
        let report = reconcile::reconcile(
            store,
            account_id,
            document.id,
            &statement.stock_positions,
            Some(reference_date),
        )
        .await?;
        outcome.warnings.extend(report.warnings.iter().cloned());
        outcome.reconciliation = Some(report);
    }

    // 4. Recompute every pair the ledger entries touched
    for asset_id in &touched {
        replay_after_change(store, gate, account_id, *asset_id).await?;
        outcome.replayed_pairs += 1;
    }

    // 5. Statement consolidated totals are the authoritative snapshot
    if let Some(breakdown) = &statement.consolidated_position {
        snapshot::apply_statement_snapshot(
            store,
            config,
            account.user_id,
            account_id,
            reference_date,
            breakdown,
            document.id,
        )
        .await?;
    }

    info!(
        document_id = %document.id,
        transactions = outcome.transactions_created,
        cash_flows = outcome.cash_flows_created,
        replayed = outcome.replayed_pairs,
        warnings = outcome.warnings.len(),
        "document commit complete"
    );

    Ok(outcome)
}

enum ParsedRow {
    /// Becomes a ledger [`Transaction`] on the named kind.
    Ledger(TransactionKind),
    /// Becomes a [`CashFlow`] on the named kind.
    Cash(CashFlowKind),
    /// Informational only; no ledger effect.
    Journal,
}

/// Map a canonical parsed row onto its ledger representation. Ticker-bearing events become
/// journal transactions against the asset; pure money movements become cash flows.
fn classify(parsed: &ParsedTransaction) -> ParsedRow {
    use ParsedTransactionKind::*;

    let has_ticker = parsed.ticker.is_some();
    match parsed.kind {
        Buy => ParsedRow::Ledger(TransactionKind::Buy),
        Sell => ParsedRow::Ledger(TransactionKind::Sell),
        Split => ParsedRow::Ledger(TransactionKind::Split),
        Subscription => ParsedRow::Ledger(TransactionKind::Subscription),
        TransferIn if has_ticker => ParsedRow::Ledger(TransactionKind::TransferIn),
        TransferOut if has_ticker => ParsedRow::Ledger(TransactionKind::TransferOut),
        TransferIn => ParsedRow::Cash(CashFlowKind::Deposit),
        TransferOut => ParsedRow::Cash(CashFlowKind::Withdrawal),
        Dividend if has_ticker => ParsedRow::Ledger(TransactionKind::Dividend),
        Dividend => ParsedRow::Cash(CashFlowKind::Dividend),
        Jcp if has_ticker => ParsedRow::Ledger(TransactionKind::Jcp),
        Jcp => ParsedRow::Cash(CashFlowKind::Jcp),
        Rental if has_ticker => ParsedRow::Ledger(TransactionKind::Rental),
        Rental => ParsedRow::Cash(CashFlowKind::RentalIncome),
        Amortization if has_ticker => ParsedRow::Ledger(TransactionKind::Amortization),
        Interest => ParsedRow::Cash(CashFlowKind::Interest),
        Fee | CustodyFee => ParsedRow::Cash(CashFlowKind::Fee),
        Tax => ParsedRow::Cash(CashFlowKind::Tax),
        Settlement => ParsedRow::Cash(CashFlowKind::Settlement),
        Application | Redemption | LendingOut | LendingReturn | Amortization | Other => {
            ParsedRow::Journal
        }
    }
}
