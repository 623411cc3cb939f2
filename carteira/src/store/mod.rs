use crate::{
    fund::FundShare,
    holdings::{FixedIncomePosition, InvestmentFundPosition},
    ledger::{CashFlow, Transaction, TransactionKind},
    position::Position,
    snapshot::PortfolioSnapshot,
    trade::RealizedTrade,
};
use async_trait::async_trait;
use carteira_ingest::document::{Document, ParsingStatus};
use carteira_instrument::{
    account::Account, asset::Asset, ticker::Ticker, AccountId, AssetId, CashFlowId, DocumentId,
    TransactionId, UserId,
};
use carteira_market::store::{AssetCatalog, QuoteStore, RateStore};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

pub mod memory;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Filter over the transaction journal. Results are always ordered ascending by
/// (executed_at, id) - the deterministic replay order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TransactionFilter {
    pub account_id: Option<AccountId>,
    pub asset_id: Option<AssetId>,
    pub user_id: Option<UserId>,
    pub kind: Option<TransactionKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Handles the reading & writing of [`Account`]s.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. (user_id, name) must be unique among active accounts.
    async fn insert_account(&self, account: Account) -> Result<(), StoreError>;

    async fn account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Active accounts of a user.
    async fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError>;

    /// Soft-delete: flips `is_active` off, freeing the (user, name) key.
    async fn deactivate_account(&self, id: AccountId) -> Result<(), StoreError>;

    /// Distinct users owning at least one active account.
    async fn user_ids(&self) -> Result<Vec<UserId>, StoreError>;
}

/// Handles the reading & writing of [`Asset`]s. Tickers are globally unique.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upsert_asset(&self, asset: Asset) -> Result<(), StoreError>;

    async fn asset(&self, id: AssetId) -> Result<Asset, StoreError>;

    async fn asset_by_ticker(&self, ticker: &Ticker) -> Result<Option<Asset>, StoreError>;

    async fn assets(&self, ids: &[AssetId]) -> Result<Vec<Asset>, StoreError>;
}

/// Handles the reading & writing of journal [`Transaction`]s.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, transaction: Transaction) -> Result<(), StoreError>;

    async fn update_transaction(&self, transaction: Transaction) -> Result<(), StoreError>;

    async fn delete_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Matching transactions, ascending (executed_at, id).
    async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Distinct assets with at least one transaction on the account.
    async fn asset_ids_with_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<AssetId>, StoreError>;

    /// The most recent transaction of `kind` on the pair citing `document_id`.
    async fn latest_document_transaction(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
        document_id: DocumentId,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>, StoreError>;
}

/// Handles the reading & writing of [`CashFlow`]s.
#[async_trait]
pub trait CashFlowStore: Send + Sync {
    async fn insert_cash_flow(&self, flow: CashFlow) -> Result<(), StoreError>;

    async fn update_cash_flow(&self, flow: CashFlow) -> Result<(), StoreError>;

    async fn delete_cash_flow(&self, id: CashFlowId) -> Result<Option<CashFlow>, StoreError>;

    async fn cash_flow(&self, id: CashFlowId) -> Result<CashFlow, StoreError>;

    /// All flows on the user's accounts with `executed_at < until` (when given), ascending.
    async fn cash_flows_for_user(
        &self,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<CashFlow>, StoreError>;

    /// Record the fund shares issued/redeemed by a flow.
    async fn set_shares_affected(
        &self,
        id: CashFlowId,
        shares: Decimal,
    ) -> Result<(), StoreError>;
}

/// Handles the reading & writing of open [`Position`]s, keyed by (account, asset).
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn upsert_position(&self, position: Position) -> Result<(), StoreError>;

    async fn position(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
    ) -> Result<Option<Position>, StoreError>;

    async fn remove_position(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
    ) -> Result<Option<Position>, StoreError>;

    /// Delete every position of the account, returning how many were removed.
    async fn remove_account_positions(&self, account_id: AccountId) -> Result<usize, StoreError>;

    /// Open positions (quantity > 0) of one account.
    async fn positions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Position>, StoreError>;

    /// Open positions (quantity > 0) across all of the user's accounts.
    async fn positions_for_user(&self, user_id: UserId) -> Result<Vec<Position>, StoreError>;
}

/// Handles the append-only [`RealizedTrade`] records.
#[async_trait]
pub trait RealizedTradeStore: Send + Sync {
    /// Append unless a row with the same [`RealizedTrade::dedup_key`] exists. Returns whether
    /// a row was inserted.
    async fn insert_realized_trade_if_absent(
        &self,
        trade: RealizedTrade,
    ) -> Result<bool, StoreError>;

    /// Unconditional append (used by reconciliation, which carries its own document key).
    async fn insert_realized_trade(&self, trade: RealizedTrade) -> Result<(), StoreError>;

    /// Trades of an account, ascending by close_date.
    async fn realized_trades_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<RealizedTrade>, StoreError>;
}

/// Handles the daily [`FundShare`] (quota) ledger, keyed by (user, date).
#[async_trait]
pub trait FundShareStore: Send + Sync {
    async fn upsert_fund_share(&self, share: FundShare) -> Result<(), StoreError>;

    async fn latest_fund_share(&self, user_id: UserId) -> Result<Option<FundShare>, StoreError>;

    /// Most recent row strictly before `date`.
    async fn fund_share_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<FundShare>, StoreError>;

    /// Most recent row on or before `date`.
    async fn fund_share_at_or_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<FundShare>, StoreError>;

    /// History descending by date, at most `limit` rows.
    async fn fund_share_history(
        &self,
        user_id: UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<FundShare>, StoreError>;
}

/// Handles the daily [`PortfolioSnapshot`]s, keyed by (user, date, account?).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert_snapshot(&self, snapshot: PortfolioSnapshot) -> Result<(), StoreError>;

    async fn snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
        account_id: Option<AccountId>,
    ) -> Result<Option<PortfolioSnapshot>, StoreError>;

    /// Per-account rows of one (user, date).
    async fn account_snapshots(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<PortfolioSnapshot>, StoreError>;

    /// Consolidated rows (account_id = None), descending by date.
    async fn snapshot_history(
        &self,
        user_id: UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<PortfolioSnapshot>, StoreError>;
}

/// Handles statement-sourced fixed-income and fund holdings, replaced wholesale per import.
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    async fn replace_fixed_income(
        &self,
        account_id: AccountId,
        positions: Vec<FixedIncomePosition>,
    ) -> Result<(), StoreError>;

    async fn fixed_income_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<FixedIncomePosition>, StoreError>;

    async fn replace_fund_positions(
        &self,
        account_id: AccountId,
        positions: Vec<InvestmentFundPosition>,
    ) -> Result<(), StoreError>;

    async fn fund_positions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<InvestmentFundPosition>, StoreError>;
}

/// Handles [`Document`] records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: Document) -> Result<(), StoreError>;

    async fn document(&self, id: DocumentId) -> Result<Document, StoreError>;

    async fn update_document(&self, document: Document) -> Result<(), StoreError>;

    async fn delete_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// A user's documents, optionally filtered by status, newest first.
    async fn documents_by_status(
        &self,
        user_id: UserId,
        status: Option<ParsingStatus>,
    ) -> Result<Vec<Document>, StoreError>;
}

/// The full persistence surface the engines run against. Blanket-implemented for anything
/// that provides every repository trait.
pub trait Store:
    AccountStore
    + AssetStore
    + TransactionStore
    + CashFlowStore
    + PositionStore
    + RealizedTradeStore
    + FundShareStore
    + SnapshotStore
    + HoldingsStore
    + DocumentStore
    + QuoteStore
    + RateStore
    + AssetCatalog
{
}

impl<T> Store for T where
    T: AccountStore
        + AssetStore
        + TransactionStore
        + CashFlowStore
        + PositionStore
        + RealizedTradeStore
        + FundShareStore
        + SnapshotStore
        + HoldingsStore
        + DocumentStore
        + QuoteStore
        + RateStore
        + AssetCatalog
{
}
