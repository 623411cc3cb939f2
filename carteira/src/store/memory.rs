use crate::{
    fund::FundShare,
    holdings::{FixedIncomePosition, InvestmentFundPosition},
    ledger::{CashFlow, Transaction, TransactionKind},
    position::Position,
    snapshot::PortfolioSnapshot,
    store::{
        AccountStore, AssetStore, CashFlowStore, DocumentStore, FundShareStore, HoldingsStore,
        PositionStore, RealizedTradeStore, SnapshotStore, StoreError, TransactionFilter,
        TransactionStore,
    },
    trade::RealizedTrade,
};
use async_trait::async_trait;
use carteira_ingest::document::{Document, ParsingStatus};
use carteira_instrument::{
    account::Account, asset::Asset, ticker::Ticker, AccountId, AssetId, CashFlowId, DocumentId,
    TransactionId, UserId,
};
use carteira_market::{
    fx::ExchangeRate,
    quote::Quote,
    store::{AssetCatalog, InMemoryMarketStore, QuoteStore, RateStore},
    MarketError,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

/// In-memory store implementing every repository trait. Backs the test suite and
/// proof-of-concept deployments. **Do not use in production - no fault tolerance, no
/// transactional rollback.**
#[derive(Debug, Default)]
pub struct InMemoryStore {
    market: InMemoryMarketStore,
    accounts: RwLock<HashMap<AccountId, Account>>,
    assets: RwLock<HashMap<AssetId, Asset>>,
    assets_by_ticker: RwLock<HashMap<Ticker, AssetId>>,
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
    cash_flows: RwLock<HashMap<CashFlowId, CashFlow>>,
    positions: RwLock<HashMap<(AccountId, AssetId), Position>>,
    realized_trades: RwLock<Vec<RealizedTrade>>,
    fund_shares: RwLock<BTreeMap<(UserId, NaiveDate), FundShare>>,
    snapshots: RwLock<HashMap<(UserId, NaiveDate, Option<AccountId>), PortfolioSnapshot>>,
    fixed_income: RwLock<HashMap<AccountId, Vec<FixedIncomePosition>>>,
    fund_positions: RwLock<HashMap<AccountId, Vec<InvestmentFundPosition>>>,
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_ids_of_user(&self, user_id: UserId) -> HashSet<AccountId> {
        self.accounts
            .read()
            .values()
            .filter(|account| account.user_id == user_id)
            .map(|account| account.id)
            .collect()
    }

    fn owner_of_account(&self, account_id: AccountId) -> Option<UserId> {
        self.accounts
            .read()
            .get(&account_id)
            .map(|account| account.user_id)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();

        let duplicate = accounts.values().any(|existing| {
            existing.is_active
                && existing.user_id == account.user_id
                && existing.name == account.name
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "account name already in use: {}",
                account.name
            )));
        }

        accounts.insert(account.id, account);
        Ok(())
    }

    async fn account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .read()
            .values()
            .filter(|account| account.user_id == user_id && account.is_active)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    async fn deactivate_account(&self, id: AccountId) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("account", id))?;
        account.is_active = false;
        Ok(())
    }

    async fn user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let mut user_ids: Vec<UserId> = self
            .accounts
            .read()
            .values()
            .filter(|account| account.is_active)
            .map(|account| account.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        user_ids.sort();
        Ok(user_ids)
    }
}

#[async_trait]
impl AssetStore for InMemoryStore {
    async fn upsert_asset(&self, asset: Asset) -> Result<(), StoreError> {
        let mut assets = self.assets.write();
        let mut by_ticker = self.assets_by_ticker.write();

        if let Some(existing_id) = by_ticker.get(&asset.ticker) {
            if *existing_id != asset.id {
                return Err(StoreError::Conflict(format!(
                    "ticker already registered: {}",
                    asset.ticker
                )));
            }
        }

        by_ticker.insert(asset.ticker.clone(), asset.id);
        assets.insert(asset.id, asset);
        Ok(())
    }

    async fn asset(&self, id: AssetId) -> Result<Asset, StoreError> {
        self.assets
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("asset", id))
    }

    async fn asset_by_ticker(&self, ticker: &Ticker) -> Result<Option<Asset>, StoreError> {
        let assets = self.assets.read();
        Ok(self
            .assets_by_ticker
            .read()
            .get(ticker)
            .and_then(|id| assets.get(id))
            .cloned())
    }

    async fn assets(&self, ids: &[AssetId]) -> Result<Vec<Asset>, StoreError> {
        let assets = self.assets.read();
        Ok(ids.iter().filter_map(|id| assets.get(id)).cloned().collect())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut transactions = self.transactions.write();
        if transactions.contains_key(&transaction.id) {
            return Err(StoreError::Conflict(format!(
                "transaction already exists: {}",
                transaction.id
            )));
        }
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn update_transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut transactions = self.transactions.write();
        if !transactions.contains_key(&transaction.id) {
            return Err(StoreError::not_found("transaction", transaction.id));
        }
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn delete_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.write().remove(&id))
    }

    async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, StoreError> {
        let user_accounts = filter.user_id.map(|user_id| self.account_ids_of_user(user_id));

        let mut matching: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|transaction| {
                filter
                    .account_id
                    .is_none_or(|account_id| transaction.account_id == account_id)
            })
            .filter(|transaction| {
                filter.asset_id.is_none_or(|asset_id| transaction.asset_id == asset_id)
            })
            .filter(|transaction| {
                user_accounts
                    .as_ref()
                    .is_none_or(|accounts| accounts.contains(&transaction.account_id))
            })
            .filter(|transaction| filter.kind.is_none_or(|kind| transaction.kind == kind))
            .filter(|transaction| {
                filter
                    .from
                    .is_none_or(|from| transaction.executed_at.date_naive() >= from)
            })
            .filter(|transaction| {
                filter
                    .to
                    .is_none_or(|to| transaction.executed_at.date_naive() <= to)
            })
            .cloned()
            .collect();

        // Deterministic replay order: ascending executed_at with id tie-break
        matching.sort_by_key(|transaction| (transaction.executed_at, transaction.id));
        Ok(matching)
    }

    async fn asset_ids_with_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<AssetId>, StoreError> {
        let mut asset_ids: Vec<AssetId> = self
            .transactions
            .read()
            .values()
            .filter(|transaction| transaction.account_id == account_id)
            .map(|transaction| transaction.asset_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        asset_ids.sort();
        Ok(asset_ids)
    }

    async fn latest_document_transaction(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
        document_id: DocumentId,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .transactions
            .read()
            .values()
            .filter(|transaction| {
                transaction.account_id == account_id
                    && transaction.asset_id == asset_id
                    && transaction.document_id == Some(document_id)
                    && transaction.kind == kind
            })
            .max_by_key(|transaction| (transaction.executed_at, transaction.id))
            .cloned())
    }
}

#[async_trait]
impl CashFlowStore for InMemoryStore {
    async fn insert_cash_flow(&self, flow: CashFlow) -> Result<(), StoreError> {
        let mut cash_flows = self.cash_flows.write();
        if cash_flows.contains_key(&flow.id) {
            return Err(StoreError::Conflict(format!(
                "cash flow already exists: {}",
                flow.id
            )));
        }
        cash_flows.insert(flow.id, flow);
        Ok(())
    }

    async fn update_cash_flow(&self, flow: CashFlow) -> Result<(), StoreError> {
        let mut cash_flows = self.cash_flows.write();
        if !cash_flows.contains_key(&flow.id) {
            return Err(StoreError::not_found("cash flow", flow.id));
        }
        cash_flows.insert(flow.id, flow);
        Ok(())
    }

    async fn delete_cash_flow(&self, id: CashFlowId) -> Result<Option<CashFlow>, StoreError> {
        Ok(self.cash_flows.write().remove(&id))
    }

    async fn cash_flow(&self, id: CashFlowId) -> Result<CashFlow, StoreError> {
        self.cash_flows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("cash flow", id))
    }

    async fn cash_flows_for_user(
        &self,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<CashFlow>, StoreError> {
        let accounts = self.account_ids_of_user(user_id);

        let mut flows: Vec<CashFlow> = self
            .cash_flows
            .read()
            .values()
            .filter(|flow| accounts.contains(&flow.account_id))
            .filter(|flow| until.is_none_or(|until| flow.executed_at < until))
            .cloned()
            .collect();
        flows.sort_by_key(|flow| (flow.executed_at, flow.id));
        Ok(flows)
    }

    async fn set_shares_affected(
        &self,
        id: CashFlowId,
        shares: Decimal,
    ) -> Result<(), StoreError> {
        let mut cash_flows = self.cash_flows.write();
        let flow = cash_flows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("cash flow", id))?;
        flow.shares_affected = Some(shares);
        Ok(())
    }
}

#[async_trait]
impl PositionStore for InMemoryStore {
    async fn upsert_position(&self, position: Position) -> Result<(), StoreError> {
        self.positions
            .write()
            .insert((position.account_id, position.asset_id), position);
        Ok(())
    }

    async fn position(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
    ) -> Result<Option<Position>, StoreError> {
        Ok(self.positions.read().get(&(account_id, asset_id)).cloned())
    }

    async fn remove_position(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
    ) -> Result<Option<Position>, StoreError> {
        Ok(self.positions.write().remove(&(account_id, asset_id)))
    }

    async fn remove_account_positions(&self, account_id: AccountId) -> Result<usize, StoreError> {
        let mut positions = self.positions.write();
        let before = positions.len();
        positions.retain(|(position_account, _), _| *position_account != account_id);
        Ok(before - positions.len())
    }

    async fn positions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Position>, StoreError> {
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .values()
            .filter(|position| {
                position.account_id == account_id && position.quantity > Decimal::ZERO
            })
            .cloned()
            .collect();
        positions.sort_by_key(|position| position.asset_id);
        Ok(positions)
    }

    async fn positions_for_user(&self, user_id: UserId) -> Result<Vec<Position>, StoreError> {
        let accounts = self.account_ids_of_user(user_id);

        let mut positions: Vec<Position> = self
            .positions
            .read()
            .values()
            .filter(|position| {
                accounts.contains(&position.account_id) && position.quantity > Decimal::ZERO
            })
            .cloned()
            .collect();
        positions.sort_by_key(|position| (position.account_id, position.asset_id));
        Ok(positions)
    }
}

#[async_trait]
impl RealizedTradeStore for InMemoryStore {
    async fn insert_realized_trade_if_absent(
        &self,
        trade: RealizedTrade,
    ) -> Result<bool, StoreError> {
        let mut trades = self.realized_trades.write();
        let exists = trades
            .iter()
            .any(|existing| existing.dedup_key() == trade.dedup_key());
        if exists {
            return Ok(false);
        }
        trades.push(trade);
        Ok(true)
    }

    async fn insert_realized_trade(&self, trade: RealizedTrade) -> Result<(), StoreError> {
        self.realized_trades.write().push(trade);
        Ok(())
    }

    async fn realized_trades_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<RealizedTrade>, StoreError> {
        let mut trades: Vec<RealizedTrade> = self
            .realized_trades
            .read()
            .iter()
            .filter(|trade| trade.account_id == account_id)
            .cloned()
            .collect();
        trades.sort_by_key(|trade| trade.close_date);
        Ok(trades)
    }
}

#[async_trait]
impl FundShareStore for InMemoryStore {
    async fn upsert_fund_share(&self, share: FundShare) -> Result<(), StoreError> {
        self.fund_shares
            .write()
            .insert((share.user_id, share.date), share);
        Ok(())
    }

    async fn latest_fund_share(&self, user_id: UserId) -> Result<Option<FundShare>, StoreError> {
        let shares = self.fund_shares.read();
        Ok(shares
            .range((user_id, NaiveDate::MIN)..=(user_id, NaiveDate::MAX))
            .next_back()
            .map(|(_, share)| share.clone()))
    }

    async fn fund_share_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<FundShare>, StoreError> {
        let shares = self.fund_shares.read();
        Ok(shares
            .range((user_id, NaiveDate::MIN)..(user_id, date))
            .next_back()
            .map(|(_, share)| share.clone()))
    }

    async fn fund_share_at_or_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<FundShare>, StoreError> {
        let shares = self.fund_shares.read();
        Ok(shares
            .range((user_id, NaiveDate::MIN)..=(user_id, date))
            .next_back()
            .map(|(_, share)| share.clone()))
    }

    async fn fund_share_history(
        &self,
        user_id: UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<FundShare>, StoreError> {
        let shares = self.fund_shares.read();
        Ok(shares
            .range((user_id, NaiveDate::MIN)..=(user_id, NaiveDate::MAX))
            .rev()
            .map(|(_, share)| share)
            .filter(|share| from.is_none_or(|from| share.date >= from))
            .filter(|share| to.is_none_or(|to| share.date <= to))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn upsert_snapshot(&self, snapshot: PortfolioSnapshot) -> Result<(), StoreError> {
        self.snapshots.write().insert(
            (snapshot.user_id, snapshot.date, snapshot.account_id),
            snapshot,
        );
        Ok(())
    }

    async fn snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
        account_id: Option<AccountId>,
    ) -> Result<Option<PortfolioSnapshot>, StoreError> {
        Ok(self
            .snapshots
            .read()
            .get(&(user_id, date, account_id))
            .cloned())
    }

    async fn account_snapshots(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<PortfolioSnapshot>, StoreError> {
        let mut rows: Vec<PortfolioSnapshot> = self
            .snapshots
            .read()
            .values()
            .filter(|snapshot| {
                snapshot.user_id == user_id
                    && snapshot.date == date
                    && snapshot.account_id.is_some()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|snapshot| snapshot.account_id);
        Ok(rows)
    }

    async fn snapshot_history(
        &self,
        user_id: UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<PortfolioSnapshot>, StoreError> {
        let mut rows: Vec<PortfolioSnapshot> = self
            .snapshots
            .read()
            .values()
            .filter(|snapshot| snapshot.user_id == user_id && snapshot.account_id.is_none())
            .filter(|snapshot| from.is_none_or(|from| snapshot.date >= from))
            .filter(|snapshot| to.is_none_or(|to| snapshot.date <= to))
            .cloned()
            .collect();
        rows.sort_by_key(|snapshot| std::cmp::Reverse(snapshot.date));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl HoldingsStore for InMemoryStore {
    async fn replace_fixed_income(
        &self,
        account_id: AccountId,
        positions: Vec<FixedIncomePosition>,
    ) -> Result<(), StoreError> {
        self.fixed_income.write().insert(account_id, positions);
        Ok(())
    }

    async fn fixed_income_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<FixedIncomePosition>, StoreError> {
        Ok(self
            .fixed_income
            .read()
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_fund_positions(
        &self,
        account_id: AccountId,
        positions: Vec<InvestmentFundPosition>,
    ) -> Result<(), StoreError> {
        self.fund_positions.write().insert(account_id, positions);
        Ok(())
    }

    async fn fund_positions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<InvestmentFundPosition>, StoreError> {
        Ok(self
            .fund_positions
            .read()
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write();
        if documents.contains_key(&document.id) {
            return Err(StoreError::Conflict(format!(
                "document already exists: {}",
                document.id
            )));
        }
        documents.insert(document.id, document);
        Ok(())
    }

    async fn document(&self, id: DocumentId) -> Result<Document, StoreError> {
        self.documents
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", id))
    }

    async fn update_document(&self, document: Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write();
        if !documents.contains_key(&document.id) {
            return Err(StoreError::not_found("document", document.id));
        }
        documents.insert(document.id, document);
        Ok(())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.write().remove(&id))
    }

    async fn documents_by_status(
        &self,
        user_id: UserId,
        status: Option<ParsingStatus>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut documents: Vec<Document> = self
            .documents
            .read()
            .values()
            .filter(|document| document.user_id == user_id)
            .filter(|document| status.is_none_or(|status| document.parsing_status == status))
            .cloned()
            .collect();
        documents.sort_by_key(|document| std::cmp::Reverse(document.created_at));
        Ok(documents)
    }
}

#[async_trait]
impl QuoteStore for InMemoryStore {
    async fn upsert_quote(&self, quote: Quote) -> Result<(), MarketError> {
        self.market.upsert_quote(quote).await
    }

    async fn latest_quotes(&self, asset_ids: &[AssetId]) -> Result<Vec<Quote>, MarketError> {
        self.market.latest_quotes(asset_ids).await
    }

    async fn quotes_at(
        &self,
        asset_ids: &[AssetId],
        date: NaiveDate,
    ) -> Result<Vec<Quote>, MarketError> {
        self.market.quotes_at(asset_ids, date).await
    }

    async fn quote_history(
        &self,
        asset_id: AssetId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<Quote>, MarketError> {
        self.market.quote_history(asset_id, from, to, limit).await
    }
}

#[async_trait]
impl RateStore for InMemoryStore {
    async fn upsert_rate(&self, rate: ExchangeRate) -> Result<(), MarketError> {
        self.market.upsert_rate(rate).await
    }

    async fn rate_in_window(
        &self,
        from: &carteira_instrument::currency::Currency,
        to: &carteira_instrument::currency::Currency,
        max_date: NaiveDate,
        min_date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, MarketError> {
        self.market.rate_in_window(from, to, max_date, min_date).await
    }

    async fn latest_rate(
        &self,
        from: &carteira_instrument::currency::Currency,
        to: &carteira_instrument::currency::Currency,
    ) -> Result<Option<ExchangeRate>, MarketError> {
        self.market.latest_rate(from, to).await
    }
}

#[async_trait]
impl AssetCatalog for InMemoryStore {
    async fn resolve_or_create(&self, ticker: &Ticker) -> Result<Asset, MarketError> {
        if let Some(asset) = self
            .asset_by_ticker(ticker)
            .await
            .map_err(|error| MarketError::Store(error.to_string()))?
        {
            return Ok(asset);
        }

        let asset = Asset::from_ticker(ticker.clone());
        self.upsert_asset(asset.clone())
            .await
            .map_err(|error| MarketError::Store(error.to_string()))?;
        Ok(asset)
    }

    async fn active_tickers(&self) -> Result<Vec<Ticker>, MarketError> {
        let mut tickers: Vec<Ticker> = self
            .assets
            .read()
            .values()
            .filter(|asset| asset.is_active)
            .map(|asset| asset.ticker.clone())
            .collect();
        tickers.sort();
        Ok(tickers)
    }
}
