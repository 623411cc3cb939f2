use crate::{
    error::CarteiraError,
    ledger::{Transaction, TransactionKind},
    position::{Position, PositionKind, PositionSource},
    store::{PositionStore, RealizedTradeStore, TransactionStore, TransactionFilter},
    trade::RealizedTrade,
};
use carteira_instrument::{AccountId, AssetId, PositionId, TransactionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Kind of realized P&L event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlKind {
    /// A SELL closing LONG quantity.
    LongClose,
    /// A BUY covering SHORT quantity.
    ShortClose,
}

/// One realized P&L event - emitted per closing fill during replay.
///
/// For a LONG close, `gross_proceeds` is the sale value and `cost_basis` the entry value;
/// for a SHORT close they swap roles (`gross_proceeds` is what was received when shorting,
/// `cost_basis` what is paid to cover, fees included).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RealizedPnlEntry {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub asset_id: AssetId,
    pub executed_at: DateTime<Utc>,
    pub kind: PnlKind,
    pub quantity: Decimal,
    pub close_price: Decimal,
    pub avg_open_price: Decimal,
    pub gross_proceeds: Decimal,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    /// Timestamp of the transaction that opened the closed streak, when known.
    pub open_date: Option<DateTime<Utc>>,
}

/// Netting state for one (account, asset) pair during replay.
///
/// At most one direction is ever open: a long sells into a short, a short buys back into a
/// long, and a flip splits a single trade into a close and an open.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PositionState {
    pub kind: Option<PositionKind>,
    pub quantity: Decimal,
    /// Cost basis for LONG, proceeds basis for SHORT.
    pub total_cost: Decimal,
    /// Timestamp of the transaction that opened the current streak.
    pub first_date: Option<DateTime<Utc>>,
}

impl PositionState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed the state from a statement-sourced position: replay starts from the statement and
    /// never rewinds past it.
    pub fn from_statement(position: &Position) -> Self {
        Self {
            kind: Some(position.kind),
            quantity: position.quantity,
            total_cost: position.total_cost,
            first_date: position.opened_at,
        }
    }

    pub fn avg_price(&self) -> Decimal {
        if self.quantity > Decimal::ZERO {
            self.total_cost / self.quantity
        } else {
            Decimal::ZERO
        }
    }

    pub fn is_flat(&self) -> bool {
        self.kind.is_none() || self.quantity.is_zero()
    }

    /// Apply one transaction, returning any realized P&L events it generated.
    pub fn apply(&mut self, transaction: &Transaction) -> Vec<RealizedPnlEntry> {
        match transaction.kind {
            TransactionKind::Buy | TransactionKind::Subscription => self.apply_buy(
                transaction,
                transaction.quantity,
                transaction.price,
                transaction.fees,
            ),
            TransactionKind::Sell => self.apply_sell(transaction),
            TransactionKind::TransferIn => {
                // A transfer in behaves like a fee-free BUY: it reduces SHORT before opening
                // LONG
                self.apply_buy(
                    transaction,
                    transaction.quantity,
                    transaction.price,
                    Decimal::ZERO,
                )
            }
            TransactionKind::TransferOut => {
                self.apply_transfer_out(transaction.quantity);
                Vec::new()
            }
            TransactionKind::Split => {
                self.apply_split(transaction.quantity);
                Vec::new()
            }
            // Cash/journal kinds never move the position
            _ => Vec::new(),
        }
    }

    fn apply_buy(
        &mut self,
        transaction: &Transaction,
        quantity: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> Vec<RealizedPnlEntry> {
        if self.kind != Some(PositionKind::Short) {
            // Opening or increasing a LONG
            self.total_cost += quantity * price + fees;
            self.quantity += quantity;
            self.kind = Some(PositionKind::Long);
            if self.first_date.is_none() {
                self.first_date = Some(transaction.executed_at);
            }
            return Vec::new();
        }

        let short_quantity = self.quantity;
        let short_avg_price = self.avg_price();
        let open_date = self.first_date;

        if quantity <= short_quantity {
            // Partial or exact cover of the SHORT
            let gross_proceeds = quantity * short_avg_price;
            let cost_basis = quantity * price + fees;

            self.quantity -= quantity;
            self.total_cost -= quantity * short_avg_price;
            if self.quantity.is_zero() {
                self.kind = None;
                self.total_cost = Decimal::ZERO;
            }

            vec![RealizedPnlEntry {
                transaction_id: transaction.id,
                account_id: transaction.account_id,
                asset_id: transaction.asset_id,
                executed_at: transaction.executed_at,
                kind: PnlKind::ShortClose,
                quantity,
                close_price: price,
                avg_open_price: short_avg_price,
                gross_proceeds,
                cost_basis,
                realized_pnl: gross_proceeds - cost_basis,
                fees,
                open_date,
            }]
        } else {
            // Cover the whole SHORT, flip the excess into a LONG. Fees split pro-rata between
            // the closing and opening sides.
            let mut entries = Vec::with_capacity(1);

            if short_quantity > Decimal::ZERO {
                let fees_for_close = fees * short_quantity / quantity;
                let gross_proceeds = short_quantity * short_avg_price;
                let cost_basis = short_quantity * price + fees_for_close;

                entries.push(RealizedPnlEntry {
                    transaction_id: transaction.id,
                    account_id: transaction.account_id,
                    asset_id: transaction.asset_id,
                    executed_at: transaction.executed_at,
                    kind: PnlKind::ShortClose,
                    quantity: short_quantity,
                    close_price: price,
                    avg_open_price: short_avg_price,
                    gross_proceeds,
                    cost_basis,
                    realized_pnl: gross_proceeds - cost_basis,
                    fees: fees_for_close,
                    open_date,
                });
            }

            let excess = quantity - short_quantity;
            let fees_for_open = fees * excess / quantity;
            self.kind = Some(PositionKind::Long);
            self.quantity = excess;
            self.total_cost = excess * price + fees_for_open;
            self.first_date = Some(transaction.executed_at);

            entries
        }
    }

    fn apply_sell(&mut self, transaction: &Transaction) -> Vec<RealizedPnlEntry> {
        let quantity = transaction.quantity;
        let price = transaction.price;
        let fees = transaction.fees;

        match self.kind {
            Some(PositionKind::Long) | Some(PositionKind::DayTrade) => {
                let long_quantity = self.quantity;
                let avg_cost = self.avg_price();
                let open_date = self.first_date;

                if quantity <= long_quantity {
                    // Partial or exact close of the LONG. Fees reduce the proceeds.
                    let gross_proceeds = quantity * price;
                    let cost_basis = quantity * avg_cost;

                    self.quantity -= quantity;
                    self.total_cost -= cost_basis;
                    if self.quantity.is_zero() {
                        self.kind = None;
                        self.total_cost = Decimal::ZERO;
                    }

                    vec![RealizedPnlEntry {
                        transaction_id: transaction.id,
                        account_id: transaction.account_id,
                        asset_id: transaction.asset_id,
                        executed_at: transaction.executed_at,
                        kind: PnlKind::LongClose,
                        quantity,
                        close_price: price,
                        avg_open_price: avg_cost,
                        gross_proceeds,
                        cost_basis,
                        realized_pnl: gross_proceeds - fees - cost_basis,
                        fees,
                        open_date,
                    }]
                } else {
                    // Close the whole LONG, open a SHORT with the excess at the sale price
                    let mut entries = Vec::with_capacity(1);

                    if long_quantity > Decimal::ZERO {
                        let fees_for_close = fees * long_quantity / quantity;
                        let gross_proceeds = long_quantity * price;
                        let cost_basis = long_quantity * avg_cost;

                        entries.push(RealizedPnlEntry {
                            transaction_id: transaction.id,
                            account_id: transaction.account_id,
                            asset_id: transaction.asset_id,
                            executed_at: transaction.executed_at,
                            kind: PnlKind::LongClose,
                            quantity: long_quantity,
                            close_price: price,
                            avg_open_price: avg_cost,
                            gross_proceeds,
                            cost_basis,
                            realized_pnl: gross_proceeds - fees_for_close - cost_basis,
                            fees: fees_for_close,
                            open_date,
                        });
                    }

                    let excess = quantity - long_quantity;
                    self.kind = Some(PositionKind::Short);
                    self.quantity = excess;
                    // SHORT basis is the sale proceeds
                    self.total_cost = excess * price;
                    self.first_date = Some(transaction.executed_at);

                    entries
                }
            }
            Some(PositionKind::Short) => {
                // Extending the SHORT; weighted-mean proceeds basis
                self.quantity += quantity;
                self.total_cost += quantity * price;
                Vec::new()
            }
            None => {
                self.kind = Some(PositionKind::Short);
                self.quantity = quantity;
                self.total_cost = quantity * price;
                self.first_date = Some(transaction.executed_at);
                Vec::new()
            }
        }
    }

    /// Reduce LONG by `quantity` at current average cost. Never generates P&L and never
    /// opens a SHORT; a transfer exceeding the open quantity is ignored whole, leaving the
    /// position untouched.
    fn apply_transfer_out(&mut self, quantity: Decimal) {
        if self.kind != Some(PositionKind::Long) || self.quantity <= Decimal::ZERO {
            return;
        }
        if quantity > self.quantity {
            return;
        }

        let avg_cost = self.avg_price();
        self.quantity -= quantity;
        self.total_cost -= quantity * avg_cost;

        if self.quantity <= Decimal::ZERO {
            self.kind = None;
            self.quantity = Decimal::ZERO;
            self.total_cost = Decimal::ZERO;
        }
    }

    /// Multiply LONG quantity by the split factor, keeping total cost. Reverse splits carry a
    /// factor below 1.
    fn apply_split(&mut self, factor: Decimal) {
        if factor > Decimal::ZERO
            && self.quantity > Decimal::ZERO
            && self.kind == Some(PositionKind::Long)
        {
            self.quantity *= factor;
        }
    }

    /// Materialise the final state as a [`Position`] row, or `None` when flat.
    fn into_position(
        self,
        account_id: AccountId,
        asset_id: AssetId,
        source: PositionSource,
        updated_at: DateTime<Utc>,
    ) -> Option<Position> {
        let kind = self.kind?;
        if self.quantity <= Decimal::ZERO {
            return None;
        }

        Some(Position {
            id: PositionId::random(),
            account_id,
            asset_id,
            kind,
            quantity: self.quantity.round_dp(8),
            avg_price: self.avg_price().round_dp(6),
            total_cost: self.total_cost.round_dp(2),
            source,
            opened_at: self.first_date,
            updated_at,
        })
    }
}

/// Outcome of replaying one (account, asset) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub position: Option<Position>,
    pub entries: Vec<RealizedPnlEntry>,
}

/// Serialises replay per (account, asset) key. Two concurrent replays of the same pair would
/// race the delete-then-insert of the position row and can break the netting invariant;
/// cross-asset concurrency within an account stays allowed.
#[derive(Debug, Default)]
pub struct ReplayGate {
    locks: Mutex<HashMap<(AccountId, AssetId), Arc<tokio::sync::Mutex<()>>>>,
}

impl ReplayGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        account_id: AccountId,
        asset_id: AssetId,
    ) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry((account_id, asset_id))
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

/// Replay the transaction log for one (account, asset) pair.
///
/// Transactions are applied in ascending (executed_at, id) order. The existing position row
/// is deleted and the final state re-inserted, making the result a pure function of the
/// transaction set. Realized events are persisted as [`RealizedTrade`] rows, deduplicated by
/// their close key, so a re-run never duplicates them.
///
/// A stored position with `source = STATEMENT` is the authoritative opening for the pair:
/// replay seeds from it and only applies transactions after its `updated_at` anchor. With no
/// later transactions the row is returned untouched; otherwise the derived row stays
/// statement-anchored with the anchor advanced to the last applied fill, so a re-run applies
/// nothing twice.
pub async fn replay<S>(
    store: &S,
    account_id: AccountId,
    asset_id: AssetId,
) -> Result<ReplayOutcome, CarteiraError>
where
    S: TransactionStore + PositionStore + RealizedTradeStore,
{
    let existing = store.position(account_id, asset_id).await?;

    let (mut state, anchor) = match &existing {
        Some(position) if position.source == PositionSource::Statement => (
            PositionState::from_statement(position),
            Some(position.updated_at),
        ),
        _ => (PositionState::empty(), None),
    };

    let transactions = store
        .transactions(&TransactionFilter {
            account_id: Some(account_id),
            asset_id: Some(asset_id),
            ..Default::default()
        })
        .await?;

    let applicable: Vec<&Transaction> = transactions
        .iter()
        .filter(|transaction| anchor.is_none_or(|anchor| transaction.executed_at > anchor))
        .collect();

    if anchor.is_some() && applicable.is_empty() {
        // Nothing newer than the statement: the anchored row is already the answer
        return Ok(ReplayOutcome {
            position: existing,
            entries: Vec::new(),
        });
    }

    for transaction in &applicable {
        transaction.validate()?;
    }

    let mut entries = Vec::new();
    for transaction in &applicable {
        entries.extend(state.apply(transaction));
    }

    let (source, updated_at) = match anchor {
        // Derived on top of a statement baseline: stay anchored, advance to the last fill
        Some(anchor) => (
            PositionSource::Statement,
            applicable
                .last()
                .map(|transaction| transaction.executed_at)
                .unwrap_or(anchor),
        ),
        None => (PositionSource::Calculated, Utc::now()),
    };

    // Clean slate for the pair, then the final row if anything stayed open
    store.remove_position(account_id, asset_id).await?;
    let position = state.into_position(account_id, asset_id, source, updated_at);

    if let Some(position) = &position {
        store.upsert_position(position.clone()).await?;
    }

    for entry in &entries {
        store
            .insert_realized_trade_if_absent(RealizedTrade::from_entry(entry))
            .await?;
    }

    info!(
        %account_id,
        %asset_id,
        transactions = applicable.len(),
        realized_events = entries.len(),
        open = position.is_some(),
        "replay complete"
    );

    Ok(ReplayOutcome { position, entries })
}

/// Replay every asset with at least one transaction on the account. Returns the open
/// positions that remained.
pub async fn replay_account<S>(
    store: &S,
    gate: &ReplayGate,
    account_id: AccountId,
) -> Result<Vec<Position>, CarteiraError>
where
    S: TransactionStore + PositionStore + RealizedTradeStore,
{
    let asset_ids = store.asset_ids_with_transactions(account_id).await?;

    let mut positions = Vec::new();
    for asset_id in asset_ids {
        let _guard = gate.acquire(account_id, asset_id).await;
        if let Some(position) = replay(store, account_id, asset_id).await?.position {
            positions.push(position);
        }
    }

    Ok(positions)
}

/// Trigger hook after a transaction create/update/delete: recompute the touched pair under
/// the replay gate.
pub async fn replay_after_change<S>(
    store: &S,
    gate: &ReplayGate,
    account_id: AccountId,
    asset_id: AssetId,
) -> Result<ReplayOutcome, CarteiraError>
where
    S: TransactionStore + PositionStore + RealizedTradeStore,
{
    let _guard = gate.acquire(account_id, asset_id).await;
    replay(store, account_id, asset_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use carteira_instrument::currency::Currency;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn txn(
        kind: TransactionKind,
        quantity: Decimal,
        price: Decimal,
        fees: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id: TransactionId::random(),
            account_id: AccountId::random(),
            asset_id: AssetId::random(),
            document_id: None,
            kind,
            quantity,
            price,
            fees,
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at,
            notes: None,
        }
    }

    #[test]
    fn test_simple_long_round_trip() {
        // BUY 100 @ 10.00 fees 0; SELL 100 @ 12.00 fees 1.00
        let mut state = PositionState::empty();

        let entries = state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(10.00), dec!(0), at(2)));
        assert!(entries.is_empty());

        let entries = state.apply(&txn(TransactionKind::Sell, dec!(100), dec!(12.00), dec!(1.00), at(5)));
        assert_eq!(entries.len(), 1);

        let close = &entries[0];
        assert_eq!(close.kind, PnlKind::LongClose);
        assert_eq!(close.quantity, dec!(100));
        assert_eq!(close.avg_open_price, dec!(10.00));
        assert_eq!(close.close_price, dec!(12.00));
        assert_eq!(close.gross_proceeds, dec!(1200.00));
        assert_eq!(close.cost_basis, dec!(1000.00));
        assert_eq!(close.realized_pnl, dec!(199.00));
        assert_eq!(close.fees, dec!(1.00));

        assert!(state.is_flat());
    }

    #[test]
    fn test_flip_long_to_short() {
        // BUY 10 @ 50.00; SELL 15 @ 60.00 fees 3.00
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(10), dec!(50.00), dec!(0), at(1)));

        let entries = state.apply(&txn(TransactionKind::Sell, dec!(15), dec!(60.00), dec!(3.00), at(2)));
        assert_eq!(entries.len(), 1);

        let close = &entries[0];
        assert_eq!(close.kind, PnlKind::LongClose);
        assert_eq!(close.quantity, dec!(10));
        assert_eq!(close.fees, dec!(2.00)); // 3 * 10/15
        assert_eq!(close.gross_proceeds, dec!(600.00));
        assert_eq!(close.cost_basis, dec!(500.00));
        assert_eq!(close.realized_pnl, dec!(98.00)); // 600 - 2 - 500

        assert_eq!(state.kind, Some(PositionKind::Short));
        assert_eq!(state.quantity, dec!(5));
        assert_eq!(state.total_cost, dec!(300.00)); // 5 * 60
        assert_eq!(state.avg_price(), dec!(60.00));
        assert_eq!(state.first_date, Some(at(2)));
    }

    #[test]
    fn test_short_close_with_profit() {
        // SELL 10 @ 100.00 opens SHORT; BUY 4 @ 90.00 covers part of it
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Sell, dec!(10), dec!(100.00), dec!(0), at(1)));

        assert_eq!(state.kind, Some(PositionKind::Short));
        assert_eq!(state.total_cost, dec!(1000.00));

        let entries = state.apply(&txn(TransactionKind::Buy, dec!(4), dec!(90.00), dec!(0), at(2)));
        assert_eq!(entries.len(), 1);

        let close = &entries[0];
        assert_eq!(close.kind, PnlKind::ShortClose);
        assert_eq!(close.quantity, dec!(4));
        assert_eq!(close.gross_proceeds, dec!(400.00));
        assert_eq!(close.cost_basis, dec!(360.00));
        assert_eq!(close.realized_pnl, dec!(40.00));

        assert_eq!(state.quantity, dec!(6));
        assert_eq!(state.total_cost, dec!(600.00));
    }

    #[test]
    fn test_flip_short_to_long_with_fees() {
        // SELL 10 @ 100; BUY 25 @ 80 fees 5.00 -> cover 10, open LONG 15
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Sell, dec!(10), dec!(100.00), dec!(0), at(1)));

        let entries = state.apply(&txn(TransactionKind::Buy, dec!(25), dec!(80.00), dec!(5.00), at(3)));
        assert_eq!(entries.len(), 1);

        let close = &entries[0];
        assert_eq!(close.kind, PnlKind::ShortClose);
        assert_eq!(close.quantity, dec!(10));
        assert_eq!(close.fees, dec!(2.00)); // 5 * 10/25
        assert_eq!(close.gross_proceeds, dec!(1000.00));
        assert_eq!(close.cost_basis, dec!(802.00)); // 10*80 + 2
        assert_eq!(close.realized_pnl, dec!(198.00));

        assert_eq!(state.kind, Some(PositionKind::Long));
        assert_eq!(state.quantity, dec!(15));
        assert_eq!(state.total_cost, dec!(1203.00)); // 15*80 + 3
    }

    #[test]
    fn test_split_doubles_quantity_keeps_cost() {
        // BUY 100 @ 20.00; SPLIT factor 2
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(20.00), dec!(0), at(1)));

        let entries = state.apply(&txn(TransactionKind::Split, dec!(2), dec!(0), dec!(0), at(2)));
        assert!(entries.is_empty());

        assert_eq!(state.quantity, dec!(200));
        assert_eq!(state.total_cost, dec!(2000.00));
        assert_eq!(state.avg_price(), dec!(10.00));
    }

    #[test]
    fn test_reverse_split_factor_below_one() {
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(10.00), dec!(0), at(1)));
        state.apply(&txn(TransactionKind::Split, dec!(0.1), dec!(0), dec!(0), at(2)));

        assert_eq!(state.quantity, dec!(10.0));
        assert_eq!(state.total_cost, dec!(1000.00));
        assert_eq!(state.avg_price(), dec!(100.00));
    }

    #[test]
    fn test_transfer_in_reduces_short_before_opening_long() {
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Sell, dec!(10), dec!(50.00), dec!(0), at(1)));

        let entries = state.apply(&txn(TransactionKind::TransferIn, dec!(4), dec!(48.00), dec!(0), at(2)));
        // Transfer-in covers short quantity fee-free and still realizes P&L on the cover
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, PnlKind::ShortClose);
        assert_eq!(entries[0].fees, dec!(0));
        assert_eq!(state.quantity, dec!(6));
    }

    #[test]
    fn test_transfer_out_reduces_long_without_pnl() {
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(10), dec!(10.00), dec!(0), at(1)));

        let entries = state.apply(&txn(TransactionKind::TransferOut, dec!(4), dec!(0), dec!(0), at(2)));
        assert!(entries.is_empty());
        assert_eq!(state.quantity, dec!(6));
        assert_eq!(state.total_cost, dec!(60.00));

        // Transferring the rest exactly closes the position
        state.apply(&txn(TransactionKind::TransferOut, dec!(6), dec!(0), dec!(0), at(3)));
        assert!(state.is_flat());
        assert_eq!(state.total_cost, dec!(0));
    }

    #[test]
    fn test_transfer_out_exceeding_long_is_ignored_whole() {
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(10), dec!(10.00), dec!(0), at(1)));

        let entries = state.apply(&txn(TransactionKind::TransferOut, dec!(25), dec!(0), dec!(0), at(2)));
        assert!(entries.is_empty());

        // The over-sized transfer does not execute at all: no partial reduction, no SHORT
        assert_eq!(state.kind, Some(PositionKind::Long));
        assert_eq!(state.quantity, dec!(10));
        assert_eq!(state.total_cost, dec!(100.00));
    }

    #[test]
    fn test_weighted_average_cost_on_increase() {
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(10.00), dec!(0), at(1)));
        state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(20.00), dec!(0), at(2)));

        assert_eq!(state.quantity, dec!(200));
        assert_eq!(state.avg_price(), dec!(15.00));
    }

    #[test]
    fn test_fees_enter_long_cost_basis() {
        let mut state = PositionState::empty();
        state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(10.00), dec!(5.00), at(1)));

        assert_eq!(state.total_cost, dec!(1005.00));
        assert_eq!(state.avg_price(), dec!(10.05));
    }

    #[test]
    fn test_conservation_of_cost_over_closed_sequence() {
        // Buys and sells that end flat: sum of realized pnl must equal
        // sell value - buy value - fees
        let mut state = PositionState::empty();
        let mut entries = Vec::new();

        entries.extend(state.apply(&txn(TransactionKind::Buy, dec!(100), dec!(10.00), dec!(1.00), at(1))));
        entries.extend(state.apply(&txn(TransactionKind::Buy, dec!(50), dec!(12.00), dec!(0.50), at(2))));
        entries.extend(state.apply(&txn(TransactionKind::Sell, dec!(80), dec!(13.00), dec!(1.20), at(3))));
        entries.extend(state.apply(&txn(TransactionKind::Sell, dec!(70), dec!(11.00), dec!(0.80), at(4))));

        assert!(state.is_flat());

        let realized: Decimal = entries.iter().map(|entry| entry.realized_pnl).sum();
        let sold = dec!(80) * dec!(13.00) + dec!(70) * dec!(11.00);
        let bought = dec!(100) * dec!(10.00) + dec!(50) * dec!(12.00);
        let fees = dec!(1.00) + dec!(0.50) + dec!(1.20) + dec!(0.80);

        assert_eq!(realized + state.total_cost, sold - bought - fees);
    }

    #[test]
    fn test_statement_seed_replays_only_later_transactions() {
        let position = Position {
            id: PositionId::random(),
            account_id: AccountId::random(),
            asset_id: AssetId::random(),
            kind: PositionKind::Long,
            quantity: dec!(100),
            avg_price: dec!(10.00),
            total_cost: dec!(1000.00),
            source: PositionSource::Statement,
            opened_at: Some(at(1)),
            updated_at: at(10),
        };

        let mut state = PositionState::from_statement(&position);
        assert_eq!(state.quantity, dec!(100));
        assert_eq!(state.avg_price(), dec!(10.00));

        // A later sell realizes against the statement's average price
        let entries = state.apply(&txn(TransactionKind::Sell, dec!(40), dec!(12.00), dec!(0), at(15)));
        assert_eq!(entries[0].avg_open_price, dec!(10.00));
        assert_eq!(entries[0].realized_pnl, dec!(80.00));
        assert_eq!(state.quantity, dec!(60));
    }
}
