use crate::error::CarteiraError;
use carteira_instrument::{
    currency::Currency, AccountId, AssetId, CashFlowId, DocumentId, TransactionId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Kind of ledger transaction.
///
/// Only the replay-relevant kinds move positions; the rest are cash/journal events that flow
/// through to the cash journal untouched.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Buy,
    Sell,
    Dividend,
    Jcp,
    Split,
    ReverseSplit,
    Bonus,
    Subscription,
    Fee,
    Income,
    Amortization,
    TransferIn,
    TransferOut,
    Rental,
    Other,
}

impl TransactionKind {
    /// True for kinds the position replay consumes.
    pub fn affects_position(&self) -> bool {
        matches!(
            self,
            TransactionKind::Buy
                | TransactionKind::Sell
                | TransactionKind::Subscription
                | TransactionKind::TransferIn
                | TransactionKind::TransferOut
                | TransactionKind::Split
        )
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransactionKind::Buy => "buy",
            TransactionKind::Sell => "sell",
            TransactionKind::Dividend => "dividend",
            TransactionKind::Jcp => "jcp",
            TransactionKind::Split => "split",
            TransactionKind::ReverseSplit => "reverse_split",
            TransactionKind::Bonus => "bonus",
            TransactionKind::Subscription => "subscription",
            TransactionKind::Fee => "fee",
            TransactionKind::Income => "income",
            TransactionKind::Amortization => "amortization",
            TransactionKind::TransferIn => "transfer_in",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::Rental => "rental",
            TransactionKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// An immutable journal entry. Updates and deletions exist only at the store boundary, and
/// every mutation must be followed by a replay of the touched (account, asset) pair.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub asset_id: AssetId,
    pub document_id: Option<DocumentId>,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub currency: Currency,
    /// Rate to the base currency at `executed_at`.
    pub exchange_rate: Decimal,
    pub executed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Transaction {
    /// `quantity × price`. Computed on read; never persisted.
    pub fn total_value(&self) -> Decimal {
        self.quantity * self.price
    }

    /// Reject nonsensical input before any write. A failed transaction aborts the whole
    /// operation and leaves prior state untouched.
    pub fn validate(&self) -> Result<(), CarteiraError> {
        if self.quantity < Decimal::ZERO {
            return Err(CarteiraError::validation("quantity must not be negative"));
        }
        if self.price < Decimal::ZERO {
            return Err(CarteiraError::validation("price must not be negative"));
        }
        if self.fees < Decimal::ZERO {
            return Err(CarteiraError::validation("fees must not be negative"));
        }

        if matches!(self.kind, TransactionKind::Buy | TransactionKind::Sell) {
            if self.quantity.is_zero() {
                return Err(CarteiraError::validation(format!(
                    "{} requires a positive quantity",
                    self.kind
                )));
            }
            if self.price.is_zero() {
                return Err(CarteiraError::validation(format!(
                    "{} requires a price",
                    self.kind
                )));
            }
        }

        Ok(())
    }
}

/// Field-by-field partial update of a [`Transaction`]. Absent fields keep their value.
///
/// After applying a patch the (account, asset) pair must be replayed; see
/// [`replay_after_change`](crate::position::replay::replay_after_change).
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct TransactionPatch {
    pub kind: Option<TransactionKind>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
    pub notes: Option<Option<String>>,
}

impl TransactionPatch {
    /// Apply the patch, returning the updated transaction after re-validating it.
    pub fn apply(&self, mut transaction: Transaction) -> Result<Transaction, CarteiraError> {
        if let Some(kind) = self.kind {
            transaction.kind = kind;
        }
        if let Some(quantity) = self.quantity {
            transaction.quantity = quantity;
        }
        if let Some(price) = self.price {
            transaction.price = price;
        }
        if let Some(fees) = self.fees {
            transaction.fees = fees;
        }
        if let Some(executed_at) = self.executed_at {
            transaction.executed_at = executed_at;
        }
        if let Some(notes) = &self.notes {
            transaction.notes = notes.clone();
        }

        transaction.validate()?;
        Ok(transaction)
    }
}

/// Kind of cash flow journal entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CashFlowKind {
    Deposit,
    Withdrawal,
    Dividend,
    Jcp,
    Interest,
    Fee,
    Tax,
    Settlement,
    RentalIncome,
    Other,
}

impl CashFlowKind {
    /// Contribution sign when the flow is consumed as cash balance: deposits add, withdrawals
    /// subtract, everything else is tracked but folds into position cost.
    pub fn balance_sign(&self) -> i64 {
        match self {
            CashFlowKind::Deposit => 1,
            CashFlowKind::Withdrawal => -1,
            _ => 0,
        }
    }
}

impl Display for CashFlowKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CashFlowKind::Deposit => "deposit",
            CashFlowKind::Withdrawal => "withdrawal",
            CashFlowKind::Dividend => "dividend",
            CashFlowKind::Jcp => "jcp",
            CashFlowKind::Interest => "interest",
            CashFlowKind::Fee => "fee",
            CashFlowKind::Tax => "tax",
            CashFlowKind::Settlement => "settlement",
            CashFlowKind::RentalIncome => "rental_income",
            CashFlowKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// A cash movement on an account. `amount` is always positive; the sign is implied by the
/// kind.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct CashFlow {
    pub id: CashFlowId,
    pub account_id: AccountId,
    pub kind: CashFlowKind,
    pub amount: Decimal,
    pub currency: Currency,
    /// Rate to the base currency at `executed_at`.
    pub exchange_rate: Decimal,
    pub executed_at: DateTime<Utc>,
    /// Fund shares issued (positive) or redeemed (negative) by this flow. Set by the quota
    /// engine for deposits and withdrawals.
    pub shares_affected: Option<Decimal>,
    pub notes: Option<String>,
}

impl CashFlow {
    /// The effective signed contribution to the cash balance, in base currency:
    /// `amount × exchange_rate` signed by kind.
    pub fn balance_contribution(&self) -> Decimal {
        self.amount * self.exchange_rate * Decimal::from(self.kind.balance_sign())
    }

    pub fn validate(&self) -> Result<(), CarteiraError> {
        if self.amount <= Decimal::ZERO {
            return Err(CarteiraError::validation("amount must be positive"));
        }
        if self.exchange_rate <= Decimal::ZERO {
            return Err(CarteiraError::validation("exchange_rate must be positive"));
        }
        Ok(())
    }
}

/// Field-by-field partial update of a [`CashFlow`]. Absent fields keep their value.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct CashFlowPatch {
    pub kind: Option<CashFlowKind>,
    pub amount: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
    pub notes: Option<Option<String>>,
}

impl CashFlowPatch {
    /// Apply the patch, returning the updated flow after re-validating it.
    pub fn apply(&self, mut flow: CashFlow) -> Result<CashFlow, CarteiraError> {
        if let Some(kind) = self.kind {
            flow.kind = kind;
        }
        if let Some(amount) = self.amount {
            flow.amount = amount;
        }
        if let Some(exchange_rate) = self.exchange_rate {
            flow.exchange_rate = exchange_rate;
        }
        if let Some(executed_at) = self.executed_at {
            flow.executed_at = executed_at;
        }
        if let Some(notes) = &self.notes {
            flow.notes = notes.clone();
        }

        flow.validate()?;
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn transaction(kind: TransactionKind, quantity: Decimal, price: Decimal) -> Transaction {
        Transaction {
            id: TransactionId::random(),
            account_id: AccountId::random(),
            asset_id: AssetId::random(),
            document_id: None,
            kind,
            quantity,
            price,
            fees: Decimal::ZERO,
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: Utc::now(),
            notes: None,
        }
    }

    #[test]
    fn test_transaction_validate() {
        assert!(transaction(TransactionKind::Buy, dec!(100), dec!(10)).validate().is_ok());
        assert!(transaction(TransactionKind::Buy, dec!(-1), dec!(10)).validate().is_err());
        assert!(transaction(TransactionKind::Sell, dec!(100), dec!(0)).validate().is_err());
        assert!(transaction(TransactionKind::Buy, dec!(0), dec!(10)).validate().is_err());
        // Journal kinds do not require quantity/price
        assert!(transaction(TransactionKind::Dividend, dec!(0), dec!(0)).validate().is_ok());
        // A split factor is carried in quantity; no price required
        assert!(transaction(TransactionKind::Split, dec!(2), dec!(0)).validate().is_ok());
    }

    #[test]
    fn test_transaction_patch_applies_and_revalidates() {
        let original = transaction(TransactionKind::Buy, dec!(100), dec!(10));

        let patched = TransactionPatch {
            price: Some(dec!(11.50)),
            fees: Some(dec!(2.00)),
            notes: Some(Some("corrected fill".to_string())),
            ..Default::default()
        }
        .apply(original.clone())
        .unwrap();

        assert_eq!(patched.price, dec!(11.50));
        assert_eq!(patched.fees, dec!(2.00));
        assert_eq!(patched.quantity, original.quantity);
        assert_eq!(patched.notes.as_deref(), Some("corrected fill"));

        // A patch that breaks validation is rejected
        let rejected = TransactionPatch {
            quantity: Some(dec!(0)),
            ..Default::default()
        }
        .apply(original);
        assert!(rejected.is_err());
    }

    #[test]
    fn test_cash_flow_balance_contribution() {
        let mut flow = CashFlow {
            id: CashFlowId::random(),
            account_id: AccountId::random(),
            kind: CashFlowKind::Deposit,
            amount: dec!(100.00),
            currency: Currency::USD,
            exchange_rate: dec!(5.00),
            executed_at: Utc::now(),
            shares_affected: None,
            notes: None,
        };

        assert_eq!(flow.balance_contribution(), dec!(500.00));

        flow.kind = CashFlowKind::Withdrawal;
        assert_eq!(flow.balance_contribution(), dec!(-500.00));

        flow.kind = CashFlowKind::Dividend;
        assert_eq!(flow.balance_contribution(), dec!(0));
    }
}
