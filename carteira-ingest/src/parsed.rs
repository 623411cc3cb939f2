use carteira_instrument::{category::CategoryBreakdown, ticker::Ticker};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Canonical transaction kind emitted by the dialect parsers.
///
/// Broker-local vocabulary (eg/ "COMPRA", "VENDA", "Wire In", "RESGATE") is normalized into
/// this set before anything downstream sees it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsedTransactionKind {
    Buy,
    Sell,
    Dividend,
    Jcp,
    Interest,
    Fee,
    CustodyFee,
    Tax,
    TransferIn,
    TransferOut,
    Application,
    Redemption,
    LendingOut,
    LendingReturn,
    Settlement,
    Split,
    Subscription,
    Amortization,
    Rental,
    Other,
}

impl Display for ParsedTransactionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParsedTransactionKind::Buy => "buy",
            ParsedTransactionKind::Sell => "sell",
            ParsedTransactionKind::Dividend => "dividend",
            ParsedTransactionKind::Jcp => "jcp",
            ParsedTransactionKind::Interest => "interest",
            ParsedTransactionKind::Fee => "fee",
            ParsedTransactionKind::CustodyFee => "custody_fee",
            ParsedTransactionKind::Tax => "tax",
            ParsedTransactionKind::TransferIn => "transfer_in",
            ParsedTransactionKind::TransferOut => "transfer_out",
            ParsedTransactionKind::Application => "application",
            ParsedTransactionKind::Redemption => "redemption",
            ParsedTransactionKind::LendingOut => "lending_out",
            ParsedTransactionKind::LendingReturn => "lending_return",
            ParsedTransactionKind::Settlement => "settlement",
            ParsedTransactionKind::Split => "split",
            ParsedTransactionKind::Subscription => "subscription",
            ParsedTransactionKind::Amortization => "amortization",
            ParsedTransactionKind::Rental => "rental",
            ParsedTransactionKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// A transaction extracted from a document, vocabulary already normalized.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub kind: ParsedTransactionKind,
    pub ticker: Option<Ticker>,
    pub asset_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub total: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub notes: Option<String>,
}

/// Statement coverage period. Either bound may be missing in a partially-extracted document.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct StatementPeriod {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// A stock position as stated by the broker. Quantity keeps the statement's sign - negative
/// quantities are short positions; the reconciliation step normalizes the sign away.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RawStatementPosition {
    pub ticker: Ticker,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub total_cost: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub current_value: Option<Decimal>,
}

/// A fixed-income holding as stated by the broker. Not replayed - authoritative from the
/// latest statement's reference date.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ParsedFixedIncome {
    pub asset_name: String,
    pub kind: Option<String>,
    pub issuer: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub total_value: Decimal,
    pub indexer: Option<String>,
    pub rate_percent: Option<Decimal>,
    pub acquisition_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
}

/// An investment-fund holding as stated by the broker. Not replayed.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ParsedFundPosition {
    pub fund_name: String,
    pub cnpj: Option<String>,
    pub quota_quantity: Decimal,
    pub quota_price: Option<Decimal>,
    pub gross_balance: Decimal,
    pub ir_provision: Option<Decimal>,
    pub net_balance: Option<Decimal>,
    pub performance_pct: Option<Decimal>,
}

/// The normalized content of a parsed statement, one field per section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ParsedStatement {
    pub period: Option<StatementPeriod>,
    pub transactions: Vec<ParsedTransaction>,
    pub cash_movements: Vec<ParsedTransaction>,
    pub stock_positions: Vec<RawStatementPosition>,
    pub fixed_income_positions: Vec<ParsedFixedIncome>,
    pub investment_fund_positions: Vec<ParsedFundPosition>,
    /// The broker's own consolidated totals, mapped into the canonical category shape. When
    /// present this is the authoritative snapshot for the period end date.
    pub consolidated_position: Option<CategoryBreakdown>,
}

impl ParsedStatement {
    /// Every transaction-like row, journal movements included.
    pub fn all_transactions(&self) -> impl Iterator<Item = &ParsedTransaction> {
        self.transactions.iter().chain(self.cash_movements.iter())
    }
}
