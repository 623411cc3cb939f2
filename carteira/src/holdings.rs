use carteira_ingest::parsed::{ParsedFixedIncome, ParsedFundPosition};
use carteira_instrument::{
    AccountId, DocumentId, FixedIncomePositionId, InvestmentFundPositionId,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of fixed-income instrument.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedIncomeKind {
    Cdb,
    Lca,
    Lci,
    Lft,
    Ntnb,
    Ntnf,
    Lf,
    Debenture,
    Cri,
    Cra,
    Other,
}

impl FixedIncomeKind {
    /// Best-effort classification from the broker's free-text type label.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "CDB" => Self::Cdb,
            "LCA" => Self::Lca,
            "LCI" => Self::Lci,
            "LFT" => Self::Lft,
            "NTNB" | "NTN-B" => Self::Ntnb,
            "NTNF" | "NTN-F" => Self::Ntnf,
            "LF" => Self::Lf,
            "DEBENTURE" | "DEBÊNTURE" => Self::Debenture,
            "CRI" => Self::Cri,
            "CRA" => Self::Cra,
            _ => Self::Other,
        }
    }
}

/// Rate indexer of a fixed-income instrument.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerKind {
    Cdi,
    Selic,
    Ipca,
    Igpm,
    Prefixado,
    Other,
}

impl IndexerKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "CDI" => Self::Cdi,
            "SELIC" => Self::Selic,
            "IPCA" | "IPCA+" => Self::Ipca,
            "IGPM" | "IGP-M" => Self::Igpm,
            "PREFIXADO" | "PRE" | "PRÉ" => Self::Prefixado,
            _ => Self::Other,
        }
    }
}

/// A fixed-income holding. Never replayed - fully authoritative from the latest statement's
/// reference date; imports replace the account's rows wholesale.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct FixedIncomePosition {
    pub id: FixedIncomePositionId,
    pub account_id: AccountId,
    pub document_id: Option<DocumentId>,
    pub asset_name: String,
    pub kind: FixedIncomeKind,
    pub issuer: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub total_value: Decimal,
    pub indexer: Option<IndexerKind>,
    pub rate_percent: Option<Decimal>,
    pub acquisition_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub reference_date: NaiveDate,
}

impl FixedIncomePosition {
    pub fn from_parsed(
        parsed: &ParsedFixedIncome,
        account_id: AccountId,
        document_id: Option<DocumentId>,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            id: FixedIncomePositionId::random(),
            account_id,
            document_id,
            asset_name: parsed.asset_name.clone(),
            kind: parsed
                .kind
                .as_deref()
                .map(FixedIncomeKind::from_label)
                .unwrap_or(FixedIncomeKind::Other),
            issuer: parsed.issuer.clone(),
            quantity: parsed.quantity,
            unit_price: parsed.unit_price,
            total_value: parsed.total_value,
            indexer: parsed.indexer.as_deref().map(IndexerKind::from_label),
            rate_percent: parsed.rate_percent,
            acquisition_date: parsed.acquisition_date,
            maturity_date: parsed.maturity_date,
            reference_date,
        }
    }
}

/// An investment-fund holding. Never replayed; replace-on-import like fixed income.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct InvestmentFundPosition {
    pub id: InvestmentFundPositionId,
    pub account_id: AccountId,
    pub document_id: Option<DocumentId>,
    pub fund_name: String,
    pub cnpj: Option<String>,
    pub quota_quantity: Decimal,
    pub quota_price: Option<Decimal>,
    pub gross_balance: Decimal,
    pub ir_provision: Option<Decimal>,
    pub net_balance: Option<Decimal>,
    pub performance_pct: Option<Decimal>,
    pub reference_date: NaiveDate,
}

impl InvestmentFundPosition {
    pub fn from_parsed(
        parsed: &ParsedFundPosition,
        account_id: AccountId,
        document_id: Option<DocumentId>,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            id: InvestmentFundPositionId::random(),
            account_id,
            document_id,
            fund_name: parsed.fund_name.clone(),
            cnpj: parsed.cnpj.clone(),
            quota_quantity: parsed.quota_quantity,
            quota_price: parsed.quota_price,
            gross_balance: parsed.gross_balance,
            ir_provision: parsed.ir_provision,
            net_balance: parsed.net_balance,
            performance_pct: parsed.performance_pct,
            reference_date,
        }
    }
}
