#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Carteira-Instrument
//! Carteira-Instrument contains the core Account, Asset, Ticker, Currency and Category data
//! structures shared by every Carteira crate, plus the B3 ticker heuristics used to classify
//! Brazilian listed instruments.

use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Brokerage [`Account`](account::Account) related data structures.
pub mod account;

/// [`Asset`](asset::Asset) related data structures.
pub mod asset;

/// Portfolio [`Category`](category::Category) vocabulary and breakdown totals.
pub mod category;

/// ISO-4217 style [`Currency`](currency::Currency) code.
pub mod currency;

/// Canonical [`Ticker`](ticker::Ticker) and the B3 shape heuristics.
pub mod ticker;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Copy,
            Clone,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            Deserialize,
            Serialize,
            Constructor,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of the portfolio owner. Lifecycle is externally managed (auth system).
    UserId
);
uuid_id!(
    /// Unique identifier of a brokerage [`Account`](account::Account).
    AccountId
);
uuid_id!(
    /// Unique identifier of an [`Asset`](asset::Asset).
    AssetId
);
uuid_id!(
    /// Unique identifier of an immutable ledger transaction.
    TransactionId
);
uuid_id!(
    /// Unique identifier of a cash flow journal entry.
    CashFlowId
);
uuid_id!(
    /// Unique identifier of an open position row.
    PositionId
);
uuid_id!(
    /// Unique identifier of a realized trade record.
    RealizedTradeId
);
uuid_id!(
    /// Unique identifier of a daily fund share (quota) row.
    FundShareId
);
uuid_id!(
    /// Unique identifier of a statement-sourced fixed-income holding.
    FixedIncomePositionId
);
uuid_id!(
    /// Unique identifier of a statement-sourced investment-fund holding.
    InvestmentFundPositionId
);
uuid_id!(
    /// Unique identifier of an ingested source document.
    DocumentId
);
