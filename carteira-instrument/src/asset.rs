use crate::{currency::Currency, ticker::Ticker, AssetId};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Kind of tradable instrument.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Stock,
    Etf,
    Fii,
    Bdr,
    Fiagro,
    Reit,
    Fund,
    Bond,
    Treasury,
    Option,
    Future,
    Crypto,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetKind::Stock => "stock",
            AssetKind::Etf => "etf",
            AssetKind::Fii => "fii",
            AssetKind::Bdr => "bdr",
            AssetKind::Fiagro => "fiagro",
            AssetKind::Reit => "reit",
            AssetKind::Fund => "fund",
            AssetKind::Bond => "bond",
            AssetKind::Treasury => "treasury",
            AssetKind::Option => "option",
            AssetKind::Future => "future",
            AssetKind::Crypto => "crypto",
        };
        write!(f, "{name}")
    }
}

/// A tradable instrument. Assets are global - they are not owned by any account.
///
/// The [`Ticker`] is unique across the system and is the only key parsers and providers need.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Asset {
    pub id: AssetId,
    pub ticker: Ticker,
    pub name: String,
    pub kind: AssetKind,
    pub currency: Currency,
    pub exchange: Option<SmolStr>,
    pub is_active: bool,
}

impl Asset {
    /// Construct a minimal [`Asset`] for an unknown ticker, classifying it with the B3 shape
    /// heuristic. The name is provisional until richer reference data arrives.
    pub fn from_ticker(ticker: Ticker) -> Self {
        let brazilian = ticker.is_brazilian();
        Self {
            id: AssetId::random(),
            name: ticker.as_str().to_string(),
            kind: ticker.infer_kind(),
            currency: if brazilian {
                Currency::BRL
            } else {
                Currency::USD
            },
            exchange: brazilian.then(|| SmolStr::new_static("B3")),
            is_active: true,
            ticker,
        }
    }
}
