use crate::{currency::Currency, AccountId, UserId};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Kind of brokerage holding context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    BtgBr,
    Xp,
    BtgCayman,
    TesouroDireto,
}

impl Display for AccountKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AccountKind::BtgBr => "btg_br",
            AccountKind::Xp => "xp",
            AccountKind::BtgCayman => "btg_cayman",
            AccountKind::TesouroDireto => "tesouro_direto",
        };
        write!(f, "{name}")
    }
}

/// A brokerage account owned by a [`UserId`].
///
/// (user_id, name) is unique while the account is active. Deletion is soft via `is_active`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub name: String,
    pub kind: AccountKind,
    pub currency: Currency,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
