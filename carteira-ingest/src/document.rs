use carteira_instrument::{AccountId, DocumentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Kind of source document, selecting the dialect parser.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// BTG Pactual monthly account statement (Portuguese, BRL).
    Statement,
    /// BTG Pactual Cayman monthly statement (English, USD).
    CaymanStatement,
    /// Trade confirmation note (nota de corretagem).
    TradeNote,
    IncomeReport,
    Other,
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentKind::Statement => "statement",
            DocumentKind::CaymanStatement => "cayman_statement",
            DocumentKind::TradeNote => "trade_note",
            DocumentKind::IncomeReport => "income_report",
            DocumentKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Parsing lifecycle of a [`Document`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A parsed source artifact. The PDF bytes themselves live behind the object-storage boundary;
/// only the path is recorded here.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub user_id: UserId,
    pub account_id: Option<AccountId>,
    pub kind: DocumentKind,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub parsing_status: ParsingStatus,
    pub parsing_error: Option<String>,
    pub parsed_at: Option<DateTime<Utc>>,
    pub raw_extracted_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A freshly uploaded document awaiting its first parse.
    pub fn pending(
        user_id: UserId,
        account_id: Option<AccountId>,
        kind: DocumentKind,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        file_size: u64,
    ) -> Self {
        Self {
            id: DocumentId::random(),
            user_id,
            account_id,
            kind,
            file_name: file_name.into(),
            file_path: file_path.into(),
            file_size,
            parsing_status: ParsingStatus::Pending,
            parsing_error: None,
            parsed_at: None,
            raw_extracted_data: None,
            created_at: Utc::now(),
        }
    }

    /// True when a (re-)parse may start. A FAILED document is retained and may be retried.
    pub fn can_parse(&self) -> bool {
        matches!(
            self.parsing_status,
            ParsingStatus::Pending | ParsingStatus::Failed
        )
    }
}
