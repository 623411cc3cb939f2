use crate::{
    document::DocumentKind,
    parsed::{ParsedStatement, ParsedTransaction},
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;

/// BTG Pactual BR monthly statement parser (Portuguese vocabulary).
pub mod btg;

/// BTG Pactual Cayman monthly statement parser (English vocabulary, USD).
pub mod cayman;

/// Trade confirmation note parser.
pub mod trade_note;

/// A dialect parser for one [`DocumentKind`].
///
/// Parsers work over the raw JSON extracted by the LLM: they validate its structure, extract
/// the canonical sections, and normalize broker-local vocabulary. A parser may name
/// `recoverable_sections` for which the orchestrator issues focused retry prompts when the
/// first pass leaves them empty.
pub trait DocumentParser: Debug + Send + Sync {
    fn kind(&self) -> DocumentKind;

    /// The full extraction prompt for the first pass.
    fn prompt_template(&self) -> &str;

    /// Sections that must be present for the document to be considered extracted.
    fn required_sections(&self) -> &[&str];

    /// Subset of [`Self::required_sections`] with a focused retry prompt implemented.
    fn recoverable_sections(&self) -> &[&str] {
        &[]
    }

    /// A retry prompt scoped to a single missing section, returning only that section.
    fn focused_prompt(&self, _section: &str) -> Option<String> {
        None
    }

    /// Validate the raw extraction. At least one data section must be present; a period object,
    /// if any, must be at least partially populated.
    fn validate(&self, raw: &Value) -> Result<(), String>;

    /// Extract every transaction-like row, vocabulary normalized.
    fn extract_transactions(&self, raw: &Value) -> Vec<ParsedTransaction>;

    /// Extract the full normalized statement content.
    fn extract_statement(&self, raw: &Value) -> ParsedStatement;
}

/// Maps a [`DocumentKind`] to its [`DocumentParser`].
#[derive(Debug, Default)]
pub struct ParserRegistry {
    parsers: HashMap<DocumentKind, Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in parser registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(btg::BtgStatementParser::new()));
        registry.register(Box::new(cayman::CaymanStatementParser::new()));
        registry.register(Box::new(trade_note::TradeNoteParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn DocumentParser>) {
        self.parsers.insert(parser.kind(), parser);
    }

    pub fn get(&self, kind: DocumentKind) -> Option<&dyn DocumentParser> {
        self.parsers.get(&kind).map(Box::as_ref)
    }
}

/// Required sections that are missing or empty in the raw extraction.
///
/// A section is missing when the key is absent, null, an empty array, or an empty object. A
/// `cash_movements` object counts as present when its `movements` array is non-empty.
pub fn missing_sections(raw: &Value, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|section| {
            let value = raw.get(**section);
            match value {
                None | Some(Value::Null) => true,
                Some(Value::Array(items)) => items.is_empty(),
                Some(Value::Object(fields)) => {
                    if let Some(Value::Array(movements)) = fields.get("movements") {
                        movements.is_empty()
                    } else {
                        fields.is_empty()
                    }
                }
                Some(_) => false,
            }
        })
        .map(|section| section.to_string())
        .collect()
}

/// True when the section is a non-empty array.
pub(crate) fn section_has_rows(raw: &Value, section: &str) -> bool {
    raw.get(section)
        .and_then(Value::as_array)
        .is_some_and(|rows| !rows.is_empty())
}

/// True when `cash_movements.movements` is a non-empty array.
pub(crate) fn cash_movements_present(raw: &Value) -> bool {
    raw.get("cash_movements")
        .and_then(|section| section.get("movements"))
        .and_then(Value::as_array)
        .is_some_and(|rows| !rows.is_empty())
}

/// Shared period validation: a period object present but with neither bound is invalid.
pub(crate) fn validate_period(raw: &Value) -> Result<(), String> {
    if let Some(period) = raw.get("period") {
        if period.is_object()
            && crate::coerce::parse_date(period.get("start_date")).is_none()
            && crate::coerce::parse_date(period.get("end_date")).is_none()
        {
            return Err("invalid period data".to_string());
        }
    }
    Ok(())
}

/// Scan a free-text description for a B3-shaped ticker (4 letters + 1-2 digits).
///
/// eg/ "DIVIDENDOS GGBR4" -> Some("GGBR4")
pub(crate) fn ticker_from_description(description: &str) -> Option<String> {
    let upper = description.to_uppercase();
    let bytes = upper.as_bytes();

    let mut start = 0;
    while start < bytes.len() {
        // Candidate words are maximal alphanumeric runs
        if !bytes[start].is_ascii_alphanumeric() {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
            end += 1;
        }

        let word = &upper[start..end];
        if (5..=6).contains(&word.len()) {
            let (letters, digits) = word.split_at(4);
            if letters.chars().all(|c| c.is_ascii_alphabetic())
                && !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
            {
                return Some(word.to_string());
            }
        }

        start = end;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_sections() {
        let raw = json!({
            "transactions": [{"date": "2024-01-02"}],
            "stock_positions": [],
            "cash_movements": {"movements": []},
            "fixed_income_positions": null,
        });

        let missing = missing_sections(
            &raw,
            &["transactions", "stock_positions", "cash_movements", "fixed_income_positions", "absent"],
        );

        assert_eq!(
            missing,
            vec!["stock_positions", "cash_movements", "fixed_income_positions", "absent"]
        );
    }

    #[test]
    fn test_ticker_from_description() {
        struct TestCase {
            input: &'static str,
            expected: Option<&'static str>,
        }

        let cases = vec![
            TestCase {
                input: "DIVIDENDOS GGBR4",
                expected: Some("GGBR4"),
            },
            TestCase {
                input: "jcp vale3 ref 01/2024",
                expected: Some("VALE3"),
            },
            TestCase {
                input: "RENDIMENTO XPLG11",
                expected: Some("XPLG11"),
            },
            TestCase {
                input: "TED RECEBIDA",
                expected: None,
            },
            TestCase {
                input: "TAXA CUSTODIA 012024",
                expected: None,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                ticker_from_description(test.input).as_deref(),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.get(DocumentKind::Statement).is_some());
        assert!(registry.get(DocumentKind::CaymanStatement).is_some());
        assert!(registry.get(DocumentKind::TradeNote).is_some());
        assert!(registry.get(DocumentKind::IncomeReport).is_none());
    }
}
