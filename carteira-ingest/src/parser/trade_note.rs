use crate::{
    coerce,
    document::DocumentKind,
    parsed::{ParsedStatement, ParsedTransaction, ParsedTransactionKind},
    parser::{section_has_rows, validate_period, DocumentParser},
};
use carteira_instrument::ticker::Ticker;
use serde_json::Value;

const PROMPT: &str = r#"Extract this brokerage trade confirmation note (nota de corretagem) as one JSON object:
"period" {"start_date", "end_date"} (YYYY-MM-DD, both the trade date),
"transactions" [{"date", "type", "ticker", "asset_name", "quantity", "price", "total", "fees", "settlement_date", "market", "notes"}].
Operation types appear as C/V or COMPRA/VENDA; copy them as written. Aggregate the note's costs (corretagem, emolumentos, taxas) into "fees" per operation, pro-rated by value.
IMPORTANT OUTPUT RULES:
1. Return ONLY valid JSON, no text before or after, no markdown code fences.
2. Use null instead of empty strings or "N/A".
3. Dates are YYYY-MM-DD. Numbers use "." as the decimal separator.
4. Ensure the JSON is COMPLETE - do not truncate the output."#;

/// Parser for trade confirmation notes. Carries only the executed operations.
#[derive(Debug, Default)]
pub struct TradeNoteParser;

impl TradeNoteParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for TradeNoteParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::TradeNote
    }

    fn prompt_template(&self) -> &str {
        PROMPT
    }

    fn required_sections(&self) -> &[&str] {
        &["transactions"]
    }

    fn validate(&self, raw: &Value) -> Result<(), String> {
        if !raw.is_object() {
            return Err("response is not a valid JSON object".to_string());
        }
        if !section_has_rows(raw, "transactions") {
            return Err("no transactions extracted from trade note".to_string());
        }
        validate_period(raw)
    }

    fn extract_transactions(&self, raw: &Value) -> Vec<ParsedTransaction> {
        let Some(transactions) = raw.get("transactions").and_then(Value::as_array) else {
            return Vec::new();
        };

        transactions
            .iter()
            .filter(|row| row.is_object())
            .filter_map(|row| {
                let date = coerce::parse_date(row.get("date"))?;
                let kind = row
                    .get("type")
                    .and_then(Value::as_str)
                    .map(super::btg::normalize_kind)
                    .unwrap_or(ParsedTransactionKind::Other);

                let ticker = row
                    .get("ticker")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|raw| !raw.is_empty())
                    .map(Ticker::new);

                let mut notes = coerce::parse_string(row.get("notes"));
                if let Some(market) = coerce::parse_string(row.get("market")) {
                    notes = Some(match notes {
                        Some(existing) => format!("{existing} [{market}]"),
                        None => format!("[{market}]"),
                    });
                }

                Some(ParsedTransaction {
                    date,
                    kind,
                    ticker,
                    asset_name: coerce::parse_string(row.get("asset_name")),
                    quantity: coerce::parse_decimal(row.get("quantity")),
                    price: coerce::parse_decimal(row.get("price")),
                    total: coerce::parse_decimal(row.get("total")),
                    fees: coerce::parse_decimal(row.get("fees")),
                    notes,
                })
            })
            .collect()
    }

    fn extract_statement(&self, raw: &Value) -> ParsedStatement {
        ParsedStatement {
            period: super::btg::extract_period(raw),
            transactions: self.extract_transactions(raw),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_trade_note_extraction() {
        let parser = TradeNoteParser::new();
        let raw = json!({
            "period": {"start_date": "2024-02-05", "end_date": "2024-02-05"},
            "transactions": [
                {"date": "2024-02-05", "type": "C", "ticker": "ITUB4", "quantity": 200,
                 "price": 32.15, "total": 6430.00, "fees": 5.12, "market": "BOVESPA"},
                {"date": "2024-02-05", "type": "V", "ticker": "PETR4", "quantity": 100,
                 "price": 37.00, "total": 3700.00, "fees": 2.95}
            ]
        });

        assert!(parser.validate(&raw).is_ok());
        let transactions = parser.extract_transactions(&raw);

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].kind, ParsedTransactionKind::Buy);
        assert_eq!(transactions[0].notes.as_deref(), Some("[BOVESPA]"));
        assert_eq!(transactions[1].kind, ParsedTransactionKind::Sell);
        assert_eq!(transactions[1].fees, Some(dec!(2.95)));
    }

    #[test]
    fn test_trade_note_requires_transactions() {
        let parser = TradeNoteParser::new();
        assert!(parser.validate(&json!({"transactions": []})).is_err());
    }
}
