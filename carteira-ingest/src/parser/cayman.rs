use crate::{
    coerce,
    document::DocumentKind,
    parsed::{
        ParsedStatement, ParsedTransaction, ParsedTransactionKind, RawStatementPosition,
    },
    parser::{cash_movements_present, section_has_rows, validate_period, DocumentParser},
};
use carteira_instrument::{category::CategoryBreakdown, ticker::Ticker};
use rust_decimal::Decimal;
use serde_json::Value;

const PROMPT: &str = r#"Extract the complete content of this BTG Pactual Cayman account statement (English, USD) as one JSON object with these sections:
"period" {"start_date", "end_date"} (YYYY-MM-DD),
"summary" {"total_net_worth"},
"cash_accounts" [{"description", "currency", "balance"}],
"equities" [{"ticker", "quantity", "avg_price", "current_price", "market_value"}] (SHORT positions have negative quantity),
"derivatives" [{"description", "ticker", "quantity", "market_value"}],
"structured_products" [{"description", "market_value"}],
"transactions" [{"date", "type", "ticker", "description", "quantity", "price", "total", "fees", "notes"}],
"cash_movements" {"movements": [{"date", "type", "description", "value"}]}.
Transaction types appear in English (Buy, Sell, Short, Cover, Dividend, Wire In, ...); copy them as written.
IMPORTANT OUTPUT RULES:
1. Return ONLY valid JSON, no text before or after, no markdown code fences.
2. Use null instead of empty strings or "N/A".
3. Dates are YYYY-MM-DD. Numbers use "." as the decimal separator.
4. Ensure the JSON is COMPLETE - do not truncate the output."#;

const REQUIRED_SECTIONS: &[&str] = &["equities", "derivatives", "transactions", "cash_movements"];
const RECOVERABLE_SECTIONS: &[&str] = &["equities", "derivatives"];

/// Parser for BTG Pactual Cayman monthly statements (English, USD).
///
/// The offshore statement carries LONG and SHORT equity positions, derivatives and structured
/// products; its category dialect is mapped into the canonical breakdown (cash ->
/// conta_corrente, equities -> renda_variavel, structured products -> renda_fixa).
#[derive(Debug, Default)]
pub struct CaymanStatementParser;

impl CaymanStatementParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for CaymanStatementParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::CaymanStatement
    }

    fn prompt_template(&self) -> &str {
        PROMPT
    }

    fn required_sections(&self) -> &[&str] {
        REQUIRED_SECTIONS
    }

    fn recoverable_sections(&self) -> &[&str] {
        RECOVERABLE_SECTIONS
    }

    fn focused_prompt(&self, section: &str) -> Option<String> {
        if !RECOVERABLE_SECTIONS.contains(&section) {
            return None;
        }

        let shape = match section {
            "equities" => {
                r#""equities": [{"ticker", "quantity", "avg_price", "current_price", "market_value"}] (SHORT positions have negative quantity)"#
            }
            "derivatives" => {
                r#""derivatives": [{"description", "ticker", "quantity", "market_value"}]"#
            }
            _ => return None,
        };

        Some(format!(
            "The {section} section of this BTG Pactual Cayman statement was missed on a first \
             read. Extract ONLY that section as a JSON object of the shape {{{shape}}}. \
             Return ONLY valid JSON, no markdown code fences. If the statement truly has no \
             {section}, return {{\"{section}\": []}}."
        ))
    }

    fn validate(&self, raw: &Value) -> Result<(), String> {
        if !raw.is_object() {
            return Err("response is not a valid JSON object".to_string());
        }

        let has_data = section_has_rows(raw, "transactions")
            || cash_movements_present(raw)
            || section_has_rows(raw, "equities")
            || section_has_rows(raw, "derivatives")
            || section_has_rows(raw, "structured_products")
            || section_has_rows(raw, "cash_accounts");

        if !has_data {
            return Err("no data extracted from statement".to_string());
        }

        validate_period(raw)
    }

    fn extract_transactions(&self, raw: &Value) -> Vec<ParsedTransaction> {
        let mut transactions = extract_transaction_rows(raw);
        transactions.extend(extract_cash_movement_rows(raw));
        transactions
    }

    fn extract_statement(&self, raw: &Value) -> ParsedStatement {
        ParsedStatement {
            period: super::btg::extract_period(raw),
            transactions: extract_transaction_rows(raw),
            cash_movements: extract_cash_movement_rows(raw),
            stock_positions: extract_equities(raw),
            fixed_income_positions: Vec::new(),
            investment_fund_positions: Vec::new(),
            consolidated_position: extract_consolidated(raw),
        }
    }
}

/// Normalize an English broker transaction label into the canonical kind.
pub fn normalize_kind(raw: &str) -> ParsedTransactionKind {
    use ParsedTransactionKind::*;

    match raw.trim().to_lowercase().as_str() {
        "buy" | "purchase" | "cover" | "buy_to_cover" => Buy,
        "sell" | "sale" | "short" => Sell,
        "dividend" | "div" => Dividend,
        "interest" | "int" => Interest,
        "fee" | "commission" | "brokerage" => Fee,
        "tax" | "withholding" => Tax,
        "transfer_in" | "wire_in" | "wire in" | "deposit" => TransferIn,
        "transfer_out" | "wire_out" | "wire out" | "withdrawal" => TransferOut,
        "settlement" => Settlement,
        "split" | "stock_split" => Split,
        "spinoff" | "subscription" => Subscription,
        "redemption" => Redemption,
        _ => Other,
    }
}

fn extract_transaction_rows(raw: &Value) -> Vec<ParsedTransaction> {
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
                .map(normalize_kind)
                .unwrap_or(ParsedTransactionKind::Other);

            Some(ParsedTransaction {
                date,
                kind,
                ticker: ticker_field(row),
                asset_name: coerce::parse_string(row.get("description")),
                quantity: coerce::parse_decimal(row.get("quantity")),
                price: coerce::parse_decimal(row.get("price")),
                total: coerce::parse_decimal(row.get("total")),
                fees: coerce::parse_decimal(row.get("fees")),
                notes: coerce::parse_string(row.get("notes")),
            })
        })
        .collect()
}

fn extract_cash_movement_rows(raw: &Value) -> Vec<ParsedTransaction> {
    let Some(movements) = raw
        .get("cash_movements")
        .and_then(|section| section.get("movements"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    movements
        .iter()
        .filter(|row| row.is_object())
        .filter_map(|row| {
            let date = coerce::parse_date(row.get("date"))?;
            let kind = row
                .get("type")
                .and_then(Value::as_str)
                .map(normalize_kind)
                .unwrap_or(ParsedTransactionKind::Other);

            Some(ParsedTransaction {
                date,
                kind,
                // Offshore cash movements do not reference tickers
                ticker: None,
                asset_name: None,
                quantity: None,
                price: None,
                total: coerce::parse_decimal(row.get("value")),
                fees: None,
                notes: coerce::parse_string(row.get("description")),
            })
        })
        .collect()
}

fn extract_equities(raw: &Value) -> Vec<RawStatementPosition> {
    let Some(equities) = raw.get("equities").and_then(Value::as_array) else {
        return Vec::new();
    };

    equities
        .iter()
        .filter(|row| row.is_object())
        .filter_map(|row| {
            let ticker = ticker_field(row)?;
            Some(RawStatementPosition {
                ticker,
                quantity: coerce::parse_decimal(row.get("quantity")).unwrap_or(Decimal::ZERO),
                avg_price: coerce::first_of(row, &["avg_price", "average_cost"])
                    .and_then(|value| coerce::parse_decimal(Some(value)))
                    .unwrap_or(Decimal::ZERO),
                total_cost: None,
                current_price: coerce::parse_decimal(row.get("current_price")),
                current_value: coerce::parse_decimal(row.get("market_value")),
            })
        })
        .collect()
}

/// Map the Cayman statement dialect into the canonical category breakdown:
/// cash accounts -> conta_corrente, equities (long + short market value) -> renda_variavel,
/// structured products -> renda_fixa, derivatives -> derivativos.
fn extract_consolidated(raw: &Value) -> Option<CategoryBreakdown> {
    let mut breakdown = CategoryBreakdown::default();
    let mut any = false;

    if let Some(accounts) = raw.get("cash_accounts").and_then(Value::as_array) {
        for account in accounts {
            if let Some(balance) = coerce::parse_decimal(account.get("balance")) {
                breakdown.conta_corrente += balance;
                any = true;
            }
        }
    }

    if let Some(equities) = raw.get("equities").and_then(Value::as_array) {
        for equity in equities {
            if let Some(value) = coerce::parse_decimal(equity.get("market_value")) {
                breakdown.renda_variavel += value;
                any = true;
            }
        }
    }

    if let Some(products) = raw.get("structured_products").and_then(Value::as_array) {
        for product in products {
            if let Some(value) = coerce::parse_decimal(product.get("market_value")) {
                breakdown.renda_fixa += value;
                any = true;
            }
        }
    }

    if let Some(derivatives) = raw.get("derivatives").and_then(Value::as_array) {
        for derivative in derivatives {
            if let Some(value) = coerce::parse_decimal(derivative.get("market_value")) {
                breakdown.derivativos += value;
                any = true;
            }
        }
    }

    any.then_some(breakdown)
}

fn ticker_field(row: &Value) -> Option<Ticker> {
    let raw = coerce::first_of(row, &["ticker", "symbol"])?.as_str()?.trim();
    (!raw.is_empty()).then(|| Ticker::new(raw))
}
