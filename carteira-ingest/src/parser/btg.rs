use crate::{
    coerce,
    document::DocumentKind,
    parsed::{
        ParsedFixedIncome, ParsedFundPosition, ParsedStatement, ParsedTransaction,
        ParsedTransactionKind, RawStatementPosition, StatementPeriod,
    },
    parser::{
        cash_movements_present, section_has_rows, ticker_from_description, validate_period,
        DocumentParser,
    },
};
use carteira_instrument::{category::CategoryBreakdown, ticker::Ticker};
use rust_decimal::Decimal;
use serde_json::Value;

const PROMPT: &str = r#"Extract the complete content of this BTG Pactual monthly statement (Extrato Mensal) as one JSON object with these sections:
"period" {"start_date", "end_date"} (YYYY-MM-DD),
"transactions" [{"date", "type", "ticker", "asset_name", "quantity", "price", "total", "fees", "notes"}],
"cash_movements" {"movements": [{"date", "type", "description", "ticker", "value"}]},
"stock_positions" [{"ticker", "quantity", "avg_price", "total_cost", "current_price", "current_value"}],
"fixed_income_positions" [{"asset_name", "type", "issuer", "quantity", "unit_price", "total_value", "indexer", "rate_percent", "acquisition_date", "maturity_date"}],
"investment_fund_positions" [{"fund_name", "cnpj", "quota_quantity", "quota_price", "gross_balance", "ir_provision", "net_balance", "performance_pct"}],
"stock_lending" [{"date", "type", "ticker", "quantity", "total", "rate_percent"}],
"consolidated_position" {"renda_fixa", "fundos_investimento", "renda_variavel", "derivativos", "conta_corrente", "coe", "total"}.
Transaction types appear in Portuguese (COMPRA, VENDA, DIVIDENDOS, JCP, RENDIMENTO, ...); copy them as written.
IMPORTANT OUTPUT RULES:
1. Return ONLY valid JSON, no text before or after, no markdown code fences.
2. Use null instead of empty strings or "N/A".
3. Dates are YYYY-MM-DD. Numbers use "." as the decimal separator.
4. Ensure the JSON is COMPLETE - do not truncate the output."#;

/// Parser for BTG Pactual monthly account statements (Portuguese, BRL).
///
/// Handles the rich statement structure: consolidated position, fixed income, stocks, fund
/// positions, stock lending and cash movements.
#[derive(Debug, Default)]
pub struct BtgStatementParser;

impl BtgStatementParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for BtgStatementParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Statement
    }

    fn prompt_template(&self) -> &str {
        PROMPT
    }

    fn required_sections(&self) -> &[&str] {
        &[
            "transactions",
            "cash_movements",
            "stock_positions",
            "fixed_income_positions",
        ]
    }

    fn validate(&self, raw: &Value) -> Result<(), String> {
        if !raw.is_object() {
            return Err("response is not a valid JSON object".to_string());
        }

        let has_data = section_has_rows(raw, "transactions")
            || cash_movements_present(raw)
            || section_has_rows(raw, "stock_positions")
            || section_has_rows(raw, "fixed_income_positions");

        if !has_data {
            return Err("no data extracted from statement".to_string());
        }

        validate_period(raw)
    }

    fn extract_transactions(&self, raw: &Value) -> Vec<ParsedTransaction> {
        let mut transactions = extract_transaction_rows(raw);
        transactions.extend(extract_cash_movement_rows(raw));
        transactions.extend(extract_stock_lending_rows(raw));
        transactions
    }

    fn extract_statement(&self, raw: &Value) -> ParsedStatement {
        ParsedStatement {
            period: extract_period(raw),
            transactions: {
                let mut rows = extract_transaction_rows(raw);
                rows.extend(extract_stock_lending_rows(raw));
                rows
            },
            cash_movements: extract_cash_movement_rows(raw),
            stock_positions: extract_stock_positions(raw),
            fixed_income_positions: extract_fixed_income(raw),
            investment_fund_positions: extract_fund_positions(raw),
            consolidated_position: extract_consolidated(raw),
        }
    }
}

/// Normalize a Portuguese broker transaction label into the canonical kind.
pub fn normalize_kind(raw: &str) -> ParsedTransactionKind {
    use ParsedTransactionKind::*;

    match raw.trim().to_lowercase().as_str() {
        "compra" | "c" | "buy" => Buy,
        "venda" | "v" | "sell" => Sell,
        "dividendo" | "dividendos" | "dividend" | "provento" => Dividend,
        "juros" | "jcp" | "jscp" | "juros s/capital" => Jcp,
        "rendimento" | "interest" => Interest,
        "taxa" | "tarifa" | "fee" | "corretagem" => Fee,
        "custody_fee" | "taxa custodia" => CustodyFee,
        "tax" | "iof" | "ir" | "irrf" => Tax,
        "transfer_in" | "transferencia" | "aporte" | "ted" | "doc" => TransferIn,
        "transfer_out" | "saque" => TransferOut,
        "application" | "aplicacao" => Application,
        "redemption" | "resgate" => Redemption,
        "lending_out" | "emprestimo" => LendingOut,
        "lending_return" | "liquidacao emprestimo" => LendingReturn,
        "settlement" | "liq bolsa" | "liq. bolsa" => Settlement,
        "desdobramento" | "grupamento" | "split" => Split,
        "bonificacao" | "subscricao" | "subscription" => Subscription,
        "amortizacao" | "amortization" => Amortization,
        "aluguel" | "rental" => Rental,
        _ => Other,
    }
}

pub(crate) fn extract_period(raw: &Value) -> Option<StatementPeriod> {
    let period = raw.get("period")?;
    if !period.is_object() {
        return None;
    }
    Some(StatementPeriod {
        start_date: coerce::parse_date(period.get("start_date")),
        end_date: coerce::parse_date(period.get("end_date")),
    })
}

fn extract_transaction_rows(raw: &Value) -> Vec<ParsedTransaction> {
    rows(raw, "transactions")
        .filter_map(|row| {
            let date = coerce::parse_date(row.get("date"))?;
            let kind = raw_kind(row).map(normalize_kind).unwrap_or(ParsedTransactionKind::Other);

            Some(ParsedTransaction {
                date,
                kind,
                ticker: ticker_field(row, "ticker"),
                asset_name: coerce::parse_string(row.get("asset_name")),
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
            let kind = raw_kind(row).map(normalize_kind).unwrap_or(ParsedTransactionKind::Other);
            let description = coerce::parse_string(row.get("description"));

            // Proventos often only name the ticker inside the description text
            let ticker = ticker_field(row, "ticker").or_else(|| {
                description
                    .as_deref()
                    .and_then(ticker_from_description)
                    .map(Ticker::new)
            });

            Some(ParsedTransaction {
                date,
                kind,
                ticker,
                asset_name: None,
                quantity: None,
                price: None,
                total: coerce::parse_decimal(row.get("value")),
                fees: None,
                notes: description,
            })
        })
        .collect()
}

fn extract_stock_lending_rows(raw: &Value) -> Vec<ParsedTransaction> {
    rows(raw, "stock_lending")
        .filter_map(|row| {
            let date = coerce::parse_date(row.get("date"))?;
            let kind = raw_kind(row).map(normalize_kind).unwrap_or(ParsedTransactionKind::Other);
            let rate = coerce::parse_decimal(row.get("rate_percent")).unwrap_or(Decimal::ZERO);

            Some(ParsedTransaction {
                date,
                kind,
                ticker: ticker_field(row, "ticker"),
                asset_name: None,
                quantity: coerce::parse_decimal(row.get("quantity")),
                price: None,
                total: coerce::parse_decimal(row.get("total")),
                fees: None,
                notes: Some(format!("Rate: {rate}%")),
            })
        })
        .collect()
}

pub(crate) fn extract_stock_positions(raw: &Value) -> Vec<RawStatementPosition> {
    rows(raw, "stock_positions")
        .filter_map(|row| {
            let ticker = ticker_field(row, "ticker")?;
            Some(RawStatementPosition {
                ticker,
                quantity: coerce::parse_decimal(row.get("quantity")).unwrap_or(Decimal::ZERO),
                avg_price: coerce::first_of(row, &["avg_price", "average_price", "preco_medio"])
                    .and_then(|value| coerce::parse_decimal(Some(value)))
                    .unwrap_or(Decimal::ZERO),
                total_cost: coerce::first_of(row, &["total_cost", "total", "custo_total"])
                    .and_then(|value| coerce::parse_decimal(Some(value))),
                current_price: coerce::parse_decimal(row.get("current_price")),
                current_value: coerce::parse_decimal(row.get("current_value")),
            })
        })
        .collect()
}

fn extract_fixed_income(raw: &Value) -> Vec<ParsedFixedIncome> {
    rows(raw, "fixed_income_positions")
        .filter_map(|row| {
            let asset_name =
                coerce::first_of(row, &["asset_name", "name"]).and_then(|value| {
                    coerce::parse_string(Some(value))
                })?;

            Some(ParsedFixedIncome {
                asset_name,
                kind: coerce::parse_string(row.get("type")),
                issuer: coerce::parse_string(row.get("issuer")),
                quantity: coerce::parse_decimal(row.get("quantity")).unwrap_or(Decimal::ONE),
                unit_price: coerce::parse_decimal(row.get("unit_price")),
                total_value: coerce::first_of(row, &["total_value", "current_value", "value"])
                    .and_then(|value| coerce::parse_decimal(Some(value)))
                    .unwrap_or(Decimal::ZERO),
                indexer: coerce::parse_string(row.get("indexer")),
                rate_percent: coerce::parse_decimal(row.get("rate_percent")),
                acquisition_date: coerce::parse_date(row.get("acquisition_date")),
                maturity_date: coerce::parse_date(row.get("maturity_date")),
            })
        })
        .collect()
}

fn extract_fund_positions(raw: &Value) -> Vec<ParsedFundPosition> {
    rows(raw, "investment_fund_positions")
        .filter_map(|row| {
            let fund_name = coerce::first_of(row, &["fund_name", "name"]).and_then(|value| {
                coerce::parse_string(Some(value))
            })?;

            Some(ParsedFundPosition {
                fund_name,
                cnpj: coerce::parse_string(row.get("cnpj")),
                quota_quantity: coerce::first_of(row, &["quota_quantity", "quantity"])
                    .and_then(|value| coerce::parse_decimal(Some(value)))
                    .unwrap_or(Decimal::ZERO),
                quota_price: coerce::parse_decimal(row.get("quota_price")),
                gross_balance: coerce::first_of(row, &["gross_balance", "gross_value"])
                    .and_then(|value| coerce::parse_decimal(Some(value)))
                    .unwrap_or(Decimal::ZERO),
                ir_provision: coerce::parse_decimal(row.get("ir_provision")),
                net_balance: coerce::first_of(row, &["net_balance", "net_value"])
                    .and_then(|value| coerce::parse_decimal(Some(value))),
                performance_pct: coerce::parse_decimal(row.get("performance_pct")),
            })
        })
        .collect()
}

pub(crate) fn extract_consolidated(raw: &Value) -> Option<CategoryBreakdown> {
    let section = raw.get("consolidated_position")?;
    if !section.is_object() {
        return None;
    }

    let field = |key: &str| {
        coerce::parse_decimal(section.get(key)).unwrap_or(Decimal::ZERO)
    };

    Some(CategoryBreakdown {
        renda_fixa: field("renda_fixa"),
        fundos_investimento: field("fundos_investimento"),
        renda_variavel: field("renda_variavel"),
        derivativos: field("derivativos"),
        conta_corrente: field("conta_corrente"),
        coe: field("coe"),
    })
}

fn rows<'a>(raw: &'a Value, section: &str) -> impl Iterator<Item = &'a Value> {
    raw.get(section)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .unwrap_or_default()
        .filter(|row| row.is_object())
}

fn raw_kind(row: &Value) -> Option<&str> {
    row.get("type").and_then(Value::as_str)
}

fn ticker_field(row: &Value, key: &str) -> Option<Ticker> {
    let raw = row.get(key)?.as_str()?.trim();
    (!raw.is_empty()).then(|| Ticker::new(raw))
}
