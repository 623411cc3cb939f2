use crate::{
    document::{Document, ParsingStatus},
    llm::{extract_json, LlmProvider},
    parsed::ParsedStatement,
    parser::{missing_sections, DocumentParser, ParserRegistry},
    IngestError,
};
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Result of a successful document parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// The merged raw extraction, as stored on the document.
    pub raw: Value,
    /// The normalized statement content.
    pub statement: ParsedStatement,
    /// Sections that stayed empty after focused retries.
    pub unrecovered_sections: Vec<String>,
}

/// Drives the parse loop for a [`Document`]: first full-template pass, detection of missing
/// sections, focused retries for the parser's recoverable sections, fragment merge, and
/// validation. Status transitions are applied to the document in place.
#[derive(Debug)]
pub struct ParseOrchestrator<Llm> {
    llm: Llm,
    registry: ParserRegistry,
    max_tokens: u32,
}

impl<Llm> ParseOrchestrator<Llm>
where
    Llm: LlmProvider,
{
    pub fn new(llm: Llm) -> Self {
        Self {
            llm,
            registry: ParserRegistry::with_defaults(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Parse `pdf` for `document`, leaving the document COMPLETED with its extraction, or
    /// FAILED with the reason. A COMPLETED or PROCESSING document is rejected up front.
    pub async fn parse(
        &self,
        document: &mut Document,
        pdf: &[u8],
    ) -> Result<ParseOutcome, IngestError> {
        if !document.can_parse() {
            return Err(IngestError::Validation(format!(
                "document {} is {:?} and cannot be parsed",
                document.id, document.parsing_status
            )));
        }

        let parser = self
            .registry
            .get(document.kind)
            .ok_or(IngestError::UnknownParser(document.kind))?;

        info!(
            document_id = %document.id,
            kind = %document.kind,
            pdf_size = pdf.len(),
            "document parse started"
        );

        document.parsing_status = ParsingStatus::Processing;
        document.parsing_error = None;

        match self.run(parser, pdf).await {
            Ok(outcome) => {
                document.parsing_status = ParsingStatus::Completed;
                document.parsed_at = Some(Utc::now());
                document.raw_extracted_data = Some(outcome.raw.clone());

                info!(
                    document_id = %document.id,
                    transactions = outcome.statement.transactions.len(),
                    cash_movements = outcome.statement.cash_movements.len(),
                    stock_positions = outcome.statement.stock_positions.len(),
                    "document parse complete"
                );

                Ok(outcome)
            }
            Err(error) => {
                document.parsing_status = ParsingStatus::Failed;
                document.parsing_error = Some(error.to_string());
                document.parsed_at = Some(Utc::now());

                warn!(document_id = %document.id, %error, "document parse failed");
                Err(error)
            }
        }
    }

    /// [`Self::parse`] bounded by a deadline. On expiry the document is left FAILED with
    /// reason "cancelled".
    pub async fn parse_with_deadline(
        &self,
        document: &mut Document,
        pdf: &[u8],
        deadline: Duration,
    ) -> Result<ParseOutcome, IngestError> {
        match tokio::time::timeout(deadline, self.parse(document, pdf)).await {
            Ok(result) => result,
            Err(_) => {
                document.parsing_status = ParsingStatus::Failed;
                document.parsing_error = Some("cancelled".to_string());
                document.parsed_at = Some(Utc::now());
                Err(IngestError::ParseFailed("cancelled".to_string()))
            }
        }
    }

    async fn run(
        &self,
        parser: &dyn DocumentParser,
        pdf: &[u8],
    ) -> Result<ParseOutcome, IngestError> {
        // First pass with the full template
        let response = self
            .llm
            .extract(pdf, parser.prompt_template(), self.max_tokens)
            .await?;
        let mut raw = extract_json(&response)?;

        // Focused retries for recoverable sections the first pass left empty
        let missing = missing_sections(&raw, parser.required_sections());
        let mut unrecovered = Vec::new();

        for section in missing {
            let Some(prompt) = parser.focused_prompt(&section) else {
                unrecovered.push(section);
                continue;
            };

            info!(section, "retrying missing section with focused prompt");

            match self.retry_section(pdf, &section, &prompt).await {
                Some(fragment) => merge_fragment(&mut raw, &section, fragment),
                None => unrecovered.push(section),
            }
        }

        parser
            .validate(&raw)
            .map_err(|reason| IngestError::ParseFailed(format!("validation failed: {reason}")))?;

        let statement = parser.extract_statement(&raw);

        Ok(ParseOutcome {
            raw,
            statement,
            unrecovered_sections: unrecovered,
        })
    }

    async fn retry_section(&self, pdf: &[u8], section: &str, prompt: &str) -> Option<Value> {
        let response = match self.llm.extract(pdf, prompt, self.max_tokens).await {
            Ok(response) => response,
            Err(error) => {
                warn!(section, %error, "focused retry call failed");
                return None;
            }
        };

        match extract_json(&response) {
            Ok(fragment) => Some(fragment),
            Err(error) => {
                warn!(section, %error, "focused retry returned unparseable output");
                None
            }
        }
    }
}

/// Merge a focused-retry fragment into the original extraction.
///
/// The fragment is expected to be `{"<section>": ...}`; a bare value is accepted and placed
/// under the section key.
fn merge_fragment(raw: &mut Value, section: &str, fragment: Value) {
    let value = match fragment {
        Value::Object(mut fields) if fields.contains_key(section) => {
            fields.remove(section).unwrap_or(Value::Null)
        }
        other => other,
    };

    if value.is_null() {
        return;
    }

    if let Value::Object(fields) = raw {
        fields.insert(section.to_string(), value);
    }
}
