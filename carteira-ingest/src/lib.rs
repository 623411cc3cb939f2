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

//! # Carteira-Ingest
//! LLM-driven ingestion of brokerage documents for the Carteira portfolio engine.
//!
//! A PDF enters as a [`Document`](document::Document); the
//! [`ParseOrchestrator`](orchestrator::ParseOrchestrator) drives an
//! [`LlmProvider`](llm::LlmProvider) call per the registered
//! [`DocumentParser`](parser::DocumentParser), retries missing sections with focused prompts,
//! and emits a normalized [`ParsedStatement`](parsed::ParsedStatement) whose broker-local
//! vocabulary (Portuguese for BTG BR, English for BTG Cayman) has been mapped into the
//! canonical transaction kinds.

use crate::document::DocumentKind;
use thiserror::Error;

/// Safe decimal and date coercion for LLM-extracted values.
pub mod coerce;

/// [`Document`](document::Document) record and parsing lifecycle.
pub mod document;

/// [`LlmProvider`](llm::LlmProvider) abstraction, the Anthropic messages adapter, and JSON
/// fence-fallback extraction.
pub mod llm;

/// Parse-loop orchestration: first pass, focused retries, validation, status transitions.
pub mod orchestrator;

/// Normalized document content: transactions, positions, and the statement sections.
pub mod parsed;

/// [`DocumentParser`](parser::DocumentParser) trait, registry, and the per-broker dialect
/// parsers.
pub mod parser;

/// Errors generated by document ingestion.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum IngestError {
    #[error("llm provider: {0}")]
    Llm(String),

    #[error("document parse failed: {0}")]
    ParseFailed(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("no parser registered for document kind: {0}")]
    UnknownParser(DocumentKind),
}
