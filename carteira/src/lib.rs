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

//! # Carteira
//! Personal investment portfolio engine.
//!
//! Carteira reconciles a time-ordered transaction ledger against brokerage statements to
//! produce a canonical view of a multi-account, multi-currency portfolio:
//!
//! * **Position replay** ([`position::replay`]) - a deterministic netting state machine over
//!   the transaction log, producing at most one open position per (account, asset) and a
//!   stream of realized-P&L events, with long/short flips splitting a single trade into two
//!   ledger effects.
//! * **P&L** ([`pnl`]) - realized summaries computed by re-running replay, and unrealized
//!   aggregation joining open positions with latest prices.
//! * **NAV & quota engine** ([`fund`]) - daily NAV across currencies via dated FX rates, a
//!   personal fund-share ledger with issuance/redemption against the previous day's share
//!   value, and performance metrics (MTD/YTD/1Y, max drawdown, annualized volatility).
//! * **Snapshots** ([`snapshot`]) - daily consolidated and per-account portfolio totals with
//!   category breakdown.
//! * **Reconciliation** ([`reconcile`]) - a new statement is the source of truth for its
//!   account: positions are created, updated, or closed against the store, emitting a
//!   realized trade for every position that disappeared.
//! * **Commit** ([`commit`]) - applies one parsed document to the ledger as a logical unit.
//!
//! Storage is behind the [`store`] traits; [`store::memory::InMemoryStore`] backs the test
//! suite and proof-of-concept deployments.

/// Commit of a parsed document into the ledger.
pub mod commit;

/// Engine configuration with named options and defaults.
pub mod config;

/// Engine error types.
pub mod error;

/// NAV computation and the fund-share (quota) ledger.
pub mod fund;

/// Statement-sourced fixed-income and investment-fund holdings.
pub mod holdings;

/// Immutable journal entries: transactions and cash flows.
pub mod ledger;

/// Structured logging initialisers.
pub mod logging;

/// Realized & unrealized P&L aggregation.
pub mod pnl;

/// Open positions and the replay state machine.
pub mod position;

/// Statement reconciliation.
pub mod reconcile;

/// Periodic job entry points (quote sync, NAV, snapshots).
pub mod scheduler;

/// Daily portfolio snapshot materialisation.
pub mod snapshot;

/// Repository traits and the in-memory store.
pub mod store;

/// Permanent records of closed quantities.
pub mod trade;

pub use config::CarteiraConfig;
pub use error::CarteiraError;
