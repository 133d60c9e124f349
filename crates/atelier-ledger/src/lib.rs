//! # atelier-ledger
//!
//! Bidirectional mapping between a [`CeremonySession`] and its ledger file,
//! plus the durable store that writes ledgers atomically.
//!
//! The ledger is a markdown document that is both machine-parseable and
//! readable without tooling. Rendering is deterministic: identical session
//! state always produces byte-identical output. Parsing never fails; damaged
//! or truncated input yields a partial result and unreadable task records are
//! dropped individually.
//!
//! [`CeremonySession`]: atelier_core::CeremonySession

mod codec;
mod store;

pub use codec::{parse, render, LedgerMetadata, ParsedLedger};
pub use store::{ledger_filename, load_ledger, write_ledger};
