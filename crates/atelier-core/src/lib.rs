//! # atelier-core
//!
//! Core types for the Atelier ceremony orchestrator.
//!
//! A ceremony is one unit of orchestrated work: a dependency graph of tasks
//! that a master weaver hands to the orchestrator, which dispatches eligible
//! tasks to apprentice workers and records every transition in a ledger file.
//!
//! ## Core Paradigm
//!
//! - The ledger file IS the ceremony's source of truth
//! - Task eligibility IS dependency completion (no separate ready queue)
//! - Apprentices are external: dispatch a task, await exactly one outcome
//! - Terminal task states are final (a retry is a new task)

mod config;
mod error;
mod types;

pub use config::AtelierConfig;
pub use error::{AtelierError, Result};
pub use types::*;
