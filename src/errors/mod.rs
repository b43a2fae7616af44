//! # Error Handling
//!
//! Error types shared by the ledger, the translation store, the keystore
//! backends and the orchestrator.

pub mod types;

pub use types::{KeywardError, Result};
