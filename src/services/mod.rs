//! Business logic services
//!
//! The orchestrator that composes the key-material backend, the metadata
//! service and the lifecycle state machine into request-level operations.

pub mod secret_service;

pub use secret_service::{CreateSecretRequest, SecretService};
