//! Domain layer
//!
//! Pure types shared by every layer of the engine. Nothing in here performs
//! I/O.
//!
//! ## Module Organization
//!
//! - `secret`: the secret record, lifecycle states and backend references
//! - `secret_string`: redacting wrapper for payloads and credentials
//! - `tenant`: tenant scope and per-request context

pub mod secret;
pub mod secret_string;
pub mod tenant;

pub use secret::{
    BackendRefs, KeyState, NonactiveReason, Secret, MAX_CHAR_LEN_FOR_ENCRYPTED_FIELD,
    MAX_CHAR_LEN_FOR_METADATA, MAX_CHAR_LEN_FOR_TAGS, MAX_METADATA_ALLOWED, MAX_PAYLOAD_LENGTH,
    MAX_TAGS_ALLOWED, MIN_CHAR_LEN_FOR_SEARCHABLE_FIELD, RESERVED_CHARACTERS,
};
pub use secret_string::SecretString;
pub use tenant::{RequestContext, TenantContext};
