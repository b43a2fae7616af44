//! Secret domain types
//!
//! The [`Secret`] record is owned by the metadata service; this engine only
//! mutates its lifecycle fields. Key material itself never leaves the
//! backend except as a transient [`SecretString`] payload.
//!
//! ## Lifecycle
//!
//! ```text
//! Preactivation → Activation ⇄ Suspended → Deactivated
//!        any state ──────────────────────→ Destroyed (terminal)
//! ```

use super::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// Maximum payload length in characters
pub const MAX_PAYLOAD_LENGTH: usize = 10_000;
/// Maximum length of name and description (fits an encrypted 255-char column)
pub const MAX_CHAR_LEN_FOR_ENCRYPTED_FIELD: u64 = 230;
/// Minimum length of a searchable field such as the name
pub const MIN_CHAR_LEN_FOR_SEARCHABLE_FIELD: u64 = 2;
/// Maximum number of tags
pub const MAX_TAGS_ALLOWED: u64 = 30;
/// Maximum characters per tag
pub const MAX_CHAR_LEN_FOR_TAGS: usize = 30;
/// Maximum entries in either metadata map
pub const MAX_METADATA_ALLOWED: usize = 30;
/// Maximum characters of a metadata key or value
pub const MAX_CHAR_LEN_FOR_METADATA: usize = 130;
/// Characters disallowed in tags and user metadata keys
pub const RESERVED_CHARACTERS: [char; 5] = ['<', '>', ':', '&', '|'];

const RESERVED_CHARACTER_MESSAGE: &str =
    "contains a reserved character (angled bracket, colon, ampersand, or vertical pipe)";

/// Lifecycle state of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// Material requested but not yet usable
    #[default]
    Preactivation,
    /// Material present and within its validity window
    Activation,
    /// Temporarily withheld
    Suspended,
    /// Past its expiration date
    Deactivated,
    /// Material gone; absorbing state
    Destroyed,
}

impl KeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preactivation => "preactivation",
            Self::Activation => "activation",
            Self::Suspended => "suspended",
            Self::Deactivated => "deactivated",
            Self::Destroyed => "destroyed",
        }
    }

    /// Whether expiration dates are meaningful in this state
    pub fn evaluates_expiration(&self) -> bool {
        matches!(self, Self::Activation | Self::Suspended)
    }
}

impl FromStr for KeyState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preactivation" => Ok(Self::Preactivation),
            "activation" => Ok(Self::Activation),
            "suspended" => Ok(Self::Suspended),
            "deactivated" => Ok(Self::Deactivated),
            "destroyed" => Ok(Self::Destroyed),
            _ => Err(format!("Unknown key state: {}", s)),
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a secret is not (or is) in the active state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonactiveReason {
    KeyActive,
    Expired,
    GenerationFailed,
}

impl NonactiveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyActive => "key_active",
            Self::Expired => "expired",
            Self::GenerationFailed => "generation_failed",
        }
    }
}

impl fmt::Display for NonactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_extractable() -> bool {
    true
}

/// A tenant's secret as tracked by the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Secret {
    /// Issued identifier, empty until the backend has accepted the secret
    #[serde(default)]
    pub id: String,

    #[validate(length(
        min = "MIN_CHAR_LEN_FOR_SEARCHABLE_FIELD",
        max = "MAX_CHAR_LEN_FOR_ENCRYPTED_FIELD",
        message = "Name incorrect length"
    ))]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = "MAX_CHAR_LEN_FOR_ENCRYPTED_FIELD", message = "Description too long"))]
    pub description: Option<String>,

    #[serde(default)]
    #[validate(
        length(max = "MAX_TAGS_ALLOWED", message = "Too many tags"),
        custom(function = "validate_tags")
    )]
    pub tags: Vec<String>,

    /// Key material; held only in memory for the current request
    #[serde(skip)]
    pub payload: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm_type: Option<String>,

    /// Algorithm parameters such as `mode` and `bitLength`
    #[serde(default)]
    #[validate(custom(function = "validate_algorithm_metadata"))]
    pub algorithm_metadata: BTreeMap<String, String>,

    #[serde(default)]
    #[validate(custom(function = "validate_user_metadata"))]
    pub user_metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub activation_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,

    #[serde(default = "default_extractable")]
    pub extractable: bool,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub state: KeyState,

    #[serde(default)]
    pub nonactive_reason: Option<NonactiveReason>,
}

impl Secret {
    /// New secret with the given name and defaults for everything else
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            payload: None,
            algorithm_type: None,
            algorithm_metadata: BTreeMap::new(),
            user_metadata: BTreeMap::new(),
            activation_date: None,
            expiration_date: None,
            creation_date: None,
            extractable: true,
            deleted: false,
            state: KeyState::default(),
            nonactive_reason: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<SecretString>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Whether the request supplied material rather than asking for generation
    pub fn has_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Update state and reason together
    pub fn set_state(&mut self, state: KeyState, reason: Option<NonactiveReason>) {
        self.state = state;
        self.nonactive_reason = reason;
    }

    /// Hide the payload unless it may leave the engine
    pub fn redact_unless_extractable(&mut self) {
        if !self.extractable || self.state != KeyState::Activation {
            self.payload = None;
        }
    }

    /// Name, id and state only; the legacy create/delete response shape
    pub fn summary(&self) -> Secret {
        let mut summary = Secret::new(self.name.trim());
        summary.id = self.id.clone();
        summary.state = self.state;
        summary
    }
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}

fn contains_reserved_character(value: &str) -> bool {
    value.chars().any(|c| RESERVED_CHARACTERS.contains(&c))
}

fn validate_tags(tags: &Vec<String>) -> Result<(), ValidationError> {
    for tag in tags {
        if tag.chars().count() > MAX_CHAR_LEN_FOR_TAGS {
            return Err(invalid("tag_length", "Tag too long".to_string()));
        }
        if contains_reserved_character(tag) {
            return Err(invalid("tag_reserved", format!("Tag {}", RESERVED_CHARACTER_MESSAGE)));
        }
    }
    Ok(())
}

fn validate_metadata_map(
    map: &BTreeMap<String, String>,
    label: &str,
    reject_reserved_keys: bool,
) -> Result<(), ValidationError> {
    if map.len() > MAX_METADATA_ALLOWED {
        return Err(invalid("metadata_count", format!("Too many {} key value pairs", label)));
    }

    for (key, value) in map {
        if key.chars().count() > MAX_CHAR_LEN_FOR_METADATA {
            return Err(invalid("metadata_key_length", format!("{} key too long", label)));
        }
        if reject_reserved_keys && contains_reserved_character(key) {
            return Err(invalid(
                "metadata_key_reserved",
                format!("{} key {}", label, RESERVED_CHARACTER_MESSAGE),
            ));
        }
        if value.chars().count() > MAX_CHAR_LEN_FOR_METADATA {
            return Err(invalid("metadata_value_length", format!("{} value too long", label)));
        }
    }
    Ok(())
}

fn validate_algorithm_metadata(map: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    validate_metadata_map(map, "Algorithm metadata", false)
}

fn validate_user_metadata(map: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    validate_metadata_map(map, "User metadata", true)
}

/// Translation-store row: how an issued identifier maps onto the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRefs {
    pub issued_id: String,
    pub secret_ref: Option<String>,
    pub order_ref: Option<String>,
}

impl BackendRefs {
    /// Row for a secret stored directly from a supplied payload
    pub fn for_secret(secret_ref: impl Into<String>) -> Self {
        Self { issued_id: String::new(), secret_ref: Some(secret_ref.into()), order_ref: None }
    }

    /// Row for a pending generation order
    pub fn for_order(order_ref: impl Into<String>) -> Self {
        Self { issued_id: String::new(), secret_ref: None, order_ref: Some(order_ref.into()) }
    }

    pub fn secret_ref(&self) -> Option<&str> {
        self.secret_ref.as_deref().filter(|r| !r.is_empty())
    }

    pub fn order_ref(&self) -> Option<&str> {
        self.order_ref.as_deref().filter(|r| !r.is_empty())
    }

    /// Both references empty: the row is gone as far as callers are concerned
    pub fn is_empty(&self) -> bool {
        self.secret_ref().is_none() && self.order_ref().is_none()
    }

    /// Only an order exists; material is not yet addressable
    pub fn is_unresolved(&self) -> bool {
        self.secret_ref().is_none() && self.order_ref().is_some()
    }

    /// Whether the material was generated by the backend rather than uploaded
    pub fn is_generated(&self) -> bool {
        self.order_ref().is_some()
    }
}
