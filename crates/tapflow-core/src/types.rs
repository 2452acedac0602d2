//! Validated identifier types and the validation error taxonomy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for token and card identifiers.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Maximum length for a stage name.
pub const MAX_STAGE_LEN: usize = 50;

/// Why a candidate tap was refused before it reached storage.
///
/// These are caller-input problems. They are reported per item and never
/// escalate past the ingestion boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    /// The stage is not part of the configured service-flow vocabulary.
    #[error("unknown stage: {stage}")]
    UnknownStage { stage: String },

    /// An identifier field was empty, too long, or otherwise malformed.
    #[error("malformed {field}: {reason}")]
    MalformedIdentifier {
        field: &'static str,
        reason: String,
    },

    /// The observed timestamp cannot have been produced by a real tap.
    #[error("implausible timestamp {observed_at}: {reason}")]
    ImplausibleTimestamp {
        observed_at: DateTime<Utc>,
        reason: TimestampFault,
    },
}

/// The specific plausibility check a timestamp failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFault {
    /// Beyond the configured clock-skew tolerance into the future.
    InFuture,
    /// Earlier than the session's configured start.
    BeforeSessionStart,
}

impl fmt::Display for TimestampFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InFuture => write!(f, "in the future"),
            Self::BeforeSessionStart => write!(f, "before session start"),
        }
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal, $max_len:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::MalformedIdentifier {
                        field: $field_name,
                        reason: "cannot be empty".to_string(),
                    });
                }
                if id.len() > $max_len {
                    return Err(ValidationError::MalformedIdentifier {
                        field: $field_name,
                        reason: format!("exceeds {} characters", $max_len),
                    });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// The identifier read from a presented card or token.
    ///
    /// Stable per physical card; within a session, the same token presented
    /// at the same stage inside the duplicate window is the same logical tap.
    TokenId, "token ID", MAX_IDENTIFIER_LEN
);

define_string_id!(
    /// The scope within which deduplication and metrics are computed.
    ///
    /// One operational event or day (e.g. `festival-2026-summer`). Records
    /// in different sessions never interact.
    SessionId, "session ID", MAX_IDENTIFIER_LEN
);

/// Hex-encoded hardware UID of a card.
///
/// Secondary dedup/audit key. Normalized to uppercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardUid(String);

impl CardUid {
    /// Creates a new UID after validating it is non-empty hex of bounded length.
    pub fn new(uid: impl Into<String>) -> Result<Self, ValidationError> {
        let uid = uid.into();
        if uid.is_empty() {
            return Err(ValidationError::MalformedIdentifier {
                field: "card UID",
                reason: "cannot be empty".to_string(),
            });
        }
        if uid.len() > MAX_IDENTIFIER_LEN {
            return Err(ValidationError::MalformedIdentifier {
                field: "card UID",
                reason: format!("exceeds {MAX_IDENTIFIER_LEN} characters"),
            });
        }
        if !uid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ValidationError::MalformedIdentifier {
                field: "card UID",
                reason: "must be hex-encoded".to_string(),
            });
        }
        Ok(Self(uid.to_ascii_uppercase()))
    }

    /// Returns the UID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CardUid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CardUid> for String {
    fn from(uid: CardUid) -> Self {
        uid.0
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CardUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
