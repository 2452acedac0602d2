//! Tap event records and their pre-validation wire shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::Stage;
use crate::types::{CardUid, SessionId, TokenId};

/// Which station produced a tap.
///
/// Kept for audit; origin never participates in deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "device", rename_all = "snake_case")]
pub enum Origin {
    /// The fixed station, by device id.
    Station(String),
    /// A named mobile station operating offline.
    Mobile(String),
}

impl Origin {
    /// The device identifier, regardless of station kind.
    pub fn device(&self) -> &str {
        match self {
            Self::Station(device) | Self::Mobile(device) => device,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Station(device) => write!(f, "station:{device}"),
            Self::Mobile(device) => write!(f, "mobile:{device}"),
        }
    }
}

/// Error type for unparseable origin strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOrigin(String);

impl fmt::Display for InvalidOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid origin: {}", self.0)
    }
}

impl std::error::Error for InvalidOrigin {}

impl FromStr for Origin {
    type Err = InvalidOrigin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("station", device)) if !device.is_empty() => {
                Ok(Self::Station(device.to_string()))
            }
            Some(("mobile", device)) if !device.is_empty() => Ok(Self::Mobile(device.to_string())),
            _ => Err(InvalidOrigin(s.to_string())),
        }
    }
}

/// A candidate tap as submitted by a producer, before validation.
///
/// This is the wire shape for both the fixed station and mobile batches.
/// Field aliases accept the camelCase names some producers send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTap {
    #[serde(alias = "tokenId")]
    pub token_id: String,
    #[serde(alias = "serial")]
    pub uid: String,
    pub stage: String,
    #[serde(alias = "sessionId")]
    pub session_id: String,
    pub origin: Origin,
    /// When the physical tap occurred, assigned at the producing station.
    #[serde(alias = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

/// A tap that has passed validation and is ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTap {
    pub token_id: TokenId,
    pub uid: CardUid,
    pub stage: Stage,
    pub session_id: SessionId,
    pub origin: Origin,
    pub observed_at: DateTime<Utc>,
}

/// One persisted tap. Immutable once written.
///
/// `observed_at` orders records for metrics; `received_at` and `seq` break
/// ties, since offline batches arrive out of temporal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapRecord {
    /// Monotonically increasing sequence number assigned at persist time.
    pub seq: i64,
    pub token_id: TokenId,
    pub uid: CardUid,
    pub stage: Stage,
    pub session_id: SessionId,
    pub origin: Origin,
    /// When the physical tap occurred.
    pub observed_at: DateTime<Utc>,
    /// When the store durably persisted the record.
    pub received_at: DateTime<Utc>,
}
