//! Pre-storage validation of candidate taps.

use chrono::{DateTime, Duration, Utc};

use crate::event::{RawTap, ValidTap};
use crate::stage::StageVocabulary;
use crate::types::{CardUid, SessionId, TimestampFault, TokenId, ValidationError};

/// Default tolerance for producer clocks running ahead, in seconds.
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;

/// The checks every candidate tap passes before it touches storage.
///
/// Checks run in a fixed order (stage vocabulary, identifiers, timestamp
/// plausibility) and the first failure wins.
#[derive(Debug, Clone)]
pub struct IngestPolicy {
    vocabulary: StageVocabulary,
    clock_skew: Duration,
    session_start: Option<DateTime<Utc>>,
}

impl IngestPolicy {
    /// Creates a policy over the given stage vocabulary.
    pub fn new(
        vocabulary: StageVocabulary,
        clock_skew: Duration,
        session_start: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            vocabulary,
            clock_skew,
            session_start,
        }
    }

    /// The stage vocabulary this policy validates against.
    pub const fn vocabulary(&self) -> &StageVocabulary {
        &self.vocabulary
    }

    /// Validates a candidate tap, producing a typed [`ValidTap`].
    pub fn validate(&self, raw: &RawTap, now: DateTime<Utc>) -> Result<ValidTap, ValidationError> {
        let stage = self.vocabulary.resolve(&raw.stage)?;
        let token_id = TokenId::new(raw.token_id.clone())?;
        let uid = CardUid::new(raw.uid.clone())?;
        let session_id = SessionId::new(raw.session_id.clone())?;

        if raw.observed_at > now + self.clock_skew {
            return Err(ValidationError::ImplausibleTimestamp {
                observed_at: raw.observed_at,
                reason: TimestampFault::InFuture,
            });
        }
        if let Some(start) = self.session_start {
            if raw.observed_at < start {
                return Err(ValidationError::ImplausibleTimestamp {
                    observed_at: raw.observed_at,
                    reason: TimestampFault::BeforeSessionStart,
                });
            }
        }

        Ok(ValidTap {
            token_id,
            uid,
            stage,
            session_id,
            origin: raw.origin.clone(),
            observed_at: raw.observed_at,
        })
    }
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self::new(
            StageVocabulary::default(),
            Duration::seconds(i64::try_from(DEFAULT_CLOCK_SKEW_SECS).unwrap_or(60)),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Origin;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn raw_tap() -> RawTap {
        RawTap {
            token_id: "042".to_string(),
            uid: "04A3B2C1".to_string(),
            stage: "QUEUE_JOIN".to_string(),
            session_id: "festival-2026-summer".to_string(),
            origin: Origin::Station("front-desk".to_string()),
            observed_at: at("2026-06-01T12:00:00Z"),
        }
    }

    #[test]
    fn valid_tap_passes() {
        let policy = IngestPolicy::default();
        let valid = policy.validate(&raw_tap(), at("2026-06-01T12:00:05Z")).unwrap();
        assert_eq!(valid.token_id.as_str(), "042");
        assert_eq!(valid.stage.as_str(), "QUEUE_JOIN");
    }

    #[test]
    fn unknown_stage_rejected_first() {
        let policy = IngestPolicy::default();
        let mut raw = raw_tap();
        raw.stage = "TEARDOWN".to_string();
        raw.token_id = String::new(); // also malformed, but stage wins
        let err = policy.validate(&raw, at("2026-06-01T12:00:05Z")).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownStage { .. }));
    }

    #[test]
    fn malformed_token_rejected() {
        let policy = IngestPolicy::default();
        let mut raw = raw_tap();
        raw.token_id = String::new();
        let err = policy.validate(&raw, at("2026-06-01T12:00:05Z")).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedIdentifier { .. }));
    }

    #[test]
    fn future_timestamp_beyond_skew_rejected() {
        let policy = IngestPolicy::default();
        let raw = raw_tap();
        let err = policy.validate(&raw, at("2026-06-01T11:58:00Z")).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ImplausibleTimestamp {
                reason: TimestampFault::InFuture,
                ..
            }
        ));
    }

    #[test]
    fn future_timestamp_within_skew_accepted() {
        let policy = IngestPolicy::default();
        let raw = raw_tap();
        // 30 seconds ahead of the ingesting clock, inside the default skew.
        assert!(policy.validate(&raw, at("2026-06-01T11:59:30Z")).is_ok());
    }

    #[test]
    fn timestamp_before_session_start_rejected() {
        let policy = IngestPolicy::new(
            StageVocabulary::default(),
            Duration::seconds(60),
            Some(at("2026-06-01T13:00:00Z")),
        );
        let raw = raw_tap();
        let err = policy.validate(&raw, at("2026-06-01T14:00:00Z")).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ImplausibleTimestamp {
                reason: TimestampFault::BeforeSessionStart,
                ..
            }
        ));
    }

    #[test]
    fn stage_is_normalized_during_validation() {
        let policy = IngestPolicy::default();
        let mut raw = raw_tap();
        raw.stage = " exit ".to_string();
        let valid = policy.validate(&raw, at("2026-06-01T12:00:05Z")).unwrap();
        assert_eq!(valid.stage.as_str(), "EXIT");
    }
}
