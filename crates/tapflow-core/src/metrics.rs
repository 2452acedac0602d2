//! Queue-state metrics derived from the event log.
//!
//! Everything here is a pure function of a record slice ordered by
//! `observed_at` (with `received_at`/`seq` as tie-break), so results are
//! always indistinguishable from a full recompute over current store state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TapRecord;
use crate::stage::StageVocabulary;
use crate::types::TokenId;

/// Knobs for metric derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Estimated maximum queue capacity, for utilization.
    pub max_capacity: u32,
    /// How many recent completed journeys feed the wait estimate.
    pub recent_journeys: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10,
            recent_journeys: 20,
        }
    }
}

/// A token currently between its join stage and a terminal stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub token_id: TokenId,
    pub joined_at: DateTime<Utc>,
    /// 1-based rank by join time among currently-queued tokens.
    pub position: usize,
}

/// One completed pass through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Journey {
    pub token_id: TokenId,
    pub joined_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl Journey {
    /// Service duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.completed_at - self.joined_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Coarse operational assessment of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueHealth {
    Good,
    Moderate,
    Warning,
    Critical,
}

/// Live metrics for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetrics {
    pub queue_length: usize,
    /// Wait estimate for a new arrival; `None` until a journey completes.
    pub estimated_wait_seconds: Option<f64>,
    /// Mean service duration over the recent-journey sample.
    pub average_service_seconds: Option<f64>,
    /// Unclamped; above 100 is a meaningful overload signal.
    pub capacity_utilization_percent: f64,
    /// Age of the oldest unserved join.
    pub longest_wait_seconds: Option<i64>,
    pub queue_health: QueueHealth,
}

impl SessionMetrics {
    /// Utilization clamped to the 0–200% display range.
    pub fn display_utilization_percent(&self) -> f64 {
        self.capacity_utilization_percent.clamp(0.0, 200.0)
    }
}

/// Where a token currently stands in the service flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenStatus {
    /// No record of this token in the session.
    NotSeen,
    /// Joined and not yet through a terminal stage.
    InQueue {
        joined_at: DateTime<Utc>,
        position: usize,
        estimated_wait_seconds: Option<f64>,
    },
    /// Most recent journey is complete.
    Completed {
        joined_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        wait_seconds: f64,
    },
}

/// Folds the ordered log into open memberships and completed journeys.
///
/// A terminal stage closes the most recent open join for that token; a token
/// may re-enter after exiting, so only the latest join/terminal pair per
/// token determines current membership.
fn fold_journeys(
    records: &[TapRecord],
    vocabulary: &StageVocabulary,
) -> (Vec<(TokenId, DateTime<Utc>)>, Vec<Journey>) {
    let mut open: Vec<(TokenId, DateTime<Utc>)> = Vec::new();
    let mut completed: Vec<Journey> = Vec::new();

    for record in records {
        if vocabulary.is_join(&record.stage) {
            match open.iter_mut().find(|(token, _)| *token == record.token_id) {
                // Re-join while already queued restarts the membership.
                Some(entry) => entry.1 = record.observed_at,
                None => open.push((record.token_id.clone(), record.observed_at)),
            }
        } else if vocabulary.is_terminal(&record.stage) {
            if let Some(index) = open
                .iter()
                .position(|(token, _)| *token == record.token_id)
            {
                let (token_id, joined_at) = open.swap_remove(index);
                completed.push(Journey {
                    token_id,
                    joined_at,
                    completed_at: record.observed_at,
                });
            }
            // A terminal tap without an open join is ignored for membership.
        }
    }

    (open, completed)
}

/// Tokens currently in the queue, ranked by join time.
pub fn queue_entries(records: &[TapRecord], vocabulary: &StageVocabulary) -> Vec<QueueEntry> {
    let (mut open, _) = fold_journeys(records, vocabulary);
    open.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    open.into_iter()
        .enumerate()
        .map(|(index, (token_id, joined_at))| QueueEntry {
            token_id,
            joined_at,
            position: index + 1,
        })
        .collect()
}

/// Completed journeys in completion order.
pub fn completed_journeys(records: &[TapRecord], vocabulary: &StageVocabulary) -> Vec<Journey> {
    let (_, mut completed) = fold_journeys(records, vocabulary);
    completed.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
    completed
}

/// Mean service duration over the most recent `sample` completed journeys.
///
/// Averages over however many exist when fewer than `sample` are available.
/// Returns `None` with zero journeys; there is no fallback constant.
pub fn average_service_seconds(journeys: &[Journey], sample: usize) -> Option<f64> {
    if journeys.is_empty() || sample == 0 {
        return None;
    }
    let recent = &journeys[journeys.len().saturating_sub(sample)..];
    let total: f64 = recent.iter().map(Journey::duration_seconds).sum();
    Some(total / recent.len() as f64)
}

/// Wait estimate for a caller at the given 1-based queue position.
pub fn estimated_wait_seconds(average_service_seconds: f64, position: usize) -> f64 {
    average_service_seconds * position as f64
}

/// Queue length relative to capacity, as an unclamped percentage.
pub fn utilization_percent(queue_length: usize, max_capacity: u32) -> f64 {
    if max_capacity == 0 {
        return 0.0;
    }
    queue_length as f64 / f64::from(max_capacity) * 100.0
}

/// Thresholds match the operational dashboard: queue depth 5/10/20 people,
/// longest wait 30/45/90 minutes.
fn assess_health(queue_length: usize, longest_wait_seconds: Option<i64>) -> QueueHealth {
    let longest_min = longest_wait_seconds.unwrap_or(0) / 60;
    if queue_length > 20 || longest_min > 90 {
        QueueHealth::Critical
    } else if queue_length > 10 || longest_min > 45 {
        QueueHealth::Warning
    } else if queue_length > 5 || longest_min > 30 {
        QueueHealth::Moderate
    } else {
        QueueHealth::Good
    }
}

/// Derives all session metrics from the ordered log.
///
/// The wait estimate is computed for a new arrival, i.e. queue position
/// `queue_length + 1`.
pub fn session_metrics(
    records: &[TapRecord],
    vocabulary: &StageVocabulary,
    config: &MetricsConfig,
    now: DateTime<Utc>,
) -> SessionMetrics {
    let entries = queue_entries(records, vocabulary);
    let journeys = completed_journeys(records, vocabulary);

    let queue_length = entries.len();
    let average = average_service_seconds(&journeys, config.recent_journeys);
    let estimated =
        average.map(|avg| estimated_wait_seconds(avg, queue_length + 1));
    let longest_wait_seconds = entries
        .first()
        .map(|entry| (now - entry.joined_at).num_seconds());

    SessionMetrics {
        queue_length,
        estimated_wait_seconds: estimated,
        average_service_seconds: average,
        capacity_utilization_percent: utilization_percent(queue_length, config.max_capacity),
        longest_wait_seconds,
        queue_health: assess_health(queue_length, longest_wait_seconds),
    }
}

/// Where one token stands: queued, completed, or never seen.
pub fn token_status(
    records: &[TapRecord],
    vocabulary: &StageVocabulary,
    token_id: &TokenId,
    config: &MetricsConfig,
) -> TokenStatus {
    let entries = queue_entries(records, vocabulary);
    if let Some(entry) = entries.iter().find(|entry| entry.token_id == *token_id) {
        let journeys = completed_journeys(records, vocabulary);
        let average = average_service_seconds(&journeys, config.recent_journeys);
        return TokenStatus::InQueue {
            joined_at: entry.joined_at,
            position: entry.position,
            estimated_wait_seconds: average
                .map(|avg| estimated_wait_seconds(avg, entry.position)),
        };
    }

    let journeys = completed_journeys(records, vocabulary);
    journeys
        .iter()
        .filter(|journey| journey.token_id == *token_id)
        .next_back()
        .map_or(TokenStatus::NotSeen, |journey| TokenStatus::Completed {
            joined_at: journey.joined_at,
            completed_at: journey.completed_at,
            wait_seconds: journey.duration_seconds(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Origin;
    use crate::stage::Stage;
    use crate::types::{CardUid, SessionId};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn record(seq: i64, token: &str, stage: &str, observed_at: &str) -> TapRecord {
        TapRecord {
            seq,
            token_id: TokenId::new(token).unwrap(),
            uid: CardUid::new("04A3B2C1").unwrap(),
            stage: Stage::new(stage).unwrap(),
            session_id: SessionId::new("festival-2026-summer").unwrap(),
            origin: Origin::Station("front-desk".to_string()),
            observed_at: at(observed_at),
            received_at: at(observed_at),
        }
    }

    #[test]
    fn queue_length_counts_unserved_joins() {
        let records = vec![
            record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
            record(2, "B", "QUEUE_JOIN", "2026-06-01T12:01:00Z"),
            record(3, "A", "EXIT", "2026-06-01T12:05:00Z"),
        ];
        let entries = queue_entries(&records, &StageVocabulary::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token_id.as_str(), "B");
        assert_eq!(entries[0].position, 1);
    }

    #[test]
    fn token_may_re_enter_after_exit() {
        let records = vec![
            record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
            record(2, "A", "EXIT", "2026-06-01T12:05:00Z"),
            record(3, "A", "QUEUE_JOIN", "2026-06-01T13:00:00Z"),
        ];
        let vocab = StageVocabulary::default();
        let entries = queue_entries(&records, &vocab);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].joined_at, at("2026-06-01T13:00:00Z"));

        let journeys = completed_journeys(&records, &vocab);
        assert_eq!(journeys.len(), 1);
    }

    #[test]
    fn intermediate_stage_does_not_close_membership() {
        let records = vec![
            record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
            record(2, "A", "SERVICE_START", "2026-06-01T12:10:00Z"),
        ];
        let entries = queue_entries(&records, &StageVocabulary::default());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn positions_rank_by_join_time() {
        let records = vec![
            record(1, "B", "QUEUE_JOIN", "2026-06-01T12:01:00Z"),
            record(2, "C", "QUEUE_JOIN", "2026-06-01T12:02:00Z"),
            record(3, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
        ];
        // Input slice ordering does not matter; join time does.
        let entries = queue_entries(&records, &StageVocabulary::default());
        let tokens: Vec<&str> = entries.iter().map(|e| e.token_id.as_str()).collect();
        assert_eq!(tokens, vec!["A", "B", "C"]);
        assert_eq!(entries[2].position, 3);
    }

    #[test]
    fn wait_estimate_scales_with_position() {
        let vocab = StageVocabulary::default();
        let records = vec![
            record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
            record(2, "A", "EXIT", "2026-06-01T12:01:00Z"), // 60s
            record(3, "B", "QUEUE_JOIN", "2026-06-01T12:02:00Z"),
            record(4, "B", "EXIT", "2026-06-01T12:04:00Z"), // 120s
            record(5, "C", "QUEUE_JOIN", "2026-06-01T12:05:00Z"),
            record(6, "C", "EXIT", "2026-06-01T12:08:00Z"), // 180s
        ];
        let journeys = completed_journeys(&records, &vocab);
        let average = average_service_seconds(&journeys, 20).unwrap();
        assert!((average - 120.0).abs() < f64::EPSILON);
        assert!((estimated_wait_seconds(average, 2) - 240.0).abs() < f64::EPSILON);
    }

    #[test]
    fn wait_estimate_uses_most_recent_sample() {
        let vocab = StageVocabulary::default();
        let mut records = Vec::new();
        // Ten 60-second journeys followed by two 300-second ones.
        for i in 0..10 {
            let join = format!("2026-06-01T0{i}:00:00Z");
            let exit = format!("2026-06-01T0{i}:01:00Z");
            records.push(record(i64::from(i) * 2 + 1, &format!("T{i}"), "QUEUE_JOIN", &join));
            records.push(record(i64::from(i) * 2 + 2, &format!("T{i}"), "EXIT", &exit));
        }
        records.push(record(21, "S1", "QUEUE_JOIN", "2026-06-01T10:00:00Z"));
        records.push(record(22, "S1", "EXIT", "2026-06-01T10:05:00Z"));
        records.push(record(23, "S2", "QUEUE_JOIN", "2026-06-01T11:00:00Z"));
        records.push(record(24, "S2", "EXIT", "2026-06-01T11:05:00Z"));

        let journeys = completed_journeys(&records, &vocab);
        let average = average_service_seconds(&journeys, 2).unwrap();
        assert!((average - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_completed_journeys_means_no_estimate() {
        let vocab = StageVocabulary::default();
        let records = vec![record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z")];
        let metrics = session_metrics(
            &records,
            &vocab,
            &MetricsConfig::default(),
            at("2026-06-01T12:10:00Z"),
        );
        assert_eq!(metrics.estimated_wait_seconds, None);
        assert_eq!(metrics.average_service_seconds, None);
    }

    #[test]
    fn utilization_is_not_clamped_internally() {
        let config = MetricsConfig {
            max_capacity: 10,
            recent_journeys: 20,
        };
        let mut records = Vec::new();
        for i in 0..12 {
            records.push(record(
                i + 1,
                &format!("T{i}"),
                "QUEUE_JOIN",
                "2026-06-01T12:00:00Z",
            ));
        }
        let metrics = session_metrics(
            &records,
            &StageVocabulary::default(),
            &config,
            at("2026-06-01T12:30:00Z"),
        );
        assert!((metrics.capacity_utilization_percent - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn display_utilization_clamps_to_range() {
        let metrics = SessionMetrics {
            queue_length: 30,
            estimated_wait_seconds: None,
            average_service_seconds: None,
            capacity_utilization_percent: 300.0,
            longest_wait_seconds: None,
            queue_health: QueueHealth::Critical,
        };
        assert!((metrics.display_utilization_percent() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn longest_wait_is_oldest_open_join() {
        let records = vec![
            record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
            record(2, "B", "QUEUE_JOIN", "2026-06-01T12:20:00Z"),
        ];
        let metrics = session_metrics(
            &records,
            &StageVocabulary::default(),
            &MetricsConfig::default(),
            at("2026-06-01T12:30:00Z"),
        );
        assert_eq!(metrics.longest_wait_seconds, Some(1800));
    }

    #[test]
    fn health_degrades_with_depth_and_wait() {
        assert_eq!(assess_health(3, Some(60)), QueueHealth::Good);
        assert_eq!(assess_health(6, Some(60)), QueueHealth::Moderate);
        assert_eq!(assess_health(3, Some(40 * 60)), QueueHealth::Moderate);
        assert_eq!(assess_health(11, None), QueueHealth::Warning);
        assert_eq!(assess_health(21, None), QueueHealth::Critical);
        assert_eq!(assess_health(1, Some(100 * 60)), QueueHealth::Critical);
    }

    #[test]
    fn token_status_reports_queue_position_and_estimate() {
        let records = vec![
            record(1, "A", "QUEUE_JOIN", "2026-06-01T12:00:00Z"),
            record(2, "A", "EXIT", "2026-06-01T12:01:00Z"),
            record(3, "B", "QUEUE_JOIN", "2026-06-01T12:02:00Z"),
            record(4, "C", "QUEUE_JOIN", "2026-06-01T12:03:00Z"),
        ];
        let vocab = StageVocabulary::default();
        let config = MetricsConfig::default();

        let status = token_status(&records, &vocab, &TokenId::new("C").unwrap(), &config);
        match status {
            TokenStatus::InQueue {
                position,
                estimated_wait_seconds,
                ..
            } => {
                assert_eq!(position, 2);
                // One completed 60s journey, position 2.
                assert!((estimated_wait_seconds.unwrap() - 120.0).abs() < f64::EPSILON);
            }
            other => panic!("expected InQueue, got {other:?}"),
        }

        let status = token_status(&records, &vocab, &TokenId::new("A").unwrap(), &config);
        match status {
            TokenStatus::Completed { wait_seconds, .. } => {
                assert!((wait_seconds - 60.0).abs() < f64::EPSILON);
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        let status = token_status(&records, &vocab, &TokenId::new("Z").unwrap(), &config);
        assert_eq!(status, TokenStatus::NotSeen);
    }
}
