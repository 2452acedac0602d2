//! The duplicate-window predicate and its configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Default duplicate window in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 30;

/// How close two taps of the same token+stage+session must be to count as
/// one logical tap.
///
/// The window is a deduplication-sensitivity knob, not a hard real-time
/// constraint: a short window absorbs double-taps, a long one absorbs a
/// minutes-later re-presentation. Per-stage overrides take precedence over
/// the global window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateWindows {
    /// Window applied to any stage without an override, in seconds.
    pub global_secs: u64,
    /// Per-stage overrides, keyed by normalized stage name.
    #[serde(default)]
    pub per_stage_secs: BTreeMap<String, u64>,
}

impl Default for DuplicateWindows {
    fn default() -> Self {
        Self {
            global_secs: DEFAULT_WINDOW_SECS,
            per_stage_secs: BTreeMap::new(),
        }
    }
}

impl DuplicateWindows {
    /// The window that applies to the given stage.
    pub fn window_for(&self, stage: &Stage) -> Duration {
        let secs = self
            .per_stage_secs
            .get(stage.as_str())
            .copied()
            .unwrap_or(self.global_secs);
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

/// Whether two observations of the same token+stage+session are the same
/// logical tap.
///
/// Symmetric: an out-of-order sync can deliver the earlier observation
/// second, and it must still collapse onto the retained record.
pub fn is_duplicate(
    existing: DateTime<Utc>,
    candidate: DateTime<Utc>,
    window: Duration,
) -> bool {
    (candidate - existing).abs() <= window
}
