//! Configuration loading and management.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use tapflow_core::dedup::{DEFAULT_WINDOW_SECS, DuplicateWindows};
use tapflow_core::metrics::MetricsConfig;
use tapflow_core::policy::{DEFAULT_CLOCK_SKEW_SECS, IngestPolicy};
use tapflow_core::stage::StageVocabulary;
use tapflow_core::types::ValidationError;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Session taps are recorded into unless overridden per command.
    pub session_id: String,
    /// Identifier reported as this station's origin.
    pub device_id: String,
    /// The stage vocabulary, join stage, and terminal stages.
    pub stages: Vec<String>,
    pub join_stage: String,
    pub terminal_stages: Vec<String>,
    /// Duplicate window in seconds, with optional per-stage overrides.
    pub duplicate_window_secs: u64,
    #[serde(default)]
    pub stage_windows: BTreeMap<String, u64>,
    /// Tolerance for producer clocks running ahead, in seconds.
    pub clock_skew_secs: u64,
    /// Taps observed before this instant are rejected.
    pub session_start: Option<DateTime<Utc>>,
    /// Service points available, for utilization.
    pub max_capacity: u32,
    /// Completed journeys sampled for the wait estimate.
    pub recent_journeys: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("session_id", &self.session_id)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tapflow.db"),
            session_id: "default".to_string(),
            device_id: default_device_id(),
            stages: vec![
                "QUEUE_JOIN".to_string(),
                "SERVICE_START".to_string(),
                "EXIT".to_string(),
            ],
            join_stage: "QUEUE_JOIN".to_string(),
            terminal_stages: vec!["EXIT".to_string()],
            duplicate_window_secs: DEFAULT_WINDOW_SECS,
            stage_windows: BTreeMap::new(),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            session_start: None,
            max_capacity: 10,
            recent_journeys: 20,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TAPFLOW_*)
        figment = figment.merge(Env::prefixed("TAPFLOW_"));

        figment.extract()
    }

    /// The stage vocabulary this deployment accepts.
    pub fn vocabulary(&self) -> Result<StageVocabulary, ValidationError> {
        StageVocabulary::new(&self.stages, &self.join_stage, &self.terminal_stages)
    }

    /// Duplicate windows, per-stage overrides keyed by normalized name.
    pub fn windows(&self) -> DuplicateWindows {
        DuplicateWindows {
            global_secs: self.duplicate_window_secs,
            per_stage_secs: self
                .stage_windows
                .iter()
                .map(|(stage, secs)| (stage.trim().to_ascii_uppercase(), *secs))
                .collect(),
        }
    }

    /// The validation policy applied to every candidate tap.
    pub fn policy(&self) -> Result<IngestPolicy, ValidationError> {
        Ok(IngestPolicy::new(
            self.vocabulary()?,
            Duration::seconds(i64::try_from(self.clock_skew_secs).unwrap_or(i64::MAX)),
            self.session_start,
        ))
    }

    pub const fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            max_capacity: self.max_capacity,
            recent_journeys: self.recent_journeys,
        }
    }
}

/// Returns the platform-specific config directory for tapflow.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tapflow"))
}

/// Returns the platform-specific data directory for tapflow.
///
/// On Linux: `~/.local/share/tapflow`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tapflow"))
}

fn default_device_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "station".to_string())
}
