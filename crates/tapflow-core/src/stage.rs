//! Service-flow stages and the configured stage vocabulary.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{MAX_STAGE_LEN, ValidationError};

/// A point in the service flow a tap represents.
///
/// Stages are tagged values, not free-form strings: the shape is checked
/// here and membership is checked against a [`StageVocabulary`]. Input is
/// trimmed and uppercased, so `" queue_join "` and `QUEUE_JOIN` compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Stage(String);

impl Stage {
    /// Creates a stage after normalization and shape validation.
    pub fn new(stage: impl AsRef<str>) -> Result<Self, ValidationError> {
        let normalized = stage.as_ref().trim().to_ascii_uppercase();
        if normalized.is_empty() || normalized.len() > MAX_STAGE_LEN {
            return Err(ValidationError::UnknownStage { stage: normalized });
        }
        Ok(Self(normalized))
    }

    /// Returns the stage as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Stage {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Stage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The closed set of stages a deployment accepts, validated at startup.
///
/// Which stage opens a queue membership and which stages close one are
/// explicit configuration, never hard-coded string comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVocabulary {
    known: BTreeSet<Stage>,
    join: Stage,
    terminal: BTreeSet<Stage>,
}

impl StageVocabulary {
    /// Builds a vocabulary from configured stage names.
    ///
    /// The join stage and every terminal stage must be members of the known
    /// set; a violation is reported as [`ValidationError::UnknownStage`].
    pub fn new(
        known: impl IntoIterator<Item = impl AsRef<str>>,
        join: impl AsRef<str>,
        terminal: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ValidationError> {
        let known = known
            .into_iter()
            .map(Stage::new)
            .collect::<Result<BTreeSet<_>, _>>()?;
        let join = Stage::new(join)?;
        let terminal = terminal
            .into_iter()
            .map(Stage::new)
            .collect::<Result<BTreeSet<_>, _>>()?;

        if !known.contains(&join) {
            return Err(ValidationError::UnknownStage {
                stage: join.as_str().to_string(),
            });
        }
        if let Some(stage) = terminal.iter().find(|stage| !known.contains(*stage)) {
            return Err(ValidationError::UnknownStage {
                stage: stage.as_str().to_string(),
            });
        }

        Ok(Self {
            known,
            join,
            terminal,
        })
    }

    /// Resolves a raw stage string against the vocabulary.
    pub fn resolve(&self, raw: &str) -> Result<Stage, ValidationError> {
        let stage = Stage::new(raw)?;
        if self.known.contains(&stage) {
            Ok(stage)
        } else {
            Err(ValidationError::UnknownStage {
                stage: stage.as_str().to_string(),
            })
        }
    }

    /// Whether this stage opens a queue membership.
    pub fn is_join(&self, stage: &Stage) -> bool {
        self.join == *stage
    }

    /// Whether this stage closes a queue membership.
    pub fn is_terminal(&self, stage: &Stage) -> bool {
        self.terminal.contains(stage)
    }

    /// The configured join stage.
    pub const fn join_stage(&self) -> &Stage {
        &self.join
    }

    /// The known stages, in sorted order.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.known.iter()
    }
}

impl Default for StageVocabulary {
    /// The standard three-stage flow: `QUEUE_JOIN`, `SERVICE_START`, `EXIT`.
    fn default() -> Self {
        Self::new(["QUEUE_JOIN", "SERVICE_START", "EXIT"], "QUEUE_JOIN", ["EXIT"])
            .expect("default vocabulary is valid")
    }
}
