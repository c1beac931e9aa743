//! Scenario files: a seeded cache, one batch mutation and a scripted remote.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use optimist_cache::{CacheEntry, CacheError, CacheKey, Patch, Record, RecordId};
use optimist_mutation::{CoordinatorConfig, MutationError, MutationMode, MutationRequest};

/// Errors loading or preparing a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid seed entry: {0}")]
    Seed(#[from] CacheError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// One cached query result to seed before the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub key: CacheKey,
    pub entry: CacheEntry,
}

/// The batch to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMutation {
    pub resource: String,
    pub ids: Vec<RecordId>,
    pub values: Patch,
    #[serde(default)]
    pub mode: MutationMode,
    /// Undo window; the configured default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl ScenarioMutation {
    pub fn to_request(&self) -> MutationRequest {
        let request = MutationRequest::new(
            self.resource.clone(),
            self.ids.iter().cloned(),
            self.values.clone(),
        )
        .mode(self.mode);
        match self.delay_ms {
            Some(ms) => request.delay(Duration::from_millis(ms)),
            None => request,
        }
    }
}

/// How the simulated remote answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOutcome {
    #[default]
    Success,
    Failure,
}

/// Scripted remote behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteScript {
    pub outcome: RemoteOutcome,
    /// Status code reported on failure.
    pub status: u16,
    /// Message reported on failure; empty falls back to the configured
    /// error template.
    pub message: String,
    pub latency_ms: u64,
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: CoordinatorConfig,
    #[serde(default)]
    pub seed: Vec<SeedEntry>,
    pub mutation: ScenarioMutation,
    #[serde(default)]
    pub remote: RemoteScript,
    /// Undo the batch this long after submitting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_after_ms: Option<u64>,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse a scenario from JSON text.
    pub fn parse(raw: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(raw)?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    /// A small undoable archive of two posts, cancelled halfway through
    /// its window.
    pub fn example() -> Self {
        let post = |id: i64| {
            Record::new(id)
                .with("title", format!("Post {}", id))
                .with("status", "draft")
        };
        Scenario {
            config: CoordinatorConfig::default(),
            seed: vec![
                SeedEntry {
                    key: CacheKey::list("posts", "page=1&perPage=10"),
                    entry: CacheEntry::page(vec![post(1), post(2), post(3)], 3),
                },
                SeedEntry {
                    key: CacheKey::one("posts", 1_i64),
                    entry: CacheEntry::single(post(1)),
                },
            ],
            mutation: ScenarioMutation {
                resource: "posts".to_string(),
                ids: vec![RecordId::Int(1), RecordId::Int(2)],
                values: Patch::new().with("status", "archived"),
                mode: MutationMode::Undoable,
                delay_ms: Some(2000),
            },
            remote: RemoteScript {
                latency_ms: 150,
                ..Default::default()
            },
            cancel_after_ms: Some(1000),
        }
    }
}
