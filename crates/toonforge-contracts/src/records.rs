use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{JsonFile, StoreError};

pub const RECORDS_SCHEMA_VERSION: u64 = 1;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The scene text a user submitted, stored once per generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub content: String,
    pub character_id: Option<String>,
    pub created_at: String,
}

impl Scenario {
    pub fn new(content: impl Into<String>, character_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            character_id,
            created_at: now_utc_iso(),
        }
    }
}

/// How the image reference of a generation was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOutcome {
    Provider,
    FallbackDisabled,
    FallbackFailed,
}

impl GenerationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::FallbackDisabled => "fallback_disabled",
            Self::FallbackFailed => "fallback_failed",
        }
    }
}

/// Character data as it was resolved when the generation ran. Later edits or
/// deletions in the registry do not touch these copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub id: String,
    pub scenario_id: String,
    pub image_url: String,
    pub prompt: String,
    #[serde(default)]
    pub characters: Vec<CharacterSnapshot>,
    pub outcome: GenerationOutcome,
    #[serde(default)]
    pub diagnostic: String,
    pub created_at: String,
}

impl Generation {
    pub fn new(
        scenario: &Scenario,
        image_url: impl Into<String>,
        prompt: impl Into<String>,
        characters: Vec<CharacterSnapshot>,
        outcome: GenerationOutcome,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scenario_id: scenario.id.clone(),
            image_url: image_url.into(),
            prompt: prompt.into(),
            characters,
            outcome,
            diagnostic: diagnostic.into(),
            created_at: now_utc_iso(),
        }
    }
}

/// A generation joined with the scenario it was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub generation: Generation,
    pub scenario: Scenario,
}

/// Durable storage for scenarios and generations.
///
/// `commit` is the only write. It stores a scenario together with its single
/// generation: both land or neither does.
pub trait RecordStore: Send + Sync {
    fn commit(&self, scenario: &Scenario, generation: &Generation) -> Result<(), StoreError>;
    fn scenario(&self, id: &str) -> Result<Option<Scenario>, StoreError>;
    fn generation(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError>;
    /// Newest first, at most `limit` entries.
    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordBook {
    schema_version: u64,
    #[serde(default)]
    scenarios: Vec<Scenario>,
    #[serde(default)]
    generations: Vec<Generation>,
}

impl Default for RecordBook {
    fn default() -> Self {
        Self {
            schema_version: RECORDS_SCHEMA_VERSION,
            scenarios: Vec::new(),
            generations: Vec::new(),
        }
    }
}

impl RecordBook {
    fn join(&self, generation: &Generation) -> Option<HistoryEntry> {
        let scenario = self
            .scenarios
            .iter()
            .find(|row| row.id == generation.scenario_id)?;
        Some(HistoryEntry {
            generation: generation.clone(),
            scenario: scenario.clone(),
        })
    }
}

/// `records.json` backed [`RecordStore`]. Rows are kept in insertion order.
#[derive(Debug)]
pub struct JsonRecordStore {
    file: JsonFile<RecordBook>,
}

impl JsonRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl RecordStore for JsonRecordStore {
    fn commit(&self, scenario: &Scenario, generation: &Generation) -> Result<(), StoreError> {
        if generation.scenario_id != scenario.id {
            return Err(StoreError::Rejected(format!(
                "generation {} links scenario {}, not {}",
                generation.id, generation.scenario_id, scenario.id
            )));
        }
        if generation.image_url.trim().is_empty() {
            return Err(StoreError::Rejected(format!(
                "generation {} has no image reference",
                generation.id
            )));
        }
        self.file.update(|book| {
            if book.scenarios.iter().any(|row| row.id == scenario.id) {
                return Err(StoreError::Rejected(format!(
                    "scenario {} already stored",
                    scenario.id
                )));
            }
            if book.generations.iter().any(|row| row.id == generation.id) {
                return Err(StoreError::Rejected(format!(
                    "generation {} already stored",
                    generation.id
                )));
            }
            book.scenarios.push(scenario.clone());
            book.generations.push(generation.clone());
            Ok(())
        })
    }

    fn scenario(&self, id: &str) -> Result<Option<Scenario>, StoreError> {
        let book = self.file.read()?;
        Ok(book.scenarios.into_iter().find(|row| row.id == id))
    }

    fn generation(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError> {
        let book = self.file.read()?;
        Ok(book
            .generations
            .iter()
            .find(|row| row.id == id)
            .and_then(|row| book.join(row)))
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let book = self.file.read()?;
        Ok(book
            .generations
            .iter()
            .rev()
            .filter_map(|row| book.join(row))
            .take(limit)
            .collect())
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn record(text: &str) -> (Scenario, Generation) {
        let scenario = Scenario::new(text, None);
        let generation = Generation::new(
            &scenario,
            format!("/uploads/{}.png", scenario.id),
            text,
            Vec::new(),
            GenerationOutcome::Provider,
            "",
        );
        (scenario, generation)
    }

    #[test]
    fn commit_links_scenario_and_generation() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonRecordStore::new(temp.path().join("records.json"));
        let (scenario, generation) = record("A hero stands on a cliff at dawn");

        store.commit(&scenario, &generation)?;

        let entry = store
            .generation(&generation.id)?
            .ok_or_else(|| anyhow::anyhow!("generation missing"))?;
        assert_eq!(entry.scenario, scenario);
        assert_eq!(entry.generation.scenario_id, scenario.id);
        assert_eq!(store.scenario(&scenario.id)?, Some(scenario));
        Ok(())
    }

    #[test]
    fn recent_is_newest_first_and_limited() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonRecordStore::new(temp.path().join("records.json"));
        for idx in 0..12 {
            let (scenario, generation) = record(&format!("scene {idx}"));
            store.commit(&scenario, &generation)?;
        }

        let recent = store.recent(DEFAULT_HISTORY_LIMIT)?;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].scenario.content, "scene 11");
        assert_eq!(recent[9].scenario.content, "scene 2");
        Ok(())
    }

    #[test]
    fn mismatched_link_is_rejected_without_writing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonRecordStore::new(temp.path().join("records.json"));
        let (scenario, _) = record("one");
        let (_, other_generation) = record("two");

        let result = store.commit(&scenario, &other_generation);
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(store.recent(10)?.is_empty());
        assert_eq!(store.scenario(&scenario.id)?, None);
        Ok(())
    }

    #[test]
    fn empty_image_reference_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonRecordStore::new(temp.path().join("records.json"));
        let (scenario, mut generation) = record("blank");
        generation.image_url = "  ".to_string();

        assert!(store.commit(&scenario, &generation).is_err());
        assert!(store.recent(10)?.is_empty());
        Ok(())
    }

    #[test]
    fn history_entry_serializes_with_nested_scenario() -> anyhow::Result<()> {
        let (scenario, generation) = record("rain");
        let entry = HistoryEntry {
            generation,
            scenario,
        };
        let value = serde_json::to_value(&entry)?;
        assert!(value.get("imageUrl").and_then(Value::as_str).is_some());
        assert_eq!(value["outcome"], "provider");
        assert_eq!(value["scenario"]["content"], "rain");
        assert_eq!(value["scenario"]["characterId"], Value::Null);
        Ok(())
    }
}
