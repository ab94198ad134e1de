//! Scene-to-image generation pipeline.
//!
//! [`Studio::generate`] resolves characters, assembles the prompt, calls the
//! image provider once under a hard timeout (or takes the placeholder path),
//! stores the artifact and persists a linked scenario/generation pair.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod fallback;
pub mod prompt;
pub mod provider;
pub mod references;

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};
use toonforge_contracts::characters::{CharacterRegistry, CharacterStore};
use toonforge_contracts::events::{EventPayload, EventWriter};
use toonforge_contracts::models::{ModeSelection, ModeSelector};
use toonforge_contracts::receipts::{build_receipt, write_receipt};
use toonforge_contracts::records::{
    Generation, GenerationOutcome, HistoryEntry, JsonRecordStore, RecordStore, Scenario,
};
use toonforge_contracts::store::StoreError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, StoredArtifact, UploadDir};
use crate::config::EngineConfig;
use crate::fallback::{placeholder_url, PlaceholderKind};
use crate::provider::{GeminiProvider, ImageProvider, ProviderRequest};
use crate::references::ReferenceLoader;

pub use crate::error::{GenerateError, ProviderError, ReferenceError};

/// Inbound request for one generation. Lives for a single `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub scenario_text: String,
    pub character_ids: Vec<String>,
    pub provider_mode: Option<String>,
}

/// Response returned to the caller after a persisted generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(rename = "imageUrl")]
    pub image_reference: String,
    #[serde(rename = "refinedPrompt")]
    pub assembled_prompt: String,
    #[serde(rename = "debugError")]
    pub diagnostic: String,
    #[serde(rename = "generationId")]
    pub generation_id: String,
    #[serde(rename = "scenarioId")]
    pub scenario_id: String,
    #[serde(skip)]
    pub outcome: GenerationOutcome,
}

/// Result of the generate step: a usable image reference either way.
struct Rendered {
    image_reference: String,
    outcome: GenerationOutcome,
    failure: Option<String>,
    artifact: Option<StoredArtifact>,
    provider_request: Option<Map<String, Value>>,
}

pub struct Studio {
    config: EngineConfig,
    characters: Box<dyn CharacterRegistry>,
    records: Box<dyn RecordStore>,
    artifacts: Box<dyn ArtifactStore>,
    provider: Box<dyn ImageProvider>,
    modes: ModeSelector,
    events: EventWriter,
}

impl Studio {
    /// File-backed studio rooted at `config.data_dir()`.
    pub fn open(config: EngineConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config.data_dir())?;
        let characters = CharacterStore::new(config.characters_path());
        let records = JsonRecordStore::new(config.records_path());
        let artifacts = UploadDir::new(config.public_dir());
        let provider = GeminiProvider::new(&config);
        Ok(Self::with_parts(
            config,
            Box::new(characters),
            Box::new(records),
            Box::new(artifacts),
            Box::new(provider),
        ))
    }

    pub fn with_parts(
        config: EngineConfig,
        characters: Box<dyn CharacterRegistry>,
        records: Box<dyn RecordStore>,
        artifacts: Box<dyn ArtifactStore>,
        provider: Box<dyn ImageProvider>,
    ) -> Self {
        let events = EventWriter::new(config.events_path(), "studio");
        Self {
            config,
            characters,
            records,
            artifacts,
            provider,
            modes: ModeSelector::new(None),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one generation end to end.
    ///
    /// Provider, transport and reference-image problems never fail the call;
    /// they end up in `diagnostic`. Only a failing character lookup or record
    /// write returns an error, and then nothing is persisted.
    pub fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerateError> {
        let started = Instant::now();
        let events = self.events.for_session(Uuid::new_v4().to_string());
        let selection = self.modes.select(request.provider_mode.as_deref());
        self.emit(
            &events,
            "generation_started",
            json!({
                "scenario_chars": request.scenario_text.chars().count(),
                "character_ids": request.character_ids,
                "provider_mode": selection.requested,
                "mode_fallback_reason": selection.fallback_reason,
            }),
        );

        let loaded = ReferenceLoader::new(self.characters.as_ref(), self.config.public_dir())
            .load(&request.character_ids)
            .map_err(|err| {
                self.emit(
                    &events,
                    "generation_failed",
                    json!({"stage": "resolve", "error": err.to_string()}),
                );
                GenerateError::Registry(err)
            })?;
        let mut notes: Vec<String> = loaded.issues.iter().map(ToString::to_string).collect();
        self.emit(
            &events,
            "references_resolved",
            json!({
                "resolved": loaded.characters.iter().map(|row| row.id.clone()).collect::<Vec<_>>(),
                "unresolved": loaded.unresolved,
                "images": loaded.images.len(),
                "issues": notes,
            }),
        );

        let assembled = prompt::assemble(&request.scenario_text, &loaded.characters, loaded.images);
        let provider_request = ProviderRequest {
            model: selection
                .model()
                .unwrap_or(self.config.image_model())
                .to_string(),
            prompt: assembled.text.clone(),
            images: assembled.images,
        };

        let rendered = self.render(&events, &selection, &provider_request, &request.scenario_text);
        notes.extend(rendered.failure.clone());
        let diagnostic = notes.join("; ");

        let scenario = Scenario::new(
            request.scenario_text.clone(),
            request.character_ids.first().cloned(),
        );
        let generation = Generation::new(
            &scenario,
            rendered.image_reference.clone(),
            assembled.text.clone(),
            loaded.characters,
            rendered.outcome,
            diagnostic.clone(),
        );

        if let Err(err) = self.records.commit(&scenario, &generation) {
            if let Some(artifact) = rendered.artifact.as_ref() {
                if let Err(discard_err) = self.artifacts.discard(artifact) {
                    warn!(error = %discard_err, "failed to discard orphaned artifact");
                }
            }
            self.emit(
                &events,
                "generation_failed",
                json!({"stage": "persist", "error": err.to_string()}),
            );
            return Err(GenerateError::Persistence(err));
        }

        self.write_receipt(&scenario, &generation, &rendered);
        self.emit(
            &events,
            "generation_persisted",
            json!({
                "generation_id": generation.id,
                "scenario_id": scenario.id,
                "image_url": generation.image_url,
                "outcome": generation.outcome.as_str(),
                "elapsed_ms": started.elapsed().as_millis() as u64,
            }),
        );
        info!(
            generation_id = %generation.id,
            outcome = generation.outcome.as_str(),
            "generation persisted"
        );

        Ok(GenerationResponse {
            success: true,
            image_reference: generation.image_url,
            assembled_prompt: assembled.text,
            diagnostic,
            generation_id: generation.id,
            scenario_id: scenario.id,
            outcome: generation.outcome,
        })
    }

    /// Most recent generations, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        self.records.recent(limit)
    }

    pub fn generation(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError> {
        self.records.generation(id)
    }

    fn render(
        &self,
        events: &EventWriter,
        selection: &ModeSelection,
        request: &ProviderRequest,
        scenario: &str,
    ) -> Rendered {
        if selection.forces_placeholder() {
            return self.fallback(events, PlaceholderKind::Disabled, scenario, None, None);
        }
        if !self.provider.is_configured() {
            let failure = selection
                .selects_provider()
                .then(|| ProviderError::Unavailable.to_string());
            return self.fallback(events, PlaceholderKind::Disabled, scenario, failure, None);
        }

        let described = self.provider.describe_request(request);
        let provider_started = Instant::now();
        let image = match self.provider.generate(request) {
            Ok(image) => image,
            Err(err) => {
                warn!(provider = self.provider.name(), error = %err, "provider failed");
                self.emit(
                    events,
                    "provider_failed",
                    json!({
                        "provider": self.provider.name(),
                        "timeout": err.is_timeout(),
                        "error": err.to_string(),
                        "elapsed_ms": provider_started.elapsed().as_millis() as u64,
                    }),
                );
                return self.fallback(
                    events,
                    PlaceholderKind::Failed,
                    scenario,
                    Some(err.to_string()),
                    Some(described),
                );
            }
        };

        match self.artifacts.store(&image.bytes, &image.media_type) {
            Ok(artifact) => {
                self.emit(
                    events,
                    "artifact_stored",
                    json!({
                        "provider": self.provider.name(),
                        "image_url": artifact.reference,
                        "bytes": artifact.bytes,
                        "sha256": artifact.sha256,
                        "elapsed_ms": provider_started.elapsed().as_millis() as u64,
                    }),
                );
                Rendered {
                    image_reference: artifact.reference.clone(),
                    outcome: GenerationOutcome::Provider,
                    failure: None,
                    artifact: Some(artifact),
                    provider_request: Some(described),
                }
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "artifact store failed");
                self.fallback(
                    events,
                    PlaceholderKind::Failed,
                    scenario,
                    Some(format!("artifact store failed: {err:#}")),
                    Some(described),
                )
            }
        }
    }

    fn fallback(
        &self,
        events: &EventWriter,
        kind: PlaceholderKind,
        scenario: &str,
        failure: Option<String>,
        provider_request: Option<Map<String, Value>>,
    ) -> Rendered {
        let image_reference = placeholder_url(kind, scenario);
        self.emit(
            events,
            "fallback_used",
            json!({
                "outcome": kind.outcome().as_str(),
                "image_url": image_reference,
                "reason": failure,
            }),
        );
        Rendered {
            image_reference,
            outcome: kind.outcome(),
            failure,
            artifact: None,
            provider_request,
        }
    }

    fn write_receipt(&self, scenario: &Scenario, generation: &Generation, rendered: &Rendered) {
        let path = self
            .config
            .receipts_dir()
            .join(format!("{}.json", generation.id));
        let artifact = rendered.artifact.as_ref().map(StoredArtifact::describe);
        let payload = build_receipt(
            scenario,
            generation,
            rendered.provider_request.as_ref(),
            artifact.as_ref(),
        );
        if let Err(err) = write_receipt(&path, &payload) {
            warn!(path = %path.display(), error = %format!("{err:#}"), "failed to write receipt");
        }
    }

    /// Event log writes never fail a generation.
    fn emit(&self, events: &EventWriter, event_type: &str, payload: Value) {
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Err(err) = events.emit(event_type, payload) {
            warn!(event_type, error = %format!("{err:#}"), "failed to append event");
        }
    }
}
