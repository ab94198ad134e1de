use std::path::PathBuf;
use std::time::Duration;

use toonforge_contracts::store::StoreError;

/// Why the provider path produced no image. Every variant is recoverable: the
/// orchestrator turns it into a placeholder plus a diagnostic string.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("No API Key")]
    Unavailable,
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{code} {reason}: {body}")]
    Status {
        code: u16,
        reason: String,
        body: String,
    },
    #[error("No image data. Model generated text instead: {excerpt}")]
    Refusal { excerpt: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A character reference image that could not be attached to the request.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("reference image for character {character_id} unreadable ({}): {source}", .path.display())]
    Unreadable {
        character_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reference image for character {character_id} is not a local file ({pointer})")]
    NotLocal {
        character_id: String,
        pointer: String,
    },
}

/// Failures that abort a generation request. Nothing is persisted when one
/// of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("character lookup failed: {0}")]
    Registry(#[source] StoreError),
    #[error("persisting generation failed: {0}")]
    Persistence(#[source] StoreError),
}
