use url::form_urlencoded;

use toonforge_contracts::records::GenerationOutcome;

const PLACEHOLDER_BASE: &str = "https://placehold.co/1024x1024";
const LABEL_SOURCE_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// No provider was attempted.
    Disabled,
    /// The provider was attempted and produced nothing usable.
    Failed,
}

impl PlaceholderKind {
    fn colors(self) -> (&'static str, &'static str) {
        match self {
            Self::Disabled => ("18181b", "facc15"),
            Self::Failed => ("facc15", "18181b"),
        }
    }

    fn label_prefix(self) -> &'static str {
        match self {
            Self::Disabled => "Webtoon: ",
            Self::Failed => "Fallback: ",
        }
    }

    pub fn outcome(self) -> GenerationOutcome {
        match self {
            Self::Disabled => GenerationOutcome::FallbackDisabled,
            Self::Failed => GenerationOutcome::FallbackFailed,
        }
    }
}

/// Placeholder image URL labelled with the start of the scenario.
pub fn placeholder_url(kind: PlaceholderKind, scenario: &str) -> String {
    let excerpt: String = scenario.chars().take(LABEL_SOURCE_CHARS).collect();
    let label = format!("{}{excerpt}", kind.label_prefix());
    let encoded: String = form_urlencoded::byte_serialize(label.as_bytes()).collect();
    let (background, foreground) = kind.colors();
    format!("{PLACEHOLDER_BASE}/{background}/{foreground}/png?text={encoded}")
}
