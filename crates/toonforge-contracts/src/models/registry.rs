use indexmap::IndexMap;

pub const PLACEHOLDER_PROVIDER: &str = "placeholder";

/// A provider mode the caller can ask for by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSpec {
    pub name: String,
    pub provider: String,
    /// Provider-side model id. `None` for placeholder-only modes.
    pub model: Option<String>,
}

impl ModeSpec {
    pub fn is_placeholder(&self) -> bool {
        self.provider == PLACEHOLDER_PROVIDER
    }
}

#[derive(Debug, Clone)]
pub struct ModeRegistry {
    modes: IndexMap<String, ModeSpec>,
}

impl ModeRegistry {
    pub fn new(modes: Option<IndexMap<String, ModeSpec>>) -> Self {
        Self {
            modes: modes.unwrap_or_else(default_modes),
        }
    }

    /// Case-insensitive lookup on the mode name.
    pub fn get(&self, name: &str) -> Option<&ModeSpec> {
        let key = name.trim().to_ascii_lowercase();
        self.modes.get(&key)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModeSpec> {
        self.modes.values()
    }
}

fn default_modes() -> IndexMap<String, ModeSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, model: Option<&str>| {
        map.insert(
            name.to_string(),
            ModeSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                model: model.map(str::to_string),
            },
        );
    };

    insert("nano-banana", "gemini", Some("gemini-3-pro-image-preview"));
    insert(
        "gemini-3-pro-image-preview",
        "gemini",
        Some("gemini-3-pro-image-preview"),
    );
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        Some("gemini-2.5-flash-image"),
    );
    insert("mock", PLACEHOLDER_PROVIDER, None);

    map
}
