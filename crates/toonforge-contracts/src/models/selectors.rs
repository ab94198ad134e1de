use super::registry::{ModeRegistry, ModeSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSelection {
    /// `None` when the caller asked for nothing usable.
    pub mode: Option<ModeSpec>,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

impl ModeSelection {
    /// The caller explicitly picked a real provider.
    pub fn selects_provider(&self) -> bool {
        self.mode
            .as_ref()
            .map(|mode| !mode.is_placeholder())
            .unwrap_or(false)
    }

    /// The caller explicitly asked for placeholder output only.
    pub fn forces_placeholder(&self) -> bool {
        self.mode
            .as_ref()
            .map(ModeSpec::is_placeholder)
            .unwrap_or(false)
    }

    pub fn model(&self) -> Option<&str> {
        self.mode.as_ref().and_then(|mode| mode.model.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ModeSelector {
    pub registry: ModeRegistry,
}

impl ModeSelector {
    pub fn new(registry: Option<ModeRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModeRegistry::new(None)),
        }
    }

    pub fn select(&self, requested: Option<&str>) -> ModeSelection {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let Some(requested_value) = requested.as_deref() else {
            return ModeSelection {
                mode: None,
                requested: None,
                fallback_reason: None,
            };
        };
        if let Some(mode) = self.registry.get(requested_value) {
            return ModeSelection {
                mode: Some(mode.clone()),
                requested,
                fallback_reason: None,
            };
        }
        ModeSelection {
            mode: None,
            fallback_reason: Some(format!(
                "Requested mode '{requested_value}' unavailable; no provider mode selected."
            )),
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{ModeRegistry, ModeSelector, ModeSpec};

    #[test]
    fn nano_banana_routes_to_gemini() {
        let selection = ModeSelector::new(None).select(Some("nano-banana"));
        assert!(selection.selects_provider());
        assert!(!selection.forces_placeholder());
        assert_eq!(selection.model(), Some("gemini-3-pro-image-preview"));
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        let selection = ModeSelector::new(None).select(Some("  Nano-Banana "));
        assert!(selection.selects_provider());
        assert_eq!(selection.requested.as_deref(), Some("Nano-Banana"));
    }

    #[test]
    fn mock_forces_placeholder() {
        let selection = ModeSelector::new(None).select(Some("mock"));
        assert!(selection.forces_placeholder());
        assert!(!selection.selects_provider());
        assert_eq!(selection.model(), None);
    }

    #[test]
    fn blank_request_selects_nothing_without_reason() {
        let selection = ModeSelector::new(None).select(Some("   "));
        assert_eq!(selection.mode, None);
        assert_eq!(selection.requested, None);
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn unknown_mode_explains_itself() {
        let selection = ModeSelector::new(None).select(Some("dall-e"));
        assert_eq!(selection.mode, None);
        assert!(!selection.selects_provider());
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested mode 'dall-e' unavailable; no provider mode selected.")
        );
    }

    #[test]
    fn custom_registry_replaces_defaults() {
        let mut modes = IndexMap::new();
        modes.insert(
            "house".to_string(),
            ModeSpec {
                name: "house".to_string(),
                provider: "gemini".to_string(),
                model: Some("house-image-1".to_string()),
            },
        );
        let selector = ModeSelector::new(Some(ModeRegistry::new(Some(modes))));
        let names: Vec<&str> = selector.registry.list().map(|mode| mode.name.as_str()).collect();
        assert_eq!(names, vec!["house"]);
        assert_eq!(selector.select(Some("house")).model(), Some("house-image-1"));
        assert_eq!(selector.select(Some("nano-banana")).mode, None);
    }
}
