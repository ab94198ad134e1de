use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
/// Hard ceiling for a single provider call.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const API_KEY_VARS: &[&str] = &["GOOGLE_GENERATIVE_AI_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    data_dir: PathBuf,
    public_dir: PathBuf,
    api_key: Option<String>,
    api_base: String,
    image_model: String,
    request_timeout: Duration,
}

impl EngineConfig {
    /// Defaults with no credential: every generation takes the placeholder path.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            public_dir: data_dir.join("public"),
            data_dir,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout: MAX_REQUEST_TIMEOUT,
        }
    }

    /// Reads the credential, endpoint, model and timeout from the process
    /// environment. Unset or blank variables keep the defaults.
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(data_dir);
        config.api_key = API_KEY_VARS.iter().find_map(|key| non_empty_env(key));
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            config = config.with_api_base(base);
        }
        if let Some(model) = non_empty_env("TOONFORGE_IMAGE_MODEL") {
            config = config.with_image_model(model);
        }
        if let Some(public_dir) = non_empty_env("TOONFORGE_PUBLIC_DIR") {
            config = config.with_public_dir(public_dir);
        }
        if let Some(timeout) =
            non_empty_env("TOONFORGE_REQUEST_TIMEOUT").and_then(|raw| parse_timeout(&raw))
        {
            config = config.with_request_timeout(timeout);
        }
        config
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into();
        let trimmed = api_base.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_base = trimmed.to_string();
        }
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_public_dir(mut self, public_dir: impl Into<PathBuf>) -> Self {
        self.public_dir = public_dir.into();
        self
    }

    /// Clamped to [`MAX_REQUEST_TIMEOUT`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.min(MAX_REQUEST_TIMEOUT);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.json")
    }

    pub fn characters_path(&self) -> PathBuf {
        self.data_dir.join("characters.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.data_dir.join("receipts")
    }
}

/// Seconds as a float, clamped to 1..=300. Non-numeric, non-finite and
/// non-positive values are ignored.
fn parse_timeout(raw: &str) -> Option<Duration> {
    let seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(
        seconds.clamp(1.0, MAX_REQUEST_TIMEOUT.as_secs_f64()),
    ))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{parse_timeout, EngineConfig, DEFAULT_API_BASE, MAX_REQUEST_TIMEOUT};

    #[test]
    fn defaults_have_no_credential_and_full_ceiling() {
        let config = EngineConfig::new("/srv/toonforge");
        assert_eq!(config.api_key(), None);
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
        assert_eq!(config.request_timeout(), MAX_REQUEST_TIMEOUT);
        assert_eq!(
            config.public_dir(),
            std::path::Path::new("/srv/toonforge/public")
        );
        assert_eq!(
            config.records_path(),
            std::path::Path::new("/srv/toonforge/records.json")
        );
    }

    #[test]
    fn timeout_never_exceeds_ceiling() {
        let config = EngineConfig::new("data").with_request_timeout(Duration::from_secs(900));
        assert_eq!(config.request_timeout(), MAX_REQUEST_TIMEOUT);
        let config = config.with_request_timeout(Duration::from_millis(250));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn env_timeout_is_clamped_before_conversion() {
        assert_eq!(parse_timeout("1e30"), Some(MAX_REQUEST_TIMEOUT));
        assert_eq!(parse_timeout("301"), Some(MAX_REQUEST_TIMEOUT));
        assert_eq!(parse_timeout(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_timeout("0.25"), Some(Duration::from_secs(1)));
        for rejected in ["0", "-5", "inf", "NaN", "soon"] {
            assert_eq!(parse_timeout(rejected), None, "{rejected}");
        }
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let config = EngineConfig::new("data").with_api_key(Some("   ".to_string()));
        assert_eq!(config.api_key(), None);
        let config = config.with_api_key(Some(" k-123 ".to_string()));
        assert_eq!(config.api_key(), Some("k-123"));
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        let config = EngineConfig::new("data").with_api_base("http://127.0.0.1:9/v1beta/");
        assert_eq!(config.api_base(), "http://127.0.0.1:9/v1beta");
    }
}
