//! Persisted Client Configuration
//!
//! This module defines the `AppConfig` record (system prompt, model and voice
//! selection) and the `ConfigStore` abstraction used to persist it between runs.
//! Loading always merges the persisted record over the built-in defaults, so a
//! partially written or older settings file still yields a complete config.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_VOICE: &str = "alloy";

/// Voices offered by the realtime endpoint, as `(id, display name)` pairs.
const VOICE_CATALOG: &[(&str, &str)] = &[
    ("alloy", "Alloy"),
    ("ash", "Ash"),
    ("ballad", "Ballad"),
    ("coral", "Coral"),
    ("echo", "Echo"),
    ("sage", "Sage"),
    ("shimmer", "Shimmer"),
    ("verse", "Verse"),
    ("marin", "Marin"),
    ("cedar", "Cedar"),
];

/// Returns the fixed voice catalog in display order.
pub fn voice_catalog() -> &'static [(&'static str, &'static str)] {
    VOICE_CATALOG
}

/// Checks whether `id` names a voice from the catalog.
pub fn is_known_voice(id: &str) -> bool {
    VOICE_CATALOG.iter().any(|(voice, _)| *voice == id)
}

/// The hosted speech-to-speech model variants a session can request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum S2sModel {
    #[default]
    #[serde(rename = "gpt-realtime")]
    GptRealtime,
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
}

impl S2sModel {
    pub const ALL: [S2sModel; 3] = [
        S2sModel::GptRealtime,
        S2sModel::Gpt4oRealtimePreview,
        S2sModel::Gpt4oMiniRealtimePreview,
    ];

    /// The identifier the realtime API expects in `?model=`.
    pub fn as_str(&self) -> &'static str {
        match self {
            S2sModel::GptRealtime => "gpt-realtime",
            S2sModel::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            S2sModel::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
        }
    }
}

impl fmt::Display for S2sModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown model '{0}'")]
pub struct UnknownModel(pub String);

impl FromStr for S2sModel {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        S2sModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s.trim())
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}

/// The speech-to-speech group of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S2sSettings {
    pub model: S2sModel,
    pub voice: String,
    /// Fields this version does not know about, kept so they are written back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for S2sSettings {
    fn default() -> Self {
        Self {
            model: S2sModel::default(),
            voice: DEFAULT_VOICE.to_string(),
            extra: Map::new(),
        }
    }
}

/// Client settings persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// System instructions sent to the model when a session starts.
    pub prompt: String,
    pub s2s: S2sSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            s2s: S2sSettings::default(),
            extra: Map::new(),
        }
    }
}

impl AppConfig {
    /// Returns a copy of this config with a different model.
    pub fn with_model(&self, model: S2sModel) -> Self {
        let mut next = self.clone();
        next.s2s.model = model;
        next
    }

    /// Returns a copy of this config with a different voice.
    pub fn with_voice(&self, voice: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.s2s.voice = voice.into();
        next
    }

    /// Returns a copy of this config with a different system prompt.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.prompt = prompt.into();
        next
    }

    /// Builds a config from a persisted JSON blob, filling gaps from the defaults.
    ///
    /// Top-level keys are merged shallowly; the `s2s` group is merged key by key.
    /// A known field holding an unusable value (e.g. a retired model id) falls
    /// back to its default alone; every other persisted value is kept. Returns
    /// `None` only when the blob is not a JSON object.
    pub fn from_persisted(blob: &str) -> Option<Self> {
        let saved: Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Persisted configuration is not valid JSON");
                return None;
            }
        };
        let Value::Object(mut saved) = saved else {
            warn!("Persisted configuration is not a JSON object");
            return None;
        };

        let mut config = AppConfig::default();
        if let Some(value) = saved.remove("prompt") {
            config.prompt = field_or_default("prompt", value, config.prompt);
        }
        match saved.remove("s2s") {
            Some(Value::Object(mut group)) => {
                let s2s = &mut config.s2s;
                if let Some(value) = group.remove("model") {
                    s2s.model = field_or_default("s2s.model", value, s2s.model);
                }
                if let Some(value) = group.remove("voice") {
                    s2s.voice = field_or_default("s2s.voice", value, s2s.voice.clone());
                }
                s2s.extra = group;
            }
            Some(Value::Null) | None => {}
            Some(_) => warn!("Persisted s2s settings are not an object, using defaults"),
        }
        config.extra = saved;
        Some(config)
    }
}

/// Deserializes one persisted field, keeping `default` when the value is unusable.
fn field_or_default<T: serde::de::DeserializeOwned>(name: &str, value: Value, default: T) -> T {
    match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(field = name, error = %e, "Ignoring unusable persisted setting");
            default
        }
    }
}

/// Persistence for `AppConfig`.
///
/// Storage is best effort: an unavailable medium makes `load` return the
/// defaults and `save` do nothing. Failures are logged, never raised.
pub trait ConfigStore: Send + Sync {
    /// Returns the persisted config merged over the defaults.
    fn load(&self) -> AppConfig;
    /// Persists the whole config, replacing any previous value.
    fn save(&self, config: &AppConfig);
}

/// A `ConfigStore` backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
}

impl JsonFileStore {
    /// Creates a store that reads and writes `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Creates a store under the platform config directory
    /// (`<config dir>/s2s-chat/settings.json`). The store is unavailable when
    /// the platform has no config directory.
    pub fn default_location() -> Self {
        Self {
            path: dirs::config_dir().map(|dir| dir.join("s2s-chat").join("settings.json")),
        }
    }

    /// A store with no backing medium.
    pub fn unavailable() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> AppConfig {
        let Some(path) = &self.path else {
            debug!("No settings location available, using defaults");
            return AppConfig::default();
        };
        match std::fs::read_to_string(path) {
            Ok(blob) => AppConfig::from_persisted(&blob).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings file");
                AppConfig::default()
            }
        }
    }

    fn save(&self, config: &AppConfig) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(config)
            .map_err(std::io::Error::other)
            .and_then(|blob| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, blob)
            });
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write settings file");
        }
    }
}

/// A `ConfigStore` that keeps the serialized record in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `blob`, as if a previous run saved it.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: RwLock::new(Some(blob.into())),
        }
    }

    /// The raw persisted blob, if any.
    pub fn blob(&self) -> Option<String> {
        self.blob.read().ok().and_then(|guard| guard.clone())
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> AppConfig {
        self.blob()
            .and_then(|blob| AppConfig::from_persisted(&blob))
            .unwrap_or_default()
    }

    fn save(&self, config: &AppConfig) {
        match serde_json::to_string(config) {
            Ok(blob) => {
                if let Ok(mut guard) = self.blob.write() {
                    *guard = Some(blob);
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize configuration"),
        }
    }
}
