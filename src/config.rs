//! Process-wide settings

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Environment variable naming an optional settings file
pub const CONFIG_PATH_ENV: &str = "ES_INDEXABLE_CONFIG";

/// Process-wide settings shared by every indexed model
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Settings {
    /// Search cluster URL
    #[validate(url)]
    #[serde(default = "default_url")]
    pub url: String,

    /// Index used by models that don't name one
    #[validate(length(min = 1))]
    #[serde(default = "default_index")]
    pub default_index: String,

    /// Fuzziness applied to free-text queries unless a queryset overrides it
    #[validate(range(min = 0.0))]
    #[serde(default = "default_fuzziness")]
    pub fuzziness: f64,

    /// Analyzer set on every string mapping
    #[serde(default)]
    pub default_analyzer: Option<String>,

    /// Body `settings` sent when an index is created
    #[serde(default)]
    pub index_settings: Option<serde_json::Value>,

    /// Rows per primary-store chunk while reindexing
    #[validate(range(min = 1))]
    #[serde(default = "default_chunk_size")]
    pub reindex_chunk_size: usize,

    /// Request timeout (seconds)
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Load settings from the embedded defaults, an optional file and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_with(path.as_deref().map(Path::new))
    }

    /// Load settings, layering `path` (if any) over the embedded defaults
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            include_str!("../config/default.toml"),
            config::FileFormat::Toml,
        ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings: Settings = builder
            // Override with environment variables (prefix: ES_INDEXABLE__)
            .add_source(
                config::Environment::with_prefix("ES_INDEXABLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Analysis analyzer declared as `default` in `index_settings`, if any
    pub fn analysis_default(&self) -> Option<&serde_json::Value> {
        self.index_settings
            .as_ref()
            .and_then(|s| s.get("analysis"))
            .and_then(|a| a.get("analyzer"))
            .and_then(|a| a.get("default"))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: default_url(),
            default_index: default_index(),
            fuzziness: default_fuzziness(),
            default_analyzer: None,
            index_settings: None,
            reindex_chunk_size: default_chunk_size(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Builder for Settings.
///
/// Overrides are scoped: derive a new value from an existing one, use it, drop it.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.settings.url = url.into();
        self
    }

    pub fn default_index(mut self, index: impl Into<String>) -> Self {
        self.settings.default_index = index.into();
        self
    }

    pub fn fuzziness(mut self, fuzziness: f64) -> Self {
        self.settings.fuzziness = fuzziness;
        self
    }

    pub fn default_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.settings.default_analyzer = Some(analyzer.into());
        self
    }

    pub fn index_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings.index_settings = Some(settings);
        self
    }

    pub fn reindex_chunk_size(mut self, size: usize) -> Self {
        self.settings.reindex_chunk_size = size;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.request_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "django".to_string()
}

fn default_fuzziness() -> f64 {
    0.5
}

fn default_chunk_size() -> usize {
    2000
}

fn default_request_timeout() -> u64 {
    30
}
