use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use veritas_llm::{DEFAULT_GEMINI_ENDPOINT, ProviderConfig};

use crate::research::{MODEL_DEEP, MODEL_FAST, ResearchLevel};

pub const SETTINGS_DIRECTORY_NAME: &str = "veritas";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment variable consulted when no API key is configured on disk.
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model_fast")]
    pub model_fast: String,
    #[serde(default = "default_model_deep")]
    pub model_deep: String,
    #[serde(default)]
    pub default_level: ResearchLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            model_fast: default_model_fast(),
            model_deep: default_model_deep(),
            default_level: ResearchLevel::default(),
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = if self.endpoint.trim().is_empty() {
            default_endpoint()
        } else {
            self.endpoint.trim().to_string()
        };
        self.model_fast = if self.model_fast.trim().is_empty() {
            default_model_fast()
        } else {
            self.model_fast.trim().to_string()
        };
        self.model_deep = if self.model_deep.trim().is_empty() {
            default_model_deep()
        } else {
            self.model_deep.trim().to_string()
        };

        self
    }

    /// Falls back to the process environment when no key is configured on
    /// disk. The fallback never gets persisted.
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_key.is_empty()
            && let Ok(key) = std::env::var(API_KEY_ENV_VAR)
        {
            let key = key.trim();
            if !key.is_empty() {
                self.api_key = key.to_string();
            }
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(&self.api_key, &self.endpoint))
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".veritas"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> Settings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return Settings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(Settings::default())).merge(Json::file(path));

        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_endpoint() -> String {
    DEFAULT_GEMINI_ENDPOINT.to_string()
}

fn default_model_fast() -> String {
    MODEL_FAST.to_string()
}

fn default_model_deep() -> String {
    MODEL_DEEP.to_string()
}
