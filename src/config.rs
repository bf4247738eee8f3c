use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::vocabulary::{Checklist, ObjectionTaxonomy};

#[derive(Deserialize, Debug, Default)]
pub struct Environment {
    pub openai_api_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No API key given: pass --api-key or set OPENAI_API_KEY")]
    MissingApiKey,

    #[error("Failed to read environment")]
    Environment(#[from] envy::Error),

    #[error("Failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub max_in_flight: usize,
    pub request_timeout_secs: u64,
    pub topics: Checklist,
    pub objections: ObjectionTaxonomy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            temperature: 0.1,
            max_in_flight: 4,
            request_timeout_secs: 60,
            topics: Checklist::default(),
            objections: ObjectionTaxonomy::default(),
        }
    }
}

impl Settings {
    /// Reads settings from `explicit_path`, or from the per-user config file
    /// if one exists, falling back to built-in defaults.
    pub async fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit_path {
            Some(path) => Some(path.to_owned()),
            None => default_config_path().filter(|path| path.is_file()),
        };

        let settings = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading settings");
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                toml::from_str::<Self>(&contents).map_err(|source| ConfigError::Parse { path, source })?
            }
            None => Self::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} is outside 0..=2",
                self.temperature
            )));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.topics.is_empty() {
            return Err(ConfigError::Invalid("topic checklist is empty".into()));
        }
        if self.objections.is_empty() {
            return Err(ConfigError::Invalid("objection taxonomy is empty".into()));
        }

        let topics = self.topics.duplicate_names();
        if !topics.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "topics listed more than once: {}",
                topics.join(", ")
            )));
        }
        let objections = self.objections.duplicate_names();
        if !objections.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "objection types listed more than once: {}",
                objections.join(", ")
            )));
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(env!("CARGO_PKG_NAME")).join("config.toml"))
}

/// The explicit key wins over the environment. Blank keys count as absent.
pub fn resolve_api_key(
    explicit: Option<String>,
    environment: Environment,
) -> Result<String, ConfigError> {
    explicit
        .into_iter()
        .chain(environment.openai_api_key)
        .find(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)
}
