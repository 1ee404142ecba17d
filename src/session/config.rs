//! Agent configuration.
//!
//! Loaded from an optional TOML file; every field has a default. The API key
//! comes from `GEMINI_API_KEY` (or `VITE_GEMINI_API_KEY`) when set, otherwise
//! from the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer};

use crate::audio::FRAME_SAMPLES;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
pub const DEFAULT_VOICE: &str = "Zephyr";
pub const DEFAULT_AGENCY: &str = "DEALS HUB";

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "VITE_GEMINI_API_KEY"];

/// API key that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "\"\"")
        } else {
            write!(f, "\"[REDACTED]\"")
        }
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ApiKey)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub api_key: ApiKey,
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub connect_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            connect_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per capture frame at 16 kHz.
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frame_size: FRAME_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// JSON file with the listings the agent may talk about.
    pub listings: Option<PathBuf>,
    pub agency: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            listings: None,
            agency: DEFAULT_AGENCY.to_string(),
        }
    }
}

impl AgentConfig {
    /// Read `path` if given, then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Environment wins over the file for the API key.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty())
        {
            self.api_key = ApiKey::new(key.trim());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            bail!("Missing API key: set GEMINI_API_KEY or api_key in the config file");
        }
        if self.audio.frame_size == 0 {
            bail!("audio.frame_size must be greater than zero");
        }
        if self.live.connect_timeout_secs == 0 {
            bail!("live.connect_timeout_secs must be greater than zero");
        }
        if self.live.model.trim().is_empty() {
            bail!("live.model must not be empty");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.live.connect_timeout_secs)
    }

    pub fn session_config(&self, instruction: String) -> SessionConfig {
        SessionConfig {
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
            instruction,
        }
    }
}

/// What a session is opened with. Fixed for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: String,
    pub voice: String,
    pub instruction: String,
}

impl SessionConfig {
    /// Model name as the endpoint expects it, with the `models/` prefix.
    pub fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.live.model, DEFAULT_MODEL);
        assert_eq!(config.live.voice, "Zephyr");
        assert_eq!(config.audio.frame_size, 4096);
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            api_key = "from-file"

            [live]
            voice = "Puck"
            connect_timeout_secs = 5

            [context]
            agency = "Nile Homes"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_key.expose(), "from-file");
        assert_eq!(config.live.voice, "Puck");
        assert_eq!(config.live.model, DEFAULT_MODEL);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.context.agency, "Nile Homes");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_key_overrides_file() {
        let mut config = AgentConfig::from_toml("api_key = \"file\"").unwrap();
        config.apply_env(|name| match name {
            "GEMINI_API_KEY" => Some("  ".to_string()),
            "VITE_GEMINI_API_KEY" => Some("vite-key".to_string()),
            _ => None,
        });
        assert_eq!(config.api_key.expose(), "vite-key");

        config.apply_env(|_| None);
        assert_eq!(config.api_key.expose(), "vite-key");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AgentConfig {
            api_key: ApiKey::new("super-secret"),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = AgentConfig {
            api_key: ApiKey::new("k"),
            ..Default::default()
        };
        config.audio.frame_size = 0;
        assert!(config.validate().is_err());

        config.audio.frame_size = 4096;
        config.live.connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_path() {
        let config = AgentConfig::default().session_config("hi".into());
        assert_eq!(
            config.model_path(),
            "models/gemini-2.5-flash-native-audio-preview-12-2025"
        );

        let prefixed = SessionConfig {
            model: "models/x".into(),
            ..config
        };
        assert_eq!(prefixed.model_path(), "models/x");
    }
}
