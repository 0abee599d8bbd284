//! Playback configuration
//!
//! Values come from (lowest to highest priority) built-in defaults, an
//! optional TOML file and `DUET_`-prefixed environment variables, e.g.
//! `DUET_ERROR_SKIP_DELAY_MS=1500`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File consulted when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "duet.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Delay before the single retry of a refused `play()`
    #[serde(default = "default_play_retry_delay_ms")]
    pub play_retry_delay_ms: u64,

    /// Delay between an active-slot error and the automatic skip
    #[serde(default = "default_error_skip_delay_ms")]
    pub error_skip_delay_ms: u64,

    /// Smallest body accepted as real audio
    #[serde(default = "default_min_preload_bytes")]
    pub min_preload_bytes: usize,

    /// Volume applied to both slots at start-up (0.0-1.0)
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Preload request timeout
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// User agent sent with preload requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl PlaybackConfig {
    /// Load configuration from file and process environment
    ///
    /// Without `path`, `duet.toml` in the working directory is used if it
    /// exists. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::environment())
    }

    /// Load configuration with a caller-supplied environment source
    pub fn load_with_env(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path).required(true));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(environment);

        let config: Self = settings
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Environment source for `DUET_`-prefixed variables
    ///
    /// Keys are flat, so the nesting separator is `__` and single
    /// underscores stay part of the key.
    pub fn environment() -> config::Environment {
        config::Environment::with_prefix("DUET")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_volume.is_finite() || !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(ConfigError::Invalid(format!(
                "initial_volume must be within 0.0..=1.0, got {}",
                self.initial_volume
            )));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn play_retry_delay(&self) -> Duration {
        Duration::from_millis(self.play_retry_delay_ms)
    }

    pub fn error_skip_delay(&self) -> Duration {
        Duration::from_millis(self.error_skip_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            play_retry_delay_ms: default_play_retry_delay_ms(),
            error_skip_delay_ms: default_error_skip_delay_ms(),
            min_preload_bytes: default_min_preload_bytes(),
            initial_volume: default_initial_volume(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

// Default values
fn default_play_retry_delay_ms() -> u64 {
    100
}

fn default_error_skip_delay_ms() -> u64 {
    1000
}

fn default_min_preload_bytes() -> usize {
    1000
}

fn default_initial_volume() -> f32 {
    1.0
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("duet-player/{}", env!("CARGO_PKG_VERSION"))
}
