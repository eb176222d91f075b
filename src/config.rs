use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// API key. Usually left empty here and supplied via GEMINI_API_KEY.
    pub key: String,
    pub live_model: String,
    pub text_model: String,
    pub image_model: String,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    /// Rate frames are delivered at. The live endpoint expects 16 kHz PCM;
    /// capture resamples from whatever the device provides.
    pub sample_rate: u32,
    pub frame_samples: usize,
}

/// Artifact output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for generated dream images. Falls back to the system
    /// temp directory when unset.
    pub image_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            live_model: defaults::LIVE_MODEL.to_string(),
            text_model: defaults::TEXT_MODEL.to_string(),
            image_model: defaults::IMAGE_MODEL.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_samples: defaults::FRAME_SAMPLES,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    // Re-panic on invalid TOML or other errors
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - GEMINI_API_KEY → api.key
    /// - ONEIRO_LIVE_MODEL → api.live_model
    /// - ONEIRO_TEXT_MODEL → api.text_model
    /// - ONEIRO_IMAGE_MODEL → api.image_model
    /// - ONEIRO_AUDIO_DEVICE → audio.device
    /// - ONEIRO_IMAGE_DIR → output.image_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.is_empty()
        {
            self.api.key = key;
        }

        if let Ok(model) = std::env::var("ONEIRO_LIVE_MODEL")
            && !model.is_empty()
        {
            self.api.live_model = model;
        }

        if let Ok(model) = std::env::var("ONEIRO_TEXT_MODEL")
            && !model.is_empty()
        {
            self.api.text_model = model;
        }

        if let Ok(model) = std::env::var("ONEIRO_IMAGE_MODEL")
            && !model.is_empty()
        {
            self.api.image_model = model;
        }

        if let Ok(device) = std::env::var("ONEIRO_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(dir) = std::env::var("ONEIRO_IMAGE_DIR")
            && !dir.is_empty()
        {
            self.output.image_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/oneiro/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("oneiro")
            .join("config.toml")
    }
}
