//! Error types for oneiro.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OneiroError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Streaming transcription session errors
    #[error("Could not connect to the transcription service: {message}")]
    SessionConnect { message: String },

    #[error("A capture session is already open")]
    SessionAlreadyOpen,

    #[error("Failed to send audio frame: {message}")]
    FrameSend { message: String },

    // Backend API errors (bad status, undecodable payload)
    #[error("Gemini API error: {message}")]
    Api { message: String },

    // Processing errors. These carry the exact sentences shown to the user;
    // the underlying cause is logged where the failure is observed.
    #[error("Failed to interpret the dream.")]
    Interpretation,

    #[error("Failed to create an image prompt from the dream.")]
    ImagePrompt,

    #[error("Failed to generate the dream image.")]
    ImageGeneration,

    #[error("No image was generated.")]
    NoImageProduced,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, OneiroError>;
