//! oneiro - Voice-first dream journal
//!
//! Speak a dream, watch it transcribe live, and get a Jungian interpretation
//! alongside a generated illustration.

// Error handling discipline: propagate with Result, never unwrap outside tests
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod gemini;
pub mod orchestrator;
pub mod output;
pub mod prompt;
pub mod session;
pub mod state;

// Composition root - needs everything
#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;

// Core traits (capture → session → processing)
pub use audio::producer::{FrameConsumer, MockFrameConsumer};
pub use gemini::{GenAi, GeminiClient, GeneratedImage, LiveEvent, LiveReceiver, LiveSender};

// Session
pub use session::{SessionStatus, TranscriptionSession};
pub use session::chain::FrameGate;

// Dream processing
pub use orchestrator::{DreamArtifact, process_dream};

// Error handling
pub use error::{OneiroError, Result};

// Config
pub use config::Config;

// Journal state machine
pub use state::{AppEvent, AppState, AppStateMachine};

/// Build version string with optional git commit hash.
///
/// Returns `"0.2.0+abc1234"` when git hash is available, `"0.2.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        // In a git repo build, GIT_HASH is set → expect "0.2.0+<hash>"
        // In CI without git, expect plain "0.2.0"
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
