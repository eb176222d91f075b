//! Default configuration constants for oneiro.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per audio frame sent to the transcription session.
///
/// 4096 samples at 16kHz is one block every ~256ms. The producer assembles
/// exactly this many samples before handing a frame to the consumer; partial
/// blocks are never delivered.
pub const FRAME_SAMPLES: usize = 4096;

/// MIME descriptor attached to every outgoing audio frame.
///
/// The live endpoint expects raw signed 16-bit little-endian PCM tagged with
/// its sample rate.
pub const PCM_MIME: &str = "audio/pcm;rate=16000";

/// Default model for the live transcription session.
pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default model for text generation (interpretation and image-prompt derivation).
pub const TEXT_MODEL: &str = "gemini-2.5-flash";

/// Default model for image generation.
pub const IMAGE_MODEL: &str = "imagen-4.0-generate-001";

/// Aspect ratio requested for the generated dream image.
pub const IMAGE_ASPECT_RATIO: &str = "4:3";

/// Number of images requested per generation call.
///
/// Exactly one image is produced per dream; the first prediction is used.
pub const IMAGE_COUNT: u32 = 1;

/// Base URL for the Gemini REST API.
pub const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// WebSocket endpoint for the bidirectional live transcription session.
pub const LIVE_WS_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Capacity of the channel between the capture callback and the encode worker.
///
/// Bounded and small: a frame that cannot be forwarded within ~2 seconds of
/// capture is stale for live transcription, so overflow drops frames rather
/// than queueing them.
pub const FRAME_CHANNEL_CAPACITY: usize = 8;

/// Capacity of the channel between the encode worker and the wire writer.
///
/// Same policy as [`FRAME_CHANNEL_CAPACITY`]: drop on overflow, never queue
/// unboundedly.
pub const WIRE_CHANNEL_CAPACITY: usize = 8;

/// How long to wait for the server's setup acknowledgment before giving up.
pub const SETUP_TIMEOUT_MS: u64 = 30_000;

/// Initial grace window for late transcription fragments after frames stop.
///
/// The server continues flushing recognized text for a short while after the
/// last audio frame; closing immediately would truncate the narration's
/// final words.
pub const TAIL_DRAIN_INITIAL_MS: u64 = 500;

/// Extension added to the drain deadline each time a late fragment arrives.
pub const TAIL_DRAIN_EXTEND_MS: u64 = 600;

/// Hard cap on the total tail-drain window.
pub const TAIL_DRAIN_MAX_MS: u64 = 4000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_cadence_is_roughly_a_quarter_second() {
        let cadence_ms = FRAME_SAMPLES as u64 * 1000 / SAMPLE_RATE as u64;
        assert_eq!(cadence_ms, 256);
    }

    #[test]
    fn tail_drain_windows_are_ordered() {
        assert!(TAIL_DRAIN_INITIAL_MS < TAIL_DRAIN_MAX_MS);
        assert!(TAIL_DRAIN_EXTEND_MS < TAIL_DRAIN_MAX_MS);
    }
}
