//! Gemini API access: REST generation, live transcription, and mocks.

pub mod client;
pub mod live;
pub mod rest;

pub use client::{GenAi, GeneratedImage, LiveEvent, LiveReceiver, LiveSender, MockGenAi};
pub use rest::GeminiClient;
