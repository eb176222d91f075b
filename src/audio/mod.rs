//! Audio capture, frame assembly, and access gating.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod permission;
pub mod producer;
pub mod wav;
