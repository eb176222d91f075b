//! Microphone access gating.
//!
//! Linux has no per-app microphone permission dialog, so "permission" here
//! means a usable input device can actually be opened. [`PermissionGate::check`]
//! probes without touching the device; [`PermissionGate::request`] opens a
//! stream and immediately releases it, which is what makes desktop portals
//! and PipeWire surface any access problem up front instead of mid-session.

#[cfg(feature = "cpal-audio")]
use crate::audio::capture::{CpalFrameProducer, list_devices};
#[cfg(feature = "cpal-audio")]
use crate::audio::frame::AudioFrame;
#[cfg(feature = "cpal-audio")]
use crate::audio::producer::FrameConsumer;

/// Outcome of a non-intrusive availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheck {
    /// A usable input device is present.
    Granted,
    /// The probe worked but found no usable device yet; an explicit request
    /// may still succeed.
    NotGranted,
    /// The probe itself failed. Access status is unknowable.
    QueryFailed,
}

/// Outcome of an explicit open-and-release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRequest {
    Granted,
    Denied,
}

/// Gate that decides whether recording may start.
pub trait PermissionGate: Send + Sync {
    /// Probe availability without opening the device.
    fn check(&self) -> PermissionCheck;

    /// Open the device briefly to force an authoritative answer.
    ///
    /// Must release whatever it acquires before returning.
    fn request(&self) -> PermissionRequest;
}

/// [`PermissionGate`] backed by real audio hardware.
#[cfg(feature = "cpal-audio")]
pub struct DeviceGate {
    device: Option<String>,
    sample_rate: u32,
    frame_samples: usize,
}

#[cfg(feature = "cpal-audio")]
impl DeviceGate {
    pub fn new(device: Option<String>, sample_rate: u32, frame_samples: usize) -> Self {
        Self {
            device,
            sample_rate,
            frame_samples,
        }
    }
}

/// Consumer that discards everything, used for the open-and-release probe.
#[cfg(feature = "cpal-audio")]
struct NullConsumer;

#[cfg(feature = "cpal-audio")]
impl FrameConsumer for NullConsumer {
    fn frame(&mut self, _frame: AudioFrame) {}

    fn stream_ended(&mut self) {}
}

#[cfg(feature = "cpal-audio")]
impl PermissionGate for DeviceGate {
    fn check(&self) -> PermissionCheck {
        match list_devices() {
            Ok(devices) if devices.is_empty() => PermissionCheck::NotGranted,
            Ok(devices) => match &self.device {
                Some(name) => {
                    let found = devices
                        .iter()
                        .map(|d| d.strip_suffix(" [recommended]").unwrap_or(d))
                        .any(|d| d == name);
                    if found {
                        PermissionCheck::Granted
                    } else {
                        PermissionCheck::NotGranted
                    }
                }
                None => PermissionCheck::Granted,
            },
            Err(e) => {
                eprintln!("oneiro: device enumeration failed: {}", e);
                PermissionCheck::QueryFailed
            }
        }
    }

    fn request(&self) -> PermissionRequest {
        let producer = match CpalFrameProducer::new(
            self.device.as_deref(),
            self.sample_rate,
            self.frame_samples,
        ) {
            Ok(producer) => producer,
            Err(e) => {
                eprintln!("oneiro: microphone request failed: {}", e);
                return PermissionRequest::Denied;
            }
        };

        match producer.start(NullConsumer) {
            Ok(mut stream) => {
                stream.release();
                PermissionRequest::Granted
            }
            Err(e) => {
                eprintln!("oneiro: microphone request failed: {}", e);
                PermissionRequest::Denied
            }
        }
    }
}

/// Scriptable gate for tests.
pub struct MockPermissionGate {
    check_result: PermissionCheck,
    request_result: PermissionRequest,
}

impl MockPermissionGate {
    /// Gate that grants everything.
    pub fn granted() -> Self {
        Self {
            check_result: PermissionCheck::Granted,
            request_result: PermissionRequest::Granted,
        }
    }

    /// Gate that denies everything.
    pub fn denied() -> Self {
        Self {
            check_result: PermissionCheck::NotGranted,
            request_result: PermissionRequest::Denied,
        }
    }

    /// Gate with no device yet, resolving to `request_result` on request.
    pub fn not_granted(request_result: PermissionRequest) -> Self {
        Self {
            check_result: PermissionCheck::NotGranted,
            request_result,
        }
    }

    /// Gate whose probe fails outright.
    pub fn query_failed() -> Self {
        Self {
            check_result: PermissionCheck::QueryFailed,
            request_result: PermissionRequest::Denied,
        }
    }
}

impl PermissionGate for MockPermissionGate {
    fn check(&self) -> PermissionCheck {
        self.check_result
    }

    fn request(&self) -> PermissionRequest {
        self.request_result
    }
}
