//! Push-delivery contract between the capture layer and its consumer.

use crate::audio::frame::AudioFrame;
use std::sync::{Arc, Mutex};

/// Receives completed audio blocks from a frame producer.
///
/// Delivery is synchronous on the capture thread and in capture order.
/// Implementations must not block: the next block is due one frame period
/// later, and a consumer that cannot forward a frame is expected to drop it
/// rather than queue without bound.
pub trait FrameConsumer: Send + 'static {
    /// Handle one completed block.
    fn frame(&mut self, frame: AudioFrame);

    /// The input stream closed unexpectedly. No frames follow this call.
    /// The producer does not retry.
    fn stream_ended(&mut self);
}

#[derive(Debug, Default)]
struct Collected {
    frames: Vec<AudioFrame>,
    ended_calls: u32,
}

/// Test consumer that records every delivery for later inspection.
#[derive(Debug, Clone, Default)]
pub struct MockFrameConsumer {
    collected: Arc<Mutex<Collected>>,
}

impl MockFrameConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames delivered so far, in delivery order.
    #[allow(clippy::unwrap_used)]
    pub fn frames(&self) -> Vec<AudioFrame> {
        self.collected.lock().unwrap().frames.clone()
    }

    /// Whether `stream_ended` has been signaled.
    pub fn ended(&self) -> bool {
        self.ended_count() > 0
    }

    /// How many times `stream_ended` has been signaled.
    #[allow(clippy::unwrap_used)]
    pub fn ended_count(&self) -> u32 {
        self.collected.lock().unwrap().ended_calls
    }
}

impl FrameConsumer for MockFrameConsumer {
    #[allow(clippy::unwrap_used)]
    fn frame(&mut self, frame: AudioFrame) {
        self.collected.lock().unwrap().frames.push(frame);
    }

    #[allow(clippy::unwrap_used)]
    fn stream_ended(&mut self) {
        self.collected.lock().unwrap().ended_calls += 1;
    }
}
