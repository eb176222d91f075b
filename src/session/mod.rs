//! Live transcription session lifecycle.
//!
//! A [`TranscriptionSession`] owns everything between the microphone and the
//! transcript: the encode worker, the async send/receive loops, and the
//! capture stream handle the caller attaches after starting the producer.
//! Opening acquires resources in order; stopping releases them in reverse,
//! attempting every step even when an earlier one failed. Stop is idempotent
//! and delivers the accumulated transcript exactly once.

pub mod chain;
mod wire;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::defaults;
use crate::error::{OneiroError, Result};
use crate::gemini::GenAi;

use chain::{ChainWorker, FrameGate};
use wire::WireHandle;

/// Lifecycle phase of a transcription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, nothing acquired yet.
    Idle,
    /// Acquiring the live channel and processing chain.
    Opening,
    /// Streaming. Frames are accepted and transcript fragments accumulate.
    Active,
    /// Teardown in progress.
    Closing,
    /// Torn down cleanly.
    Closed,
    /// Torn down, but a teardown step reported an error along the way.
    Failed,
}

/// A resource the session must give back during teardown.
///
/// Handles are released in reverse acquisition order. Implementations must
/// tolerate being released twice.
pub trait ResourceHandle: Send {
    /// Release the underlying resource.
    fn release(&mut self);

    /// Short name for teardown logging.
    fn name(&self) -> &str;
}

#[cfg(feature = "cpal-audio")]
impl ResourceHandle for crate::audio::capture::CaptureStream {
    fn release(&mut self) {
        crate::audio::capture::CaptureStream::release(self);
    }

    fn name(&self) -> &str {
        self.device_name()
    }
}

/// Release-counting handle for tests.
#[derive(Clone)]
pub struct MockResourceHandle {
    name: String,
    releases: Arc<AtomicUsize>,
}

impl MockResourceHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times `release` has been called across all clones.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn is_released(&self) -> bool {
        self.release_count() > 0
    }
}

impl ResourceHandle for MockResourceHandle {
    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One live transcription session between an audio source and the service.
///
/// The expected flow:
///
/// 1. [`open`](Self::open) connects the live channel and starts the
///    processing chain, handing back a [`FrameGate`] for the frame producer.
/// 2. The caller starts capture with the gate as consumer and attaches the
///    resulting stream via [`attach_device`](Self::attach_device).
/// 3. Fragments accumulate; [`drain_new_fragments`](Self::drain_new_fragments)
///    surfaces them for live display.
/// 4. [`stop`](Self::stop) tears everything down and returns the transcript.
pub struct TranscriptionSession {
    status: SessionStatus,
    active: Arc<AtomicBool>,
    stream_ended: Arc<AtomicBool>,
    chain: Option<ChainWorker>,
    device: Option<Box<dyn ResourceHandle>>,
    wire: Option<WireHandle>,
    transcript: Vec<String>,
}

impl TranscriptionSession {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            active: Arc::new(AtomicBool::new(false)),
            stream_ended: Arc::new(AtomicBool::new(false)),
            chain: None,
            device: None,
            wire: None,
            transcript: Vec::new(),
        }
    }

    /// Connects the live channel and starts the processing chain.
    ///
    /// Returns the [`FrameGate`] to hand to the frame producer. Fails with
    /// [`OneiroError::SessionAlreadyOpen`] while a previous open is still in
    /// effect; a session that closed or failed can be opened again.
    pub async fn open<C: GenAi>(&mut self, client: &C) -> Result<FrameGate> {
        match self.status {
            SessionStatus::Opening | SessionStatus::Active | SessionStatus::Closing => {
                return Err(OneiroError::SessionAlreadyOpen);
            }
            SessionStatus::Idle | SessionStatus::Closed | SessionStatus::Failed => {}
        }
        self.status = SessionStatus::Opening;

        let (sender, receiver) = match client.connect_live().await {
            Ok(halves) => halves,
            Err(e) => {
                self.status = SessionStatus::Idle;
                return Err(e);
            }
        };

        let (wire_tx, wire_rx) = tokio::sync::mpsc::channel(defaults::WIRE_CHANNEL_CAPACITY);
        let wire = WireHandle::spawn(sender, receiver, wire_rx);

        // Fresh flags per open so gates from earlier sessions stay dead.
        let active = Arc::new(AtomicBool::new(true));
        let stream_ended = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(defaults::FRAME_CHANNEL_CAPACITY);
        let gate = FrameGate::new(frame_tx, Arc::clone(&active), Arc::clone(&stream_ended));

        // The worker shares the gate's drop counter so the driver sees one
        // total for the whole frame path.
        let chain = match ChainWorker::spawn(frame_rx, wire_tx, gate.dropped_counter()) {
            Ok(chain) => chain,
            Err(e) => {
                wire.abort();
                self.status = SessionStatus::Idle;
                return Err(e);
            }
        };

        self.active = active;
        self.stream_ended = stream_ended;
        self.chain = Some(chain);
        self.wire = Some(wire);
        self.transcript.clear();
        self.status = SessionStatus::Active;
        Ok(gate)
    }

    /// Attaches the capture stream handle released during teardown.
    ///
    /// If the session is no longer active the handle is released on the
    /// spot instead of being kept past its useful life.
    pub fn attach_device(&mut self, mut device: Box<dyn ResourceHandle>) {
        if self.status == SessionStatus::Active {
            self.device = Some(device);
        } else {
            device.release();
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// True once the frame producer reported an unexpected end of stream.
    pub fn is_stream_ended(&self) -> bool {
        self.stream_ended.load(Ordering::Relaxed)
    }

    /// Moves newly received fragments into the transcript buffer and returns
    /// them for live display.
    pub fn drain_new_fragments(&mut self) -> Vec<String> {
        let mut new = Vec::new();
        if let Some(wire) = self.wire.as_mut() {
            while let Some(text) = wire.try_recv_fragment() {
                new.push(text);
            }
        }
        self.transcript.extend(new.iter().cloned());
        new
    }

    /// The transcript accumulated so far, fragments concatenated in arrival
    /// order.
    pub fn transcript_so_far(&self) -> String {
        self.transcript.concat()
    }

    /// Tears the session down and returns the full transcript.
    ///
    /// Teardown runs in reverse acquisition order: deactivate the frame gate
    /// and release the capture stream, stop the encode chain, then drain the
    /// transcript tail and close the live channel. Frames already queued when
    /// the stop begins are still encoded and sent, so the narration's last
    /// block is not cut off. Every step runs even if an earlier one failed;
    /// steps for resources never acquired are skipped. Errors are logged and
    /// swallowed.
    ///
    /// The transcript is delivered exactly once. Calling `stop` again is a
    /// no-op returning `None`.
    pub async fn stop(&mut self) -> Option<String> {
        match self.status {
            SessionStatus::Opening | SessionStatus::Active => {}
            _ => return None,
        }
        self.status = SessionStatus::Closing;
        let mut clean = true;

        self.active.store(false, Ordering::Relaxed);

        if let Some(mut device) = self.device.take() {
            device.release();
        }

        if let Some(chain) = self.chain.take()
            && !chain.stop_and_join()
        {
            clean = false;
        }

        if let Some(wire) = self.wire.take() {
            let (fragments, wire_clean) = wire.shutdown().await;
            self.transcript.extend(fragments);
            if !wire_clean {
                clean = false;
            }
        }

        self.status = if clean {
            SessionStatus::Closed
        } else {
            SessionStatus::Failed
        };
        Some(self.transcript.concat())
    }
}

impl Default for TranscriptionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        if matches!(self.status, SessionStatus::Opening | SessionStatus::Active) {
            eprintln!("oneiro: session dropped while active, releasing resources");
            self.active.store(false, Ordering::Relaxed);
            if let Some(mut device) = self.device.take() {
                device.release();
            }
            if let Some(chain) = self.chain.take() {
                chain.stop_and_join();
            }
            if let Some(wire) = self.wire.take() {
                wire.abort();
            }
        }
    }
}
