//! Audio processing chain between the capture callback and the live channel.
//!
//! Frames take two hops on their way to the wire: the [`FrameGate`] sits in
//! the capture callback and hands frames to a dedicated encode thread over a
//! bounded channel, and the encode thread base64-encodes each frame and hands
//! it to the async send loop. Both hops drop on a full channel rather than
//! block, so the real-time callback never stalls on a slow network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, TrySendError};

use crate::audio::frame::AudioFrame;
use crate::audio::producer::FrameConsumer;
use crate::error::{OneiroError, Result};
use crate::gemini::live::encode_pcm;

/// Frame consumer that feeds the processing chain while the session is active.
///
/// The gate is handed to the frame producer when a session opens. Frames
/// arriving while the session is not active are dropped silently, never
/// queued, so a stale gate from a finished session can keep receiving
/// callbacks without side effects.
#[derive(Debug)]
pub struct FrameGate {
    tx: crossbeam_channel::Sender<AudioFrame>,
    active: Arc<AtomicBool>,
    stream_ended: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl FrameGate {
    pub(crate) fn new(
        tx: crossbeam_channel::Sender<AudioFrame>,
        active: Arc<AtomicBool>,
        stream_ended: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tx,
            active,
            stream_ended,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of frames dropped because the chain could not keep up.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared handle to the drop counter, for reporting after the gate has
    /// moved into the capture callback.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

impl FrameConsumer for FrameGate {
    fn frame(&mut self, frame: AudioFrame) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }

        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed);
                if dropped == 0 {
                    eprintln!("oneiro: frame channel full, dropping audio");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                // Chain already torn down.
            }
        }
    }

    fn stream_ended(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        self.stream_ended.store(true, Ordering::Relaxed);
        eprintln!("oneiro: audio stream ended unexpectedly");
    }
}

/// Dedicated thread that encodes PCM frames for the live channel.
///
/// Encoding happens off the capture callback and off the async runtime. The
/// worker forwards encoded frames with `try_send`, so a stalled send loop
/// costs audio rather than backpressure into the capture path. Drops at this
/// hop count into the same counter as the gate's.
pub(crate) struct ChainWorker {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl ChainWorker {
    pub(crate) fn spawn(
        frame_rx: Receiver<AudioFrame>,
        wire_tx: tokio::sync::mpsc::Sender<String>,
        dropped: Arc<AtomicU64>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("oneiro-encode".to_string())
            .spawn(move || {
                run_encoder(&frame_rx, &wire_tx, &worker_running, &dropped);
            })
            .map_err(|e| OneiroError::Other(format!("Failed to spawn encode worker: {}", e)))?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    /// Stops the worker and waits for it to exit. Returns false if the
    /// thread panicked.
    pub(crate) fn stop_and_join(mut self) -> bool {
        self.running.store(false, Ordering::Relaxed);
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(()) => true,
                Err(_) => {
                    eprintln!("oneiro: encode worker thread panicked");
                    false
                }
            },
            None => true,
        }
    }
}

fn run_encoder(
    frame_rx: &Receiver<AudioFrame>,
    wire_tx: &tokio::sync::mpsc::Sender<String>,
    running: &AtomicBool,
    dropped: &AtomicU64,
) {
    let mut warned = false;
    // Returns false once the wire is gone.
    let mut forward = |frame: AudioFrame| -> bool {
        let data = encode_pcm(&frame.samples);
        match wire_tx.try_send(data) {
            Ok(()) => true,
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                if !warned {
                    warned = true;
                    eprintln!("oneiro: send loop behind, dropping encoded audio");
                }
                true
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => false,
        }
    };

    while running.load(Ordering::Relaxed) {
        match frame_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                if !forward(frame) {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }

    // The owner deactivates the gate before stopping the worker, so the
    // queue only shrinks from here. Encode the remainder; audio captured
    // before the stop still belongs in the transcript.
    while let Ok(frame) = frame_rx.try_recv() {
        if !forward(frame) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::defaults;

    fn test_frame(samples: Vec<i16>, sequence: u64) -> AudioFrame {
        AudioFrame::new(samples, Instant::now(), sequence)
    }

    #[test]
    fn gate_forwards_frames_while_active() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let active = Arc::new(AtomicBool::new(true));
        let ended = Arc::new(AtomicBool::new(false));
        let mut gate = FrameGate::new(tx, active, ended);

        gate.frame(test_frame(vec![1, 2, 3], 0));
        gate.frame(test_frame(vec![4, 5, 6], 1));

        assert_eq!(rx.recv().unwrap().sequence, 0);
        assert_eq!(rx.recv().unwrap().sequence, 1);
        assert_eq!(gate.dropped_frames(), 0);
    }

    #[test]
    fn gate_drops_frames_while_inactive() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let active = Arc::new(AtomicBool::new(false));
        let ended = Arc::new(AtomicBool::new(false));
        let mut gate = FrameGate::new(tx, active, ended);

        gate.frame(test_frame(vec![1, 2, 3], 0));

        assert!(rx.try_recv().is_err());
        assert_eq!(gate.dropped_frames(), 0);
    }

    #[test]
    fn gate_drops_on_full_channel_without_blocking() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let active = Arc::new(AtomicBool::new(true));
        let ended = Arc::new(AtomicBool::new(false));
        let mut gate = FrameGate::new(tx, active, ended);

        gate.frame(test_frame(vec![1], 0));
        gate.frame(test_frame(vec![2], 1));
        gate.frame(test_frame(vec![3], 2));

        assert_eq!(gate.dropped_frames(), 2);
        assert_eq!(rx.recv().unwrap().sequence, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn gate_signals_stream_ended_and_deactivates() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let active = Arc::new(AtomicBool::new(true));
        let ended = Arc::new(AtomicBool::new(false));
        let mut gate = FrameGate::new(tx, Arc::clone(&active), Arc::clone(&ended));

        gate.stream_ended();

        assert!(ended.load(Ordering::Relaxed));
        assert!(!active.load(Ordering::Relaxed));

        gate.frame(test_frame(vec![1], 0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_encodes_and_forwards_frames() {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(defaults::FRAME_CHANNEL_CAPACITY);
        let (wire_tx, mut wire_rx) = tokio::sync::mpsc::channel(defaults::WIRE_CHANNEL_CAPACITY);

        let worker = ChainWorker::spawn(frame_rx, wire_tx, Arc::new(AtomicU64::new(0))).unwrap();
        frame_tx.send(test_frame(vec![0, 1, -1, 256], 0)).unwrap();

        let data = wire_rx.recv().await.unwrap();
        assert_eq!(data, encode_pcm(&[0, 1, -1, 256]));

        assert!(worker.stop_and_join());
    }

    #[tokio::test]
    async fn worker_preserves_frame_order() {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(defaults::FRAME_CHANNEL_CAPACITY);
        let (wire_tx, mut wire_rx) = tokio::sync::mpsc::channel(defaults::WIRE_CHANNEL_CAPACITY);

        let worker = ChainWorker::spawn(frame_rx, wire_tx, Arc::new(AtomicU64::new(0))).unwrap();
        for sequence in 0..4 {
            frame_tx
                .send(test_frame(vec![sequence as i16], sequence))
                .unwrap();
        }

        for sequence in 0..4i16 {
            let data = wire_rx.recv().await.unwrap();
            assert_eq!(data, encode_pcm(&[sequence]));
        }

        assert!(worker.stop_and_join());
    }

    #[tokio::test]
    async fn stop_flushes_queued_frames() {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(defaults::FRAME_CHANNEL_CAPACITY);
        let (wire_tx, mut wire_rx) = tokio::sync::mpsc::channel(defaults::WIRE_CHANNEL_CAPACITY);

        let worker = ChainWorker::spawn(frame_rx, wire_tx, Arc::new(AtomicU64::new(0))).unwrap();
        for sequence in 0..4 {
            frame_tx
                .send(test_frame(vec![sequence as i16], sequence))
                .unwrap();
        }

        assert!(worker.stop_and_join());

        // Every frame queued before the stop is still encoded and forwarded.
        for sequence in 0..4i16 {
            assert_eq!(wire_rx.recv().await, Some(encode_pcm(&[sequence])));
        }
    }

    #[tokio::test]
    async fn worker_counts_drops_on_full_wire_channel() {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(defaults::FRAME_CHANNEL_CAPACITY);
        let (wire_tx, mut wire_rx) = tokio::sync::mpsc::channel(1);
        // Occupy the only wire slot so every forward hits a full channel.
        wire_tx.try_send(encode_pcm(&[9])).unwrap();

        let dropped = Arc::new(AtomicU64::new(0));
        let worker = ChainWorker::spawn(frame_rx, wire_tx, Arc::clone(&dropped)).unwrap();
        frame_tx.send(test_frame(vec![1], 0)).unwrap();
        frame_tx.send(test_frame(vec![2], 1)).unwrap();

        assert!(worker.stop_and_join());

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(wire_rx.recv().await, Some(encode_pcm(&[9])));
        assert!(wire_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_exits_when_frame_channel_disconnects() {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(defaults::FRAME_CHANNEL_CAPACITY);
        let (wire_tx, _wire_rx) = tokio::sync::mpsc::channel(defaults::WIRE_CHANNEL_CAPACITY);

        let worker = ChainWorker::spawn(frame_rx, wire_tx, Arc::new(AtomicU64::new(0))).unwrap();
        drop(frame_tx);

        assert!(worker.stop_and_join());
    }
}
