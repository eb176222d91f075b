//! Async half of the live transcription channel.
//!
//! A session owns two background tasks: a send loop that forwards encoded
//! frames to the live channel, and a receive loop that turns server events
//! into transcript fragments. The two halves never block each other, and the
//! fragment channel has exactly one consumer, the session that spawned it.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

use crate::defaults;
use crate::gemini::{LiveEvent, LiveReceiver, LiveSender};

/// How long to wait for the send loop to hand the sender back on shutdown.
const SEND_TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the background tasks serving one live session.
pub(crate) struct WireHandle {
    send_task: JoinHandle<Box<dyn LiveSender>>,
    recv_task: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    fragment_rx: mpsc::UnboundedReceiver<String>,
}

impl WireHandle {
    /// Spawns the send and receive loops for an established live channel.
    pub(crate) fn spawn(
        sender: Box<dyn LiveSender>,
        receiver: Box<dyn LiveReceiver>,
        wire_rx: mpsc::Receiver<String>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (fragment_tx, fragment_rx) = mpsc::unbounded_channel();

        let send_task = tokio::spawn(run_sender(sender, wire_rx, shutdown_rx));
        let recv_task = tokio::spawn(run_receiver(receiver, fragment_tx));

        Self {
            send_task,
            recv_task,
            shutdown_tx: Some(shutdown_tx),
            fragment_rx,
        }
    }

    /// Returns the next transcript fragment if one is queued.
    pub(crate) fn try_recv_fragment(&mut self) -> Option<String> {
        self.fragment_rx.try_recv().ok()
    }

    /// Stops sending, drains the transcript tail, and closes the channel.
    ///
    /// The server keeps transcribing audio it has already received, so the
    /// drain window extends every time a fragment arrives and gives up after
    /// a hard cap. Returns the drained fragments in arrival order and whether
    /// the channel closed cleanly.
    pub(crate) async fn shutdown(mut self) -> (Vec<String>, bool) {
        let mut clean = true;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let mut sender = match timeout(SEND_TASK_JOIN_TIMEOUT, &mut self.send_task).await {
            Ok(Ok(sender)) => Some(sender),
            Ok(Err(e)) => {
                eprintln!("oneiro: send loop panicked: {}", e);
                clean = false;
                None
            }
            Err(_) => {
                eprintln!("oneiro: send loop did not stop in time");
                self.send_task.abort();
                clean = false;
                None
            }
        };

        let mut fragments = Vec::new();
        let max_stop = Instant::now() + Duration::from_millis(defaults::TAIL_DRAIN_MAX_MS);
        let mut conclude_at = Instant::now() + Duration::from_millis(defaults::TAIL_DRAIN_INITIAL_MS);
        loop {
            let deadline = conclude_at.min(max_stop);
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match timeout(deadline - now, self.fragment_rx.recv()).await {
                Ok(Some(text)) => {
                    fragments.push(text);
                    conclude_at =
                        Instant::now() + Duration::from_millis(defaults::TAIL_DRAIN_EXTEND_MS);
                }
                // Receive loop gone and nothing left queued.
                Ok(None) => break,
                // Window expired without a new fragment.
                Err(_) => break,
            }
        }

        // One-way close, no acknowledgment awaited.
        if let Some(sender) = sender.as_mut() {
            if let Err(e) = sender.close().await {
                eprintln!("oneiro: session close failed: {}", e);
                clean = false;
            }
        } else {
            clean = false;
        }

        self.recv_task.abort();
        while let Ok(text) = self.fragment_rx.try_recv() {
            fragments.push(text);
        }

        (fragments, clean)
    }

    /// Abandons both tasks without draining. Used when a session is dropped
    /// while still active.
    pub(crate) fn abort(self) {
        self.send_task.abort();
        self.recv_task.abort();
    }
}

async fn run_sender(
    mut sender: Box<dyn LiveSender>,
    mut wire_rx: mpsc::Receiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Box<dyn LiveSender> {
    loop {
        tokio::select! {
            maybe_frame = wire_rx.recv() => {
                match maybe_frame {
                    Some(data) => {
                        // Mid-stream send failures cost one frame, not the
                        // session.
                        if let Err(e) = sender.send_audio(&data).await {
                            eprintln!("oneiro: frame send failed: {}", e);
                        }
                    }
                    None => break,
                }
            }
            _ = &mut shutdown_rx => {
                // The owner stops the encode chain before signaling shutdown,
                // so the queue only shrinks here. Flush it: audio never sent
                // is audio never transcribed, tail drain or not.
                while let Ok(data) = wire_rx.try_recv() {
                    if let Err(e) = sender.send_audio(&data).await {
                        eprintln!("oneiro: frame send failed: {}", e);
                    }
                }
                break;
            }
        }
    }
    sender
}

async fn run_receiver(
    mut receiver: Box<dyn LiveReceiver>,
    fragment_tx: mpsc::UnboundedSender<String>,
) {
    loop {
        match receiver.next_event().await {
            Ok(Some(LiveEvent::Transcription(text))) => {
                if fragment_tx.send(text).is_err() {
                    break;
                }
            }
            Ok(Some(LiveEvent::TurnComplete)) => {}
            Ok(None) => break,
            Err(e) => {
                // A dead receive half does not end the session. Sending
                // continues until the owner stops.
                eprintln!("oneiro: transcription receive failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::defaults;
    use crate::gemini::{GenAi, MockGenAi};

    async fn spawn_wire(mock: &MockGenAi) -> (WireHandle, mpsc::Sender<String>) {
        let (sender, receiver) = mock.connect_live().await.unwrap();
        let (wire_tx, wire_rx) = mpsc::channel(defaults::WIRE_CHANNEL_CAPACITY);
        (WireHandle::spawn(sender, receiver, wire_rx), wire_tx)
    }

    #[tokio::test]
    async fn forwards_frames_to_the_live_channel() {
        let mock = MockGenAi::new();
        let (wire, wire_tx) = spawn_wire(&mock).await;

        wire_tx.send("AQA=".to_string()).await.unwrap();
        wire_tx.send("AgA=".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(mock.sent_frames(), vec!["AQA=", "AgA="]);
        wire.shutdown().await;
    }

    #[tokio::test]
    async fn fragments_arrive_in_emission_order() {
        let mock = MockGenAi::new().with_live_events(vec![
            (0, LiveEvent::Transcription("I was ".to_string())),
            (5, LiveEvent::Transcription("flying over ".to_string())),
            (5, LiveEvent::Transcription("a purple ocean".to_string())),
        ]);
        let (mut wire, _wire_tx) = spawn_wire(&mock).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(wire.try_recv_fragment().as_deref(), Some("I was "));
        assert_eq!(wire.try_recv_fragment().as_deref(), Some("flying over "));
        assert_eq!(wire.try_recv_fragment().as_deref(), Some("a purple ocean"));
        assert_eq!(wire.try_recv_fragment(), None);
        wire.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_the_transcript_tail() {
        let mock = MockGenAi::new().with_live_events(vec![
            (50, LiveEvent::Transcription("early ".to_string())),
            (200, LiveEvent::Transcription("late".to_string())),
        ]);
        let (wire, _wire_tx) = spawn_wire(&mock).await;

        let (fragments, clean) = wire.shutdown().await;

        assert_eq!(fragments, vec!["early ", "late"]);
        assert!(clean);
        assert!(mock.live_closed());
    }

    #[tokio::test]
    async fn shutdown_on_quiet_channel_closes_cleanly() {
        let mock = MockGenAi::new();
        let (wire, _wire_tx) = spawn_wire(&mock).await;

        let (fragments, clean) = wire.shutdown().await;

        assert!(fragments.is_empty());
        assert!(clean);
        assert!(mock.live_closed());
    }

    #[tokio::test]
    async fn shutdown_flushes_frames_queued_behind_it() {
        let mock = MockGenAi::new();
        let (wire, wire_tx) = spawn_wire(&mock).await;

        // No yield between queueing and shutdown: the send loop sees the
        // frames and the stop signal together.
        wire_tx.send("AQA=".to_string()).await.unwrap();
        wire_tx.send("AgA=".to_string()).await.unwrap();
        drop(wire_tx);

        let (_, clean) = wire.shutdown().await;

        assert!(clean);
        assert_eq!(mock.sent_frames(), vec!["AQA=", "AgA="]);
        assert!(mock.live_closed());
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_the_session() {
        let mock = MockGenAi::new().with_send_failure_after(1);
        let (wire, wire_tx) = spawn_wire(&mock).await;

        wire_tx.send("AQA=".to_string()).await.unwrap();
        wire_tx.send("AgA=".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(mock.sent_frames(), vec!["AQA="]);

        // The send loop survives the failure and still closes the channel.
        let (_, clean) = wire.shutdown().await;
        assert!(clean);
        assert!(mock.live_closed());
    }

    #[tokio::test]
    async fn receive_error_ends_receiving_but_not_sending() {
        let mock = MockGenAi::new()
            .with_live_events(vec![(0, LiveEvent::Transcription("kept".to_string()))])
            .with_receive_error_after_events();
        let (wire, wire_tx) = spawn_wire(&mock).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        wire_tx.send("AQA=".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(mock.sent_frames(), vec!["AQA="]);

        let (fragments, _) = wire.shutdown().await;
        assert_eq!(fragments, vec!["kept"]);
    }
}
