use crate::error::{OneiroError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An image returned by the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Event delivered by the live transcription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Fragment of the speaker's transcription, in utterance order.
    Transcription(String),
    /// The model finished a response turn.
    TurnComplete,
}

/// Outgoing half of a live session.
#[async_trait::async_trait]
pub trait LiveSender: Send {
    /// Send one base64-encoded PCM frame.
    async fn send_audio(&mut self, data: &str) -> Result<()>;

    /// Close the outgoing half. One-way: transcription events already in
    /// flight on the receiving half are still delivered afterwards.
    async fn close(&mut self) -> Result<()>;
}

/// Incoming half of a live session.
#[async_trait::async_trait]
pub trait LiveReceiver: Send {
    /// Next server event, or `None` once the stream is over.
    async fn next_event(&mut self) -> Result<Option<LiveEvent>>;
}

/// Trait for the generative backend.
///
/// This trait allows swapping implementations (real Gemini API vs mock).
#[async_trait::async_trait]
pub trait GenAi: Send + Sync {
    /// One-shot text generation against the configured text model.
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    /// Generate images from a prompt with the configured image model.
    ///
    /// An empty vector means the model produced nothing; callers decide
    /// whether that is an error.
    async fn generate_images(&self, prompt: &str) -> Result<Vec<GeneratedImage>>;

    /// Open a realtime transcription session against the configured live
    /// model. Returns the two halves so sending and receiving can be driven
    /// independently.
    async fn connect_live(&self) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)>;
}

/// Implement GenAi for Arc<T> to allow sharing across tasks.
#[async_trait::async_trait]
impl<T: GenAi + ?Sized> GenAi for Arc<T> {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        (**self).generate_text(prompt).await
    }

    async fn generate_images(&self, prompt: &str) -> Result<Vec<GeneratedImage>> {
        (**self).generate_images(prompt).await
    }

    async fn connect_live(&self) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
        (**self).connect_live().await
    }
}

/// Response rule for [`MockGenAi::generate_text`], matched on a prompt substring.
struct TextRule {
    marker: String,
    delay: Duration,
    /// `None` makes the matched call fail.
    response: Option<String>,
}

#[derive(Default)]
struct CallLog {
    text_prompts: Vec<String>,
    image_prompts: Vec<String>,
    live_connects: usize,
}

#[derive(Debug, Default)]
struct MockLiveShared {
    sent: Vec<String>,
    closed: bool,
}

/// Mock backend for testing.
///
/// Text responses are selected by prompt substring so concurrent callers with
/// different prompts get deterministic answers regardless of ordering.
pub struct MockGenAi {
    text_rules: Vec<TextRule>,
    images: Vec<GeneratedImage>,
    image_delay: Duration,
    image_failure: bool,
    connect_failure: bool,
    live_events: Vec<(Duration, LiveEvent)>,
    receive_error_after_events: bool,
    send_fail_after: Option<usize>,
    calls: Arc<Mutex<CallLog>>,
    last_live: Arc<Mutex<Option<Arc<Mutex<MockLiveShared>>>>>,
}

impl MockGenAi {
    /// Create a mock that answers every text prompt with "mock response" and
    /// produces a single stub image.
    pub fn new() -> Self {
        Self {
            text_rules: Vec::new(),
            images: vec![GeneratedImage {
                bytes: b"mock-png".to_vec(),
                mime_type: "image/png".to_string(),
            }],
            image_delay: Duration::ZERO,
            image_failure: false,
            connect_failure: false,
            live_events: Vec::new(),
            receive_error_after_events: false,
            send_fail_after: None,
            calls: Arc::new(Mutex::new(CallLog::default())),
            last_live: Arc::new(Mutex::new(None)),
        }
    }

    /// Respond with `response` to text prompts containing `marker`.
    pub fn with_text_response(self, marker: &str, response: &str) -> Self {
        self.with_delayed_text_response(marker, 0, response)
    }

    /// Respond with `response` after `delay_ms` to prompts containing `marker`.
    pub fn with_delayed_text_response(mut self, marker: &str, delay_ms: u64, response: &str) -> Self {
        self.text_rules.push(TextRule {
            marker: marker.to_string(),
            delay: Duration::from_millis(delay_ms),
            response: Some(response.to_string()),
        });
        self
    }

    /// Fail text prompts containing `marker`.
    pub fn with_text_failure(mut self, marker: &str) -> Self {
        self.text_rules.push(TextRule {
            marker: marker.to_string(),
            delay: Duration::ZERO,
            response: None,
        });
        self
    }

    /// Return `images` from image generation.
    pub fn with_images(mut self, images: Vec<GeneratedImage>) -> Self {
        self.images = images;
        self
    }

    /// Make image generation return an empty vector.
    pub fn with_no_images(mut self) -> Self {
        self.images = Vec::new();
        self
    }

    /// Delay image generation by `delay_ms`.
    pub fn with_image_delay(mut self, delay_ms: u64) -> Self {
        self.image_delay = Duration::from_millis(delay_ms);
        self
    }

    /// Make image generation fail.
    pub fn with_image_failure(mut self) -> Self {
        self.image_failure = true;
        self
    }

    /// Make live connection attempts fail.
    pub fn with_connect_failure(mut self) -> Self {
        self.connect_failure = true;
        self
    }

    /// Script the live receiver: each event is delivered `delay_ms` after the
    /// previous one, independent of what the sender does.
    pub fn with_live_events(mut self, events: Vec<(u64, LiveEvent)>) -> Self {
        self.live_events = events
            .into_iter()
            .map(|(ms, event)| (Duration::from_millis(ms), event))
            .collect();
        self
    }

    /// Make the live receiver report one error after its script runs out.
    pub fn with_receive_error_after_events(mut self) -> Self {
        self.receive_error_after_events = true;
        self
    }

    /// Make the live sender fail once `n` frames have been accepted.
    pub fn with_send_failure_after(mut self, n: usize) -> Self {
        self.send_fail_after = Some(n);
        self
    }

    /// Text prompts received so far, in call order.
    pub fn text_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|log| log.text_prompts.clone())
            .unwrap_or_default()
    }

    /// Image prompts received so far, in call order.
    pub fn image_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|log| log.image_prompts.clone())
            .unwrap_or_default()
    }

    /// Number of live connections opened.
    pub fn live_connects(&self) -> usize {
        self.calls.lock().map(|log| log.live_connects).unwrap_or(0)
    }

    /// Base64 frames accepted by the most recent live sender.
    pub fn sent_frames(&self) -> Vec<String> {
        self.last_live
            .lock()
            .ok()
            .and_then(|live| {
                live.as_ref()
                    .and_then(|shared| shared.lock().ok().map(|s| s.sent.clone()))
            })
            .unwrap_or_default()
    }

    /// Whether the most recent live sender was closed.
    pub fn live_closed(&self) -> bool {
        self.last_live
            .lock()
            .ok()
            .and_then(|live| {
                live.as_ref()
                    .and_then(|shared| shared.lock().ok().map(|s| s.closed))
            })
            .unwrap_or(false)
    }
}

impl Default for MockGenAi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GenAi for MockGenAi {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        if let Ok(mut log) = self.calls.lock() {
            log.text_prompts.push(prompt.to_string());
        }

        match self.text_rules.iter().find(|r| prompt.contains(&r.marker)) {
            Some(rule) => {
                if !rule.delay.is_zero() {
                    tokio::time::sleep(rule.delay).await;
                }
                match &rule.response {
                    Some(text) => Ok(text.clone()),
                    None => Err(OneiroError::Api {
                        message: "mock text failure".to_string(),
                    }),
                }
            }
            None => Ok("mock response".to_string()),
        }
    }

    async fn generate_images(&self, prompt: &str) -> Result<Vec<GeneratedImage>> {
        if let Ok(mut log) = self.calls.lock() {
            log.image_prompts.push(prompt.to_string());
        }

        if !self.image_delay.is_zero() {
            tokio::time::sleep(self.image_delay).await;
        }
        if self.image_failure {
            Err(OneiroError::Api {
                message: "mock image failure".to_string(),
            })
        } else {
            Ok(self.images.clone())
        }
    }

    async fn connect_live(&self) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
        if let Ok(mut log) = self.calls.lock() {
            log.live_connects += 1;
        }

        if self.connect_failure {
            return Err(OneiroError::SessionConnect {
                message: "mock connect failure".to_string(),
            });
        }

        let shared = Arc::new(Mutex::new(MockLiveShared::default()));
        if let Ok(mut last) = self.last_live.lock() {
            *last = Some(Arc::clone(&shared));
        }

        let sender = MockLiveSender {
            shared: Arc::clone(&shared),
            fail_after: self.send_fail_after,
        };
        let receiver = MockLiveReceiver {
            events: self.live_events.clone().into(),
            error_pending: self.receive_error_after_events,
            shared,
        };
        Ok((Box::new(sender), Box::new(receiver)))
    }
}

/// Sender half produced by [`MockGenAi::connect_live`].
pub struct MockLiveSender {
    shared: Arc<Mutex<MockLiveShared>>,
    fail_after: Option<usize>,
}

#[async_trait::async_trait]
impl LiveSender for MockLiveSender {
    async fn send_audio(&mut self, data: &str) -> Result<()> {
        if let Ok(mut shared) = self.shared.lock() {
            if let Some(limit) = self.fail_after
                && shared.sent.len() >= limit
            {
                return Err(OneiroError::FrameSend {
                    message: "mock send failure".to_string(),
                });
            }
            shared.sent.push(data.to_string());
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Ok(mut shared) = self.shared.lock() {
            shared.closed = true;
        }
        Ok(())
    }
}

/// Receiver half produced by [`MockGenAi::connect_live`].
///
/// Scripted events are delivered on their own clock, including after the
/// sender half closed, which is how the real service delivers transcription
/// tails. Once the script runs out, the receiver stays quiet until close.
pub struct MockLiveReceiver {
    events: VecDeque<(Duration, LiveEvent)>,
    error_pending: bool,
    shared: Arc<Mutex<MockLiveShared>>,
}

#[async_trait::async_trait]
impl LiveReceiver for MockLiveReceiver {
    async fn next_event(&mut self) -> Result<Option<LiveEvent>> {
        if let Some((delay, event)) = self.events.pop_front() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            return Ok(Some(event));
        }

        if self.error_pending {
            self.error_pending = false;
            return Err(OneiroError::Api {
                message: "mock receive failure".to_string(),
            });
        }

        loop {
            if self.shared.lock().map(|s| s.closed).unwrap_or(true) {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
