//! Live transcription over the Gemini BidiGenerateContent WebSocket.
//!
//! Protocol: connect, send one `setup` message, wait for `setupComplete`,
//! then stream base64 PCM frames as `realtimeInput`. The server replies with
//! `serverContent.inputTranscription` fragments in utterance order, possibly
//! continuing after the client closes its sending half.

use crate::defaults;
use crate::error::{OneiroError, Result};
use crate::gemini::client::{LiveEvent, LiveReceiver, LiveSender};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
struct SetupMessage {
    setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    input_audio_transcription: EmptyObject,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Debug, Serialize)]
struct RealtimeInput<'a> {
    audio: AudioBlob<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioBlob<'a> {
    data: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    input_transcription: Option<Transcription>,
    turn_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

/// Encode i16 PCM samples as base64 little-endian bytes, the payload format
/// the live API expects for `audio/pcm`.
pub fn encode_pcm(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Serialize one audio frame into a `realtimeInput` message.
fn audio_message(data: &str) -> Result<String> {
    serde_json::to_string(&RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: AudioBlob {
                data,
                mime_type: defaults::PCM_MIME,
            },
        },
    })
    .map_err(|e| OneiroError::FrameSend {
        message: format!("Failed to encode audio message: {}", e),
    })
}

/// Build the setup message for `model`.
fn setup_message(model: &str) -> SetupMessage {
    SetupMessage {
        setup: Setup {
            model: format!("models/{}", model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
            },
            input_audio_transcription: EmptyObject {},
        },
    }
}

/// Parse one server payload into a [`LiveEvent`], if it carries one.
fn parse_server_event(raw: &str) -> Option<LiveEvent> {
    let message: ServerMessage = serde_json::from_str(raw).ok()?;
    let content = message.server_content?;
    if let Some(transcription) = content.input_transcription
        && !transcription.text.is_empty()
    {
        return Some(LiveEvent::Transcription(transcription.text));
    }
    if content.turn_complete == Some(true) {
        return Some(LiveEvent::TurnComplete);
    }
    None
}

/// Whether a server payload is the setup acknowledgement.
fn is_setup_complete(raw: &str) -> bool {
    serde_json::from_str::<ServerMessage>(raw)
        .map(|message| message.setup_complete.is_some())
        .unwrap_or(false)
}

/// Open a live session: connect, send setup, and wait for `setupComplete`.
///
/// # Errors
/// Returns `OneiroError::SessionConnect` if the socket cannot be opened, the
/// setup handshake fails, or the server does not acknowledge within
/// [`defaults::SETUP_TIMEOUT_MS`].
pub(crate) async fn connect(
    live_url: &str,
    api_key: &str,
    model: &str,
) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
    let url = format!("{}?key={}", live_url, api_key);
    let (ws, _) = connect_async(&url)
        .await
        .map_err(|e| OneiroError::SessionConnect {
            message: format!("WebSocket connect failed: {}", e),
        })?;
    let (mut write, mut read) = ws.split();

    let payload =
        serde_json::to_string(&setup_message(model)).map_err(|e| OneiroError::SessionConnect {
            message: format!("Failed to encode setup message: {}", e),
        })?;
    write
        .send(Message::Text(payload))
        .await
        .map_err(|e| OneiroError::SessionConnect {
            message: format!("Failed to send setup message: {}", e),
        })?;

    wait_for_setup(&mut read).await?;

    Ok((Box::new(WsSender { write }), Box::new(WsReceiver { read })))
}

async fn wait_for_setup(read: &mut SplitStream<WsStream>) -> Result<()> {
    let wait = async {
        while let Some(message) = read.next().await {
            let message = message.map_err(|e| OneiroError::SessionConnect {
                message: format!("WebSocket error during setup: {}", e),
            })?;
            match message {
                Message::Text(text) => {
                    if is_setup_complete(&text) {
                        return Ok(());
                    }
                }
                Message::Binary(data) => {
                    if let Ok(text) = String::from_utf8(data)
                        && is_setup_complete(&text)
                    {
                        return Ok(());
                    }
                }
                Message::Close(_) => {
                    return Err(OneiroError::SessionConnect {
                        message: "Connection closed during setup".to_string(),
                    });
                }
                _ => {}
            }
        }
        Err(OneiroError::SessionConnect {
            message: "Stream ended before setup completed".to_string(),
        })
    };

    match tokio::time::timeout(Duration::from_millis(defaults::SETUP_TIMEOUT_MS), wait).await {
        Ok(result) => result,
        Err(_) => Err(OneiroError::SessionConnect {
            message: format!(
                "Timed out after {}ms waiting for setup acknowledgement",
                defaults::SETUP_TIMEOUT_MS
            ),
        }),
    }
}

struct WsSender {
    write: SplitSink<WsStream, Message>,
}

#[async_trait::async_trait]
impl LiveSender for WsSender {
    async fn send_audio(&mut self, data: &str) -> Result<()> {
        let payload = audio_message(data)?;
        self.write
            .send(Message::Text(payload))
            .await
            .map_err(|e| OneiroError::FrameSend {
                message: format!("WebSocket send failed: {}", e),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .send(Message::Close(None))
            .await
            .map_err(|e| OneiroError::Other(format!("WebSocket close failed: {}", e)))
    }
}

struct WsReceiver {
    read: SplitStream<WsStream>,
}

#[async_trait::async_trait]
impl LiveReceiver for WsReceiver {
    async fn next_event(&mut self) -> Result<Option<LiveEvent>> {
        while let Some(message) = self.read.next().await {
            let message = message.map_err(|e| OneiroError::Api {
                message: format!("WebSocket receive failed: {}", e),
            })?;
            match message {
                Message::Text(text) => {
                    if let Some(event) = parse_server_event(&text) {
                        return Ok(Some(event));
                    }
                }
                // The live API delivers JSON in binary frames as well
                Message::Binary(data) => {
                    if let Ok(text) = String::from_utf8(data)
                        && let Some(event) = parse_server_event(&text)
                    {
                        return Ok(Some(event));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }
}
