//! REST client for the Gemini generateContent and Imagen predict endpoints.

use crate::config::ApiConfig;
use crate::defaults;
use crate::error::{OneiroError, Result};
use crate::gemini::client::{GenAi, GeneratedImage, LiveReceiver, LiveSender};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// Build the generateContent body for a single user prompt.
fn generate_content_body(prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
    }
}

/// Build the Imagen predict body.
fn predict_body(prompt: &str, sample_count: u32, aspect_ratio: &str) -> PredictRequest {
    PredictRequest {
        instances: vec![Instance {
            prompt: prompt.to_string(),
        }],
        parameters: PredictParameters {
            sample_count,
            aspect_ratio: aspect_ratio.to_string(),
        },
    }
}

/// Pull the generated text out of a generateContent response.
///
/// Multiple parts are concatenated, matching how the official SDKs expose
/// `response.text`.
fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(OneiroError::Api {
            message: "Gemini response contained no text".to_string(),
        });
    }
    Ok(text)
}

/// Decode the images out of a predict response.
///
/// Predictions without image bytes are skipped; an empty result is not an
/// error here, callers decide what a missing image means.
fn extract_images(response: PredictResponse) -> Result<Vec<GeneratedImage>> {
    let mut images = Vec::new();
    for prediction in response.predictions {
        let Some(encoded) = prediction.bytes_base64_encoded else {
            continue;
        };
        let bytes = STANDARD.decode(&encoded).map_err(|e| OneiroError::Api {
            message: format!("Failed to decode image data: {}", e),
        })?;
        images.push(GeneratedImage {
            bytes,
            mime_type: prediction
                .mime_type
                .unwrap_or_else(|| "image/png".to_string()),
        });
    }
    Ok(images)
}

/// Real Gemini API client.
///
/// Text and image generation go over REST; live transcription sessions are
/// opened over WebSocket via [`crate::gemini::live`].
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    live_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
    live_model: String,
}

impl GeminiClient {
    /// Create a client from the API section of the config.
    ///
    /// # Errors
    /// Returns `OneiroError::ConfigInvalidValue` if the API key is empty.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.key.trim().is_empty() {
            return Err(OneiroError::ConfigInvalidValue {
                key: "api.key".to_string(),
                message: "set it in config.toml or via GEMINI_API_KEY".to_string(),
            });
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: defaults::API_BASE_URL.to_string(),
            live_url: defaults::LIVE_WS_URL.to_string(),
            api_key: config.key.clone(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            live_model: config.live_model.clone(),
        })
    }

    /// POST a JSON body to a model endpoint and decode the JSON response.
    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        model: &str,
        operation: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/models/{}:{}", self.base_url, model, operation);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| OneiroError::Api {
                message: format!("Request to {}:{} failed: {}", model, operation, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OneiroError::Api {
                message: format!("{}:{} returned {}: {}", model, operation, status, body),
            });
        }

        response.json().await.map_err(|e| OneiroError::Api {
            message: format!("Failed to decode {}:{} response: {}", model, operation, e),
        })
    }
}

#[async_trait::async_trait]
impl GenAi for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let body = generate_content_body(prompt);
        let response: GenerateContentResponse = self
            .post_json(&self.text_model, "generateContent", &body)
            .await?;
        extract_text(response)
    }

    async fn generate_images(&self, prompt: &str) -> Result<Vec<GeneratedImage>> {
        let body = predict_body(prompt, defaults::IMAGE_COUNT, defaults::IMAGE_ASPECT_RATIO);
        let response: PredictResponse =
            self.post_json(&self.image_model, "predict", &body).await?;
        extract_images(response)
    }

    async fn connect_live(&self) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
        crate::gemini::live::connect(&self.live_url, &self.api_key, &self.live_model).await
    }
}
