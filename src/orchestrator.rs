//! Post-transcript processing: interpretation and imagery run concurrently.
//!
//! Two branches with no mutual ordering: one asks for a structured
//! interpretation of the transcript, the other derives a short visual prompt
//! and renders it. The orchestration resolves to a [`DreamArtifact`] only
//! when both succeed; the first branch error resolves the whole run to that
//! failure and the other branch is abandoned. Underlying causes are logged
//! before being collapsed into the fixed user-facing messages.

use crate::error::{OneiroError, Result};
use crate::gemini::{GenAi, GeneratedImage};
use crate::prompt;

/// Combined output of one journal run. Constructed only when both branches
/// succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DreamArtifact {
    /// The transcript both artifacts were derived from, unchanged.
    pub transcription: String,
    /// Structured interpretation text.
    pub interpretation: String,
    /// Raw bytes of the generated image.
    pub image_data: Vec<u8>,
    /// MIME type reported for the image, for example `image/png`.
    pub image_format: String,
}

/// Runs both generation branches against `client` and aggregates the result.
pub async fn process_dream<C: GenAi>(client: &C, transcription: &str) -> Result<DreamArtifact> {
    let (interpretation, image) = tokio::try_join!(
        interpret(client, transcription),
        generate_image(client, transcription),
    )?;

    Ok(DreamArtifact {
        transcription: transcription.to_string(),
        interpretation,
        image_data: image.bytes,
        image_format: image.mime_type,
    })
}

async fn interpret<C: GenAi>(client: &C, dream: &str) -> Result<String> {
    client
        .generate_text(&prompt::interpretation(dream))
        .await
        .map_err(|e| {
            eprintln!("oneiro: interpretation failed: {}", e);
            OneiroError::Interpretation
        })
}

async fn generate_image<C: GenAi>(client: &C, dream: &str) -> Result<GeneratedImage> {
    let image_prompt = client
        .generate_text(&prompt::image_prompt_request(dream))
        .await
        .map_err(|e| {
            eprintln!("oneiro: image prompt derivation failed: {}", e);
            OneiroError::ImagePrompt
        })?;

    eprintln!("oneiro: image prompt: {}", image_prompt);

    let images = client
        .generate_images(&image_prompt)
        .await
        .map_err(|e| {
            eprintln!("oneiro: image generation failed: {}", e);
            OneiroError::ImageGeneration
        })?;

    match images.into_iter().next() {
        Some(image) if !image.bytes.is_empty() => Ok(image),
        _ => Err(OneiroError::NoImageProduced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::gemini::MockGenAi;

    #[tokio::test]
    async fn both_branches_combine_into_an_artifact() {
        let mock = MockGenAi::new()
            .with_text_response("Jungian", "Core Theme: flight and freedom.")
            .with_text_response(
                "image generator",
                "a surrealist dream of flight over a violet sea",
            )
            .with_images(vec![GeneratedImage {
                bytes: b"png-bytes".to_vec(),
                mime_type: "image/png".to_string(),
            }]);

        let artifact = process_dream(&mock, "I was flying over a purple ocean")
            .await
            .unwrap();

        assert_eq!(artifact.transcription, "I was flying over a purple ocean");
        assert_eq!(artifact.interpretation, "Core Theme: flight and freedom.");
        assert_eq!(artifact.image_data, b"png-bytes");
        assert_eq!(artifact.image_format, "image/png");

        // The image call received the derived prompt, not the raw dream.
        assert_eq!(
            mock.image_prompts(),
            vec!["a surrealist dream of flight over a violet sea"]
        );
    }

    #[tokio::test]
    async fn both_branches_receive_their_own_prompt() {
        let mock = MockGenAi::new();
        process_dream(&mock, "the dream text").await.unwrap();

        let prompts = mock.text_prompts();
        assert_eq!(prompts.len(), 2);
        // Branch order is not deterministic.
        assert!(prompts.iter().any(|p| p.contains("Jungian")));
        assert!(prompts.iter().any(|p| p.contains("AI image generator")));
        assert!(prompts.iter().all(|p| p.contains(r#""the dream text""#)));
    }

    #[tokio::test]
    async fn failure_resolves_when_the_failing_branch_does() {
        // Interpretation succeeds quickly; the image branch fails later. The
        // orchestration must not resolve before the failure happens, and must
        // not wait for anything after it.
        let mock = MockGenAi::new()
            .with_delayed_text_response("Jungian", 50, "Core Theme: flight.")
            .with_delayed_text_response("image generator", 50, "a violet sea")
            .with_image_delay(150)
            .with_image_failure();

        let started = Instant::now();
        let err = process_dream(&mock, "dream").await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, OneiroError::ImageGeneration));
        assert!(elapsed >= Duration::from_millis(200), "resolved too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1000), "resolved too late: {:?}", elapsed);
    }

    #[tokio::test]
    async fn first_error_abandons_the_other_branch() {
        let mock = MockGenAi::new()
            .with_text_failure("Jungian")
            .with_delayed_text_response("image generator", 100, "a violet sea");

        let started = Instant::now();
        let err = process_dream(&mock, "dream").await.unwrap_err();

        assert!(matches!(err, OneiroError::Interpretation));
        assert!(started.elapsed() < Duration::from_millis(100));
        // The imagery branch never reached the image call.
        assert!(mock.image_prompts().is_empty());
    }

    #[tokio::test]
    async fn prompt_derivation_failure_uses_its_own_message() {
        let mock = MockGenAi::new().with_text_failure("image generator");

        let err = process_dream(&mock, "dream").await.unwrap_err();
        assert!(matches!(err, OneiroError::ImagePrompt));
        assert_eq!(
            err.to_string(),
            "Failed to create an image prompt from the dream."
        );
    }

    #[tokio::test]
    async fn empty_image_list_is_no_image_produced() {
        let mock = MockGenAi::new().with_no_images();

        let err = process_dream(&mock, "dream").await.unwrap_err();
        assert!(matches!(err, OneiroError::NoImageProduced));
        assert_eq!(err.to_string(), "No image was generated.");
    }

    #[tokio::test]
    async fn image_with_empty_bytes_is_no_image_produced() {
        let mock = MockGenAi::new().with_images(vec![GeneratedImage {
            bytes: Vec::new(),
            mime_type: "image/png".to_string(),
        }]);

        let err = process_dream(&mock, "dream").await.unwrap_err();
        assert!(matches!(err, OneiroError::NoImageProduced));
    }
}
