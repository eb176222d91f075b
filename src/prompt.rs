//! Prompt templates for the two generation branches.
//!
//! The dream text is embedded verbatim inside double quotes. The image
//! template carries a worked example because the model mirrors the example's
//! register far more reliably than it follows adjectives alone.

/// Prompt asking for a structured psychological interpretation.
pub fn interpretation(dream: &str) -> String {
    format!(
        r#"Based on Jungian archetypes, provide a structured psychological interpretation of the following dream. Focus on identifying key symbols, their potential meanings, and the overall emotional theme. Structure your response with clear headings (e.g., "Core Theme", "Key Symbols", "Potential Meaning"). Dream: "{}""#,
        dream
    )
}

/// Prompt asking for a short image-generator prompt derived from the dream.
pub fn image_prompt_request(dream: &str) -> String {
    format!(
        r#"Read the following dream transcription. Summarize the core emotional theme and the most vivid visual elements into a short, descriptive prompt for an AI image generator. The prompt should result in a surrealist, dream-like, and emotionally resonant image. For example: "A surrealist oil painting of a lone figure navigating a labyrinth of melting clocks under a purple moon, evoking a sense of confusion and the passage of time." Here is the dream: "{}""#,
        dream
    )
}
