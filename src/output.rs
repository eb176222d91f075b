//! Terminal rendering for the dream journal flow.
//!
//! Live status goes to stderr so stdout stays clean for the interpretation
//! text. The recording status line is redrawn in place; everything after the
//! recording stops is printed normally.

use std::io::{self, Write};
use std::path::Path;

use crate::orchestrator::DreamArtifact;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Character cells used by the level bar.
const LEVEL_BAR_WIDTH: usize = 20;

/// Characters of transcript kept visible at the end of the status line.
const TAIL_WIDTH: usize = 48;

/// Clear the current terminal line (replaces the recording status line).
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Render an input level (0.0..=1.0) as a fixed-width bar, colored by
/// intensity. Values outside the range are clamped.
fn format_level_bar(level: f32) -> String {
    let clamped = level.clamp(0.0, 1.0);
    let filled = (clamped * LEVEL_BAR_WIDTH as f32).round() as usize;
    let color = if clamped >= 0.85 {
        RED
    } else if clamped >= 0.5 {
        YELLOW
    } else {
        GREEN
    };
    format!(
        "{color}{}{RESET}{DIM}{}{RESET}",
        "█".repeat(filled),
        "░".repeat(LEVEL_BAR_WIDTH - filled),
    )
}

/// Redraw the in-place recording status line: level bar plus the tail of the
/// transcript heard so far.
pub fn render_recording_status(level: f32, transcript: &str) {
    let tail = transcript_tail(transcript, TAIL_WIDTH);
    eprint!("\r\x1b[2K[{}] {DIM}{}{RESET}", format_level_bar(level), tail);
    io::stderr().flush().ok();
}

/// Last `width` characters of the transcript, with a leading ellipsis when
/// truncated. Newlines are flattened so the status line stays on one row.
fn transcript_tail(transcript: &str, width: usize) -> String {
    let flat = transcript.replace(['\n', '\r'], " ");
    let chars: Vec<char> = flat.chars().collect();
    if chars.len() <= width {
        return flat;
    }
    let start = chars.len() - width.saturating_sub(1);
    let mut tail = String::from("…");
    tail.extend(&chars[start..]);
    tail
}

/// Print the interpretation to stdout, coloring section headings.
///
/// The model typically structures its answer with markdown-style headings
/// ("## Symbols", "**Archetypes**") or bare "Emotions:" lines. Everything
/// else passes through unstyled.
pub fn render_interpretation(interpretation: &str) {
    for line in interpretation.lines() {
        if is_heading(line) {
            println!("{BOLD}{MAGENTA}{}{RESET}", line);
        } else {
            println!("{}", line);
        }
    }
}

/// Heuristic for section heading lines in model output.
fn is_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with('#') {
        return true;
    }
    if trimmed.starts_with("**") && trimmed.trim_end_matches(':').ends_with("**") {
        return true;
    }
    // Short "Emotions:" style labels, but not full sentences that happen to
    // end with a colon.
    trimmed.ends_with(':') && trimmed.len() <= 60 && !trimmed.contains(". ")
}

/// Print the full journal result: transcript, interpretation, image location.
pub fn render_artifact(artifact: &DreamArtifact, image_path: &Path) {
    println!();
    println!("{BOLD}{CYAN}Your Dream{RESET}");
    println!("{DIM}\"{}\"{RESET}", artifact.transcription.trim());
    println!();
    println!("{BOLD}{CYAN}Interpretation{RESET}");
    render_interpretation(&artifact.interpretation);
    println!();
    println!("{GREEN}Dream image saved to {}{RESET}", image_path.display());
}

/// Print a transient validation notice.
pub fn render_notice(message: &str) {
    eprintln!("{YELLOW}{}{RESET}", message);
}

/// Print the microphone denial guidance.
pub fn render_permission_denied() {
    eprintln!("{RED}{BOLD}Microphone Access Denied{RESET}");
    eprintln!(
        "Please enable microphone access for this application in your system settings and try again."
    );
}
