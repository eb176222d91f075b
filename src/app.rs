//! Dream journal application entry point.
//!
//! Orchestrates the complete journal flow:
//! permission gate → record → live transcription → interpretation + image → display

use crate::audio::capture::{CpalFrameProducer, suppress_audio_warnings};
use crate::audio::frame::AudioFrame;
use crate::audio::permission::{DeviceGate, PermissionCheck, PermissionGate, PermissionRequest};
use crate::audio::producer::FrameConsumer;
use crate::audio::wav::WavDump;
use crate::config::Config;
use crate::error::{OneiroError, Result};
use crate::gemini::{GenAi, GeminiClient};
use crate::orchestrator::{self, DreamArtifact};
use crate::output;
use crate::session::TranscriptionSession;
use crate::session::chain::FrameGate;
use crate::state::{AppEvent, AppState, AppStateMachine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How often the status line and live transcript are refreshed.
const STATUS_REFRESH: Duration = Duration::from_millis(100);

/// Run the journal command: record a dream → transcribe live → interpret +
/// illustrate → display.
///
/// # Arguments
/// * `config` - Base configuration (can be overridden by CLI args)
/// * `device` - Optional device override from CLI
/// * `image_out` - Optional explicit path for the generated image
/// * `max_duration` - Optional cap on recording length (Ctrl-C always works)
/// * `dump_audio` - Optional WAV tee of the raw capture
/// * `quiet` - Suppress status messages
/// * `verbosity` - Verbosity level (0=default, 1=adds capture diagnostics)
///
/// # Returns
/// Ok(()) on success or on an empty recording, an error if any step fails
#[allow(clippy::too_many_arguments)]
pub async fn run_journal_command(
    mut config: Config,
    device: Option<String>,
    image_out: Option<PathBuf>,
    max_duration: Option<Duration>,
    dump_audio: Option<PathBuf>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    // Apply CLI overrides
    if let Some(d) = device {
        config.audio.device = Some(d);
    }

    let client = GeminiClient::new(&config.api)?;
    let gate = DeviceGate::new(
        config.audio.device.clone(),
        config.audio.sample_rate,
        config.audio.frame_samples,
    );

    let mut machine = AppStateMachine::new();
    resolve_permission(&gate, &mut machine, quiet)?;

    let wav = match &dump_audio {
        Some(path) => {
            let dump = WavDump::create(path, config.audio.sample_rate)?;
            if !quiet {
                eprintln!("oneiro: dumping audio to {}", path.display());
            }
            Some(dump)
        }
        None => None,
    };

    let mut session = TranscriptionSession::new();
    let frame_gate = session.open(&client).await?;
    let dropped = frame_gate.dropped_counter();
    let peak = Arc::new(AtomicU32::new(0));
    let tap = JournalTap::new(frame_gate, Arc::clone(&peak), wav);

    let stream = match start_capture(&config, tap) {
        Ok(stream) => stream,
        Err(e) => {
            session.stop().await;
            return Err(e);
        }
    };
    session.attach_device(Box::new(stream));
    machine.apply(AppEvent::CaptureStarted);

    if !quiet {
        match max_duration {
            Some(limit) => eprintln!(
                "Recording (up to {}). Speak your dream, then press Ctrl-C to finish.",
                humantime::format_duration(limit)
            ),
            None => eprintln!("Recording. Speak your dream, then press Ctrl-C to finish."),
        }
    }

    if let Err(e) = wait_for_stop(&mut session, &peak, max_duration, quiet).await {
        session.stop().await;
        return Err(e);
    }

    let stream_died = session.is_stream_ended();
    let transcript = session.stop().await.unwrap_or_default();

    if verbosity >= 1 {
        let dropped = dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            eprintln!("oneiro: {} frames dropped during capture", dropped);
        }
    }

    // A dead stream with a partial transcript is still worth processing; a
    // dead stream with nothing transcribed is a capture failure, not an
    // empty recording.
    if stream_died && transcript.trim().is_empty() {
        machine.apply(AppEvent::CaptureFailed);
        return Err(OneiroError::AudioCapture {
            message: "audio input ended before anything was transcribed".to_string(),
        });
    }

    machine.apply(AppEvent::CaptureStopped {
        transcription: transcript,
    });

    match machine.state().clone() {
        AppState::ReadyToRecord => {
            output::render_notice("The recording was empty. Please try again.");
            Ok(())
        }
        AppState::Processing { transcription } => {
            process_and_render(
                &client,
                &mut machine,
                &transcription,
                image_out.as_deref(),
                config.output.image_dir.as_deref(),
                quiet,
            )
            .await
        }
        other => Err(OneiroError::Other(format!(
            "unexpected state after capture: {:?}",
            other
        ))),
    }
}

/// Walk the machine from `Idle` to `ReadyToRecord`, requesting device access
/// when the probe cannot decide on its own.
fn resolve_permission(
    gate: &dyn PermissionGate,
    machine: &mut AppStateMachine,
    quiet: bool,
) -> Result<()> {
    match gate.check() {
        PermissionCheck::Granted => {
            machine.apply(AppEvent::PermissionGranted);
        }
        PermissionCheck::NotGranted => {
            machine.apply(AppEvent::PermissionUnclear);
            if !quiet {
                eprintln!("This application needs microphone access to record your dreams.");
            }
            match gate.request() {
                PermissionRequest::Granted => {
                    machine.apply(AppEvent::PermissionGranted);
                }
                PermissionRequest::Denied => {
                    machine.apply(AppEvent::PermissionDenied);
                }
            }
        }
        PermissionCheck::QueryFailed => {
            machine.apply(AppEvent::PermissionQueryFailed {
                message: "Could not check microphone permissions. Please verify your audio setup."
                    .to_string(),
            });
        }
    }

    match machine.state() {
        AppState::ReadyToRecord => Ok(()),
        AppState::PermissionDenied => {
            output::render_permission_denied();
            Err(OneiroError::AudioCapture {
                message: "microphone access denied".to_string(),
            })
        }
        AppState::Error { message } => Err(OneiroError::Other(message.clone())),
        other => Err(OneiroError::Other(format!(
            "unexpected state after permission flow: {:?}",
            other
        ))),
    }
}

/// Open the configured device and start the capture stream.
fn start_capture(
    config: &Config,
    tap: JournalTap,
) -> Result<crate::audio::capture::CaptureStream> {
    let producer = CpalFrameProducer::new(
        config.audio.device.as_deref(),
        config.audio.sample_rate,
        config.audio.frame_samples,
    )?;
    producer.start(tap)
}

/// Wait until the user stops the recording, the optional duration cap
/// elapses, or the audio stream dies. Redraws the status line while waiting.
async fn wait_for_stop(
    session: &mut TranscriptionSession,
    peak: &AtomicU32,
    max_duration: Option<Duration>,
    quiet: bool,
) -> Result<()> {
    let deadline = max_duration.map(|d| tokio::time::Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(STATUS_REFRESH);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.map_err(|e| {
                    OneiroError::Other(format!("Failed to wait for Ctrl+C: {}", e))
                })?;
                break;
            }
            _ = ticker.tick() => {
                session.drain_new_fragments();
                if !quiet {
                    let level = f32::from_bits(peak.load(Ordering::Relaxed));
                    output::render_recording_status(level, &session.transcript_so_far());
                }
                if session.is_stream_ended() {
                    break;
                }
                if let Some(deadline) = deadline
                    && tokio::time::Instant::now() >= deadline
                {
                    break;
                }
            }
        }
    }

    if !quiet {
        output::clear_line();
    }
    Ok(())
}

/// Run the interpretation/image fan-out and render the outcome.
async fn process_and_render<C: GenAi>(
    client: &C,
    machine: &mut AppStateMachine,
    transcription: &str,
    image_out: Option<&Path>,
    image_dir: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        eprintln!("Interpreting your dream...");
    }

    match orchestrator::process_dream(client, transcription).await {
        Ok(artifact) => {
            machine.apply(AppEvent::ProcessingSucceeded {
                artifact: artifact.clone(),
            });
            let image_path = save_image(&artifact, image_out, image_dir)?;
            output::render_artifact(&artifact, &image_path);
            Ok(())
        }
        Err(e) => {
            machine.apply(AppEvent::ProcessingFailed {
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

/// Write the generated image to its destination and return the path.
///
/// An explicit `--image-out` path wins; otherwise the file lands in the
/// configured image directory (or the system temp directory) under a
/// timestamped name.
fn save_image(
    artifact: &DreamArtifact,
    explicit: Option<&Path>,
    image_dir: Option<&Path>,
) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let dir = image_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir);
            dir.join(image_file_name(&artifact.image_format))
        }
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &artifact.image_data)?;
    Ok(path)
}

/// Timestamped file name for a generated image, e.g. `dream-1755950000.png`.
fn image_file_name(mime_type: &str) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("dream-{}.{}", stamp, image_extension(mime_type))
}

/// Map an image MIME type to a file extension.
fn image_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Frame consumer in front of the session gate: tracks the input level for
/// the status line and optionally tees raw audio into a WAV dump.
struct JournalTap {
    gate: FrameGate,
    peak: Arc<AtomicU32>,
    wav: Option<WavDump>,
}

impl JournalTap {
    fn new(gate: FrameGate, peak: Arc<AtomicU32>, wav: Option<WavDump>) -> Self {
        Self { gate, peak, wav }
    }
}

impl FrameConsumer for JournalTap {
    fn frame(&mut self, frame: AudioFrame) {
        self.peak.store(frame.peak().to_bits(), Ordering::Relaxed);

        if let Some(mut wav) = self.wav.take() {
            match wav.write_samples(&frame.samples) {
                Ok(()) => self.wav = Some(wav),
                Err(e) => eprintln!("oneiro: wav dump failed: {}", e),
            }
        }

        self.gate.frame(frame);
    }

    fn stream_ended(&mut self) {
        if let Some(wav) = self.wav.take()
            && let Err(e) = wav.finish()
        {
            eprintln!("oneiro: wav dump finalize failed: {}", e);
        }
        self.gate.stream_ended();
    }
}
