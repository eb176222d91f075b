//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::frame::{FrameAssembler, quantize};
use crate::audio::producer::FrameConsumer;
use crate::error::{OneiroError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
/// These are harmless but confusing to users.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        // Suppress JACK "cannot connect" messages - don't try to start JACK server
        std::env::set_var("JACK_NO_START_SERVER", "1");
        // Disable JACK completely for CPAL probing
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        // Force PipeWire to not print debug messages
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        // Suppress ALSA verbose messages
        std::env::set_var("ALSA_DEBUG", "0");
        // Tell PipeWire's JACK to be quiet
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// # Returns
/// A vector of device names, with preferred devices marked with "\[recommended\]".
/// Filters out obviously unusable devices (surround channels, HDMI, etc.).
///
/// # Errors
/// Returns `OneiroError::AudioCapture` if device enumeration fails.
///
/// # Note
/// During enumeration, cpal may output ALSA/JACK warnings to stderr while
/// probing backends. These warnings are harmless and can be safely ignored.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().input_devices()).map_err(|e| {
        OneiroError::AudioCapture {
            message: format!("Failed to enumerate input devices: {}", e),
        }
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            // Skip filtered devices
            if should_filter_device(&name) {
                continue;
            }

            // Mark recommended devices
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// Tries in order:
/// 1. PipeWire
/// 2. PulseAudio/Pulse
/// 3. System default
///
/// This ensures we respect the desktop's audio device selection.
///
/// # Errors
/// Returns `OneiroError::AudioDeviceNotFound` if no input device is available.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        // Try to find a preferred device
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        // Fall back to system default
        host.default_input_device()
            .ok_or_else(|| OneiroError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only accessed from a single thread at a time. Its
/// methods are called synchronously and don't cross thread boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// State shared between the capture callbacks.
///
/// The data callback assembles samples into fixed-size frames and hands each
/// completed frame to the consumer. The error callback marks the stream ended
/// so the consumer hears about an unplugged device exactly once.
struct CaptureState<C: FrameConsumer> {
    assembler: FrameAssembler,
    consumer: C,
    ended: bool,
}

/// Microphone frame producer built on CPAL.
///
/// Captures 16-bit PCM audio at 16kHz mono and pushes fixed-size frames to a
/// [`FrameConsumer`] from the audio callback thread. Tries the preferred
/// format first (i16/16kHz/mono), then falls back to the device's default
/// config with software conversion (channel mixing + resampling).
pub struct CpalFrameProducer {
    device: cpal::Device,
    sample_rate: u32,
    frame_samples: usize,
    callback_count: Arc<AtomicU64>,
}

impl CpalFrameProducer {
    /// Create a new CPAL frame producer.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the best default input device.
    /// * `sample_rate` - Target sample rate, normally 16kHz.
    /// * `frame_samples` - Samples per delivered frame.
    ///
    /// # Errors
    /// Returns errors if:
    /// - Device not found
    /// - Device enumeration fails
    pub fn new(device_name: Option<&str>, sample_rate: u32, frame_samples: usize) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                // Find device by name
                let devices = host
                    .input_devices()
                    .map_err(|e| OneiroError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| OneiroError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                // Use smart default (prefers PipeWire/PulseAudio)
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            sample_rate,
            frame_samples,
            callback_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start capturing and push frames to `consumer` until the returned
    /// [`CaptureStream`] is released or dropped.
    ///
    /// Waits briefly after starting to check that the CPAL callback actually
    /// fires. Some PipeWire-ALSA setups accept non-native configs but never
    /// deliver data, in which case the device's native config is used with
    /// software conversion.
    ///
    /// # Errors
    /// Returns `OneiroError::AudioCapture` if no stream configuration can be
    /// built or started.
    pub fn start<C: FrameConsumer>(self, consumer: C) -> Result<CaptureStream> {
        let device_name = self
            .device
            .name()
            .unwrap_or_else(|_| "default".to_string());
        let state = Arc::new(Mutex::new(CaptureState {
            assembler: FrameAssembler::new(self.frame_samples),
            consumer,
            ended: false,
        }));

        let stream = self.build_stream(&state)?;
        stream.play().map_err(|e| OneiroError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Wait briefly to check if the CPAL callback actually fires.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            // Preferred config didn't deliver data. Stop it and retry with
            // the native config. Nothing was emitted yet, so the assembler
            // can be replaced wholesale.
            drop(stream);
            if let Ok(mut guard) = state.lock() {
                guard.assembler = FrameAssembler::new(self.frame_samples);
            }

            let native_stream = self.build_stream_native(&state)?;
            native_stream
                .play()
                .map_err(|e| OneiroError::AudioCapture {
                    message: format!("Failed to start native audio stream: {}", e),
                })?;
            native_stream
        } else {
            stream
        };

        Ok(CaptureStream {
            stream: Some(SendableStream(final_stream)),
            device_name,
        })
    }

    /// Build the audio stream with the configured format.
    ///
    /// Tries in order:
    /// 1. i16/16kHz/mono, the preferred zero-conversion path
    /// 2. f32/16kHz/mono, for devices that only expose float formats
    /// 3. Device default config, native rate/channels with software conversion
    fn build_stream<C: FrameConsumer>(
        &self,
        state: &Arc<Mutex<CaptureState<C>>>,
    ) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        // Try i16/16kHz/mono. Works with PipeWire/PulseAudio which convert transparently.
        let shared = Arc::clone(state);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                deliver_i16(&shared, data);
            },
            error_callback(state),
            None,
        ) {
            return Ok(stream);
        }

        // Try f32/16kHz/mono, for devices that only expose float formats
        let shared = Arc::clone(state);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                deliver_f32(&shared, data);
            },
            error_callback(state),
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: capture at device's native config, convert in software.
        // Some PipeWire-ALSA setups accept non-native configs but never deliver data.
        self.build_stream_native(state)
    }

    /// Build a stream using the device's default/native config, with software
    /// channel mixing (stereo to mono) and resampling (native rate to 16kHz).
    fn build_stream_native<C: FrameConsumer>(
        &self,
        state: &Arc<Mutex<CaptureState<C>>>,
    ) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| OneiroError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;

        let stream_config: cpal::StreamConfig = default_config.clone().into();

        eprintln!(
            "oneiro: using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let shared = Arc::clone(state);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted =
                            convert_to_mono_i16(data, native_channels, native_rate, target_rate);
                        deliver_i16(&shared, &converted);
                    },
                    error_callback(state),
                    None,
                )
                .map_err(|e| OneiroError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let i16_data: Vec<i16> = data.iter().map(|&s| quantize(s)).collect();
                        let converted = convert_to_mono_i16(
                            &i16_data,
                            native_channels,
                            native_rate,
                            target_rate,
                        );
                        deliver_i16(&shared, &converted);
                    },
                    error_callback(state),
                    None,
                )
                .map_err(|e| OneiroError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            fmt => Err(OneiroError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device with --device.",
                    fmt
                ),
            }),
        }
    }
}

/// Hand i16 samples to the assembler, emitting any completed frames.
fn deliver_i16<C: FrameConsumer>(state: &Arc<Mutex<CaptureState<C>>>, data: &[i16]) {
    if let Ok(mut guard) = state.lock() {
        let CaptureState {
            assembler,
            consumer,
            ended,
        } = &mut *guard;
        if *ended {
            return;
        }
        assembler.push_i16(data, |frame| consumer.frame(frame));
    }
}

/// Hand f32 samples to the assembler, emitting any completed frames.
fn deliver_f32<C: FrameConsumer>(state: &Arc<Mutex<CaptureState<C>>>, data: &[f32]) {
    if let Ok(mut guard) = state.lock() {
        let CaptureState {
            assembler,
            consumer,
            ended,
        } = &mut *guard;
        if *ended {
            return;
        }
        assembler.push_f32(data, |frame| consumer.frame(frame));
    }
}

/// Build the stream error callback.
///
/// A vanished device ends the stream for good, so the consumer is told once.
/// Other backend errors can be transient and are only logged.
fn error_callback<C: FrameConsumer>(
    state: &Arc<Mutex<CaptureState<C>>>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let state = Arc::clone(state);
    move |err| {
        eprintln!("oneiro: audio stream error: {}", err);
        if matches!(err, cpal::StreamError::DeviceNotAvailable)
            && let Ok(mut guard) = state.lock()
            && !guard.ended
        {
            guard.ended = true;
            guard.consumer.stream_ended();
        }
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn convert_to_mono_i16(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    // Mix to mono by averaging channels
    let mono: Vec<i16> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    // Resample if needed
    if source_rate == target_rate {
        mono
    } else {
        crate::audio::wav::resample(&mono, source_rate, target_rate)
    }
}

/// Handle to a running capture stream.
///
/// Frames keep flowing to the consumer until [`CaptureStream::release`] is
/// called or the handle is dropped.
pub struct CaptureStream {
    stream: Option<SendableStream>,
    device_name: String,
}

impl CaptureStream {
    /// Name of the device backing the stream.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Whether the underlying stream has already been released.
    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Stop capturing and drop the underlying stream.
    ///
    /// Idempotent. Failures to pause are logged and swallowed since the
    /// stream is being torn down either way.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.0.pause()
        {
            eprintln!("oneiro: failed to stop audio stream: {}", e);
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}
