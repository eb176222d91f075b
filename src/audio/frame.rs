//! Audio frame type and fixed-size block assembly.

use std::time::Instant;

/// A fixed-size block of captured audio samples.
///
/// Immutable once produced; ownership moves from the producer through the
/// encode worker to the session sender and is never retained after the send.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
    /// Timestamp when the block was completed.
    pub timestamp: Instant,
    /// Sequence number for ordering and gap detection.
    pub sequence: u64,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(samples: Vec<i16>, timestamp: Instant, sequence: u64) -> Self {
        Self {
            samples,
            timestamp,
            sequence,
        }
    }

    /// Peak amplitude of this frame, normalized to 0.0..=1.0.
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|s| (*s as i32).abs())
            .max()
            .unwrap_or(0) as f32
            / 32768.0
    }
}

/// Quantize a float sample in nominal range [-1.0, 1.0] to signed 16-bit.
///
/// Scales by 32768 and clamps the product to the representable range, so
/// out-of-range input saturates instead of wrapping: 1.5 encodes to
/// `i16::MAX`, -1.5 to `i16::MIN`.
pub fn quantize(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Assembles arbitrary-length callback buffers into fixed-size frames.
///
/// Capture callbacks deliver whatever buffer length the device driver
/// chooses; the transcription session wants uniform blocks. The assembler
/// holds at most one partially filled block. A partial block left over when
/// the stream ends is discarded, never delivered.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_samples: usize,
    pending: Vec<i16>,
    sequence: u64,
}

impl FrameAssembler {
    /// Creates an assembler producing frames of `frame_samples` samples.
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
            sequence: 0,
        }
    }

    /// Feed i16 samples; `emit` is invoked once per completed frame.
    pub fn push_i16(&mut self, samples: &[i16], mut emit: impl FnMut(AudioFrame)) {
        for &sample in samples {
            self.push_sample(sample, &mut emit);
        }
    }

    /// Feed float samples, quantizing each to i16.
    pub fn push_f32(&mut self, samples: &[f32], mut emit: impl FnMut(AudioFrame)) {
        for &sample in samples {
            self.push_sample(quantize(sample), &mut emit);
        }
    }

    /// Number of samples held in the current partial block.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn push_sample(&mut self, sample: i16, emit: &mut impl FnMut(AudioFrame)) {
        self.pending.push(sample);
        if self.pending.len() == self.frame_samples {
            let block = std::mem::replace(
                &mut self.pending,
                Vec::with_capacity(self.frame_samples),
            );
            let frame = AudioFrame::new(block, Instant::now(), self.sequence);
            self.sequence += 1;
            emit(frame);
        }
    }
}
