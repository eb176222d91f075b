//! WAV helpers: linear resampling and a capture dump writer.

use crate::error::{OneiroError, Result};
use std::path::{Path, PathBuf};

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// Writes captured frames to a WAV file for troubleshooting.
///
/// Used by `--dump-audio` to tee everything the microphone delivered, so a
/// garbled transcript can be checked against what was actually recorded.
pub struct WavDump {
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    path: PathBuf,
}

impl WavDump {
    /// Create a 16-bit mono WAV file at `path`.
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer =
            hound::WavWriter::create(path, spec).map_err(|e| OneiroError::AudioCapture {
                message: format!("Failed to create WAV dump at {}: {}", path.display(), e),
            })?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    /// Path the dump is being written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append samples to the dump.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        for &sample in samples {
            self.writer
                .write_sample(sample)
                .map_err(|e| OneiroError::AudioCapture {
                    message: format!("Failed to write WAV dump: {}", e),
                })?;
        }
        Ok(())
    }

    /// Finalize the WAV header. Must be called for the file to be readable.
    pub fn finish(self) -> Result<()> {
        self.writer
            .finalize()
            .map_err(|e| OneiroError::AudioCapture {
                message: format!("Failed to finalize WAV dump: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300, 400, 500];
        let resampled = resample(&samples, 16000, 16000);

        assert_eq!(resampled, samples);
    }

    #[test]
    fn resample_upsample_verification() {
        let samples = vec![0i16, 1000, 2000];
        let resampled = resample(&samples, 8000, 16000);

        // Upsampling from 8kHz to 16kHz should double the sample count
        assert_eq!(resampled.len(), 6);

        // Values should be interpolated
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn resample_downsample_verification() {
        let samples = vec![0i16; 3200]; // 200ms at 16kHz
        let resampled = resample(&samples, 16000, 8000);

        // Downsampling from 16kHz to 8kHz should halve the sample count
        assert_eq!(resampled.len(), 1600);
    }

    #[test]
    fn resample_handles_edge_cases() {
        // Empty input
        let empty = resample(&[], 16000, 8000);
        assert_eq!(empty.len(), 0);

        // Single sample
        let single = resample(&[100i16], 16000, 8000);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0], 100);
    }

    #[test]
    fn resample_preserves_signal_amplitude() {
        let samples = vec![1000i16; 44100]; // 1 second at 44.1kHz
        let resampled = resample(&samples, 44100, 16000);

        assert!(resampled.len() >= 15900 && resampled.len() <= 16100);
        assert!(resampled.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn wav_dump_round_trips_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.wav");
        let samples = vec![0i16, 1000, -1000, i16::MAX, i16::MIN];

        let mut dump = WavDump::create(&path, 16000).unwrap();
        dump.write_samples(&samples).unwrap();
        dump.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);

        let read_back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read_back, samples);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn wav_dump_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.wav");

        let dump = WavDump::create(&path, 16000).unwrap();
        assert_eq!(dump.path(), path.as_path());
    }

    #[test]
    fn wav_dump_create_fails_for_missing_directory() {
        let result = WavDump::create(Path::new("/nonexistent/dir/dump.wav"), 16000);
        assert!(result.is_err());
    }
}
