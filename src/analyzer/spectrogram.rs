use rustfft::{FftPlanner, num_complex::Complex};
use serde::Deserialize;
use std::f32::consts::PI;

use super::AnalyzeError;

/// Window/hop settings for the short-time Fourier transform.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Samples per analysis window.
    pub window_size: usize,
    /// Samples between consecutive window starts. 1/4 window keeps 75% overlap.
    pub hop_size: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            hop_size: 1024,
        }
    }
}

impl SpectrogramConfig {
    pub fn validate(&self) -> Result<(), AnalyzeError> {
        if self.window_size < 2 {
            return Err(AnalyzeError::InvalidInput(format!(
                "window size must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(AnalyzeError::InvalidInput(format!(
                "hop size must be in 1..={}, got {}",
                self.window_size, self.hop_size
            )));
        }
        Ok(())
    }

    /// Number of frames produced for `sample_count` samples.
    /// Input shorter than one window is padded to a single frame.
    pub fn frame_count(&self, sample_count: usize) -> usize {
        if sample_count <= self.window_size {
            1
        } else {
            (sample_count - self.window_size) / self.hop_size + 1
        }
    }
}

/// Magnitude spectrogram: `frames[t][bin]`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub window_size: usize,
    pub hop_size: usize,
}

impl Spectrogram {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Bins per frame (`window_size / 2`, the Nyquist bin is dropped).
    pub fn bin_count(&self) -> usize {
        self.window_size / 2
    }

    /// Width of one frequency bin in Hz.
    pub fn bin_hz(&self) -> f64 {
        self.sample_rate as f64 / self.window_size as f64
    }

    /// Bin index containing `hz`, clamped to the bin range.
    pub fn bin_for_hz(&self, hz: f64) -> usize {
        if hz <= 0.0 {
            return 0;
        }
        ((hz / self.bin_hz()).floor() as usize).min(self.bin_count())
    }
}

/// Build a magnitude spectrogram from mono samples.
///
/// Every window is Hann-weighted before the FFT; phase is discarded.
/// Frames are computed sequentially so identical input gives identical output.
pub fn build_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    config: &SpectrogramConfig,
) -> Result<Spectrogram, AnalyzeError> {
    if samples.is_empty() {
        return Err(AnalyzeError::InvalidInput("no samples".into()));
    }
    if sample_rate == 0 {
        return Err(AnalyzeError::InvalidInput("sample rate must be > 0".into()));
    }
    config.validate()?;

    let n = config.window_size;
    let frame_count = config.frame_count(samples.len());
    let window = hann_window(n);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); n];

    let mut frames = Vec::with_capacity(frame_count);
    for t in 0..frame_count {
        let start = t * config.hop_size;
        let end = (start + n).min(samples.len());
        let segment = &samples[start..end];

        for (i, slot) in buffer.iter_mut().enumerate() {
            let v = segment.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(v * window[i], 0.0);
        }

        fft.process_with_scratch(&mut buffer, &mut scratch);

        let mags: Vec<f32> = buffer[..n / 2].iter().map(|c| c.norm()).collect();
        frames.push(mags);
    }

    log::trace!(
        "spectrogram: {} samples -> {} frames x {} bins",
        samples.len(),
        frames.len(),
        n / 2
    );

    Ok(Spectrogram {
        frames,
        sample_rate,
        window_size: n,
        hop_size: config.hop_size,
    })
}

fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1.0)).cos()))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sine(freq: f32, secs: f32, rate: u32) -> Vec<f32> {
        let len = (secs * rate as f32) as usize;
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_frame_count_five_second_tone() {
        let samples = sine(440.0, 5.0, 44100);
        assert_eq!(samples.len(), 220_500);
        let spec = build_spectrogram(&samples, 44100, &SpectrogramConfig::default()).unwrap();
        assert_eq!(spec.frame_count(), 213);
        assert!(spec.frames.iter().all(|f| f.len() == 2048));
    }

    #[test]
    fn test_tone_energy_lands_in_expected_bin() {
        let samples = sine(440.0, 1.0, 44100);
        let spec = build_spectrogram(&samples, 44100, &SpectrogramConfig::default()).unwrap();
        let frame = &spec.frames[3];
        let (best, _) = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        // 440 / (44100 / 4096) = 40.87
        assert_eq!(best, 41);
        assert_eq!(spec.bin_for_hz(440.0), 40);
    }

    #[test]
    fn test_short_input_padded_to_one_frame() {
        let samples = vec![0.25; 100];
        let spec = build_spectrogram(&samples, 44100, &SpectrogramConfig::default()).unwrap();
        assert_eq!(spec.frame_count(), 1);
        assert_eq!(spec.bin_count(), 2048);
    }

    #[test]
    fn test_deterministic() {
        let samples = sine(1234.0, 0.5, 22050);
        let cfg = SpectrogramConfig::default();
        let a = build_spectrogram(&samples, 22050, &cfg).unwrap();
        let b = build_spectrogram(&samples, 22050, &cfg).unwrap();
        assert_eq!(a.frames, b.frames);
    }

    #[test]
    fn test_rejects_empty_and_zero_rate() {
        let cfg = SpectrogramConfig::default();
        assert!(matches!(
            build_spectrogram(&[], 44100, &cfg),
            Err(AnalyzeError::InvalidInput(_))
        ));
        assert!(matches!(
            build_spectrogram(&[0.1, 0.2], 0, &cfg),
            Err(AnalyzeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_bad_hop() {
        let cfg = SpectrogramConfig {
            window_size: 1024,
            hop_size: 0,
        };
        assert!(build_spectrogram(&[0.0; 2048], 44100, &cfg).is_err());
        let cfg = SpectrogramConfig {
            window_size: 1024,
            hop_size: 2048,
        };
        assert!(cfg.validate().is_err());
    }
}
