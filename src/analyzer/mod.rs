pub mod decode;
pub mod hashing;
pub mod peaks;
pub mod spectrogram;

use hashing::{Fingerprint, FingerprintConfig, TrackId};
use peaks::PeakConfig;
use serde::Deserialize;
use spectrogram::SpectrogramConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything the sample → fingerprint pipeline needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub spectrogram: SpectrogramConfig,
    pub peaks: PeakConfig,
    pub fingerprint: FingerprintConfig,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), AnalyzeError> {
        self.spectrogram.validate()?;
        self.peaks.validate()?;
        self.fingerprint.validate()?;
        Ok(())
    }

    /// Seconds covered by one spectrogram frame at `sample_rate`.
    pub fn frame_secs(&self, sample_rate: u32) -> f64 {
        self.spectrogram.hop_size as f64 / sample_rate as f64
    }
}

/// Run build → extract → generate on one track's samples.
///
/// Holds no state between calls, so independent tracks can run on separate threads.
pub fn fingerprint_samples(
    samples: &[f32],
    sample_rate: u32,
    duration_secs: f64,
    track_id: TrackId,
    config: &AnalysisConfig,
) -> Result<Vec<Fingerprint>, AnalyzeError> {
    let spec = spectrogram::build_spectrogram(samples, sample_rate, &config.spectrogram)?;
    let peaks = peaks::extract_peaks(&spec, duration_secs, &config.peaks)?;
    if peaks.is_empty() {
        return Err(AnalyzeError::InvalidInput(format!(
            "no spectral peaks found in {} samples (silent input?)",
            samples.len()
        )));
    }
    hashing::generate_fingerprints(&peaks, track_id, &config.fingerprint)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::f32::consts::PI;

    pub(crate) const RATE: u32 = 44100;
    pub(crate) const HOP: usize = 1024;

    /// Tiny deterministic generator so test signals don't need a rand dependency.
    pub(crate) struct Lcg(u64);

    impl Lcg {
        pub(crate) fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    /// A "melody": three simultaneous tones in different octaves that change every
    /// quarter second, picked from a seed. Different seeds give different songs.
    pub(crate) fn melody(seed: u64, secs: f32) -> Vec<f32> {
        let mut rng = Lcg(seed);
        let note_len = RATE as usize / 4;
        let total = (secs * RATE as f32) as usize;
        let mut out = Vec::with_capacity(total);
        let octaves = [(60.0, 100.0), (230.0, 420.0), (900.0, 1700.0)];

        while out.len() < total {
            let freqs: Vec<f32> = octaves
                .iter()
                .map(|&(lo, hi): &(f32, f32)| lo + (rng.next() % 1000) as f32 / 1000.0 * (hi - lo))
                .collect();
            for i in 0..note_len {
                if out.len() == total {
                    break;
                }
                let t = i as f32 / RATE as f32;
                let v: f32 = freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum();
                out.push(v * 0.25);
            }
        }
        out
    }

    fn run(samples: &[f32], id: u32) -> Vec<Fingerprint> {
        let secs = samples.len() as f64 / RATE as f64;
        fingerprint_samples(samples, RATE, secs, TrackId(id), &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let samples = melody(11, 6.0);
        let a = run(&samples, 3);
        let b = run(&samples, 3);
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_pure_tone_fingerprints_repeat() {
        let samples = crate::analyzer::spectrogram::tests::sine(440.0, 5.0, RATE);
        let fps = run(&samples, 1);
        assert!(!fps.is_empty());

        let distinct: HashSet<u32> = fps.iter().map(|f| f.hash).collect();
        assert!(distinct.len() < fps.len() / 10, "{} distinct of {}", distinct.len(), fps.len());
    }

    #[test]
    fn test_silent_prefix_shifts_anchors_only() {
        let clip = melody(5, 6.0);
        let prefix_frames = 40;
        let mut padded = vec![0.0; prefix_frames * HOP];
        padded.extend_from_slice(&clip);

        let plain = run(&clip, 1);
        let shifted = run(&padded, 1);

        let plain_set: HashSet<(u32, u32)> = plain
            .iter()
            .map(|f| (f.hash, f.anchor_time_offset + prefix_frames as u32))
            .collect();
        let shifted_set: HashSet<(u32, u32)> =
            shifted.iter().map(|f| (f.hash, f.anchor_time_offset)).collect();

        let shared = plain_set.intersection(&shifted_set).count();
        assert!(
            shared as f64 >= plain_set.len() as f64 * 0.8,
            "only {} of {} fingerprints survived the shift",
            shared,
            plain_set.len()
        );
    }

    #[test]
    fn test_silence_is_invalid_input() {
        let samples = vec![0.0; RATE as usize];
        let err = fingerprint_samples(&samples, RATE, 1.0, TrackId(1), &AnalysisConfig::default())
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidInput(_)));
    }
}
