use serde::Deserialize;

use super::AnalyzeError;
use super::spectrogram::Spectrogram;

/// Upper bound accepted for `max_duration_secs` (24 hours).
pub const MAX_DURATION_LIMIT_SECS: f64 = 24.0 * 60.0 * 60.0;

/// A locally dominant time-frequency bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frame: usize,
    pub bin: usize,
    pub magnitude: f32,
}

/// Peak picking parameters.
///
/// The defaults were tuned against 44.1 kHz material with a 4096/1024 spectrogram;
/// all of them are worth revisiting against a reference corpus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Band boundaries in Hz, ascending. N edges give N-1 bands.
    pub band_edges_hz: Vec<f64>,
    /// Half-width (in frames) of the rolling average used for the adaptive threshold.
    pub rolling_window_frames: usize,
    /// A champion must exceed this multiple of its band's rolling average.
    pub threshold_coefficient: f32,
    /// Absolute floor; champions at or below it are treated as silence.
    pub min_magnitude: f32,
    /// Tracks longer than this are truncated before peak picking.
    pub max_duration_secs: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            band_edges_hz: vec![0.0, 110.0, 220.0, 440.0, 880.0, 1760.0, 5500.0],
            rolling_window_frames: 20,
            threshold_coefficient: 1.5,
            min_magnitude: 1e-4,
            max_duration_secs: 20.0 * 60.0,
        }
    }
}

impl PeakConfig {
    pub fn validate(&self) -> Result<(), AnalyzeError> {
        if self.band_edges_hz.len() < 2 {
            return Err(AnalyzeError::InvalidInput(
                "need at least two band edges".into(),
            ));
        }
        if self.band_edges_hz.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(AnalyzeError::InvalidInput(format!(
                "band edges must be strictly ascending: {:?}",
                self.band_edges_hz
            )));
        }
        if !self.threshold_coefficient.is_finite() || self.threshold_coefficient < 0.0 {
            return Err(AnalyzeError::InvalidInput(format!(
                "invalid threshold coefficient {}",
                self.threshold_coefficient
            )));
        }
        if !(self.max_duration_secs > 0.0 && self.max_duration_secs <= MAX_DURATION_LIMIT_SECS) {
            return Err(AnalyzeError::InvalidInput(format!(
                "max duration must be in (0, {}] seconds, got {}",
                MAX_DURATION_LIMIT_SECS, self.max_duration_secs
            )));
        }
        Ok(())
    }
}

/// Per-band bookkeeping for one extraction pass.
struct Band {
    start: usize,
    end: usize,
    /// Running sum of per-frame band averages: `prefix[t]` covers frames `0..t`.
    prefix: Vec<f64>,
    /// (bin, magnitude) of the loudest bin in each frame.
    champions: Vec<(usize, f32)>,
}

impl Band {
    fn new(spec: &Spectrogram, start: usize, end: usize, frames: usize) -> Self {
        let mut prefix = Vec::with_capacity(frames + 1);
        let mut champions = Vec::with_capacity(frames);
        prefix.push(0.0);

        for frame in &spec.frames[..frames] {
            let slice = &frame[start..end];
            let mut best = (start, slice[0]);
            let mut sum = 0.0_f64;
            for (i, &m) in slice.iter().enumerate() {
                sum += m as f64;
                // strict > keeps the lowest bin on ties
                if m > best.1 {
                    best = (start + i, m);
                }
            }
            let last = prefix[prefix.len() - 1];
            prefix.push(last + sum / slice.len() as f64);
            champions.push(best);
        }

        Self {
            start,
            end,
            prefix,
            champions,
        }
    }

    /// Mean band magnitude over frames `[t - w, t + w]`, clipped to what exists.
    fn rolling_mean(&self, t: usize, w: usize) -> f64 {
        let frames = self.champions.len();
        let lo = t.saturating_sub(w);
        let hi = (t + w + 1).min(frames);
        (self.prefix[hi] - self.prefix[lo]) / (hi - lo) as f64
    }
}

/// Pick peaks from a spectrogram.
///
/// Only frames covering the first `duration_secs` (capped at `max_duration_secs`) are
/// considered. Output is ordered by frame, then bin.
pub fn extract_peaks(
    spec: &Spectrogram,
    duration_secs: f64,
    config: &PeakConfig,
) -> Result<Vec<Peak>, AnalyzeError> {
    if spec.frame_count() == 0 {
        return Err(AnalyzeError::InvalidInput("spectrogram has no frames".into()));
    }
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(AnalyzeError::InvalidInput(format!(
            "invalid duration {duration_secs}"
        )));
    }
    if let Some(t) = spec.frames.iter().position(|f| f.len() < spec.bin_count()) {
        return Err(AnalyzeError::InvalidInput(format!(
            "frame {} has {} bins, expected {}",
            t,
            spec.frames[t].len(),
            spec.bin_count()
        )));
    }
    config.validate()?;

    // clamp in f64 so the cast can't saturate
    let capped = duration_secs.min(config.max_duration_secs);
    let last_frame = (capped * spec.sample_rate as f64 / spec.hop_size as f64)
        .floor()
        .min((spec.frame_count() - 1) as f64);
    let frames = last_frame as usize + 1;
    if frames < spec.frame_count() {
        log::debug!(
            "peak extraction truncated to {} of {} frames",
            frames,
            spec.frame_count()
        );
    }

    let bands: Vec<Band> = config
        .band_edges_hz
        .windows(2)
        .map(|w| (spec.bin_for_hz(w[0]), spec.bin_for_hz(w[1])))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| Band::new(spec, start, end, frames))
        .collect();

    if bands.is_empty() {
        log::warn!("no frequency band fits inside {} bins", spec.bin_count());
        return Ok(Vec::new());
    }

    let coef = config.threshold_coefficient as f64;
    let mut peaks = Vec::new();

    for t in 0..frames {
        let frame_mean = bands.iter().map(|b| b.champions[t].1 as f64).sum::<f64>()
            / bands.len() as f64;

        for band in &bands {
            let (bin, magnitude) = band.champions[t];
            let m = magnitude as f64;
            if m <= config.min_magnitude as f64 || m < frame_mean {
                continue;
            }
            if m <= coef * band.rolling_mean(t, config.rolling_window_frames) {
                continue;
            }
            debug_assert!(bin >= band.start && bin < band.end);
            peaks.push(Peak {
                frame: t,
                bin,
                magnitude,
            });
        }
    }

    log::trace!("{} peaks from {} frames", peaks.len(), frames);
    Ok(peaks)
}
