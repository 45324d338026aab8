use serde::{Deserialize, Serialize};
use std::fmt;

use super::AnalyzeError;
use super::peaks::Peak;

/// Bits allotted to each quantized frequency in a hash.
const FREQ_BITS: u32 = 10;
/// Bits allotted to the anchor→target frame delta.
const DELTA_BITS: u32 = 12;
/// Right shift applied to bin indices before packing (4096-sample windows give 2048 bins).
const FREQ_SHIFT: u32 = 1;

const FREQ_MAX: u32 = (1 << FREQ_BITS) - 1;
const DELTA_MAX: u32 = (1 << DELTA_BITS) - 1;

/// Opaque track identifier, supplied by whoever owns the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One hashed peak pair bound to the anchor's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: u32,
    pub track_id: TrackId,
    pub anchor_time_offset: u32,
}

/// Target-zone bounds for peak pairing.
///
/// `max_time_delta` trades shift tolerance against collision rate: larger zones see
/// more distinct deltas but pair peaks that are less likely to survive together in a
/// noisy clip. `pairs_per_anchor` trades fingerprint density against storage cost:
/// fingerprints per track grow as `peaks × pairs_per_anchor`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Largest frame distance between anchor and target.
    pub max_time_delta: u32,
    /// Targets paired with each anchor, nearest first.
    pub pairs_per_anchor: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            max_time_delta: 128,
            pairs_per_anchor: 5,
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> Result<(), AnalyzeError> {
        if self.max_time_delta == 0 || self.max_time_delta > DELTA_MAX {
            return Err(AnalyzeError::InvalidInput(format!(
                "max time delta must be in 1..={DELTA_MAX}, got {}",
                self.max_time_delta
            )));
        }
        if self.pairs_per_anchor == 0 {
            return Err(AnalyzeError::InvalidInput(
                "pairs per anchor must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn quantize_bin(bin: usize) -> u32 {
    ((bin >> FREQ_SHIFT) as u64).min(FREQ_MAX as u64) as u32
}

/// Pack an (anchor bin, target bin, frame delta) triple into a hash.
///
/// Layout, high to low: anchor bin (10) | target bin (10) | delta (12).
/// Integer-only so identical triples hash identically everywhere.
pub fn pair_hash(anchor_bin: usize, target_bin: usize, delta: u32, max_delta: u32) -> u32 {
    let delta = delta.min(max_delta).min(DELTA_MAX);
    (quantize_bin(anchor_bin) << (FREQ_BITS + DELTA_BITS))
        | (quantize_bin(target_bin) << DELTA_BITS)
        | delta
}

/// Split a hash back into (quantized anchor bin, quantized target bin, delta).
pub fn unpack_hash(hash: u32) -> (u32, u32, u32) {
    (
        hash >> (FREQ_BITS + DELTA_BITS),
        (hash >> DELTA_BITS) & FREQ_MAX,
        hash & DELTA_MAX,
    )
}

/// Pair each peak with its nearest successors and hash every pair.
///
/// Returns a de-duplicated set ordered by (anchor offset, hash).
pub fn generate_fingerprints(
    peaks: &[Peak],
    track_id: TrackId,
    config: &FingerprintConfig,
) -> Result<Vec<Fingerprint>, AnalyzeError> {
    if peaks.is_empty() {
        return Err(AnalyzeError::InvalidInput("no peaks to fingerprint".into()));
    }
    config.validate()?;

    let mut sorted: Vec<&Peak> = peaks.iter().collect();
    sorted.sort_by_key(|p| (p.frame, p.bin));

    let max_delta = config.max_time_delta as usize;
    let mut fingerprints = Vec::with_capacity(sorted.len() * config.pairs_per_anchor);

    for (i, anchor) in sorted.iter().enumerate() {
        let targets = sorted[i + 1..]
            .iter()
            .skip_while(|q| q.frame == anchor.frame)
            .take_while(|q| q.frame - anchor.frame <= max_delta)
            .take(config.pairs_per_anchor);

        for target in targets {
            let delta = (target.frame - anchor.frame) as u32;
            fingerprints.push(Fingerprint {
                hash: pair_hash(anchor.bin, target.bin, delta, config.max_time_delta),
                track_id,
                anchor_time_offset: anchor.frame as u32,
            });
        }
    }

    fingerprints.sort_by_key(|f| (f.anchor_time_offset, f.hash));
    fingerprints.dedup();

    log::trace!(
        "track {}: {} fingerprints from {} peaks",
        track_id,
        fingerprints.len(),
        peaks.len()
    );
    Ok(fingerprints)
}
