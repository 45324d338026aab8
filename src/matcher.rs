use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalyzeError;
use crate::analyzer::hashing::{Fingerprint, TrackId};
use crate::store::FingerprintStore;

/// Acceptance thresholds for a candidate's winning bucket.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Votes the top bucket must exceed.
    pub min_votes: u32,
    /// Fraction of the query's fingerprints the top bucket must exceed.
    pub min_vote_fraction: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_votes: 8,
            min_vote_fraction: 0.02,
        }
    }
}

/// A ranked recognition candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub track_id: TrackId,
    /// Stored anchor minus query anchor, in frames, for the winning bucket.
    pub offset_delta: i64,
    pub vote_count: u32,
    pub confident: bool,
}

impl MatchCandidate {
    /// Where the query starts inside the matched track, in seconds.
    pub fn offset_secs(&self, frame_secs: f64) -> f64 {
        self.offset_delta as f64 * frame_secs
    }
}

/// Rank catalog tracks by how many query fingerprints agree on one time alignment.
///
/// A true match piles its votes on a single offset delta; chance hash collisions
/// scatter. Returns every track that shares at least one hash, best first; an empty
/// vec means nothing matched.
pub fn recognize<S: FingerprintStore + ?Sized>(
    store: &S,
    query: &[Fingerprint],
    config: &MatcherConfig,
) -> Result<Vec<MatchCandidate>, AnalyzeError> {
    if query.is_empty() {
        return Err(AnalyzeError::InvalidInput("empty query".into()));
    }

    let hashes: Vec<u32> = query
        .iter()
        .map(|f| f.hash)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let hits = store.lookup(&hashes)?;

    let mut votes: HashMap<(TrackId, i64), u32> = HashMap::new();
    for fp in query {
        let Some(points) = hits.get(&fp.hash) else {
            continue;
        };
        for p in points {
            let delta = p.anchor_time_offset as i64 - fp.anchor_time_offset as i64;
            *votes.entry((p.track_id, delta)).or_insert(0) += 1;
        }
    }

    // best bucket per track; ties go to the smaller delta
    let mut best: HashMap<TrackId, (i64, u32)> = HashMap::new();
    for (&(track_id, delta), &count) in &votes {
        best.entry(track_id)
            .and_modify(|b| {
                if count > b.1 || (count == b.1 && delta < b.0) {
                    *b = (delta, count);
                }
            })
            .or_insert((delta, count));
    }

    let relative_floor = config.min_vote_fraction * query.len() as f64;
    let mut candidates: Vec<MatchCandidate> = best
        .into_iter()
        .map(|(track_id, (offset_delta, vote_count))| MatchCandidate {
            track_id,
            offset_delta,
            vote_count,
            confident: vote_count > config.min_votes && vote_count as f64 > relative_floor,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then(a.track_id.cmp(&b.track_id))
    });

    log::debug!(
        "{} query fingerprints, {} distinct hashes, {} candidate tracks",
        query.len(),
        hashes.len(),
        candidates.len()
    );
    Ok(candidates)
}

/// The top-ranked candidate, if it is confident.
pub fn best_match(candidates: &[MatchCandidate]) -> Option<&MatchCandidate> {
    candidates.first().filter(|c| c.confident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tests::{RATE, melody};
    use crate::analyzer::{AnalysisConfig, fingerprint_samples};
    use crate::db::models::TrackMetadata;
    use crate::store::MemoryStore;

    fn fp(hash: u32, anchor: u32) -> Fingerprint {
        Fingerprint {
            hash,
            track_id: TrackId(0),
            anchor_time_offset: anchor,
        }
    }

    fn store_with(tracks: &[(u32, Vec<(u32, u32)>)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (id, points) in tracks {
            store
                .register_track(TrackId(*id), &TrackMetadata::new(format!("T{id}"), "X"))
                .unwrap();
            let batch: Vec<Fingerprint> = points
                .iter()
                .map(|&(hash, anchor)| Fingerprint {
                    hash,
                    track_id: TrackId(*id),
                    anchor_time_offset: anchor,
                })
                .collect();
            store.put(&batch).unwrap();
        }
        store
    }

    #[test]
    fn test_aligned_votes_beat_scattered_ones() {
        // track 1: hashes 1..=10 at anchors 100.., i.e. a constant delta of 100
        // track 2: the same hashes at scattered anchors
        let aligned: Vec<(u32, u32)> = (1..=10).map(|h| (h, 100 + h)).collect();
        let scattered: Vec<(u32, u32)> = (1..=10).map(|h| (h, h * 37)).collect();
        let store = store_with(&[(1, aligned), (2, scattered)]);

        let query: Vec<Fingerprint> = (1..=10).map(|h| fp(h, h)).collect();
        let cfg = MatcherConfig {
            min_votes: 5,
            min_vote_fraction: 0.1,
        };
        let result = recognize(&store, &query, &cfg).unwrap();

        assert_eq!(result[0].track_id, TrackId(1));
        assert_eq!(result[0].offset_delta, 100);
        assert_eq!(result[0].vote_count, 10);
        assert!(result[0].confident);
        assert_eq!(result[1].track_id, TrackId(2));
        assert_eq!(result[1].vote_count, 1);
        assert!(!result[1].confident);
        assert_eq!(best_match(&result).unwrap().track_id, TrackId(1));
    }

    #[test]
    fn test_ties_ranked_by_track_id() {
        let points: Vec<(u32, u32)> = (1..=4).map(|h| (h, h)).collect();
        let store = store_with(&[(9, points.clone()), (3, points)]);
        let query: Vec<Fingerprint> = (1..=4).map(|h| fp(h, h)).collect();

        let result = recognize(&store, &query, &MatcherConfig::default()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].track_id, TrackId(3));
        assert_eq!(result[1].track_id, TrackId(9));
        assert_eq!(result[0].vote_count, result[1].vote_count);
    }

    #[test]
    fn test_relative_threshold() {
        let points: Vec<(u32, u32)> = (1..=10).map(|h| (h, h)).collect();
        let store = store_with(&[(1, points)]);

        // 10 aligned votes out of 1000 query fingerprints
        let query: Vec<Fingerprint> = (1..=1000).map(|h| fp(h, h)).collect();
        let cfg = MatcherConfig {
            min_votes: 5,
            min_vote_fraction: 0.05,
        };
        let result = recognize(&store, &query, &cfg).unwrap();
        assert_eq!(result[0].vote_count, 10);
        assert!(!result[0].confident);
        assert!(best_match(&result).is_none());
    }

    #[test]
    fn test_unknown_hashes_give_empty_result() {
        let store = store_with(&[(1, vec![(1, 1), (2, 2)])]);
        let query = vec![fp(500, 0), fp(501, 3)];
        let result = recognize(&store, &query, &MatcherConfig::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_query_is_invalid() {
        let store = MemoryStore::new();
        assert!(matches!(
            recognize(&store, &[], &MatcherConfig::default()),
            Err(AnalyzeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_offset_secs() {
        let c = MatchCandidate {
            track_id: TrackId(1),
            offset_delta: 43,
            vote_count: 20,
            confident: true,
        };
        let secs = c.offset_secs(1024.0 / 44100.0);
        assert!((secs - 0.998).abs() < 0.001);
    }

    #[test]
    fn test_recognizes_subsegment_of_song() {
        let cfg = AnalysisConfig::default();
        let song_a = melody(1, 20.0);
        let song_b = melody(2, 20.0);

        let store = MemoryStore::new();
        for (id, samples) in [(1u32, &song_a), (2u32, &song_b)] {
            let secs = samples.len() as f64 / RATE as f64;
            let fps = fingerprint_samples(samples, RATE, secs, TrackId(id), &cfg).unwrap();
            store
                .register_track(TrackId(id), &TrackMetadata::new(format!("Song {id}"), "Test"))
                .unwrap();
            store.put(&fps).unwrap();
        }

        // 6 seconds of song A starting at frame 200
        let start = 200 * cfg.spectrogram.hop_size;
        let clip = &song_a[start..start + 6 * RATE as usize];
        let query = fingerprint_samples(clip, RATE, 6.0, TrackId(0), &cfg).unwrap();

        let result = recognize(&store, &query, &MatcherConfig::default()).unwrap();
        assert_eq!(result[0].track_id, TrackId(1));
        assert_eq!(result[0].offset_delta, 200);
        assert!(result[0].confident);

        if let Some(b) = result.iter().find(|c| c.track_id == TrackId(2)) {
            assert!(result[0].vote_count > b.vote_count);
        }
    }
}
