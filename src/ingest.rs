use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use crate::analyzer::decode;
use crate::analyzer::hashing::{Fingerprint, TrackId};
use crate::analyzer::{AnalysisConfig, AnalyzeError, fingerprint_samples};
use crate::db::models::TrackMetadata;
use crate::matcher::{self, MatchCandidate, MatcherConfig};
use crate::store::FingerprintStore;

/// Fingerprint one track and persist it: generate → register → put.
///
/// Invalid audio is rejected before anything is written. A store failure part-way
/// through is returned as-is; calling again with the same input is safe because
/// both `register_track` and `put` are idempotent. Returns the fingerprint count.
pub fn ingest_track<S: FingerprintStore + ?Sized>(
    store: &S,
    samples: &[f32],
    sample_rate: u32,
    duration_secs: f64,
    track_id: TrackId,
    metadata: &TrackMetadata,
    config: &AnalysisConfig,
) -> Result<usize, AnalyzeError> {
    let fingerprints = fingerprint_samples(samples, sample_rate, duration_secs, track_id, config)?;
    store_track(store, track_id, metadata, &fingerprints)?;
    Ok(fingerprints.len())
}

/// Like [`ingest_track`], but first drops whatever the store already holds for
/// `track_id`, so fingerprints of a previous recording cannot linger under the id.
///
/// The new audio is fingerprinted before anything is deleted; invalid input leaves the
/// old track untouched.
pub fn replace_track<S: FingerprintStore + ?Sized>(
    store: &S,
    samples: &[f32],
    sample_rate: u32,
    duration_secs: f64,
    track_id: TrackId,
    metadata: &TrackMetadata,
    config: &AnalysisConfig,
) -> Result<usize, AnalyzeError> {
    let fingerprints = fingerprint_samples(samples, sample_rate, duration_secs, track_id, config)?;
    purge_track(store, track_id)?;
    store_track(store, track_id, metadata, &fingerprints)?;
    Ok(fingerprints.len())
}

fn purge_track<S: FingerprintStore + ?Sized>(store: &S, track_id: TrackId) -> Result<(), AnalyzeError> {
    if store.remove_track(track_id)? {
        log::info!("Purged previous fingerprints for track {}", track_id);
    }
    Ok(())
}

fn store_track<S: FingerprintStore + ?Sized>(
    store: &S,
    track_id: TrackId,
    metadata: &TrackMetadata,
    fingerprints: &[Fingerprint],
) -> Result<(), AnalyzeError> {
    store.register_track(track_id, metadata)?;
    store.put(fingerprints)?;
    log::info!(
        "Stored {} fingerprints for track {} ({} — {})",
        fingerprints.len(),
        track_id,
        metadata.title,
        metadata.artist
    );
    Ok(())
}

/// Fingerprint a clip and rank catalog tracks against it.
pub fn identify<S: FingerprintStore + ?Sized>(
    store: &S,
    samples: &[f32],
    sample_rate: u32,
    analysis: &AnalysisConfig,
    matching: &MatcherConfig,
) -> Result<Vec<MatchCandidate>, AnalyzeError> {
    let duration = samples.len() as f64 / sample_rate.max(1) as f64;
    let query = fingerprint_samples(samples, sample_rate, duration, TrackId::default(), analysis)?;
    matcher::recognize(store, &query, matching)
}

/// A local file to add to the catalog under a caller-chosen id.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub track_id: TrackId,
    pub path: PathBuf,
    pub metadata: TrackMetadata,
    /// Drop the track's existing fingerprints before storing the new ones.
    pub replace: bool,
}

pub struct IngestResult {
    pub ingested: u64,
    pub failed: u64,
    pub fingerprints: u64,
}

struct Prepared {
    track_id: TrackId,
    replace: bool,
    metadata: TrackMetadata,
    fingerprints: Vec<Fingerprint>,
}

/// Ingest files in parallel using rayon.
///
/// Works in chunks: decode + fingerprint a chunk on the pool, then write that chunk's
/// results to the store from this thread before starting the next. Memory stays
/// bounded and every finished chunk is durable. Per-file failures are logged and
/// counted; they don't stop the batch.
pub fn ingest_batch<S: FingerprintStore + ?Sized>(
    store: &S,
    requests: &[IngestRequest],
    jobs: usize,
    config: &AnalysisConfig,
) -> Result<IngestResult, AnalyzeError> {
    config.validate()?;

    let mut result = IngestResult {
        ingested: 0,
        failed: 0,
        fingerprints: 0,
    };
    if requests.is_empty() {
        log::info!("No files to ingest");
        return Ok(result);
    }

    let jobs = jobs.max(1);
    log::info!("Ingesting {} files with {} workers", requests.len(), jobs);

    let pb = ProgressBar::new(requests.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    for chunk in requests.chunks(jobs * 2) {
        let prepared: Vec<Result<Prepared, (PathBuf, AnalyzeError)>> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|req| {
                    let r = prepare(req, config).map_err(|e| (req.path.clone(), e));
                    pb.inc(1);
                    r
                })
                .collect()
        });

        for item in prepared {
            match item {
                Ok(p) => {
                    let stored = if p.replace {
                        purge_track(store, p.track_id)
                            .and_then(|()| store_track(store, p.track_id, &p.metadata, &p.fingerprints))
                    } else {
                        store_track(store, p.track_id, &p.metadata, &p.fingerprints)
                    };
                    match stored {
                        Ok(()) => {
                            result.ingested += 1;
                            result.fingerprints += p.fingerprints.len() as u64;
                        }
                        Err(e) => {
                            log::error!("Store error for track {}: {}", p.track_id, e);
                            result.failed += 1;
                        }
                    }
                }
                Err((path, e)) => {
                    log::warn!("Fingerprinting {} failed: {}", path.display(), e);
                    result.failed += 1;
                }
            }
        }

        pb.set_message(format!("{} stored, {} failed", result.ingested, result.failed));
    }

    pb.finish_with_message(format!(
        "Done: {} ingested, {} failed",
        result.ingested, result.failed
    ));
    Ok(result)
}

/// Decode and fingerprint one file. Runs on a pool thread; touches no shared state.
fn prepare(req: &IngestRequest, config: &AnalysisConfig) -> Result<Prepared, AnalyzeError> {
    log::debug!("Fingerprinting: {}", req.path.display());
    let audio = decode::load_audio(&req.path)?;
    let duration = audio.duration_secs();
    let fingerprints =
        fingerprint_samples(&audio.samples, audio.sample_rate, duration, req.track_id, config)?;

    let mut metadata = req.metadata.clone();
    metadata.duration_secs.get_or_insert(duration);
    metadata
        .source_path
        .get_or_insert_with(|| req.path.display().to_string());

    Ok(Prepared {
        track_id: req.track_id,
        replace: req.replace,
        metadata,
        fingerprints,
    })
}
