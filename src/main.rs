use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use songprint::analyzer::decode;
use songprint::analyzer::hashing::TrackId;
use songprint::db::Database;
use songprint::db::models::TrackMetadata;
use songprint::ingest::{self, IngestRequest};
use songprint::matcher::MatchCandidate;
use songprint::store::FingerprintStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "songprint", version, about = "Acoustic fingerprinting: register songs, identify clips")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint one audio file and add it to the catalog
    Add {
        /// WAV or FLAC file
        path: PathBuf,

        /// Song title
        #[arg(long)]
        title: String,

        /// Song artist
        #[arg(long)]
        artist: String,

        /// Caller-defined reference (video id, URL, catalog number)
        #[arg(long)]
        external_ref: Option<String>,

        /// Re-fingerprint even if a song with this title and artist exists
        #[arg(long)]
        force: bool,
    },

    /// Scan directories and add every audio file ("Artist - Title.wav" naming)
    Scan {
        /// Directories to scan (defaults to config file music_dirs)
        paths: Vec<PathBuf>,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Re-fingerprint songs that are already in the catalog
        #[arg(long)]
        force: bool,
    },

    /// Add songs listed in a JSON manifest
    Import {
        /// JSON array of {path, title, artist, external_ref?}
        manifest: PathBuf,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Re-fingerprint songs that are already in the catalog
        #[arg(long)]
        force: bool,
    },

    /// Identify an audio clip against the catalog
    Identify {
        /// WAV or FLAC clip
        path: PathBuf,

        /// Number of candidates to show
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a song and its fingerprints
    Remove {
        /// Track id (see `list`)
        track_id: u32,
    },

    /// List catalog songs
    List,

    /// Show catalog statistics
    Stats,
}

#[derive(Serialize)]
struct IdentifyRow<'a> {
    rank: usize,
    title: Option<String>,
    artist: Option<String>,
    offset_secs: f64,
    #[serde(flatten)]
    candidate: &'a MatchCandidate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = songprint::config::AppConfig::load();
    let analysis = config.analysis();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli.db_path
        .or(config.db_path.clone())
        .unwrap_or_else(songprint::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Add { path, title, artist, external_ref, force } => {
            if title.trim().is_empty() || artist.trim().is_empty() {
                anyhow::bail!("--title and --artist must not be empty");
            }

            let existing = db.find_track_by_key(&title, &artist).context("Query failed")?;
            let (track_id, replace) = match existing {
                Some(t) if !force => {
                    println!(
                        "\"{}\" is already in the catalog as track {} (use --force to re-add).",
                        t.display_name(),
                        t.id
                    );
                    return Ok(());
                }
                Some(t) => (t.id, true),
                None => (db.next_track_id().context("Query failed")?, false),
            };

            let audio = decode::load_audio(&path)
                .with_context(|| format!("Failed to decode {}", path.display()))?;
            let metadata = TrackMetadata {
                title,
                artist,
                external_ref,
                duration_secs: Some(audio.duration_secs()),
                source_path: Some(path.display().to_string()),
            };

            let (samples, rate, secs) = (&audio.samples, audio.sample_rate, audio.duration_secs());
            let count = if replace {
                log::info!("Replacing track {} with {}", track_id, path.display());
                ingest::replace_track(&db, samples, rate, secs, track_id, &metadata, &analysis)
            } else {
                ingest::ingest_track(&db, samples, rate, secs, track_id, &metadata, &analysis)
            }
            .context("Ingestion failed")?;

            println!(
                "Added track {}: {} — {} ({} fingerprints)",
                track_id, metadata.title, metadata.artist, count
            );
        }

        Commands::Scan { paths, jobs, force } => {
            // Resolve scan paths: CLI args > config music_dirs
            let scan_paths = if !paths.is_empty() {
                paths
            } else if !config.music_dirs.is_empty() {
                config.music_dirs.clone()
            } else {
                anyhow::bail!(
                    "No directories to scan. Pass paths as arguments or set music_dirs in config."
                );
            };

            let files = songprint::scanner::collect_audio_files(&scan_paths);
            let songs = files
                .into_iter()
                .map(|p| {
                    let m = songprint::scanner::metadata_from_filename(&p);
                    (p, m)
                })
                .collect();

            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            run_batch(&db, songs, force, workers, &analysis)?;
        }

        Commands::Import { manifest, jobs, force } => {
            let entries = songprint::scanner::manifest::load_manifest(&manifest)
                .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
            let songs = entries
                .iter()
                .map(|e| (e.path.clone(), e.metadata()))
                .collect();

            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            run_batch(&db, songs, force, workers, &analysis)?;
        }

        Commands::Identify { path, limit, json } => {
            let audio = decode::load_audio(&path)
                .with_context(|| format!("Failed to decode {}", path.display()))?;
            let results = ingest::identify(
                &db,
                &audio.samples,
                audio.sample_rate,
                &analysis,
                &config.matcher,
            )
            .context("Identification failed")?;

            let frame_secs = analysis.frame_secs(audio.sample_rate);
            let mut rows = Vec::new();
            for (i, c) in results.iter().take(limit).enumerate() {
                let track = db.track(c.track_id).context("Query failed")?;
                rows.push(IdentifyRow {
                    rank: i + 1,
                    title: track.as_ref().map(|t| t.title.clone()),
                    artist: track.as_ref().map(|t| t.artist.clone()),
                    offset_secs: c.offset_secs(frame_secs),
                    candidate: c,
                });
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            if rows.is_empty() {
                println!("No match.");
                return Ok(());
            }
            print_identify_table(&rows);

            match songprint::matcher::best_match(&results).zip(rows.first()) {
                Some((best, top)) => println!(
                    "\nMatch: {} at {:.1}s ({} votes)",
                    top.title.as_deref().unwrap_or("?"),
                    top.offset_secs,
                    best.vote_count
                ),
                None => println!("\nNo confident match."),
            }
        }

        Commands::Remove { track_id } => {
            let id = TrackId(track_id);
            if db.remove_track(id).context("Remove failed")? {
                println!("Removed track {}.", id);
            } else {
                println!("No track with id {}.", id);
            }
        }

        Commands::List => {
            let tracks = db.list_tracks().context("Query failed")?;
            if tracks.is_empty() {
                println!("Catalog is empty.");
                return Ok(());
            }

            println!("{:>5}  {:<30} {:<25} {:>6} {:>8}", "Id", "Title", "Artist", "Min", "Prints");
            println!("{}", "-".repeat(80));
            for (t, prints) in &tracks {
                println!(
                    "{:>5}  {:<30} {:<25} {:>6.1} {:>8}",
                    t.id,
                    truncate(&t.title, 30),
                    truncate(&t.artist, 25),
                    t.duration_secs.unwrap_or(0.0) / 60.0,
                    prints
                );
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Catalog Statistics");
            println!("==================");
            println!("Tracks:           {}", stats.total_tracks);
            println!("Fingerprints:     {}", stats.total_fingerprints);
            println!("Distinct hashes:  {}", stats.distinct_hashes);
            println!("Total duration:   {:.1} hours", stats.total_duration_hours);
        }
    }

    Ok(())
}

/// Assign ids, skip known songs unless forced, then fingerprint everything in parallel.
fn run_batch(
    db: &Database,
    songs: Vec<(PathBuf, TrackMetadata)>,
    force: bool,
    workers: usize,
    analysis: &songprint::analyzer::AnalysisConfig,
) -> Result<()> {
    let mut next_id = db.next_track_id().context("Query failed")?;
    let mut requests = Vec::with_capacity(songs.len());
    let mut skipped = 0u64;

    for (path, metadata) in songs {
        let existing = db
            .find_track_by_key(&metadata.title, &metadata.artist)
            .context("Query failed")?;
        let (track_id, replace) = match existing {
            Some(_) if !force => {
                log::debug!("Skipping known song {}", path.display());
                skipped += 1;
                continue;
            }
            Some(t) => {
                log::info!("Replacing track {} with {}", t.id, path.display());
                (t.id, true)
            }
            None => {
                // two files with the same key in one batch share an id
                if let Some(prev) = requests
                    .iter()
                    .find(|r: &&IngestRequest| {
                        r.metadata.title == metadata.title && r.metadata.artist == metadata.artist
                    })
                {
                    log::warn!(
                        "{} duplicates {}; skipping",
                        path.display(),
                        prev.path.display()
                    );
                    skipped += 1;
                    continue;
                }
                let id = next_id;
                next_id = TrackId(next_id.0 + 1);
                (id, false)
            }
        };
        requests.push(IngestRequest { track_id, path, metadata, replace });
    }

    let result = ingest::ingest_batch(db, &requests, workers, analysis)
        .context("Ingestion failed")?;
    println!(
        "Ingest complete: {} added, {} skipped, {} failed ({} fingerprints)",
        result.ingested, skipped, result.failed, result.fingerprints
    );
    Ok(())
}

/// Print ranked candidates.
fn print_identify_table(rows: &[IdentifyRow<'_>]) {
    println!(
        "{:>4}  {:<30} {:<25} {:>6} {:>8}  {}",
        "Rank", "Title", "Artist", "Votes", "At (s)", "Match"
    );
    println!("{}", "-".repeat(86));

    for r in rows {
        println!(
            "{:>4}  {:<30} {:<25} {:>6} {:>8.1}  {}",
            r.rank,
            truncate(r.title.as_deref().unwrap_or("?"), 30),
            truncate(r.artist.as_deref().unwrap_or("?"), 25),
            r.candidate.vote_count,
            r.offset_secs,
            if r.candidate.confident { "yes" } else { "weak" },
        );
    }
}

/// Truncate long strings for table display.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let cut: String = s.chars().take(width - 3).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
