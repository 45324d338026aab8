use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::analyzer::AnalysisConfig;
use crate::analyzer::hashing::FingerprintConfig;
use crate::analyzer::peaks::PeakConfig;
use crate::analyzer::spectrogram::SpectrogramConfig;
use crate::matcher::MatcherConfig;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to scan for audio files (used when `scan` has no CLI args).
    pub music_dirs: Vec<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    pub spectrogram: SpectrogramConfig,
    pub peaks: PeakConfig,
    pub fingerprint: FingerprintConfig,
    pub matcher: MatcherConfig,
}

impl AppConfig {
    /// Load config from `~/.config/songprint/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                return Self::default();
            }
        };

        let config = match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                return Self::default();
            }
        };

        if let Err(e) = config.analysis().validate() {
            log::warn!("Invalid settings in {}: {}. Using defaults.", path.display(), e);
            return Self::default();
        }

        log::info!("Loaded config from {}", path.display());
        config
    }

    /// The pipeline settings as one bundle.
    pub fn analysis(&self) -> AnalysisConfig {
        AnalysisConfig {
            spectrogram: self.spectrogram.clone(),
            peaks: self.peaks.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("songprint.db")
    } else {
        // Fallback: current directory
        PathBuf::from("songprint.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let (_dir, path) = write(
            "
            workers = 3

            [fingerprint]
            pairs_per_anchor = 8

            [matcher]
            min_votes = 20
            ",
        );
        let config = AppConfig::load_from(&path);
        assert_eq!(config.resolve_workers(), 3);
        assert_eq!(config.fingerprint.pairs_per_anchor, 8);
        assert_eq!(config.fingerprint.max_time_delta, 128);
        assert_eq!(config.matcher.min_votes, 20);
        assert_eq!(config.spectrogram.window_size, 4096);
    }

    #[test]
    fn test_bad_toml_falls_back() {
        let (_dir, path) = write("workers = \"many\"");
        let config = AppConfig::load_from(&path);
        assert_eq!(config.workers, 0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let (_dir, path) = write("[spectrogram]\nhop_size = 0\n");
        let config = AppConfig::load_from(&path);
        assert_eq!(config.spectrogram.hop_size, 1024);
    }

    #[test]
    fn test_auto_workers_at_least_one() {
        assert!(AppConfig::default().resolve_workers() >= 1);
    }
}
