pub mod analyzer;
pub mod config;
pub mod db;
pub mod ingest;
pub mod matcher;
pub mod scanner;
pub mod store;

/// Audio file extensions we can decode natively
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "flac"];

/// Application name for XDG paths
pub const APP_NAME: &str = "songprint";
