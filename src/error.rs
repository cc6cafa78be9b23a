//! Error types for the transcoding pipeline
//!
//! Fatal conditions abort a run (`TranscodeError`); per-record problems
//! (`RecordError`) are logged and counted but never stop a file.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A fatal error that aborts the current run
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to read input {}", path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input {} is neither a JSON array nor newline-delimited JSON", path.display())]
    DecodeInput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create output {}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write metric output")]
    WriteOutput(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filename(#[from] FilenameError),

    #[error(transparent)]
    Positions(#[from] PositionsError),
}

/// An input filename that does not follow `<stream>_<text><timestamp>Z-<text>`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("filename {file:?} has no '_' delimiting the stream name")]
    MissingStreamDelimiter { file: String },

    #[error("filename {file:?} yields an empty stream name")]
    EmptyStreamName { file: String },

    #[error("filename {file:?} has no embedded timestamp before \"Z-\"")]
    MissingTimestamp { file: String },
}

/// Failure to load or persist the watermark table
#[derive(Debug, Error)]
pub enum PositionsError {
    #[error("failed to read positions file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode positions file {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to encode positions")]
    Encode(#[source] serde_yaml::Error),

    #[error("failed to write positions file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration that is missing or cannot be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no output file provided")]
    MissingOutput,

    #[error("at least one time format is required")]
    NoTimeFormats,

    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode config file {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A non-fatal problem with a single record field
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("couldn't parse time {value:?} in field {field:?} with any configured format")]
    UnparsableTime { field: String, value: String },

    #[error("couldn't split count_percent {value:?} into count and percentage")]
    MalformedCountPercent { value: String },

    #[error("couldn't convert {token:?} to a number for {key:?}")]
    InvalidNumber { key: String, token: String },

    #[error("value {key:?} appears more than once; keeping {kept}, discarding {discarded}")]
    DuplicateValue { key: String, kept: f64, discarded: f64 },
}
