//! # jsonmetrics - incremental JSON to OpenMetrics transcoding
//!
//! Converts periodic exports of flat JSON records into metric exposition
//! lines, remembering per stream the newest timestamp already emitted so
//! that re-running over old exports emits nothing twice.
//!
//! ## Modules
//!
//! - **transcode**: flatten records, compose metric lines, drive input files
//! - **positions**: the per-stream watermark store
//! - **timestamp**: record and filename time resolution
//! - **sanitize**: snake_case identifiers for metric and label names
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use jsonmetrics::{compose, normalize, Record, TranscodeConfig};
//! use serde_json::json;
//!
//! let config = TranscodeConfig::default();
//! let record = Record::from_value(&json!({
//!     "time": "2024-01-01",
//!     "severity": "high",
//!     "count_percent": "315 (15.7%)"
//! }))
//! .unwrap();
//!
//! let normalized = normalize(&record, &config.time_field);
//! let lines = compose(&normalized.values, &normalized.labels, Utc::now(), "vulns", &config);
//!
//! // vulns_count{severity="high"} 315.000000 ...
//! // vulns_pc{severity="high"} 15.700000 ...
//! assert_eq!(lines.len(), 2);
//! ```

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io;
use std::path::Path;

pub mod config;
pub mod error;
pub mod input;
pub mod positions;
pub mod sanitize;
pub mod timestamp;
pub mod transcode;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{FilenamePolicy, TranscodeConfig};
pub use error::{ConfigError, FilenameError, PositionsError, RecordError, TranscodeError};
pub use positions::PositionTable;
pub use sanitize::sanitize;
pub use transcode::{compose, normalize, FileReport, MetricLine, MetricWriter, RunSummary, Transcoder};
pub use types::{FieldValue, LabelSet, Record, ValueSet};

/// Main entry point: transcode `inputs` into the configured output file
///
/// Loads the positions file, writes every emitted line followed by `# EOF`,
/// and saves the positions only if some stream's watermark moved forward.
/// A fatal error leaves already-written lines in place but persists no
/// watermark changes.
pub fn transcode_files<P: AsRef<Path>>(
    config: &TranscodeConfig,
    inputs: &[P],
    run_start: DateTime<Utc>,
) -> Result<RunSummary, TranscodeError> {
    config.validate()?;
    let out = config.out.as_deref().ok_or(ConfigError::MissingOutput)?;

    let positions = PositionTable::load(&config.positions_file)?;
    log::debug!("loaded {} positions from {}", positions.len(), config.positions_file.display());

    let file = File::create(out).map_err(|source| TranscodeError::CreateOutput {
        path: out.to_path_buf(),
        source,
    })?;
    let mut writer = MetricWriter::new(file);
    if config.debug {
        writer = writer.with_echo(Box::new(io::stdout()));
    }

    let transcoder = Transcoder::new(config, run_start);
    let (updated, summary) = match transcoder.run(inputs, positions.clone(), &mut writer) {
        Ok(result) => result,
        Err(err) => {
            if let Err(flush_err) = writer.flush() {
                log::error!("couldn't flush output after failure: {flush_err}");
            }
            return Err(err);
        }
    };
    writer.finish().map_err(TranscodeError::WriteOutput)?;

    if updated != positions {
        updated.save(&config.positions_file)?;
    } else {
        log::debug!("no watermark advanced, leaving {} untouched", config.positions_file.display());
    }

    Ok(summary)
}
