//! JSON records to metric exposition lines
//!
//! Each record is flattened into numeric values and string labels, then
//! composed into one line per value. Records already covered by the
//! stream's watermark are skipped, so re-running over the same input emits
//! nothing new.

pub mod normalize;
pub mod compose;
pub mod writer;
pub mod driver;

pub use normalize::{normalize, Normalized, COUNT_PERCENT_FIELD};
pub use compose::{compose, MetricLine};
pub use writer::{MetricWriter, EOF_MARKER};
pub use driver::{FileReport, RunSummary, StreamFile, Transcoder};
