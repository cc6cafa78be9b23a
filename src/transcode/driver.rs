//! Per-file orchestration
//!
//! For each input: derive the stream name and default timestamp from the
//! filename, drop records already covered by the stream's watermark, emit
//! metric lines for the rest, and advance the watermark to the newest
//! emitted timestamp.

use crate::config::{FilenamePolicy, TranscodeConfig};
use crate::error::{FilenameError, TranscodeError};
use crate::input;
use crate::positions::PositionTable;
use crate::sanitize::sanitize;
use crate::timestamp;
use crate::transcode::compose::compose;
use crate::transcode::normalize::normalize;
use crate::transcode::writer::MetricWriter;
use crate::types::Record;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Identity of an input file: its stream and default record time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFile {
    pub stream: String,
    pub default_timestamp: DateTime<Utc>,
}

impl StreamFile {
    /// Parse `<stream>_<text><YYYYMMDDTHHMMSS>Z-<text>` from the file name of `path`
    pub fn from_path(path: &Path, run_start: DateTime<Utc>) -> Result<Self, FilenameError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some((token, _)) = file_name.split_once('_') else {
            return Err(FilenameError::MissingStreamDelimiter { file: file_name });
        };
        let stream = sanitize(token);
        if stream.is_empty() {
            return Err(FilenameError::EmptyStreamName { file: file_name });
        }

        let default_timestamp = timestamp::default_from_filename(&file_name, run_start)?;
        Ok(StreamFile {
            stream,
            default_timestamp,
        })
    }
}

/// What happened to one input file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub stream: String,
    pub records: usize,
    /// Records at or before the stream's watermark
    pub filtered: usize,
    pub emitted: usize,
    pub lines: usize,
    pub record_errors: usize,
    pub time_parse_failures: usize,
    /// New watermark, if this file moved it forward
    pub advanced_to: Option<DateTime<Utc>>,
}

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
    /// Files left out under [`FilenamePolicy::Skip`]
    pub skipped: Vec<(PathBuf, FilenameError)>,
}

impl RunSummary {
    pub fn lines(&self) -> usize {
        self.files.iter().map(|f| f.lines).sum()
    }

    pub fn filtered(&self) -> usize {
        self.files.iter().map(|f| f.filtered).sum()
    }
}

/// Transcodes input files into metric lines, one file at a time
pub struct Transcoder<'a> {
    config: &'a TranscodeConfig,
    run_start: DateTime<Utc>,
}

impl<'a> Transcoder<'a> {
    /// `run_start` is the last-resort record time when a filename's
    /// timestamp cannot be parsed
    pub fn new(config: &'a TranscodeConfig, run_start: DateTime<Utc>) -> Self {
        Transcoder { config, run_start }
    }

    /// Process `files` in order, threading the watermark table through
    ///
    /// On error the partially updated table is dropped, so nothing from an
    /// aborted run reaches the positions file.
    pub fn run<W, I, P>(
        &self,
        files: I,
        mut positions: PositionTable,
        writer: &mut MetricWriter<W>,
    ) -> Result<(PositionTable, RunSummary), TranscodeError>
    where
        W: Write,
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut summary = RunSummary::default();
        for path in files {
            let path = path.as_ref();
            let stream_file = match StreamFile::from_path(path, self.run_start) {
                Ok(stream_file) => stream_file,
                Err(err) => {
                    self.on_bad_filename(path, err, &mut summary)?;
                    continue;
                }
            };
            let (next, report) = self.process_file(path, &stream_file, positions, writer)?;
            positions = next;
            summary.files.push(report);
        }
        Ok((positions, summary))
    }

    // The single place where the filename policy is applied
    fn on_bad_filename(
        &self,
        path: &Path,
        err: FilenameError,
        summary: &mut RunSummary,
    ) -> Result<(), TranscodeError> {
        match self.config.filename_policy {
            FilenamePolicy::FailFast => Err(err.into()),
            FilenamePolicy::Skip => {
                log::error!("skipping {}: {err}", path.display());
                summary.skipped.push((path.to_path_buf(), err));
                Ok(())
            }
        }
    }

    /// Read one input file and transcode its records
    pub fn process_file<W: Write>(
        &self,
        path: &Path,
        stream_file: &StreamFile,
        positions: PositionTable,
        writer: &mut MetricWriter<W>,
    ) -> Result<(PositionTable, FileReport), TranscodeError> {
        let records = input::read_records(path)?;
        log::trace!("read {} records from {}", records.len(), path.display());

        let (positions, mut report) = self.transcode_records(stream_file, &records, positions, writer)?;
        report.path = path.to_path_buf();

        log::info!(
            "wrote {} metric lines for stream {} from {} ({} records filtered)",
            report.lines,
            report.stream,
            path.display(),
            report.filtered
        );
        Ok((positions, report))
    }

    /// Transcode already-decoded records of one stream
    pub fn transcode_records<W: Write>(
        &self,
        stream_file: &StreamFile,
        records: &[Record],
        positions: PositionTable,
        writer: &mut MetricWriter<W>,
    ) -> Result<(PositionTable, FileReport), TranscodeError> {
        let stream = stream_file.stream.as_str();
        let mut report = FileReport {
            stream: stream.to_string(),
            records: records.len(),
            ..FileReport::default()
        };
        let mut newest: Option<DateTime<Utc>> = None;

        for record in records {
            let resolved = timestamp::resolve(
                record,
                &self.config.time_field,
                &self.config.time_formats,
                stream_file.default_timestamp,
            );
            if let Some(err) = &resolved.error {
                log::warn!("{err}");
                report.time_parse_failures += 1;
            }

            if positions.covers(stream, resolved.timestamp) {
                report.filtered += 1;
                continue;
            }

            let normalized = normalize(record, &self.config.time_field);
            report.record_errors += normalized.errors.len();

            let lines = compose(
                &normalized.values,
                &normalized.labels,
                resolved.timestamp,
                stream,
                self.config,
            );
            writer.write_lines(&lines).map_err(TranscodeError::WriteOutput)?;
            if report.lines == 0 {
                if let Some(sample) = lines.first() {
                    log::debug!("first line for {stream}: {sample}");
                }
            }

            report.lines += lines.len();
            report.emitted += 1;
            newest = newest.max(Some(resolved.timestamp));
        }

        let previous = positions.get(stream);
        let positions = match newest {
            Some(ts) => positions.advanced(stream, ts),
            None => positions,
        };
        if positions.get(stream) != previous {
            report.advanced_to = positions.get(stream);
            log::debug!("advanced {stream} watermark from {previous:?} to {:?}", report.advanced_to);
        }

        Ok((positions, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn records(values: serde_json::Value) -> Vec<Record> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| Record::from_value(v).unwrap())
            .collect()
    }

    fn stream_file() -> StreamFile {
        StreamFile {
            stream: "vulns".to_string(),
            default_timestamp: utc(2024, 1, 10),
        }
    }

    fn output(writer: MetricWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_stream_file_from_path() {
        let path = Path::new("/data/Vuln-Report_weekly20240102T030405Z-1.json");
        let file = StreamFile::from_path(path, utc(2030, 1, 1)).unwrap();
        assert_eq!(file.stream, "vuln_report");
        assert_eq!(file.default_timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_stream_file_with_z_dash_in_free_text() {
        let path = Path::new("vulns_AZ-team20240102T030405Z-1.json");
        let file = StreamFile::from_path(path, utc(2030, 1, 1)).unwrap();
        assert_eq!(file.stream, "vulns");
        assert_eq!(file.default_timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_stream_file_contract_violations() {
        let run_start = utc(2030, 1, 1);
        assert!(matches!(
            StreamFile::from_path(Path::new("vulns20240102T030405Z-1.json"), run_start),
            Err(FilenameError::MissingStreamDelimiter { .. })
        ));
        assert!(matches!(
            StreamFile::from_path(Path::new("__20240102T030405Z-1.json"), run_start),
            Err(FilenameError::EmptyStreamName { .. })
        ));
        assert!(matches!(
            StreamFile::from_path(Path::new("vulns_weekly.json"), run_start),
            Err(FilenameError::MissingTimestamp { .. })
        ));
    }

    #[test]
    fn test_transcode_and_advance() {
        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let mut writer = MetricWriter::new(Vec::new());

        let input = records(json!([
            {"time": "2024-01-01", "low": 1, "high": 2},
            {"time": "2024-01-03", "low": 3, "high": 4},
        ]));
        let (positions, report) = transcoder
            .transcode_records(&stream_file(), &input, PositionTable::new(), &mut writer)
            .unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.emitted, 2);
        assert_eq!(report.filtered, 0);
        assert_eq!(report.lines, 4);
        assert_eq!(report.advanced_to, Some(utc(2024, 1, 3)));
        assert_eq!(positions.get("vulns"), Some(utc(2024, 1, 3)));

        let text = output(writer);
        assert!(text.contains("vulns{table=\"high\"} 2.000000 1704067200\n"));
        assert!(text.contains("vulns{table=\"low\"} 3.000000 1704240000\n"));
    }

    #[test]
    fn test_rerun_is_a_no_op() {
        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let input = records(json!([
            {"time": "2024-01-01", "count": 1},
            {"time": "2024-01-02", "count": 2},
        ]));

        let mut first = MetricWriter::new(Vec::new());
        let (positions, _) = transcoder
            .transcode_records(&stream_file(), &input, PositionTable::new(), &mut first)
            .unwrap();
        assert_eq!(first.lines_written(), 2);

        let mut second = MetricWriter::new(Vec::new());
        let (after, report) = transcoder
            .transcode_records(&stream_file(), &input, positions.clone(), &mut second)
            .unwrap();
        assert_eq!(second.lines_written(), 0);
        assert_eq!(report.filtered, 2);
        assert_eq!(report.advanced_to, None);
        assert_eq!(after, positions);
    }

    #[test]
    fn test_filter_is_inclusive_and_max_only_from_emitted() {
        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let positions = PositionTable::new().advanced("vulns", utc(2024, 1, 5));
        let input = records(json!([
            {"time": "2024-01-05", "count": 1},
            {"time": "2024-01-04", "count": 2},
            {"time": "2024-01-06", "count": 3},
        ]));

        let mut writer = MetricWriter::new(Vec::new());
        let (positions, report) = transcoder
            .transcode_records(&stream_file(), &input, positions, &mut writer)
            .unwrap();

        assert_eq!(report.filtered, 2);
        assert_eq!(report.emitted, 1);
        assert_eq!(positions.get("vulns"), Some(utc(2024, 1, 6)));
        assert_eq!(output(writer), "vulns{} 3.000000 1704499200\n# EOF\n");
    }

    #[test]
    fn test_missing_and_bad_times_use_file_default() {
        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let input = records(json!([
            {"count": 1},
            {"time": "not a date", "count": 2},
        ]));

        let mut writer = MetricWriter::new(Vec::new());
        let (positions, report) = transcoder
            .transcode_records(&stream_file(), &input, PositionTable::new(), &mut writer)
            .unwrap();

        assert_eq!(report.time_parse_failures, 1);
        assert_eq!(report.emitted, 2);
        assert_eq!(positions.get("vulns"), Some(utc(2024, 1, 10)));
    }

    #[test]
    fn test_record_errors_are_counted_not_fatal() {
        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let input = records(json!([
            {"time": "2024-01-01", "count_percent": "bad value", "severity": "high"},
            {"time": "2024-01-02", "count_percent": "315 (15.7%)", "severity": "low"},
        ]));

        let mut writer = MetricWriter::new(Vec::new());
        let (_, report) = transcoder
            .transcode_records(&stream_file(), &input, PositionTable::new(), &mut writer)
            .unwrap();

        assert_eq!(report.record_errors, 2);
        assert_eq!(report.emitted, 2);
        let text = output(writer);
        assert!(text.contains("vulns_count{severity=\"low\"} 315.000000 1704153600\n"));
        assert!(text.contains("vulns_pc{severity=\"low\"} 15.700000 1704153600\n"));
    }

    #[test]
    fn test_common_labels_use_stream_default_label() {
        let mut config = TranscodeConfig {
            common_label_names: BTreeSet::from(["host".to_string()]),
            ..TranscodeConfig::default()
        };
        config.default_labelname.insert("vulns".to_string(), "col".to_string());
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let input = records(json!([{"time": "2024-01-01", "host": "a", "cpu": 1, "mem": 2}]));

        let mut writer = MetricWriter::new(Vec::new());
        transcoder
            .transcode_records(&stream_file(), &input, PositionTable::new(), &mut writer)
            .unwrap();

        assert_eq!(
            output(writer),
            "vulns{col=\"cpu\",host=\"a\"} 1.000000 1704067200\n\
             vulns{col=\"mem\",host=\"a\"} 2.000000 1704067200\n\
             # EOF\n"
        );
    }

    #[test]
    fn test_run_fail_fast_on_bad_filename() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("vulns_a20240101T000000Z-x.json");
        let bad = dir.path().join("nodelimiter.json");
        fs::write(&good, r#"[{"time": "2024-01-02", "count": 1}]"#).unwrap();
        fs::write(&bad, "[]").unwrap();

        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let mut writer = MetricWriter::new(Vec::new());

        let err = transcoder
            .run([&good, &bad], PositionTable::new(), &mut writer)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Filename(FilenameError::MissingStreamDelimiter { .. })));
        // Lines from the completed file stay written
        assert_eq!(writer.lines_written(), 1);
    }

    #[test]
    fn test_run_skip_policy_continues() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("vulns_weekly.json");
        let good = dir.path().join("hosts_a20240101T000000Z-x.json");
        fs::write(&bad, "[]").unwrap();
        fs::write(&good, r#"[{"time": "2024-01-02", "count": 1}]"#).unwrap();

        let config = TranscodeConfig {
            filename_policy: FilenamePolicy::Skip,
            ..TranscodeConfig::default()
        };
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let mut writer = MetricWriter::new(Vec::new());

        let (positions, summary) = transcoder
            .run([&bad, &good], PositionTable::new(), &mut writer)
            .unwrap();
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.files.len(), 1);
        assert_eq!(positions.get("hosts"), Some(utc(2024, 1, 2)));
        assert_eq!(positions.get("vulns"), None);
    }

    #[test]
    fn test_run_same_stream_twice_filters_against_first_file() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("vulns_a20240101T000000Z-x.json");
        let second = dir.path().join("vulns_a20240108T000000Z-x.json");
        fs::write(&first, r#"[{"time": "2024-01-01", "count": 1}, {"time": "2024-01-03", "count": 2}]"#).unwrap();
        fs::write(&second, r#"[{"time": "2024-01-03", "count": 2}, {"time": "2024-01-04", "count": 3}]"#).unwrap();

        let config = TranscodeConfig::default();
        let transcoder = Transcoder::new(&config, utc(2030, 1, 1));
        let mut writer = MetricWriter::new(Vec::new());

        let (positions, summary) = transcoder
            .run([&first, &second], PositionTable::new(), &mut writer)
            .unwrap();
        assert_eq!(summary.lines(), 3);
        assert_eq!(summary.filtered(), 1);
        assert_eq!(positions.get("vulns"), Some(utc(2024, 1, 4)));
    }
}
