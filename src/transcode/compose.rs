//! Metric line composition
//!
//! Decides, once per record, whether each numeric value gets its key folded
//! into the metric name (`stream_key{labels}`) or into a default label
//! (`stream{col="key",labels}`).

use crate::config::TranscodeConfig;
use crate::sanitize::sanitize;
use crate::types::{LabelSet, ValueSet};
use chrono::{DateTime, Utc};
use std::fmt;

/// One exposition sample: `name{k="v",...} value timestamp`
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
    /// Unix epoch seconds
    pub timestamp: i64,
}

impl fmt::Display for MetricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=\"{}\"", key, escape_label_value(value))?;
        }
        write!(f, "}} {:.6} {}", self.value, self.timestamp)
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// How a record's value keys are placed in its lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Naming {
    /// `stream{}`: one value, no labels
    Bare,
    /// `stream{default="key",labels...}`
    DefaultLabel,
    /// `stream_key{labels...}`
    Suffix,
}

fn naming(values: &ValueSet, labels: &LabelSet, config: &TranscodeConfig) -> Naming {
    let single_value = values.len() == 1;
    if labels.is_empty() {
        return if single_value { Naming::Bare } else { Naming::DefaultLabel };
    }
    if single_value {
        return Naming::Suffix;
    }

    let common = labels.keys().filter(|key| config.is_common_label(key)).count();
    if common == labels.len() {
        Naming::DefaultLabel
    } else {
        Naming::Suffix
    }
}

/// Compose the metric lines for one record of `stream`
pub fn compose(
    values: &ValueSet,
    labels: &LabelSet,
    timestamp: DateTime<Utc>,
    stream: &str,
    config: &TranscodeConfig,
) -> Vec<MetricLine> {
    let naming = naming(values, labels, config);
    let default_label = config.default_label_for(stream);
    let mut label_pairs: Vec<(String, String)> = labels
        .iter()
        .map(|(key, value)| (sanitize(key), value.clone()))
        .collect();

    // Record labels may not shadow the default label
    if naming == Naming::DefaultLabel && !values.is_empty() {
        let reserved = sanitize(default_label);
        label_pairs.retain(|(key, value)| {
            let collides = *key == reserved;
            if collides {
                log::warn!("dropping label {key}=\"{value}\" from {stream}: it collides with the default label");
            }
            !collides
        });
    }
    let ts = timestamp.timestamp();

    values
        .iter()
        .map(|(key, &value)| {
            let (name, labels) = match naming {
                Naming::Bare => (stream.to_string(), Vec::new()),
                Naming::DefaultLabel => {
                    let mut pairs = Vec::with_capacity(label_pairs.len() + 1);
                    pairs.push((default_label.to_string(), key.clone()));
                    pairs.extend(label_pairs.iter().cloned());
                    (stream.to_string(), pairs)
                }
                Naming::Suffix => (format!("{}_{}", stream, sanitize(key)), label_pairs.clone()),
            };
            MetricLine {
                name,
                labels,
                value,
                timestamp: ts,
            }
        })
        .collect()
}
