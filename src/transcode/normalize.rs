use crate::error::RecordError;
use crate::sanitize::sanitize;
use crate::types::{FieldValue, LabelSet, Record, ValueSet};

/// Composite field holding "<count> (<percent>%)"
pub const COUNT_PERCENT_FIELD: &str = "count_percent";

/// A record flattened into numeric values and string labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub values: ValueSet,
    pub labels: LabelSet,
    /// Problems found while flattening; the affected values are left out
    pub errors: Vec<RecordError>,
}

/// Flatten `record` into values and labels
///
/// The time field is skipped. Numbers become values, text becomes labels
/// keyed by the sanitized field name, everything else is dropped.
/// A textual `count_percent` is unpacked into `count` and `pc`.
pub fn normalize(record: &Record, time_field: &str) -> Normalized {
    let mut out = Normalized::default();

    for (key, value) in &record.fields {
        if key == time_field {
            continue;
        }
        match value {
            FieldValue::Text(text) if key == COUNT_PERCENT_FIELD => {
                split_count_percent(text, &mut out);
            }
            FieldValue::Number(n) => insert_value(&mut out, key, *n),
            FieldValue::Text(text) => {
                out.labels.insert(sanitize(key), text.clone());
            }
            FieldValue::Other => {}
        }
    }

    for err in &out.errors {
        log::warn!("{err}");
    }
    out
}

// "315 (15.7%)" -> count = 315, pc = 15.7
fn split_count_percent(text: &str, out: &mut Normalized) {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [count, pc] = tokens.as_slice() else {
        out.errors.push(RecordError::MalformedCountPercent {
            value: text.to_string(),
        });
        return;
    };

    let pc = pc.trim_matches(|c: char| matches!(c, '(' | ')' | '%'));
    match (parse_number("count", count), parse_number("pc", pc)) {
        (Ok(count), Ok(pc)) => {
            insert_value(out, "count", count);
            insert_value(out, "pc", pc);
        }
        (count, pc) => out.errors.extend(count.err().into_iter().chain(pc.err())),
    }
}

// Fields are visited in key order; a later field never overwrites a value
// already taken from an earlier one
fn insert_value(out: &mut Normalized, key: &str, value: f64) {
    match out.values.get(key) {
        Some(&kept) => out.errors.push(RecordError::DuplicateValue {
            key: key.to_string(),
            kept,
            discarded: value,
        }),
        None => {
            out.values.insert(key.to_string(), value);
        }
    }
}

fn parse_number(key: &str, token: &str) -> Result<f64, RecordError> {
    token.parse::<f64>().map_err(|_| RecordError::InvalidNumber {
        key: key.to_string(),
        token: token.to_string(),
    })
}
