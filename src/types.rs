use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Numeric values resolved from one record, keyed by field name
pub type ValueSet = BTreeMap<String, f64>;

/// String labels resolved from one record, keyed by sanitized field name
pub type LabelSet = BTreeMap<String, String>;

/// A single record field, classified by its JSON type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// Booleans, nulls, arrays and nested objects
    Other,
}

impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Other),
            Value::String(s) => FieldValue::Text(s.clone()),
            _ => FieldValue::Other,
        }
    }
}

/// One flat JSON object from an input file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Record {
            fields: obj.iter().map(|(k, v)| (k.clone(), FieldValue::from(v))).collect(),
        }
    }

    /// Returns `None` when the value is not a JSON object
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(Self::from_object)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Text value of `field`, if present and textual
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}
