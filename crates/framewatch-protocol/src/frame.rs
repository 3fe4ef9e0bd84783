use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single decoded field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Coerce a raw `key=value` right-hand side.
    ///
    /// Only finite, nonzero numeric literals become numbers. A literal `0`
    /// stays text, as does anything the probe prints for missing data (`N/A`).
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && n != 0.0 => FieldValue::Number(n),
            _ => FieldValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// One frame as reported by the probe, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl FrameRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for assembling fixtures
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Strictly numeric field (as decoded)
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_number)
    }

    /// Numeric view of a field, also accepting text that parses as a finite
    /// number. `pkt_pts_time=0` decodes as text but still reads as `0.0` here.
    pub fn numeric(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn media_type(&self) -> Option<&str> {
        self.text("media_type")
    }

    pub fn is_video(&self) -> bool {
        self.media_type() == Some("video")
    }

    pub fn is_audio(&self) -> bool {
        self.media_type() == Some("audio")
    }

    pub fn is_key_frame(&self) -> bool {
        self.number("key_frame") == Some(1.0)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}
