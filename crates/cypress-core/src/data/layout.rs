//! Fixed-offset record field extraction
//!
//! Instrument measurement payloads are fixed-length byte buffers whose
//! fields live at fixed offsets. Each device publishes a table of
//! [`FieldSpec`]s; this module extracts the Latin-1 text at each range,
//! trims it, and converts it per the field kind. Malformed content decodes
//! to [`Value::Null`] rather than an error, so one garbled field cannot abort
//! the rest of a record.

use chrono::{Datelike, NaiveDateTime};

use super::measurement::Value;

/// How to interpret an extracted field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Trimmed text passed through as-is
    Text,
    /// Plain integer
    Int,
    /// Plain float
    Float,
    /// Instrument datetime, `MM/dd/yyHH:mm:ss` with a 2-digit year
    DateTime,
}

/// One field of a fixed-layout record: inclusive byte range plus semantics
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// First byte of the field
    pub start: usize,
    /// Last byte of the field (inclusive)
    pub end: usize,
    /// Attribute name the field decodes into
    pub name: &'static str,
    /// Conversion directive
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Describe a field at `start..=end`.
    pub const fn new(start: usize, end: usize, name: &'static str, kind: FieldKind) -> Self {
        Self {
            start,
            end,
            name,
            kind,
        }
    }
}

/// Extract a field's trimmed Latin-1 text, or None when the record is too
/// short to contain it.
pub fn extract(record: &[u8], spec: &FieldSpec) -> Option<String> {
    if spec.end >= record.len() {
        return None;
    }
    let text: String = record[spec.start..=spec.end]
        .iter()
        .map(|&b| b as char)
        .collect();
    Some(text.trim().to_string())
}

/// Parse the instrument datetime pattern `MM/dd/yyHH:mm:ss`.
///
/// The instruments emit 2-digit years; readings parsed into the 1900s get
/// a +100-year correction, matching the devices' post-2000 deployment.
pub fn parse_instrument_datetime(text: &str) -> Option<NaiveDateTime> {
    let parsed = NaiveDateTime::parse_from_str(text, "%m/%d/%y%H:%M:%S").ok()?;
    if parsed.year() < 2000 {
        parsed.with_year(parsed.year() + 100)
    } else {
        Some(parsed)
    }
}

/// Convert trimmed field text per its kind; malformed text yields Null.
pub fn convert(text: &str, kind: FieldKind) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match kind {
        FieldKind::Text => Value::Text(text.to_string()),
        FieldKind::Int => text.parse::<i64>().map(Value::Int).unwrap_or(Value::Null),
        FieldKind::Float => text
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        FieldKind::DateTime => parse_instrument_datetime(text)
            .map(Value::Date)
            .unwrap_or(Value::Null),
    }
}

/// Extract and convert one field.
pub fn decode_field(record: &[u8], spec: &FieldSpec) -> Value {
    match extract(record, spec) {
        Some(text) => convert(&text, spec.kind),
        None => Value::Null,
    }
}
