//! Typed measurement entities
//!
//! Instruments produce `Measurement`s (named attribute bags) which are
//! collected into per-device `Test` aggregates. Validity is decided here:
//! a test is valid only when its required metadata is present and every
//! contained measurement is individually complete.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde_json::json;

/// A single attribute value decoded from an instrument record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Trimmed text
    Text(String),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Instrument-sourced date/time
    Date(NaiveDateTime),
    /// Missing or unparseable
    Null,
}

impl Value {
    /// True for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as float, returning None if not numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as integer, returning None otherwise
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as text, returning None otherwise
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as date/time, returning None otherwise
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn to_json(&self, precision: Option<u8>) -> serde_json::Value {
        match self {
            Value::Text(s) => json!(s),
            Value::Int(v) => json!(v),
            Value::Float(v) => match precision {
                Some(p) => {
                    let scale = 10f64.powi(p as i32);
                    json!((v * scale).round() / scale)
                }
                None => json!(v),
            },
            Value::Date(d) => json!(d.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Null => serde_json::Value::Null,
        }
    }
}

/// A measurement attribute: value plus optional units and display precision
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The decoded value
    pub value: Value,
    /// Units label ("kg", "dB", ...)
    pub units: Option<&'static str>,
    /// Decimal places carried by the instrument
    pub precision: Option<u8>,
}

impl Attribute {
    /// A bare attribute with no units
    pub fn new(value: Value) -> Self {
        Self {
            value,
            units: None,
            precision: None,
        }
    }

    /// An attribute with a units label
    pub fn with_units(value: Value, units: &'static str) -> Self {
        Self {
            value,
            units: Some(units),
            precision: None,
        }
    }

    /// An attribute with units and display precision
    pub fn with_precision(value: Value, units: &'static str, precision: u8) -> Self {
        Self {
            value,
            units: Some(units),
            precision: Some(precision),
        }
    }

    /// True when the underlying value is null
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    fn to_json(&self) -> serde_json::Value {
        match self.units {
            Some(units) => json!({
                "value": self.value.to_json(self.precision),
                "units": units,
            }),
            None => self.value.to_json(self.precision),
        }
    }
}

/// One instrument measurement: an ordered set of named attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    attributes: BTreeMap<&'static str, Attribute>,
}

impl Measurement {
    /// Create an empty measurement
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute
    pub fn set(&mut self, name: &'static str, attribute: Attribute) {
        self.attributes.insert(name, attribute);
    }

    /// Look up an attribute by name
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether the named attribute exists with a non-null value
    pub fn has(&self, name: &str) -> bool {
        self.get(name).map(|a| !a.is_null()).unwrap_or(false)
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the measurement has no attributes
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Valid iff non-empty and free of null values
    pub fn is_valid(&self) -> bool {
        !self.attributes.is_empty() && self.attributes.values().all(|a| !a.is_null())
    }

    /// Serialize to a JSON object for the output record
    pub fn to_record(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// A per-device test aggregate: metadata plus an ordered measurement list
#[derive(Debug, Clone)]
pub struct Test {
    device: &'static str,
    metadata: Measurement,
    measurements: Vec<Measurement>,
    expected_measurements: usize,
    required_meta: &'static [&'static str],
}

impl Test {
    /// Create an empty test for a device.
    ///
    /// `expected_measurements` is the exact count a complete result carries;
    /// `required_meta` names the metadata attributes that must be present
    /// and non-null for the test to be valid.
    pub fn new(
        device: &'static str,
        expected_measurements: usize,
        required_meta: &'static [&'static str],
    ) -> Self {
        Self {
            device,
            metadata: Measurement::new(),
            measurements: Vec::new(),
            expected_measurements,
            required_meta,
        }
    }

    /// Device name this test belongs to
    pub fn device(&self) -> &'static str {
        self.device
    }

    /// Set a metadata attribute
    pub fn set_meta(&mut self, name: &'static str, attribute: Attribute) {
        self.metadata.set(name, attribute);
    }

    /// The metadata measurement
    pub fn metadata(&self) -> &Measurement {
        &self.metadata
    }

    /// Append one measurement
    pub fn add_measurement(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    /// Replace all measurements at once
    pub fn set_measurements(&mut self, measurements: Vec<Measurement>) {
        self.measurements = measurements;
    }

    /// The contained measurements, in decode order
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Number of contained measurements
    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    /// Exact measurement count a complete result carries
    pub fn expected_measurements(&self) -> usize {
        self.expected_measurements
    }

    /// Drop all measurements and metadata, keeping the device identity
    pub fn reset(&mut self) {
        self.metadata = Measurement::new();
        self.measurements.clear();
    }

    /// Required metadata present, exact measurement count, and every
    /// measurement individually valid.
    pub fn is_valid(&self) -> bool {
        self.required_meta.iter().all(|k| self.metadata.has(k))
            && self.measurements.len() == self.expected_measurements
            && self.measurements.iter().all(|m| m.is_valid())
    }

    /// Serialize to the participant result document consumed by the output
    /// writer. The core performs no file I/O itself.
    pub fn to_record(&self) -> serde_json::Value {
        json!({
            "device": self.device,
            "valid": self.is_valid(),
            "metadata": self.metadata.to_record(),
            "measurements": self
                .measurements
                .iter()
                .map(|m| m.to_record())
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(kg: f64) -> Measurement {
        let mut m = Measurement::new();
        m.set("weight", Attribute::with_precision(Value::Float(kg), "kg", 1));
        m
    }

    #[test]
    fn test_measurement_validity() {
        assert!(!Measurement::new().is_valid());
        assert!(weight(75.2).is_valid());

        let mut m = weight(75.2);
        m.set("status", Attribute::new(Value::Null));
        assert!(!m.is_valid());
    }

    #[test]
    fn test_validity_boundary() {
        let required: &[&str] = &["measured_at"];
        let mut test = Test::new("weigh_scale", 2, required);
        test.set_meta(
            "measured_at",
            Attribute::new(Value::Text("2024-01-01 10:00:00".into())),
        );

        // One short of the required count: invalid regardless of content.
        test.add_measurement(weight(75.2));
        assert!(!test.is_valid());

        // Required count with all-valid measurements: valid.
        test.add_measurement(weight(75.4));
        assert!(test.is_valid());

        // Required count but one invalid measurement: invalid.
        let mut bad = Measurement::new();
        bad.set("weight", Attribute::new(Value::Null));
        test.set_measurements(vec![weight(75.2), bad]);
        assert!(!test.is_valid());
    }

    #[test]
    fn test_missing_metadata_invalidates() {
        let required: &[&str] = &["measured_at"];
        let mut test = Test::new("weigh_scale", 1, required);
        test.add_measurement(weight(80.0));
        assert!(!test.is_valid());
    }

    #[test]
    fn test_record_shape() {
        let mut test = Test::new("weigh_scale", 1, &[]);
        test.add_measurement(weight(75.24));
        let record = test.to_record();
        assert_eq!(record["device"], "weigh_scale");
        assert_eq!(record["measurements"][0]["weight"]["units"], "kg");
        // Precision of 1 decimal place is applied on serialization.
        assert_eq!(record["measurements"][0]["weight"]["value"], 75.2);
    }

    #[test]
    fn test_reset_clears_content() {
        let mut test = Test::new("weigh_scale", 1, &[]);
        test.add_measurement(weight(75.2));
        test.set_meta("measured_at", Attribute::new(Value::Text("x".into())));
        test.reset();
        assert_eq!(test.measurement_count(), 0);
        assert!(test.metadata().is_empty());
    }
}
