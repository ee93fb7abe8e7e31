//! Weigh-scale reading decoding
//!
//! One scale record is one reading; two stable readings make a complete
//! weight test. A non-stable reading keeps its stability attribute but
//! decodes a null weight, so it can never count toward a valid test.

use crate::device::weigh_scale::RECORD_LAYOUT;

use super::layout::{decode_field, extract};
use super::measurement::{Attribute, Measurement, Value};

/// Metadata attributes a valid weight test must carry
pub const REQUIRED_META: &[&str] = &["measured_at"];

fn units_label(text: &str) -> Option<&'static str> {
    match text {
        "kg" => Some("kg"),
        "lb" => Some("lb"),
        _ => None,
    }
}

fn map_stability(text: &str) -> Value {
    match text {
        "ST" => Value::Text("stable".to_string()),
        "US" => Value::Text("unstable".to_string()),
        "OL" => Value::Text("overload".to_string()),
        _ => Value::Null,
    }
}

fn map_mode(text: &str) -> Value {
    match text {
        "GS" => Value::Text("gross".to_string()),
        "NT" => Value::Text("net".to_string()),
        _ => Value::Null,
    }
}

/// Decode one 19-byte scale record into a single reading.
pub fn decode_reading(record: &[u8]) -> Measurement {
    let mut fields = std::collections::BTreeMap::new();
    for spec in RECORD_LAYOUT {
        fields.insert(spec.name, (extract(record, spec), decode_field(record, spec)));
    }

    let status_text = fields
        .get("status")
        .and_then(|(t, _)| t.clone())
        .unwrap_or_default();
    let stable = status_text == "ST";

    let units = fields
        .get("units")
        .and_then(|(t, _)| t.as_deref().and_then(units_label));

    let mut reading = Measurement::new();
    reading.set("stability", Attribute::new(map_stability(&status_text)));
    reading.set(
        "mode",
        Attribute::new(
            fields
                .get("mode")
                .and_then(|(t, _)| t.as_deref().map(map_mode))
                .unwrap_or(Value::Null),
        ),
    );

    // Only a stable reading carries a usable weight.
    let weight_value = if stable {
        fields
            .get("weight")
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    } else {
        Value::Null
    };
    match units {
        Some(units) => reading.set("weight", Attribute::with_precision(weight_value, units, 1)),
        None => reading.set("weight", Attribute::new(weight_value)),
    }

    reading
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_reading() {
        let reading = decode_reading(b"ST,GS,+00075.5,kg\r\n");
        assert!(reading.is_valid());
        assert_eq!(reading.get("weight").unwrap().value, Value::Float(75.5));
        assert_eq!(reading.get("weight").unwrap().units, Some("kg"));
        assert_eq!(
            reading.get("stability").unwrap().value,
            Value::Text("stable".to_string())
        );
    }

    #[test]
    fn test_unstable_reading_has_no_weight() {
        let reading = decode_reading(b"US,GS,+00074.9,kg\r\n");
        assert!(!reading.is_valid());
        assert!(reading.get("weight").unwrap().is_null());
        assert_eq!(
            reading.get("stability").unwrap().value,
            Value::Text("unstable".to_string())
        );
    }

    #[test]
    fn test_overload_reading() {
        let reading = decode_reading(b"OL,GS,+------.-,kg\r\n");
        assert!(!reading.is_valid());
        assert!(reading.get("weight").unwrap().is_null());
    }

    #[test]
    fn test_net_mode_pounds() {
        let reading = decode_reading(b"ST,NT,+00166.4,lb\r\n");
        assert!(reading.is_valid());
        assert_eq!(reading.get("weight").unwrap().units, Some("lb"));
        assert_eq!(
            reading.get("mode").unwrap().value,
            Value::Text("net".to_string())
        );
    }

    #[test]
    fn test_decode_is_idempotent() {
        let record = b"ST,GS,+00075.5,kg\r\n";
        assert_eq!(decode_reading(record), decode_reading(record));
    }
}
