//! Hearing test record decoding
//!
//! The audiometer reports a hearing threshold level (HTL) for each ear at
//! each test frequency. A threshold field carries either a numeric dB
//! level or a two-letter outcome code; the code tables are checked first
//! because a bare numeric string is indistinguishable from a code by type
//! alone. Every code maps to a recommended action for the operator
//! (rerun, reinstruct the subject, or contact service).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::device::audiometer::{
    LEFT_THRESHOLDS_AT, RECORD_LAYOUT, RIGHT_THRESHOLDS_AT, TEST_ORDER, THRESHOLD_WIDTH,
};

use super::layout::{decode_field, extract, FieldKind, FieldSpec};
use super::measurement::{Attribute, Measurement, Test, Value};

/// Metadata attributes a valid hearing test must carry
pub const REQUIRED_META: &[&str] = &["patient_id", "test_datetime"];

/// HTL outcome codes: code -> (error, recommended action)
static HTL_CODES: LazyLock<HashMap<&'static str, (&'static str, &'static str)>> =
    LazyLock::new(|| {
        HashMap::from([
            ("AA", ("NOT_TESTED", "RERUN_TEST")),
            ("E1", ("NO_THRESHOLD_FOUND", "RERUN_TEST")),
            ("E2", ("LEVEL_OUT_OF_RANGE", "RERUN_TEST")),
            ("E3", ("VERIFY_FAILED_1K", "REINSTRUCT_SUBJECT")),
            ("E4", ("RESPONSE_INCONSISTENT", "REINSTRUCT_SUBJECT")),
            ("E5", ("TRANSDUCER_FAULT", "CONTACT_SERVICE")),
            ("E6", ("AMBIENT_NOISE_HIGH", "RERUN_TEST")),
            ("E7", ("TEST_INTERRUPTED", "RERUN_TEST")),
            ("E8", ("CALIBRATION_EXPIRED", "CONTACT_SERVICE")),
            ("EA", ("EQUIPMENT_ERROR", "CONTACT_SERVICE")),
        ])
    });

/// A plain HTL is an optionally negative 1-3 digit dB value.
static HTL_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}$").expect("static pattern"));

/// Decode one threshold field into a measurement for `side`/`label`.
fn decode_threshold(text: &str, side: &str, label: &str) -> Measurement {
    let mut m = Measurement::new();
    m.set("side", Attribute::new(Value::Text(side.to_string())));
    m.set("test", Attribute::new(Value::Text(label.to_string())));

    // Code tables first; only then may the text be read as a level.
    if let Some((error, outcome)) = HTL_CODES.get(text) {
        m.set("error", Attribute::new(Value::Text(error.to_string())));
        m.set("outcome", Attribute::new(Value::Text(outcome.to_string())));
    } else if HTL_LEVEL.is_match(text) {
        let level = text.parse::<i64>().map(Value::Int).unwrap_or(Value::Null);
        m.set("level", Attribute::with_units(level, "dB"));
    } else {
        m.set("level", Attribute::with_units(Value::Null, "dB"));
    }
    m
}

/// Decode one 139-byte audiometer record into a 16-measurement test.
pub fn decode(record: &[u8]) -> Test {
    let mut test = Test::new("audiometer", 16, REQUIRED_META);

    for field in RECORD_LAYOUT {
        test.set_meta(field.name, Attribute::new(decode_field(record, field)));
    }

    for (side, base) in [("left", LEFT_THRESHOLDS_AT), ("right", RIGHT_THRESHOLDS_AT)] {
        for (i, label) in TEST_ORDER.iter().enumerate() {
            let start = base + i * THRESHOLD_WIDTH;
            let spec = FieldSpec::new(start, start + THRESHOLD_WIDTH - 1, "htl", FieldKind::Text);
            let text = extract(record, &spec).unwrap_or_default();
            test.add_measurement(decode_threshold(&text, side, label));
        }
    }

    test
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Assemble a record with the given 16 threshold fields.
    fn sample_record(thresholds: &[&str; 16]) -> Vec<u8> {
        let mut body = String::new();
        body.push_str("A1234567"); // patient id
        body.push_str("03/15/2414:30:05"); // test datetime
        for t in thresholds {
            body.push_str(&format!("{:>3}", t));
        }
        while body.len() < 137 {
            body.push(' ');
        }
        let mut record = body.into_bytes();
        record.extend_from_slice(b"~\r");
        assert_eq!(record.len(), 139);
        record
    }

    fn all_levels() -> [&'static str; 16] {
        [
            "10", "015", "020", "25", "030", "035", "040", "45", //
            "10", "015", "020", "25", "030", "035", "040", "45",
        ]
    }

    #[test]
    fn test_full_decode() {
        let test = decode(&sample_record(&all_levels()));
        assert_eq!(test.measurement_count(), 16);
        assert!(test.is_valid());
        assert_eq!(
            test.metadata().get("patient_id").unwrap().value,
            Value::Text("A1234567".to_string())
        );
        // Century correction: 2-digit year "24" lands in 2024.
        let dt = test
            .metadata()
            .get("test_datetime")
            .unwrap()
            .value
            .as_date()
            .unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-15 14:30:05");
    }

    #[test]
    fn test_error_vs_value_discrimination() {
        // "E3" must decode as a coded error with its outcome, never a level.
        let m = decode_threshold("E3", "left", "1000");
        assert!(m.get("level").is_none());
        assert_eq!(
            m.get("error").unwrap().value,
            Value::Text("VERIFY_FAILED_1K".to_string())
        );
        assert_eq!(
            m.get("outcome").unwrap().value,
            Value::Text("REINSTRUCT_SUBJECT".to_string())
        );

        // "023" is a plain 23 dB threshold with no error attribute.
        let m = decode_threshold("023", "left", "1000");
        assert!(m.get("error").is_none());
        assert_eq!(m.get("level").unwrap().value, Value::Int(23));
        assert_eq!(m.get("level").unwrap().units, Some("dB"));
    }

    #[test]
    fn test_negative_level() {
        let m = decode_threshold("-10", "right", "500");
        assert_eq!(m.get("level").unwrap().value, Value::Int(-10));
    }

    #[test]
    fn test_coded_measurement_is_still_valid() {
        // An errored threshold is a complete observation: the test remains
        // valid, the outcome tells the operator what to do next.
        let mut thresholds = all_levels();
        thresholds[3] = "E3";
        let test = decode(&sample_record(&thresholds));
        assert!(test.is_valid());
    }

    #[test]
    fn test_garbage_threshold_invalidates() {
        let mut thresholds = all_levels();
        thresholds[7] = "1x";
        let test = decode(&sample_record(&thresholds));
        assert_eq!(test.measurement_count(), 16);
        assert!(!test.is_valid());
    }

    #[test]
    fn test_unknown_code_is_not_a_level() {
        // "EB" is not in the code table and not numeric: null level.
        let m = decode_threshold("EB", "left", "500");
        assert!(m.get("level").unwrap().is_null());
        assert!(m.get("error").is_none());
    }

    #[test]
    fn test_sides_and_labels() {
        let test = decode(&sample_record(&all_levels()));
        let sides: Vec<_> = test
            .measurements()
            .iter()
            .map(|m| m.get("side").unwrap().value.as_text().unwrap().to_string())
            .collect();
        assert_eq!(&sides[..8], &["left"; 8]);
        assert_eq!(&sides[8..], &["right"; 8]);
        assert_eq!(
            test.measurements()[0].get("test").unwrap().value,
            Value::Text("1k_test".to_string())
        );
        assert_eq!(
            test.measurements()[15].get("test").unwrap().value,
            Value::Text("8000".to_string())
        );
    }
}
