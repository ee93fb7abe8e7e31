//! Body-composition record decoding
//!
//! Turns the analyzer's fixed 59-byte result record into a `Test` of
//! exactly eight measurements plus the subject metadata echoed back by the
//! instrument. Unit labels follow the measurement system confirmed during
//! the input phase; the measured-at timestamp is supplied by the caller;
//! the record itself carries no clock.

use chrono::NaiveDateTime;

use crate::device::body_composition::RECORD_LAYOUT;
use crate::protocol::UnitsSystem;

use super::layout::decode_field;
use super::measurement::{Attribute, Measurement, Test, Value};

/// Metadata attributes a valid test must carry
pub const REQUIRED_META: &[&str] = &["body_type", "gender", "age", "height", "measured_at"];

/// Field names that land in metadata rather than measurements
const META_FIELDS: &[&str] = &["body_type", "gender", "age", "height"];

fn map_body_type(value: &Value) -> Value {
    match value.as_text() {
        Some("0") => Value::Text("standard".to_string()),
        Some("1") => Value::Text("athletic".to_string()),
        _ => Value::Null,
    }
}

fn map_gender(value: &Value) -> Value {
    match value.as_text() {
        Some("1") => Value::Text("male".to_string()),
        Some("2") => Value::Text("female".to_string()),
        _ => Value::Null,
    }
}

fn measurement_attribute(name: &str, value: Value, units: UnitsSystem) -> Attribute {
    let mass = units.mass_label();
    match name {
        "weight" => Attribute::with_precision(value, mass, 1),
        "impedance" => Attribute::with_units(value, "ohm"),
        "percent_fat" => Attribute::with_precision(value, "%", 1),
        "fat_mass" => Attribute::with_precision(value, mass, 1),
        "fat_free_mass" => Attribute::with_precision(value, mass, 1),
        "total_body_water" => Attribute::with_precision(value, mass, 1),
        "bmi" => Attribute::with_precision(value, "kg/m2", 1),
        "bmr" => Attribute::with_units(value, "kJ"),
        _ => Attribute::new(value),
    }
}

/// Decode one 59-byte analyzer record into a complete test.
///
/// Decoding is idempotent: the same bytes always produce the same test.
pub fn decode(record: &[u8], units: UnitsSystem, measured_at: Option<NaiveDateTime>) -> Test {
    let mut test = Test::new(
        "body_composition_analyzer",
        8,
        REQUIRED_META,
    );

    for field in RECORD_LAYOUT {
        let value = decode_field(record, field);
        if META_FIELDS.contains(&field.name) {
            let value = match field.name {
                "body_type" => map_body_type(&value),
                "gender" => map_gender(&value),
                _ => value,
            };
            let attribute = match field.name {
                "height" => Attribute::with_precision(value, units.height_label(), 1),
                _ => Attribute::new(value),
            };
            test.set_meta(field.name, attribute);
        } else {
            let mut measurement = Measurement::new();
            measurement.set(field.name, measurement_attribute(field.name, value, units));
            test.add_measurement(measurement);
        }
    }

    test.set_meta("units", Attribute::new(Value::Text(units.to_string())));
    if let Some(at) = measured_at {
        test.set_meta("measured_at", Attribute::new(Value::Date(at)));
    }

    test
}
