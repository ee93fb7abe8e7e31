//! Thermometer record decoding
//!
//! The Bluetooth thermometer delivers one fixed 13-byte characteristic
//! value per reading: a flags byte, the temperature as an IEEE-11073
//! 32-bit FLOAT, a 7-byte timestamp, and a measurement-site byte. Only the
//! record decoding lives here; the BLE transport is outside the core.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{NaiveDate, NaiveDateTime};

use super::measurement::{Attribute, Measurement, Test, Value};

/// Exact record length in bytes
pub const RECORD_LEN: usize = 13;

/// Metadata attributes a valid temperature test must carry
pub const REQUIRED_META: &[&str] = &["mode", "measured_at"];

/// IEEE-11073 special values that mean "no reading".
const FLOAT_NAN: i32 = 0x007F_FFFF;
const FLOAT_NRES: i32 = -0x0080_0000;
const FLOAT_POS_INF: i32 = 0x007F_FFFE;
const FLOAT_NEG_INF: i32 = -0x007F_FFFE;

/// Decode an IEEE-11073 32-bit FLOAT: 24-bit signed mantissa, signed
/// 8-bit base-10 exponent.
fn decode_ieee11073_float(bytes: &[u8]) -> Value {
    let mantissa_raw = LittleEndian::read_u24(bytes) as i32;
    // Sign-extend the 24-bit mantissa.
    let mantissa = (mantissa_raw << 8) >> 8;
    let exponent = bytes[3] as i8;

    if matches!(mantissa, FLOAT_NAN | FLOAT_NRES | FLOAT_POS_INF | FLOAT_NEG_INF) {
        return Value::Null;
    }
    Value::Float(mantissa as f64 * 10f64.powi(exponent as i32))
}

fn decode_timestamp(bytes: &[u8]) -> Option<NaiveDateTime> {
    let year = LittleEndian::read_u16(&bytes[0..2]) as i32;
    let date = NaiveDate::from_ymd_opt(year, bytes[2] as u32, bytes[3] as u32)?;
    date.and_hms_opt(bytes[4] as u32, bytes[5] as u32, bytes[6] as u32)
}

fn site_name(code: u8) -> Value {
    match code {
        1 => Value::Text("armpit".to_string()),
        2 => Value::Text("body".to_string()),
        3 => Value::Text("ear".to_string()),
        6 => Value::Text("mouth".to_string()),
        _ => Value::Null,
    }
}

/// Decode one 13-byte thermometer record.
///
/// A record of any other length yields an empty, invalid test.
pub fn decode(record: &[u8]) -> Test {
    let mut test = Test::new("thermometer", 1, REQUIRED_META);
    if record.len() != RECORD_LEN {
        return test;
    }

    let flags = record[0];
    let fahrenheit = flags & 0x01 != 0;
    let has_timestamp = flags & 0x02 != 0;
    let has_type = flags & 0x04 != 0;

    let units = if fahrenheit { "F" } else { "C" };
    let mut measurement = Measurement::new();
    measurement.set(
        "temperature",
        Attribute::with_precision(decode_ieee11073_float(&record[1..5]), units, 1),
    );
    test.add_measurement(measurement);

    if has_timestamp {
        if let Some(at) = decode_timestamp(&record[5..12]) {
            test.set_meta("measured_at", Attribute::new(Value::Date(at)));
        }
    }
    if has_type {
        test.set_meta("mode", Attribute::new(site_name(record[12])));
    }

    test
}
