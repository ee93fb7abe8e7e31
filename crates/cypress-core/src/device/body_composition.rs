//! Body-composition analyzer protocol tables (TBF-310 class)
//!
//! ASCII commands over 9600 8N1, every frame terminated `CR LF`. The
//! operator enters five inputs (tare weight, gender, body type, height,
//! age) plus the measurement system; the analyzer echoes each setting, a
//! `D?` query re-reads them back for confirmation, and `G1` runs the
//! impedance measurement and returns a fixed 59-byte result record.
//!
//! Settings rejections replace the settable digit with `!` (e.g. `U!`);
//! hard faults are `E`-coded frames listed in the fault table.

use std::sync::LazyLock;

use crate::data::layout::{FieldKind, FieldSpec};
use crate::protocol::{CommandTable, CommandTemplate};

use super::{DeviceDescriptor, DeviceKind, SerialSettings};

/// Fixed 59-byte measurement record layout, terminator at 57..=58.
pub const RECORD_LAYOUT: &[FieldSpec] = &[
    FieldSpec::new(0, 0, "body_type", FieldKind::Text),
    FieldSpec::new(1, 1, "gender", FieldKind::Text),
    FieldSpec::new(2, 3, "age", FieldKind::Int),
    FieldSpec::new(4, 8, "height", FieldKind::Float),
    FieldSpec::new(9, 13, "weight", FieldKind::Float),
    FieldSpec::new(14, 16, "impedance", FieldKind::Int),
    FieldSpec::new(17, 20, "percent_fat", FieldKind::Float),
    FieldSpec::new(21, 25, "fat_mass", FieldKind::Float),
    FieldSpec::new(26, 30, "fat_free_mass", FieldKind::Float),
    FieldSpec::new(31, 35, "total_body_water", FieldKind::Float),
    FieldSpec::new(36, 39, "bmi", FieldKind::Float),
    FieldSpec::new(40, 44, "bmr", FieldKind::Int),
    // 45..=56 reserved by the instrument, 57..=58 CR LF
];

fn commands() -> CommandTable {
    CommandTable::new()
        .with_command("reset", CommandTemplate::fixed(&[0x1F]))
        .with_command("set_measurement_system", CommandTemplate::with_slot(b"U#", 1, 1))
        .with_command("set_tare_weight", CommandTemplate::with_slot(b"D0#####", 2, 5))
        .with_command("set_gender", CommandTemplate::with_slot(b"D1#", 2, 1))
        .with_command("set_body_type", CommandTemplate::with_slot(b"D2#", 2, 1))
        .with_command("set_height", CommandTemplate::with_slot(b"D3#####", 2, 5))
        .with_command("set_age", CommandTemplate::with_slot(b"D4##", 2, 2))
        .with_command("confirm_settings", CommandTemplate::fixed(b"D?"))
        .with_command("measure_body_fat", CommandTemplate::fixed(b"G1"))
        .with_response(&[0x1F, 0x0D], "reset")
        .with_response(b"U0", "set_measurement_system")
        .with_response(b"U1", "set_measurement_system")
        .with_response(b"D0", "set_tare_weight")
        .with_response(b"D1", "set_gender")
        .with_response(b"D2", "set_body_type")
        .with_response(b"D3", "set_height")
        .with_response(b"D4", "set_age")
        .with_confirmation(&[0x1F, 0x0D], "analyzer reset")
        .with_confirmation(b"U0", "measurement system: metric")
        .with_confirmation(b"U1", "measurement system: imperial")
        .with_confirmation(b"D0", "tare weight confirmed")
        .with_confirmation(b"D1", "gender confirmed")
        .with_confirmation(b"D2", "body type confirmed")
        .with_confirmation(b"D3", "height confirmed")
        .with_confirmation(b"D4", "age confirmed")
        .with_fault(b"E000", "internal malfunction, contact service")
        .with_fault(
            b"E011",
            "impedance is abnormal, clean the electrodes and measure again",
        )
        .with_fault(b"E020", "subject stepped off the platform too early")
        .with_fault(b"E021", "weight exceeds platform capacity")
        .with_fault(b"E042", "measurement interrupted")
}

/// Protocol descriptor for the body-composition analyzer.
pub static DESCRIPTOR: LazyLock<DeviceDescriptor> = LazyLock::new(|| DeviceDescriptor {
    name: "body_composition_analyzer",
    kind: DeviceKind::BodyCompositionAnalyzer,
    serial: SerialSettings {
        baud_rate: 9600,
        data_bits: serialport::DataBits::Eight,
        parity: serialport::Parity::None,
        stop_bits: serialport::StopBits::One,
    },
    terminator: b"\r\n",
    key_len: 2,
    expected_confirmations: 5,
    record_len: 59,
    expected_measurements: 8,
    accumulate_readings: false,
    measure_command: "measure_body_fat",
    confirm_command: Some("confirm_settings"),
    commands: commands(),
    layout: RECORD_LAYOUT,
});
