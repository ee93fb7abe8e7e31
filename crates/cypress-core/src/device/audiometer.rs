//! Audiometer protocol tables (RA-300 class)
//!
//! 9600 8N1 with the instrument's own `~ CR` frame terminator. The
//! audiometer runs its test sequence standalone; the session resets it
//! with `CAN` (0x18) and pulls the stored results with `ENQ '4'`, which
//! returns a fixed 139-byte record of hearing threshold levels for both
//! ears. Threshold fields carry either a numeric dB level or a two-letter
//! outcome code; the code tables live in the hearing decoder.

use std::sync::LazyLock;

use crate::data::layout::{FieldKind, FieldSpec};
use crate::protocol::{CommandTable, CommandTemplate};

use super::{DeviceDescriptor, DeviceKind, SerialSettings};

/// Threshold test labels in record order, shared by both ears.
pub const TEST_ORDER: &[&str] = &[
    "1k_test", "500", "1000", "2000", "3000", "4000", "6000", "8000",
];

/// Byte offset of the first left-ear threshold field.
pub const LEFT_THRESHOLDS_AT: usize = 24;
/// Byte offset of the first right-ear threshold field.
pub const RIGHT_THRESHOLDS_AT: usize = 48;
/// Width of one threshold field.
pub const THRESHOLD_WIDTH: usize = 3;

/// Fixed 139-byte result record layout, terminator at 137..=138.
///
/// The sixteen 3-wide threshold fields at 24..=71 are decoded by the
/// hearing decoder (code table first, then numeric) and are deliberately
/// not listed here as plain fields.
pub const RECORD_LAYOUT: &[FieldSpec] = &[
    FieldSpec::new(0, 7, "patient_id", FieldKind::Text),
    FieldSpec::new(8, 23, "test_datetime", FieldKind::DateTime),
];

fn commands() -> CommandTable {
    CommandTable::new()
        .with_command("reset", CommandTemplate::fixed(&[0x18]))
        .with_command("measure_hearing", CommandTemplate::fixed(&[0x05, 0x34]))
        .with_response(&[0x18, 0x7E], "reset")
        .with_confirmation(&[0x18, 0x7E], "audiometer reset")
        .with_fault(b"E90", "calibration data lost, contact service")
        .with_fault(b"E91", "transducer disconnected")
}

/// Protocol descriptor for the audiometer.
pub static DESCRIPTOR: LazyLock<DeviceDescriptor> = LazyLock::new(|| DeviceDescriptor {
    name: "audiometer",
    kind: DeviceKind::Audiometer,
    serial: SerialSettings {
        baud_rate: 9600,
        data_bits: serialport::DataBits::Eight,
        parity: serialport::Parity::None,
        stop_bits: serialport::StopBits::One,
    },
    terminator: b"~\r",
    key_len: 2,
    expected_confirmations: 0,
    record_len: 139,
    expected_measurements: 16,
    accumulate_readings: false,
    measure_command: "measure_hearing",
    confirm_command: None,
    commands: commands(),
    layout: RECORD_LAYOUT,
});
