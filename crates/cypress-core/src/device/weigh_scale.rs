//! Weigh scale protocol tables (Tanita class)
//!
//! 9600 7E1, frames terminated `CR LF`. `Z` zeroes the platform, `P`
//! requests one reading as a fixed 19-byte record like `ST,GS,+00075.5,kg`.
//! Two stable readings make one complete weight test.

use std::sync::LazyLock;

use crate::data::layout::{FieldKind, FieldSpec};
use crate::protocol::{CommandTable, CommandTemplate};

use super::{DeviceDescriptor, DeviceKind, SerialSettings};

/// Fixed 19-byte reading layout, terminator at 17..=18.
pub const RECORD_LAYOUT: &[FieldSpec] = &[
    // ST = stable, US = unstable, OL = overload
    FieldSpec::new(0, 1, "status", FieldKind::Text),
    // GS = gross, NT = net (tare subtracted)
    FieldSpec::new(3, 4, "mode", FieldKind::Text),
    FieldSpec::new(6, 13, "weight", FieldKind::Float),
    FieldSpec::new(15, 16, "units", FieldKind::Text),
];

fn commands() -> CommandTable {
    CommandTable::new()
        .with_command("reset", CommandTemplate::fixed(b"Z"))
        .with_command("measure_weight", CommandTemplate::fixed(b"P"))
        .with_response(b"Z\r", "reset")
        .with_confirmation(b"Z\r", "scale zeroed")
        .with_fault(b"E00", "internal malfunction, contact service")
        .with_fault(b"E01", "load cell fault, power-cycle the scale")
}

/// Protocol descriptor for the weigh scale.
pub static DESCRIPTOR: LazyLock<DeviceDescriptor> = LazyLock::new(|| DeviceDescriptor {
    name: "weigh_scale",
    kind: DeviceKind::WeighScale,
    serial: SerialSettings {
        baud_rate: 9600,
        data_bits: serialport::DataBits::Seven,
        parity: serialport::Parity::Even,
        stop_bits: serialport::StopBits::One,
    },
    terminator: b"\r\n",
    key_len: 2,
    expected_confirmations: 0,
    record_len: 19,
    expected_measurements: 2,
    accumulate_readings: true,
    measure_command: "measure_weight",
    confirm_command: None,
    commands: commands(),
    layout: RECORD_LAYOUT,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_length_matches_layout() {
        let d = &*DESCRIPTOR;
        let sample = b"ST,GS,+00075.5,kg\r\n";
        assert_eq!(sample.len(), d.record_len);
    }

    #[test]
    fn test_zero_command() {
        let d = &*DESCRIPTOR;
        assert_eq!(d.commands.build("reset", None, d.terminator).unwrap(), b"Z\r\n");
        assert_eq!(d.commands.command_for_prefix(b"Z\r"), Some("reset"));
    }
}
