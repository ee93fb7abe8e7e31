//! Instrument protocol descriptors
//!
//! One protocol engine drives every serial instrument; the per-device
//! differences live entirely in these descriptors: line settings, framing
//! terminator, command vocabulary, record layout, and the expected
//! confirmation/measurement counts. Selecting an instrument is selecting a
//! [`DeviceKind`]; there is no per-device subclassing.

pub mod audiometer;
pub mod body_composition;
pub mod weigh_scale;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

use crate::data::layout::FieldSpec;
use crate::protocol::CommandTable;

/// Serial line settings fixed by an instrument's datasheet
#[derive(Debug, Clone, Copy)]
pub struct SerialSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
}

/// The serial instruments the engine knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Body-composition analyzer (TBF-310 class)
    BodyCompositionAnalyzer,
    /// Weigh scale (Tanita class)
    WeighScale,
    /// Audiometer (RA-300 class)
    Audiometer,
}

impl DeviceKind {
    /// The protocol descriptor for this instrument.
    pub fn descriptor(self) -> &'static DeviceDescriptor {
        match self {
            DeviceKind::BodyCompositionAnalyzer => &*body_composition::DESCRIPTOR,
            DeviceKind::WeighScale => &*weigh_scale::DESCRIPTOR,
            DeviceKind::Audiometer => &*audiometer::DESCRIPTOR,
        }
    }

    /// Stable device name used in output records.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

/// Everything the generic engine needs to drive one instrument
pub struct DeviceDescriptor {
    /// Stable device name for records and logs
    pub name: &'static str,
    /// The kind this descriptor belongs to
    pub kind: DeviceKind,
    /// Serial line settings
    pub serial: SerialSettings,
    /// Response/command terminator sequence
    pub terminator: &'static [u8],
    /// Length of the command key prefix used to classify responses
    pub key_len: usize,
    /// Distinct setting confirmations required before measuring
    pub expected_confirmations: usize,
    /// Exact byte length of a measurement payload frame
    pub record_len: usize,
    /// Exact measurement count of a complete test
    pub expected_measurements: usize,
    /// Whether successive readings accumulate into one test (weigh scale)
    /// or each payload replaces the previous result
    pub accumulate_readings: bool,
    /// Symbolic name of the measurement trigger command
    pub measure_command: &'static str,
    /// Symbolic name of the settings-confirmation query, if the protocol
    /// has a confirmation phase
    pub confirm_command: Option<&'static str>,
    /// Command/response lookup tables
    pub commands: CommandTable,
    /// Fixed-offset record layout
    pub layout: &'static [FieldSpec],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_are_coherent() {
        for kind in [
            DeviceKind::BodyCompositionAnalyzer,
            DeviceKind::WeighScale,
            DeviceKind::Audiometer,
        ] {
            let d = kind.descriptor();
            assert_eq!(d.kind, kind);
            assert!(!d.terminator.is_empty(), "{}", d.name);
            assert!(d.record_len > d.terminator.len(), "{}", d.name);
            assert!(d.commands.knows("reset"), "{}", d.name);
            assert!(d.commands.knows(d.measure_command), "{}", d.name);
            if let Some(confirm) = d.confirm_command {
                assert!(d.commands.knows(confirm), "{}", d.name);
                assert!(d.expected_confirmations > 0, "{}", d.name);
            }
            // Every layout field must fit inside the record, terminator excluded.
            let body_len = d.record_len - d.terminator.len();
            for field in d.layout {
                assert!(field.start <= field.end, "{}:{}", d.name, field.name);
                assert!(field.end < body_len, "{}:{}", d.name, field.name);
            }
        }
    }
}
