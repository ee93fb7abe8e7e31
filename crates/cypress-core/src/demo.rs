//! Demo mode - simulated instruments for testing
//!
//! Implements each serial instrument's wire contract over an in-memory
//! [`Channel`] so the whole session lifecycle can run without hardware.
//! Responses are table-driven and deterministic; fault frames and `!`
//! settings rejections can be injected to exercise the error paths.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};

use crate::device::DeviceKind;
use crate::protocol::{Channel, FrameAccumulator};

/// A scripted instrument on the other end of an in-memory channel.
///
/// Bytes written by the session are framed exactly like the real device
/// frames its input; each complete command produces the instrument's
/// canonical response in the inbox for the session to read back.
pub struct SimulatedInstrument {
    kind: DeviceKind,
    inbox: VecDeque<u8>,
    framer: FrameAccumulator,
    /// Setting echoes stored by their `D`-digit, replayed by `D?`
    settings: BTreeMap<u8, Vec<u8>>,
    confirm_cursor: usize,
    commands_seen: usize,
    fault_after: Option<(usize, Vec<u8>)>,
    reject_next: u32,
    scale_readings: VecDeque<(&'static str, f64)>,
    hearing_levels: [&'static str; 16],
}

impl SimulatedInstrument {
    /// Create a simulator for the given instrument.
    pub fn new(kind: DeviceKind) -> Self {
        let descriptor = kind.descriptor();
        Self {
            kind,
            inbox: VecDeque::new(),
            framer: FrameAccumulator::new(descriptor.terminator),
            settings: BTreeMap::new(),
            confirm_cursor: 0,
            commands_seen: 0,
            fault_after: None,
            reject_next: 0,
            scale_readings: VecDeque::from([("ST", 75.5), ("ST", 75.3)]),
            hearing_levels: [
                "010", "015", "020", "025", "030", "035", "040", "045", //
                "010", "015", "020", "025", "030", "035", "040", "045",
            ],
        }
    }

    /// Respond to the `n`-th subsequent command (0 = the very next one)
    /// with the given fault body instead of its normal answer.
    pub fn inject_fault_after(&mut self, commands: usize, body: &[u8]) {
        self.fault_after = Some((self.commands_seen + commands, body.to_vec()));
    }

    /// Reject the next `count` settable commands with a `!` response.
    pub fn reject_settings(&mut self, count: u32) {
        self.reject_next = count;
    }

    /// Replace the scripted scale readings (status, weight) pairs.
    pub fn set_scale_readings(&mut self, readings: Vec<(&'static str, f64)>) {
        self.scale_readings = readings.into();
    }

    /// Replace the scripted hearing threshold fields (16 of them, left ear
    /// then right, 3 characters each).
    pub fn set_hearing_levels(&mut self, levels: [&'static str; 16]) {
        self.hearing_levels = levels;
    }

    fn push_response(&mut self, body: &[u8]) {
        self.inbox.extend(body);
        self.inbox.extend(self.framer.terminator());
    }

    fn handle_command(&mut self, frame: Vec<u8>) {
        let terminator = self.framer.terminator();
        let body = frame
            .strip_suffix(terminator)
            .unwrap_or(&frame[..])
            .to_vec();

        let seen = self.commands_seen;
        self.commands_seen += 1;
        if let Some((at, fault)) = &self.fault_after {
            if seen >= *at {
                let fault = fault.clone();
                self.fault_after = None;
                self.push_response(&fault);
                return;
            }
        }

        match self.kind {
            DeviceKind::BodyCompositionAnalyzer => self.handle_analyzer(&body),
            DeviceKind::WeighScale => self.handle_scale(&body),
            DeviceKind::Audiometer => self.handle_audiometer(&body),
        }
    }

    fn handle_analyzer(&mut self, body: &[u8]) {
        match body {
            [0x1F] => {
                self.settings.clear();
                self.confirm_cursor = 0;
                self.push_response(&[0x1F]);
            }
            b"G1" => {
                let record = self.analyzer_record();
                self.push_response(&record);
            }
            b"D?" => {
                // One stored setting echo per query, cycling D0..D4.
                let stored: Vec<Vec<u8>> = self.settings.values().cloned().collect();
                if stored.is_empty() {
                    self.push_response(b"D!");
                    return;
                }
                let echo = stored[self.confirm_cursor % stored.len()].clone();
                self.confirm_cursor += 1;
                self.push_response(&echo);
            }
            [b'U', digit] => {
                if self.reject_next > 0 {
                    self.reject_next -= 1;
                    self.push_response(b"U!");
                    return;
                }
                let echo = [b'U', *digit];
                self.push_response(&echo);
            }
            [b'D', digit, ..] => {
                if self.reject_next > 0 {
                    self.reject_next -= 1;
                    self.push_response(&[b'D', *digit, b'!']);
                    return;
                }
                self.settings.insert(*digit, body.to_vec());
                self.push_response(body);
            }
            _ => self.push_response(b"??"),
        }
    }

    fn handle_scale(&mut self, body: &[u8]) {
        match body {
            b"Z" => self.push_response(b"Z"),
            b"P" => {
                let (status, weight) = match self.scale_readings.pop_front() {
                    Some(reading) => reading,
                    None => ("ST", 75.5),
                };
                let record = format!("{},GS,{:+08.1},kg", status, weight);
                self.push_response(record.as_bytes());
            }
            _ => self.push_response(b"??"),
        }
    }

    fn handle_audiometer(&mut self, body: &[u8]) {
        match body {
            [0x18] => self.push_response(&[0x18]),
            [0x05, 0x34] => {
                let record = self.audiometer_record();
                self.push_response(&record);
            }
            _ => self.push_response(b"??"),
        }
    }

    fn stored_setting(&self, digit: u8, skip: usize, default: &str) -> String {
        self.settings
            .get(&digit)
            .and_then(|body| std::str::from_utf8(&body[skip..]).ok().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    /// Assemble the analyzer's 57-byte record body from the stored inputs
    /// plus canned physiology.
    fn analyzer_record(&self) -> Vec<u8> {
        let body_type = self.stored_setting(b'2', 2, "0");
        let gender = self.stored_setting(b'1', 2, "2");
        let age = self.stored_setting(b'4', 2, "42");
        let height = self.stored_setting(b'3', 2, "170.5");
        let mut record = format!(
            "{}{}{:>2}{:>5}{}{}{}{}{}{}{}{}",
            body_type,
            gender,
            age,
            height,
            "075.2", // weight
            "523",   // impedance
            "24.5",  // percent fat
            "018.4", // fat mass
            "056.8", // fat free mass
            "041.6", // total body water
            "25.9",  // bmi
            "07250", // bmr
        );
        record.push_str(&" ".repeat(12));
        record.into_bytes()
    }

    /// Assemble the audiometer's 137-byte record body.
    fn audiometer_record(&self) -> Vec<u8> {
        let mut record = String::with_capacity(137);
        record.push_str("A1234567");
        record.push_str("03/15/2414:30:05");
        for level in &self.hearing_levels {
            record.push_str(&format!("{:>3}", level));
        }
        while record.len() < 137 {
            record.push(' ');
        }
        record.into_bytes()
    }
}

impl Read for SimulatedInstrument {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.inbox.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for SimulatedInstrument {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let frames = self.framer.feed(buf);
        for frame in frames {
            self.handle_command(frame);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for SimulatedInstrument {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.inbox.clear();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.inbox.len() as u32)
    }
}
