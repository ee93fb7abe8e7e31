//! Device session management
//!
//! `DeviceSession` composes the channel, the protocol engine, and the
//! record decoders into the instrument lifecycle: discover → connect →
//! reset → set inputs → confirm → measure → read result → disconnect. The
//! GUI layer drives it through the public methods and consumes the
//! [`SessionEvent`]s it emits; the session never calls into any dialog
//! code and never writes files.

use std::fmt;
use std::io::{Read, Write};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::measurement::{Attribute, Test, Value};
use crate::data::{body_composition, hearing, weight};
use crate::device::{DeviceDescriptor, DeviceKind};

use super::channel::{Channel, SerialChannel};
use super::engine::{EngineEvent, ProtocolEngine, SessionState};
use super::serial::{clear_buffers, configure_port, open_port};
use super::ProtocolError;

/// Measurement system confirmed on the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitsSystem {
    /// Kilograms / centimetres
    Metric,
    /// Pounds / inches
    Imperial,
}

impl UnitsSystem {
    /// Mass unit label for decoded measurements
    pub fn mass_label(self) -> &'static str {
        match self {
            UnitsSystem::Metric => "kg",
            UnitsSystem::Imperial => "lb",
        }
    }

    /// Height unit label for decoded measurements
    pub fn height_label(self) -> &'static str {
        match self {
            UnitsSystem::Metric => "cm",
            UnitsSystem::Imperial => "in",
        }
    }

    /// The settable digit in the `set_measurement_system` command
    pub fn command_digit(self) -> &'static str {
        match self {
            UnitsSystem::Metric => "0",
            UnitsSystem::Imperial => "1",
        }
    }
}

impl fmt::Display for UnitsSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitsSystem::Metric => write!(f, "metric"),
            UnitsSystem::Imperial => write!(f, "imperial"),
        }
    }
}

/// Subject gender as the analyzer encodes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    /// Encoded `1`
    Male,
    /// Encoded `2`
    Female,
}

/// Analyzer equation selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Encoded `0`
    Standard,
    /// Encoded `1`
    Athletic,
}

/// Operator inputs for a body-composition measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyCompositionInputs {
    /// Measurement system to configure on the analyzer
    pub units: UnitsSystem,
    /// Clothing allowance subtracted from the reading
    pub tare_weight: f64,
    /// Subject gender
    pub gender: Gender,
    /// Equation selection
    pub body_type: BodyType,
    /// Standing height (cm or in, per `units`)
    pub height: f64,
    /// Age in years (2-digit field on the wire)
    pub age: u8,
}

impl BodyCompositionInputs {
    /// The `set_*` command burst these inputs translate to, in protocol
    /// order. Zero-padded widths match the command template slots; an
    /// out-of-range value fails the template's exact-width check.
    pub fn setting_commands(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "set_measurement_system",
                self.units.command_digit().to_string(),
            ),
            ("set_tare_weight", format!("{:05.1}", self.tare_weight)),
            (
                "set_gender",
                match self.gender {
                    Gender::Male => "1".to_string(),
                    Gender::Female => "2".to_string(),
                },
            ),
            (
                "set_body_type",
                match self.body_type {
                    BodyType::Standard => "0".to_string(),
                    BodyType::Athletic => "1".to_string(),
                },
            ),
            ("set_height", format!("{:05.1}", self.height)),
            ("set_age", format!("{:02}", self.age)),
        ]
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Optional cap on `!`-rejection retries per command. The instruments'
    /// native behavior is unlimited retry; leave `None` to preserve it.
    pub retry_limit: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            retry_limit: None,
        }
    }
}

/// Notifications crossing the boundary to the GUI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Lifecycle state changed
    StateChanged(SessionState),
    /// The session may be (re)connected
    CanConnect,
    /// All settings confirmed; measurement may be triggered
    CanMeasure,
    /// A valid result is ready for the output writer
    CanWrite,
    /// The test aggregate changed (new or updated result data)
    DataChanged,
    /// A measurement arrived but did not produce a valid test
    InvalidResult(String),
    /// Fatal fault; the channel has been torn down
    Error(String),
}

/// One instrument session: exclusive owner of the channel and the current
/// test aggregate for a connect/measure cycle.
pub struct DeviceSession {
    engine: ProtocolEngine,
    channel: Option<Box<dyn Channel>>,
    config: SessionConfig,
    test: Test,
    units: UnitsSystem,
    measured_at: Option<NaiveDateTime>,
}

impl DeviceSession {
    /// Create a session for an instrument; no channel is opened yet.
    pub fn new(kind: DeviceKind, config: SessionConfig) -> Self {
        let engine = ProtocolEngine::new(kind.descriptor()).with_retry_limit(config.retry_limit);
        Self {
            engine,
            channel: None,
            config,
            test: blank_test(kind),
            units: UnitsSystem::Metric,
            measured_at: None,
        }
    }

    /// The device this session drives
    pub fn kind(&self) -> DeviceKind {
        self.engine.descriptor().kind
    }

    fn descriptor(&self) -> &'static DeviceDescriptor {
        self.engine.descriptor()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.engine.state()
    }

    /// Whether a channel is currently open
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Measurement system currently confirmed on the instrument
    pub fn units(&self) -> UnitsSystem {
        self.units
    }

    /// The current test aggregate
    pub fn test(&self) -> &Test {
        &self.test
    }

    /// Serialize the current result for the output writer.
    pub fn to_record(&self) -> serde_json::Value {
        self.test.to_record()
    }

    /// Open the configured serial port and start the session.
    pub fn connect(&mut self) -> Result<Vec<SessionEvent>, ProtocolError> {
        if self.channel.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        let settings = &self.descriptor().serial;
        let mut port = open_port(&self.config.port_name, settings)?;
        configure_port(port.as_mut(), settings)?;
        clear_buffers(port.as_mut())?;
        info!(
            device = self.descriptor().name,
            port = %self.config.port_name,
            "serial port opened"
        );
        self.attach(Box::new(SerialChannel::new(port)))
    }

    /// Start the session over an already-open channel (simulator, tests).
    pub fn attach(&mut self, mut channel: Box<dyn Channel>) -> Result<Vec<SessionEvent>, ProtocolError> {
        if self.channel.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        channel.clear_input_buffer()?;
        self.channel = Some(channel);
        let events = self.engine.begin()?;
        let out = self.process_events(events);
        self.write_next()?;
        Ok(out)
    }

    /// Close the channel and reset the lifecycle.
    pub fn disconnect(&mut self) -> Vec<SessionEvent> {
        self.channel = None;
        self.measured_at = None;
        let events = self.engine.abort();
        self.process_events(events)
    }

    /// Enqueue the input-setting burst for a body-composition measurement.
    /// The commands flow through the state machine one response at a time.
    pub fn set_inputs(&mut self, inputs: &BodyCompositionInputs) -> Result<Vec<SessionEvent>, ProtocolError> {
        for (name, arg) in inputs.setting_commands() {
            self.engine.enqueue_setting(name, Some(&arg))?;
        }
        self.write_next()?;
        Ok(Vec::new())
    }

    /// Ask the instrument to echo its settings back for confirmation.
    pub fn confirm_settings(&mut self) -> Result<Vec<SessionEvent>, ProtocolError> {
        self.engine.request_confirmations()?;
        self.write_next()?;
        Ok(Vec::new())
    }

    /// Trigger a measurement. `measured_at` stamps the decoded result; it
    /// is supplied by the caller so decoding stays clock-free.
    pub fn measure(&mut self, measured_at: NaiveDateTime) -> Result<Vec<SessionEvent>, ProtocolError> {
        self.measured_at = Some(measured_at);
        let events = self.engine.request_measurement()?;
        let out = self.process_events(events);
        self.write_next()?;
        Ok(out)
    }

    /// Handle bytes that arrived on the channel.
    pub fn on_data_available(&mut self, bytes: &[u8]) -> Result<Vec<SessionEvent>, ProtocolError> {
        let events = self.engine.feed(bytes);
        let out = self.process_events(events);
        self.write_next()?;
        Ok(out)
    }

    /// Poll the channel once: read whatever is available and handle it.
    pub fn pump(&mut self) -> Result<Vec<SessionEvent>, ProtocolError> {
        let chunk = {
            let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;
            let available = channel.bytes_to_read()? as usize;
            if available == 0 {
                Vec::new()
            } else {
                let mut buf = vec![0u8; available];
                let n = channel.read(&mut buf)?;
                buf.truncate(n);
                buf
            }
        };
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.on_data_available(&chunk)
    }

    /// Pump until the conversation quiesces. Intended for the simulator
    /// and tests, where responses are immediate; against hardware, use
    /// [`DeviceSession::pump`] from the host event loop.
    pub fn service(&mut self) -> Result<Vec<SessionEvent>, ProtocolError> {
        let mut all = Vec::new();
        while self.channel.is_some() {
            let events = self.pump()?;
            let quiet = events.is_empty();
            all.extend(events);
            let pending = match self.channel.as_mut() {
                Some(channel) => channel.bytes_to_read()?,
                None => 0,
            };
            if quiet && pending == 0 {
                break;
            }
        }
        Ok(all)
    }

    /// Transmit the next queued frame, if any and none is in flight.
    fn write_next(&mut self) -> Result<(), ProtocolError> {
        if let Some(frame) = self.engine.next_write() {
            let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;
            channel.write_all(&frame)?;
            channel.flush()?;
        }
        Ok(())
    }

    fn process_events(&mut self, events: Vec<EngineEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        for event in events {
            match event {
                EngineEvent::StateChanged(state) => {
                    out.push(SessionEvent::StateChanged(state));
                    match state {
                        SessionState::ReadyToMeasure => out.push(SessionEvent::CanMeasure),
                        SessionState::ResultReady => out.push(SessionEvent::CanWrite),
                        SessionState::Disconnected => out.push(SessionEvent::CanConnect),
                        _ => {}
                    }
                }
                EngineEvent::ResetAcknowledged => {
                    self.test.reset();
                }
                EngineEvent::SettingAccepted { command, body } => {
                    if command == "set_measurement_system" {
                        self.units = match body.last() {
                            Some(b'1') => UnitsSystem::Imperial,
                            _ => UnitsSystem::Metric,
                        };
                        debug!(units = %self.units, "measurement system confirmed");
                    }
                }
                EngineEvent::SettingConfirmed { description, .. } => {
                    debug!(confirmation = description, "setting confirmed");
                }
                EngineEvent::Retry { .. } => {}
                EngineEvent::MeasurementRecord(frame) => {
                    out.extend(self.handle_record(&frame));
                }
                EngineEvent::InvalidRecord { length } => {
                    out.push(SessionEvent::InvalidResult(format!(
                        "unexpected record length {} (expected {})",
                        length,
                        self.descriptor().record_len
                    )));
                }
                EngineEvent::Fault { message } => {
                    // Fatal: tear the channel down; the operator must
                    // reconnect and restart the input sequence.
                    self.channel = None;
                    out.push(SessionEvent::Error(format!("error: {}", message)));
                    out.push(SessionEvent::CanConnect);
                }
                EngineEvent::Stalled { .. } => {}
            }
        }
        out
    }

    fn handle_record(&mut self, frame: &[u8]) -> Vec<SessionEvent> {
        match self.kind() {
            DeviceKind::BodyCompositionAnalyzer => {
                self.test = body_composition::decode(frame, self.units, self.measured_at);
            }
            DeviceKind::Audiometer => {
                self.test = hearing::decode(frame);
            }
            DeviceKind::WeighScale => {
                // Readings accumulate; a full aggregate starts over.
                if self.test.measurement_count() >= self.test.expected_measurements() {
                    self.test.reset();
                }
                let reading = weight::decode_reading(frame);
                self.test.add_measurement(reading);
                if let Some(at) = self.measured_at {
                    self.test
                        .set_meta("measured_at", Attribute::new(Value::Date(at)));
                }
            }
        }

        let valid = self.test.is_valid();
        let engine_events = self.engine.record_result(valid);
        let mut out = self.process_events(engine_events);
        out.push(SessionEvent::DataChanged);
        if !valid && !self.descriptor().accumulate_readings {
            out.push(SessionEvent::InvalidResult(
                "measurement decoded but the test is incomplete or invalid".to_string(),
            ));
        }
        out
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn blank_test(kind: DeviceKind) -> Test {
    let descriptor = kind.descriptor();
    let required = match kind {
        DeviceKind::BodyCompositionAnalyzer => body_composition::REQUIRED_META,
        DeviceKind::WeighScale => weight::REQUIRED_META,
        DeviceKind::Audiometer => hearing::REQUIRED_META,
    };
    Test::new(descriptor.name, descriptor.expected_measurements, required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_disconnected() {
        let session = DeviceSession::new(DeviceKind::WeighScale, SessionConfig::default());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(session.test().measurements().is_empty());
    }

    #[test]
    fn test_inputs_format_to_slot_widths() {
        let inputs = BodyCompositionInputs {
            units: UnitsSystem::Metric,
            tare_weight: 0.5,
            gender: Gender::Female,
            body_type: BodyType::Standard,
            height: 170.5,
            age: 7,
        };
        let commands = inputs.setting_commands();
        assert_eq!(
            commands,
            vec![
                ("set_measurement_system", "0".to_string()),
                ("set_tare_weight", "000.5".to_string()),
                ("set_gender", "2".to_string()),
                ("set_body_type", "0".to_string()),
                ("set_height", "170.5".to_string()),
                ("set_age", "07".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_inputs_requires_connection() {
        let mut session =
            DeviceSession::new(DeviceKind::BodyCompositionAnalyzer, SessionConfig::default());
        let inputs = BodyCompositionInputs {
            units: UnitsSystem::Metric,
            tare_weight: 0.0,
            gender: Gender::Male,
            body_type: BodyType::Standard,
            height: 170.5,
            age: 42,
        };
        assert!(matches!(
            session.set_inputs(&inputs),
            Err(ProtocolError::InvalidState(_))
        ));
    }

    #[test]
    fn test_units_default_metric() {
        let session = DeviceSession::new(DeviceKind::BodyCompositionAnalyzer, SessionConfig::default());
        assert_eq!(session.units(), UnitsSystem::Metric);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = SessionConfig {
            port_name: "/dev/ttyUSB0".to_string(),
            retry_limit: Some(3),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port_name, config.port_name);
        assert_eq!(back.retry_limit, config.retry_limit);
    }
}
