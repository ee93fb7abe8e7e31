//! Request queue and protocol state machine
//!
//! Owns the ordered queue of pending command frames and the session state.
//! The engine is reactive and performs no I/O of its own: the session feeds
//! it raw channel bytes, it classifies each terminated response against the
//! device's lookup tables, mutates state, and reports what happened as
//! [`EngineEvent`]s. `next_write` releases at most one frame at a time;
//! a second request is never in flight while a response is pending.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::device::DeviceDescriptor;

use super::command::CommandClass;
use super::framer::FrameAccumulator;
use super::ProtocolError;

/// Device session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No channel open
    Disconnected,
    /// Channel being opened
    Connecting,
    /// Reset sent, waiting for the instrument to acknowledge
    AwaitingReset,
    /// Accepting inputs / waiting for setting confirmations
    AwaitingConfirm,
    /// All settings confirmed, measurement may be triggered
    ReadyToMeasure,
    /// Measurement triggered, payload pending
    Measuring,
    /// A valid result is available
    ResultReady,
    /// Fatal fault, session must be restarted
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingReset => "awaiting-reset",
            SessionState::AwaitingConfirm => "awaiting-confirm",
            SessionState::ReadyToMeasure => "ready-to-measure",
            SessionState::Measuring => "measuring",
            SessionState::ResultReady => "result-ready",
            SessionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One queued (or in-flight) command frame
#[derive(Debug, Clone)]
pub struct PendingCommand {
    /// Symbolic command name
    pub name: &'static str,
    /// Complete wire frame, terminator included
    pub frame: Vec<u8>,
    retries: u32,
}

/// How a terminated response was classified
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseClassification {
    /// Response acknowledges the named command
    Confirmed(&'static str),
    /// Settings rejection (`!` marker); the request will be retried
    IncorrectRetryable,
    /// Known or generic `E`-coded device fault
    FatalError(String),
    /// Measurement payload of the expected fixed length
    MeasurementPayload,
    /// Measurement response of the wrong length
    WrongLengthPayload,
    /// Matches nothing the device is known to say
    Unrecognized,
}

/// What the engine has to report after consuming bytes
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The lifecycle state changed
    StateChanged(SessionState),
    /// The instrument acknowledged its reset; the result aggregate must be
    /// cleared by the owner
    ResetAcknowledged,
    /// A `set_*` command was accepted; `body` is the echoed frame body so
    /// derived state (units system) can be updated
    SettingAccepted {
        /// The acknowledged command
        command: &'static str,
        /// Echoed response body, terminator stripped
        body: Vec<u8>,
    },
    /// A setting echo arrived during the confirmation phase
    SettingConfirmed {
        /// The setting that was confirmed
        command: &'static str,
        /// Human-readable confirmation text
        description: &'static str,
    },
    /// A rejected request was re-enqueued for retry
    Retry {
        /// The rejected command
        command: &'static str,
    },
    /// A complete measurement payload arrived; the owner decodes it and
    /// reports validity back via [`ProtocolEngine::record_result`]
    MeasurementRecord(Vec<u8>),
    /// A measurement response arrived with the wrong byte length
    InvalidRecord {
        /// Observed frame length
        length: usize,
    },
    /// Fatal device fault; the queue has been cleared
    Fault {
        /// Operator-facing fault message
        message: String,
    },
    /// Unrecognized response; the cycle is stalled until reconnect
    Stalled {
        /// The offending frame
        frame: Vec<u8>,
    },
}

/// The per-device protocol state machine
pub struct ProtocolEngine {
    descriptor: &'static DeviceDescriptor,
    state: SessionState,
    queue: VecDeque<PendingCommand>,
    in_flight: Option<PendingCommand>,
    framer: FrameAccumulator,
    confirmed: BTreeSet<&'static str>,
    retry_limit: Option<u32>,
}

impl ProtocolEngine {
    /// Create an engine for the given device, parked in `Disconnected`.
    pub fn new(descriptor: &'static DeviceDescriptor) -> Self {
        Self {
            descriptor,
            state: SessionState::Disconnected,
            queue: VecDeque::new(),
            in_flight: None,
            framer: FrameAccumulator::new(descriptor.terminator),
            confirmed: BTreeSet::new(),
            retry_limit: None,
        }
    }

    /// Cap `!`-rejection retries per command. The instruments' native
    /// behavior is unlimited retry; a cap converts exhaustion into a fault.
    pub fn with_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The device descriptor this engine drives
    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.descriptor
    }

    /// Number of distinct settings confirmed so far
    pub fn confirmation_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Number of queued commands (in-flight excluded)
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether a request is awaiting its response
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    fn goto_state(&mut self, new_state: SessionState, events: &mut Vec<EngineEvent>) {
        if self.state != new_state {
            info!(device = self.descriptor.name, from = %self.state, to = %new_state, "state transition");
            self.state = new_state;
            events.push(EngineEvent::StateChanged(new_state));
        }
    }

    /// Begin a session: enqueue the reset command and move to
    /// `AwaitingReset`. Called by the session right after the channel opens.
    pub fn begin(&mut self) -> Result<Vec<EngineEvent>, ProtocolError> {
        let mut events = Vec::new();
        self.goto_state(SessionState::Connecting, &mut events);
        self.clear();
        self.enqueue("reset", None)?;
        self.goto_state(SessionState::AwaitingReset, &mut events);
        Ok(events)
    }

    /// Enqueue an input-setting command.
    pub fn enqueue_setting(&mut self, name: &'static str, arg: Option<&str>) -> Result<(), ProtocolError> {
        match self.state {
            SessionState::AwaitingConfirm | SessionState::ReadyToMeasure => {}
            other => return Err(ProtocolError::InvalidState(other.to_string())),
        }
        self.enqueue(name, arg)
    }

    /// Enqueue the settings-confirmation query, if this device has one.
    pub fn request_confirmations(&mut self) -> Result<(), ProtocolError> {
        if self.state != SessionState::AwaitingConfirm {
            return Err(ProtocolError::InvalidState(self.state.to_string()));
        }
        match self.descriptor.confirm_command {
            Some(name) => self.enqueue(name, None),
            None => Ok(()),
        }
    }

    /// Enqueue the measurement trigger and move to `Measuring`.
    pub fn request_measurement(&mut self) -> Result<Vec<EngineEvent>, ProtocolError> {
        match self.state {
            SessionState::ReadyToMeasure | SessionState::ResultReady | SessionState::Measuring => {}
            other => return Err(ProtocolError::InvalidState(other.to_string())),
        }
        self.enqueue(self.descriptor.measure_command, None)?;
        let mut events = Vec::new();
        self.goto_state(SessionState::Measuring, &mut events);
        Ok(events)
    }

    fn enqueue(&mut self, name: &'static str, arg: Option<&str>) -> Result<(), ProtocolError> {
        let frame = self
            .descriptor
            .commands
            .build(name, arg, self.descriptor.terminator)?;
        debug_assert!(frame.ends_with(self.descriptor.terminator));
        self.queue.push_back(PendingCommand {
            name,
            frame,
            retries: 0,
        });
        Ok(())
    }

    /// Release the next frame to transmit, or None while a response is
    /// pending or the queue is empty. Clears the inbound accumulator so a
    /// response can never be polluted by stale bytes.
    pub fn next_write(&mut self) -> Option<Vec<u8>> {
        if self.in_flight.is_some() {
            return None;
        }
        let cmd = self.queue.pop_front()?;
        self.framer.clear();
        debug!(device = self.descriptor.name, command = cmd.name, "transmitting request");
        let frame = cmd.frame.clone();
        self.in_flight = Some(cmd);
        Some(frame)
    }

    /// Consume raw channel bytes, handling every response they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for frame in self.framer.feed(bytes) {
            self.handle_frame(frame, &mut events);
        }
        events
    }

    /// The owner reports decode validity of the last measurement payload.
    pub fn record_result(&mut self, valid: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if valid {
            self.goto_state(SessionState::ResultReady, &mut events);
        }
        events
    }

    /// Clear the pending queue, confirmation cache, in-flight slot, and any
    /// partial inbound frame. State is left untouched.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.confirmed.clear();
        self.in_flight = None;
        self.framer.clear();
    }

    /// Tear the session down to `Disconnected`.
    pub fn abort(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.clear();
        self.goto_state(SessionState::Disconnected, &mut events);
        events
    }

    /// Classify a terminated response frame against the device tables.
    pub fn classify(&self, frame: &[u8], in_flight: &PendingCommand) -> ResponseClassification {
        let body = frame
            .strip_suffix(self.descriptor.terminator)
            .unwrap_or(frame);
        let tables = &self.descriptor.commands;

        // Known fault payloads match exactly, before anything else.
        if let Some(message) = tables.fault_for(body) {
            return ResponseClassification::FatalError(message.to_string());
        }

        let class = CommandClass::of(in_flight.name);

        // `!` marks a settings rejection; retryable for set/reset requests
        // and for confirmation queries that are still expecting echoes.
        if body.contains(&b'!') {
            let retryable = matches!(class, Some(CommandClass::Set | CommandClass::Reset))
                || (matches!(class, Some(CommandClass::Confirm))
                    && self.confirmed.len() < self.descriptor.expected_confirmations);
            if retryable {
                return ResponseClassification::IncorrectRetryable;
            }
        }

        if matches!(class, Some(CommandClass::Measure)) {
            if frame.len() == self.descriptor.record_len {
                return ResponseClassification::MeasurementPayload;
            }
            return ResponseClassification::WrongLengthPayload;
        }

        if frame.len() >= self.descriptor.key_len {
            if let Some(name) = tables.command_for_prefix(&frame[..self.descriptor.key_len]) {
                return ResponseClassification::Confirmed(name);
            }
        }

        // An unlisted E-code is still a fault, just one without a curated
        // operator message.
        if body.len() >= 2
            && body.len() <= 5
            && body[0] == b'E'
            && body[1..].iter().all(|b| b.is_ascii_digit())
        {
            return ResponseClassification::FatalError(format!(
                "unknown device fault {}",
                String::from_utf8_lossy(body)
            ));
        }

        ResponseClassification::Unrecognized
    }

    fn handle_frame(&mut self, frame: Vec<u8>, events: &mut Vec<EngineEvent>) {
        let Some(in_flight) = self.in_flight.take() else {
            warn!(
                device = self.descriptor.name,
                frame = ?frame,
                "unsolicited frame with no request in flight, dropped"
            );
            return;
        };

        match self.classify(&frame, &in_flight) {
            ResponseClassification::FatalError(message) => {
                error!(device = self.descriptor.name, message = %message, "device fault");
                self.queue.clear();
                self.confirmed.clear();
                self.goto_state(SessionState::Error, events);
                events.push(EngineEvent::Fault { message });
            }
            ResponseClassification::IncorrectRetryable => {
                let mut cmd = in_flight;
                cmd.retries += 1;
                if let Some(limit) = self.retry_limit {
                    if cmd.retries > limit {
                        error!(
                            device = self.descriptor.name,
                            command = cmd.name,
                            retries = cmd.retries,
                            "retry limit exhausted"
                        );
                        self.queue.clear();
                        self.confirmed.clear();
                        self.goto_state(SessionState::Error, events);
                        events.push(EngineEvent::Fault {
                            message: format!("device keeps rejecting {}", cmd.name),
                        });
                        return;
                    }
                }
                warn!(
                    device = self.descriptor.name,
                    command = cmd.name,
                    retries = cmd.retries,
                    "request rejected, retrying"
                );
                events.push(EngineEvent::Retry { command: cmd.name });
                self.queue.push_front(cmd);
            }
            ResponseClassification::MeasurementPayload => {
                debug!(
                    device = self.descriptor.name,
                    length = frame.len(),
                    "measurement payload received"
                );
                events.push(EngineEvent::MeasurementRecord(frame));
            }
            ResponseClassification::WrongLengthPayload => {
                warn!(
                    device = self.descriptor.name,
                    expected = self.descriptor.record_len,
                    got = frame.len(),
                    "measurement payload has wrong length"
                );
                events.push(EngineEvent::InvalidRecord {
                    length: frame.len(),
                });
            }
            ResponseClassification::Confirmed(name) => {
                let body = frame
                    .strip_suffix(self.descriptor.terminator)
                    .unwrap_or(&frame)
                    .to_vec();
                self.handle_confirmed(&in_flight, name, body, events);
            }
            ResponseClassification::Unrecognized => {
                // Deliberate fail-safe: the in-flight slot stays occupied so
                // the queue can never auto-drain past an unknown response.
                warn!(
                    device = self.descriptor.name,
                    command = in_flight.name,
                    frame = ?frame,
                    "unrecognized response, cycle stalled"
                );
                self.in_flight = Some(in_flight);
                events.push(EngineEvent::Stalled { frame });
            }
        }
    }

    fn handle_confirmed(
        &mut self,
        in_flight: &PendingCommand,
        name: &'static str,
        body: Vec<u8>,
        events: &mut Vec<EngineEvent>,
    ) {
        match CommandClass::of(in_flight.name) {
            Some(CommandClass::Reset) => {
                info!(device = self.descriptor.name, "reset acknowledged");
                self.confirmed.clear();
                events.push(EngineEvent::ResetAcknowledged);
                if self.descriptor.expected_confirmations == 0 {
                    self.goto_state(SessionState::ReadyToMeasure, events);
                } else {
                    self.goto_state(SessionState::AwaitingConfirm, events);
                }
            }
            Some(CommandClass::Set) => {
                events.push(EngineEvent::SettingAccepted {
                    command: name,
                    body,
                });
                self.goto_state(SessionState::AwaitingConfirm, events);
            }
            Some(CommandClass::Confirm) => {
                let description = self
                    .descriptor
                    .commands
                    .confirmation_for_prefix(&body[..self.descriptor.key_len.min(body.len())])
                    .unwrap_or("setting confirmed");
                self.confirmed.insert(name);
                events.push(EngineEvent::SettingConfirmed {
                    command: name,
                    description,
                });
                if self.confirmed.len() >= self.descriptor.expected_confirmations {
                    self.goto_state(SessionState::ReadyToMeasure, events);
                } else {
                    // Keep querying until every setting has echoed back.
                    let _ = self.enqueue(in_flight.name, None);
                }
            }
            Some(CommandClass::Measure) | None => {
                debug!(
                    device = self.descriptor.name,
                    command = in_flight.name,
                    response = name,
                    "acknowledgment outside a recognized phase"
                );
            }
        }
    }
}
