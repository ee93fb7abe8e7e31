//! End-to-end protocol scenarios driven over simulated instruments.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use chrono::{NaiveDate, NaiveDateTime};

use cypress_core::demo::SimulatedInstrument;
use cypress_core::device::DeviceKind;
use cypress_core::protocol::{
    BodyCompositionInputs, BodyType, Channel, DeviceSession, Gender, SessionConfig, SessionEvent,
    SessionState, UnitsSystem,
};

fn when() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap()
}

fn inputs() -> BodyCompositionInputs {
    BodyCompositionInputs {
        units: UnitsSystem::Metric,
        tare_weight: 0.5,
        gender: Gender::Female,
        body_type: BodyType::Standard,
        height: 170.5,
        age: 42,
    }
}

fn attach(session: &mut DeviceSession, sim: SimulatedInstrument) -> Vec<SessionEvent> {
    let mut events = session.attach(Box::new(sim)).unwrap();
    events.extend(session.service().unwrap());
    events
}

#[test]
fn body_composition_full_cycle() {
    let mut session =
        DeviceSession::new(DeviceKind::BodyCompositionAnalyzer, SessionConfig::default());
    let sim = SimulatedInstrument::new(DeviceKind::BodyCompositionAnalyzer);

    // Connect: reset is sent and acknowledged, inputs may be entered.
    let events = attach(&mut session, sim);
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::AwaitingReset)));
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::AwaitingConfirm)));

    // The five-setting burst flows through one response at a time.
    session.set_inputs(&inputs()).unwrap();
    session.service().unwrap();
    assert_eq!(session.state(), SessionState::AwaitingConfirm);

    // Confirmation queries retry internally until all five settings echo.
    session.confirm_settings().unwrap();
    let events = session.service().unwrap();
    assert!(events.contains(&SessionEvent::CanMeasure));
    assert_eq!(session.state(), SessionState::ReadyToMeasure);

    // Measure: the 59-byte payload decodes into a complete test.
    session.measure(when()).unwrap();
    let events = session.service().unwrap();
    assert!(events.contains(&SessionEvent::DataChanged));
    assert!(events.contains(&SessionEvent::CanWrite));
    assert_eq!(session.state(), SessionState::ResultReady);

    let test = session.test();
    assert!(test.is_valid());
    assert_eq!(test.measurement_count(), 8);

    // The inputs echoed by the instrument come back as metadata.
    let record = session.to_record();
    assert_eq!(record["device"], "body_composition_analyzer");
    assert_eq!(record["valid"], true);
    assert_eq!(record["metadata"]["age"], 42);
    assert_eq!(record["metadata"]["gender"], "female");
    assert_eq!(record["measurements"][0]["weight"]["units"], "kg");
}

#[test]
fn fatal_fault_aborts_session() {
    let mut session =
        DeviceSession::new(DeviceKind::BodyCompositionAnalyzer, SessionConfig::default());
    let mut sim = SimulatedInstrument::new(DeviceKind::BodyCompositionAnalyzer);
    // Fault mid-burst: command 0 is the reset, the burst follows.
    sim.inject_fault_after(3, b"E011");

    attach(&mut session, sim);
    session.set_inputs(&inputs()).unwrap();
    let events = session.service().unwrap();

    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Error(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1, "exactly one error notification");
    assert!(errors[0].starts_with("error: "));
    assert!(errors[0].contains("impedance"));

    assert_eq!(session.state(), SessionState::Error);
    assert!(!session.is_connected());
}

#[test]
fn rejected_settings_are_retried() {
    let mut session =
        DeviceSession::new(DeviceKind::BodyCompositionAnalyzer, SessionConfig::default());
    let mut sim = SimulatedInstrument::new(DeviceKind::BodyCompositionAnalyzer);
    sim.reject_settings(2);

    attach(&mut session, sim);
    session.set_inputs(&inputs()).unwrap();
    session.service().unwrap();

    // The rejected commands were re-sent verbatim and eventually accepted:
    // the confirmation phase completes with all five settings.
    session.confirm_settings().unwrap();
    session.service().unwrap();
    assert_eq!(session.state(), SessionState::ReadyToMeasure);
}

#[test]
fn weigh_scale_accumulates_two_readings() {
    let mut session = DeviceSession::new(DeviceKind::WeighScale, SessionConfig::default());
    let sim = SimulatedInstrument::new(DeviceKind::WeighScale);

    // No input phase: the scale is ready right after the zero command.
    let events = attach(&mut session, sim);
    assert!(events.contains(&SessionEvent::CanMeasure));

    session.measure(when()).unwrap();
    session.service().unwrap();
    assert_eq!(session.test().measurement_count(), 1);
    assert!(!session.test().is_valid());
    assert_eq!(session.state(), SessionState::Measuring);

    session.measure(when()).unwrap();
    session.service().unwrap();
    assert_eq!(session.test().measurement_count(), 2);
    assert!(session.test().is_valid());
    assert_eq!(session.state(), SessionState::ResultReady);

    let record = session.to_record();
    assert_eq!(record["measurements"][0]["weight"]["value"], 75.5);
    assert_eq!(record["measurements"][1]["weight"]["value"], 75.3);
}

#[test]
fn unstable_reading_never_counts() {
    let mut session = DeviceSession::new(DeviceKind::WeighScale, SessionConfig::default());
    let mut sim = SimulatedInstrument::new(DeviceKind::WeighScale);
    sim.set_scale_readings(vec![("US", 74.9), ("ST", 75.5), ("ST", 75.3)]);

    attach(&mut session, sim);

    // Unstable + stable: full count, but the unstable reading is invalid.
    session.measure(when()).unwrap();
    session.service().unwrap();
    session.measure(when()).unwrap();
    session.service().unwrap();
    assert_eq!(session.test().measurement_count(), 2);
    assert!(!session.test().is_valid());

    // A third reading starts a fresh aggregate.
    session.measure(when()).unwrap();
    session.service().unwrap();
    assert_eq!(session.test().measurement_count(), 1);
}

#[test]
fn audiometer_results_with_error_codes() {
    let mut session = DeviceSession::new(DeviceKind::Audiometer, SessionConfig::default());
    let mut sim = SimulatedInstrument::new(DeviceKind::Audiometer);
    let mut levels = [
        "010", "015", "020", "025", "030", "035", "040", "045", //
        "010", "015", "020", "025", "030", "035", "040", "045",
    ];
    levels[2] = " E3"; // left 1000 Hz failed its verify pass
    sim.set_hearing_levels(levels);

    attach(&mut session, sim);
    assert_eq!(session.state(), SessionState::ReadyToMeasure);

    session.measure(when()).unwrap();
    session.service().unwrap();

    let test = session.test();
    assert_eq!(test.measurement_count(), 16);
    assert!(test.is_valid());

    let coded = &test.measurements()[2];
    assert_eq!(
        coded.get("error").unwrap().value.as_text(),
        Some("VERIFY_FAILED_1K")
    );
    assert_eq!(
        coded.get("outcome").unwrap().value.as_text(),
        Some("REINSTRUCT_SUBJECT")
    );
    assert!(coded.get("level").is_none());

    let plain = &test.measurements()[3];
    assert_eq!(plain.get("level").unwrap().value.as_i64(), Some(25));
    assert_eq!(plain.get("level").unwrap().units, Some("dB"));
}

/// Minimal scripted channel: answers every written frame with the next
/// canned response, whatever it is.
struct ScriptedChannel {
    script: VecDeque<Vec<u8>>,
    inbox: VecDeque<u8>,
}

impl ScriptedChannel {
    fn new(script: Vec<&[u8]>) -> Self {
        Self {
            script: script.into_iter().map(|r| r.to_vec()).collect(),
            inbox: VecDeque::new(),
        }
    }
}

impl Read for ScriptedChannel {
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

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(response) = self.script.pop_front() {
            self.inbox.extend(response);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for ScriptedChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.inbox.clear();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.inbox.len() as u32)
    }
}

#[test]
fn wrong_length_payload_is_an_invalid_result() {
    let mut session = DeviceSession::new(DeviceKind::Audiometer, SessionConfig::default());
    let channel = ScriptedChannel::new(vec![b"\x18~\r", b"TRUNCATED~\r"]);

    session.attach(Box::new(channel)).unwrap();
    session.service().unwrap();
    assert_eq!(session.state(), SessionState::ReadyToMeasure);

    session.measure(when()).unwrap();
    let events = session.service().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::InvalidResult(_))));
    // The session is not corrupted: still measuring, still connected.
    assert_eq!(session.state(), SessionState::Measuring);
    assert!(session.is_connected());
}

#[test]
fn unrecognized_response_stalls_the_cycle() {
    let mut session = DeviceSession::new(DeviceKind::WeighScale, SessionConfig::default());
    let channel = ScriptedChannel::new(vec![b"Q?\r\n"]);

    session.attach(Box::new(channel)).unwrap();
    let events = session.service().unwrap();

    // No error notification and no progress: the reset is never
    // acknowledged and the session waits for operator intervention.
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Error(_))));
    assert_eq!(session.state(), SessionState::AwaitingReset);
    assert!(session.is_connected());
    assert!(session.pump().unwrap().is_empty());
}
