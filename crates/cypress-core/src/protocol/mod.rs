//! Instrument protocol engine
//!
//! Implements the serial command/response protocol shared by the
//! measurement instruments: terminator framing, lookup-table command
//! building and response classification, the request queue state machine,
//! and the device session that composes them over a channel.

pub mod channel;
pub mod command;
pub mod engine;
mod error;
pub mod framer;
pub mod serial;
pub mod session;

pub use channel::{Channel, SerialChannel};
pub use command::{CommandClass, CommandTable, CommandTemplate};
pub use engine::{EngineEvent, ProtocolEngine, ResponseClassification, SessionState};
pub use error::ProtocolError;
pub use framer::FrameAccumulator;
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use session::{
    BodyCompositionInputs, BodyType, DeviceSession, Gender, SessionConfig, SessionEvent,
    UnitsSystem,
};
