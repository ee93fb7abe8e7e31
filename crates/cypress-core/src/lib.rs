//! # Cypress Core Library
//!
//! Core functionality for the Cypress clinical instrument data-collection
//! software.
//!
//! This library provides:
//! - Serial protocol communication with measurement instruments
//! - Lookup-table driven command building and response classification
//! - Fixed-offset binary record decoding into typed measurements
//! - Per-device test aggregates with validity rules and JSON result records
//! - Simulated instruments for hardware-free testing
//!
//! ## Supported instruments
//!
//! - Body-composition analyzer (TBF-310 class)
//! - Weigh scale (Tanita class)
//! - Audiometer (RA-300 class)
//! - Bluetooth thermometer (record decoding only)
//!
//! ## Example
//!
//! ```rust,ignore
//! use cypress_core::device::DeviceKind;
//! use cypress_core::protocol::{DeviceSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     port_name: "/dev/ttyUSB0".to_string(),
//!     ..Default::default()
//! };
//! let mut session = DeviceSession::new(DeviceKind::WeighScale, config);
//! session.connect()?;
//! // ... pump the session from the host event loop, then:
//! let record = session.to_record();
//! ```

#![warn(missing_docs)]

pub mod data;
pub mod demo;
pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::data::{Attribute, Measurement, Test, Value};
    pub use crate::demo::SimulatedInstrument;
    pub use crate::device::DeviceKind;
    pub use crate::protocol::{
        BodyCompositionInputs, DeviceSession, ProtocolError, SessionConfig, SessionEvent,
        SessionState, UnitsSystem,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
