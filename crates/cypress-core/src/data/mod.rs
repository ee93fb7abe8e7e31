//! Measurement data layer
//!
//! Typed measurement entities plus the per-instrument fixed-offset record
//! decoders that populate them.

pub mod body_composition;
pub mod hearing;
pub mod layout;
pub mod measurement;
pub mod temperature;
pub mod weight;

pub use measurement::{Attribute, Measurement, Test, Value};
