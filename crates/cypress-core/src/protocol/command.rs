//! Command and response lookup tables
//!
//! Each instrument's wire vocabulary is pure data: a table mapping symbolic
//! command names to byte templates, plus reverse tables classifying response
//! prefixes and known fault payloads. The tables are built once per device
//! and never mutated afterwards.

use std::collections::HashMap;

use tracing::warn;

use super::ProtocolError;

/// Placeholder byte marking the mutable slot inside a command template.
pub const SLOT: u8 = b'#';

/// Coarse command classification, derived from the symbolic name.
///
/// The state machine treats commands by class: `reset` clears the session,
/// `set_*` carry instrument inputs, `confirm_*` query the instrument's echo
/// of those inputs, `measure_*` trigger a measurement payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Device reset / zero command
    Reset,
    /// Input-setting command (`set_*`)
    Set,
    /// Settings-confirmation query (`confirm_*`)
    Confirm,
    /// Measurement trigger (`measure_*`)
    Measure,
}

impl CommandClass {
    /// Derive the class from a symbolic command name.
    pub fn of(name: &str) -> Option<Self> {
        if name == "reset" {
            Some(CommandClass::Reset)
        } else if name.starts_with("set_") {
            Some(CommandClass::Set)
        } else if name.starts_with("confirm_") {
            Some(CommandClass::Confirm)
        } else if name.starts_with("measure_") {
            Some(CommandClass::Measure)
        } else {
            None
        }
    }
}

/// An immutable command byte template.
///
/// Parameterized templates carry exactly one slot: a run of [`SLOT`] bytes
/// that is overwritten with formatted ASCII at build time. The filled value
/// must match the slot length exactly; the template length never changes.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    bytes: &'static [u8],
    slot: Option<(usize, usize)>,
}

impl CommandTemplate {
    /// A fixed template with no parameter slot.
    pub const fn fixed(bytes: &'static [u8]) -> Self {
        Self { bytes, slot: None }
    }

    /// A template whose [`SLOT`] run at `start..start + len` is filled at
    /// build time.
    pub const fn with_slot(bytes: &'static [u8], start: usize, len: usize) -> Self {
        Self {
            bytes,
            slot: Some((start, len)),
        }
    }

    /// Template body length (terminator excluded).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the template body is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The four lookup tables describing one instrument's command vocabulary.
pub struct CommandTable {
    /// Symbolic name -> outgoing byte template.
    defaults: HashMap<&'static str, CommandTemplate>,
    /// Response key prefix -> the command it answers.
    commands: HashMap<&'static [u8], &'static str>,
    /// Response key prefix -> human-readable confirmation text.
    confirms: HashMap<&'static [u8], &'static str>,
    /// Exact response body (terminator stripped) -> human-readable fault.
    incorrect: HashMap<&'static [u8], &'static str>,
}

impl CommandTable {
    /// Create an empty table; populate with the chained `with_*` methods.
    pub fn new() -> Self {
        Self {
            defaults: HashMap::new(),
            commands: HashMap::new(),
            confirms: HashMap::new(),
            incorrect: HashMap::new(),
        }
    }

    /// Register an outgoing command template.
    pub fn with_command(mut self, name: &'static str, template: CommandTemplate) -> Self {
        debug_assert!(
            CommandClass::of(name).is_some(),
            "command name {name:?} has no class"
        );
        self.defaults.insert(name, template);
        self
    }

    /// Register a response key prefix as answering `name`.
    pub fn with_response(mut self, prefix: &'static [u8], name: &'static str) -> Self {
        self.commands.insert(prefix, name);
        self
    }

    /// Register the confirmation text for a response key prefix.
    pub fn with_confirmation(mut self, prefix: &'static [u8], text: &'static str) -> Self {
        self.confirms.insert(prefix, text);
        self
    }

    /// Register an exact fault payload and its operator-facing message.
    pub fn with_fault(mut self, body: &'static [u8], text: &'static str) -> Self {
        self.incorrect.insert(body, text);
        self
    }

    /// Build the wire frame for a command, filling its slot from `arg`.
    ///
    /// The returned frame always ends with `terminator`. A slotted template
    /// rejects an argument whose formatted length differs from the slot
    /// length; a fixed template rejects any argument at all.
    pub fn build(
        &self,
        name: &str,
        arg: Option<&str>,
        terminator: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let template = self
            .defaults
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownCommand(name.to_string()))?;

        let mut frame = template.bytes.to_vec();
        match (template.slot, arg) {
            (Some((start, len)), Some(value)) => {
                if value.len() != len {
                    warn!(
                        command = name,
                        expected = len,
                        got = value.len(),
                        "rejected command parameter of wrong width"
                    );
                    return Err(ProtocolError::BadParameter {
                        command: name.to_string(),
                        reason: format!("expected {} bytes, got {:?}", len, value),
                    });
                }
                frame[start..start + len].copy_from_slice(value.as_bytes());
            }
            (Some(_), None) => {
                return Err(ProtocolError::BadParameter {
                    command: name.to_string(),
                    reason: "missing parameter".to_string(),
                });
            }
            (None, Some(_)) => {
                return Err(ProtocolError::UnexpectedParameter {
                    command: name.to_string(),
                });
            }
            (None, None) => {}
        }

        debug_assert_eq!(frame.len(), template.len());
        frame.extend_from_slice(terminator);
        Ok(frame)
    }

    /// Which command does a response with this key prefix answer?
    pub fn command_for_prefix(&self, prefix: &[u8]) -> Option<&'static str> {
        self.commands.get(prefix).copied()
    }

    /// Confirmation text for a response key prefix, if it denotes success.
    pub fn confirmation_for_prefix(&self, prefix: &[u8]) -> Option<&'static str> {
        self.confirms.get(prefix).copied()
    }

    /// Fault message for an exact response body, if it is a known fault.
    pub fn fault_for(&self, body: &[u8]) -> Option<&'static str> {
        self.incorrect.get(body).copied()
    }

    /// Whether a symbolic command name is known to this device.
    pub fn knows(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}
