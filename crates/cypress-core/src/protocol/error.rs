//! Protocol errors

use thiserror::Error;

/// Errors that can occur while driving an instrument
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to instrument")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Bad parameter for {command}: {reason}")]
    BadParameter { command: String, reason: String },

    #[error("Command {command} takes no parameter")]
    UnexpectedParameter { command: String },

    #[error("Session is in state {0} and cannot accept this request")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
