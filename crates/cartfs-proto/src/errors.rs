//! Codec error types.

use thiserror::Error;

/// Errors produced while unpacking a command word.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The opcode field holds a value outside the command table.
    #[error("unknown opcode {0:#04x} in command word")]
    UnknownOpcode(u8),
}
