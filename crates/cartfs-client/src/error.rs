//! Bus client error types.

use std::{io, net::SocketAddr};

use cartfs_proto::{Opcode, ProtocolError};
use thiserror::Error;

/// Errors raised while exchanging commands with the controller.
///
/// Every variant is terminal for the operation that produced it; the client
/// never retries. A `Controller` error means the connection is still usable,
/// the other variants generally mean it is not.
#[derive(Debug, Error)]
pub enum BusError {
    /// Could not open the TCP connection.
    #[error("connect to controller at {addr} failed: {source}")]
    Connect {
        /// Address the connect was attempted against.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// A read or write on the established connection failed or came up
    /// short.
    #[error("bus i/o failed during {opcode:?}: {source}")]
    Io {
        /// Command being exchanged when the failure happened.
        opcode: Opcode,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The controller answered with the return bit set.
    #[error("controller rejected {opcode:?} (cartridge {cart}, frame {frame})")]
    Controller {
        /// Rejected command.
        opcode: Opcode,
        /// Cartridge register of the rejected request.
        cart: u16,
        /// Frame register of the rejected request.
        frame: u16,
    },

    /// The response word did not decode.
    #[error("malformed response word: {0}")]
    Protocol(#[from] ProtocolError),
}
