//! Wire codec for the cartfs bus protocol.
//!
//! The controller speaks a register-packed command protocol: every request
//! and response is a single 64-bit word transmitted in network byte order,
//! optionally followed by one frame of payload (READ responses and WRITE
//! requests). This crate owns the field layout of that word, the opcode
//! table, and the protocol constants shared by the client, the driver, and
//! the test controller.
//!
//! The codec is pure: packing and unpacking never touch a socket. Transport
//! lives in `cartfs-client`.

mod errors;
mod word;

use std::net::{IpAddr, Ipv4Addr};

pub use errors::ProtocolError;
pub use word::{CommandWord, Opcode};

/// Size of one frame payload in bytes.
pub const FRAME_SIZE: usize = 1024;

/// Number of cartridges the controller exposes.
pub const MAX_CARTRIDGES: u16 = 64;

/// Number of frames on each cartridge.
pub const MAX_FRAMES_PER_CARTRIDGE: u16 = 1024;

/// Controller address used when no other is configured.
pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Controller TCP port used when no other is configured.
pub const DEFAULT_PORT: u16 = 19876;

/// One frame of payload bytes.
///
/// Fixed-size on the wire: READ responses and WRITE requests carry exactly
/// this many bytes after the command word.
pub type FrameBuf = [u8; FRAME_SIZE];
