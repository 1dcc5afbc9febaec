//! Blocking TCP client for the cartfs bus.
//!
//! One [`BusClient`] owns one connection to the controller and drives
//! request/response exchanges over it: an 8-byte command word out, an 8-byte
//! response word back, with one frame of payload attached for READ and
//! WRITE. The connection is opened lazily on the first exchange and torn
//! down by POWEROFF.
//!
//! This layer is deliberately thin: no retries, no timeouts, no pipelining.
//! A stalled controller stalls the caller; any short read or write is
//! terminal for the operation. Protocol knowledge (slot bookkeeping, which
//! cartridge must be loaded) lives above, in the driver.

mod bus;
mod error;

pub use bus::BusClient;
pub use error::BusError;
