//! Simulated cartridge controller for tests.
//!
//! [`SimController`] binds a real TCP listener on a loopback port and speaks
//! the bus protocol against an in-memory frame store, so driver and client
//! tests exercise the same socket path as production without an external
//! controller process.
//!
//! The harness is test-driven: it records how many exchanges of each opcode
//! it served and exposes the backing store for inspection, letting tests
//! assert on bus traffic ("a cache hit issues no READ") rather than only on
//! driver return values.

mod sim_controller;

pub use sim_controller::SimController;
