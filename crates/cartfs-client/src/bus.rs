//! The bus client proper: one lazily-opened TCP connection and the
//! word-plus-payload exchange loop.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
};

use bytes::{BufMut, BytesMut};
use cartfs_proto::{CommandWord, FRAME_SIZE, FrameBuf, Opcode};

use crate::error::BusError;

/// Client side of the bus protocol.
///
/// Holds the controller address and, once the first command has been
/// issued, the TCP stream to it. All exchanges are synchronous: the call
/// does not return until the response word (and any payload) has been read
/// in full.
///
/// # Invariants
///
/// - At most one connection exists at a time; POWEROFF drops it and the
///   next exchange reconnects.
/// - Request and response payloads are exactly [`FRAME_SIZE`] bytes; there
///   is no partial-frame traffic on the bus.
pub struct BusClient {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl BusClient {
    /// Create a client for the controller at `addr`. Does not connect.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, stream: None }
    }

    /// Address this client exchanges with.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Initialize the memory system.
    pub fn init(&mut self) -> Result<(), BusError> {
        self.exchange(CommandWord::request(Opcode::Init, 0, 0), None, None).map(drop)
    }

    /// Zero the currently loaded cartridge.
    pub fn zero(&mut self) -> Result<(), BusError> {
        self.exchange(CommandWord::request(Opcode::Zero, 0, 0), None, None).map(drop)
    }

    /// Load `cart`, making it the target of subsequent READ/WRITE commands.
    pub fn load(&mut self, cart: u16) -> Result<(), BusError> {
        self.exchange(CommandWord::request(Opcode::Load, cart, 0), None, None).map(drop)
    }

    /// Read one frame of the loaded cartridge into `into`.
    pub fn read_frame(&mut self, frame: u16, into: &mut FrameBuf) -> Result<(), BusError> {
        self.exchange(CommandWord::request(Opcode::Read, 0, frame), None, Some(into)).map(drop)
    }

    /// Write one frame of the loaded cartridge from `payload`.
    pub fn write_frame(&mut self, frame: u16, payload: &FrameBuf) -> Result<(), BusError> {
        self.exchange(CommandWord::request(Opcode::Write, 0, frame), Some(payload), None).map(drop)
    }

    /// Shut the controller down. The connection is dropped once the
    /// response word has been read, matching the controller's own close.
    pub fn poweroff(&mut self) -> Result<(), BusError> {
        self.exchange(CommandWord::request(Opcode::Poweroff, 0, 0), None, None).map(drop)
    }

    /// Drive one request/response exchange.
    ///
    /// `send` rides behind the request word (WRITE); `recv` is filled from
    /// the bytes behind the response word (READ). The payload is consumed
    /// before the return bit is inspected, so a rejected READ still leaves
    /// the stream positioned at the next word.
    fn exchange(
        &mut self,
        request: CommandWord,
        send: Option<&FrameBuf>,
        recv: Option<&mut FrameBuf>,
    ) -> Result<CommandWord, BusError> {
        let opcode = request.opcode;
        let stream = self.ensure_connected()?;

        let mut wire = BytesMut::with_capacity(CommandWord::WIRE_SIZE + FRAME_SIZE);
        wire.put_u64(request.encode());
        if let Some(payload) = send {
            wire.put_slice(payload);
        }
        stream.write_all(&wire).map_err(|source| BusError::Io { opcode, source })?;

        let mut word = [0u8; CommandWord::WIRE_SIZE];
        stream.read_exact(&mut word).map_err(|source| BusError::Io { opcode, source })?;
        let response = CommandWord::from_be_bytes(word)?;

        if let Some(payload) = recv {
            stream.read_exact(payload).map_err(|source| BusError::Io { opcode, source })?;
        }

        if opcode == Opcode::Poweroff {
            self.stream = None;
            tracing::debug!("controller connection closed after poweroff");
        }

        if response.ret {
            tracing::warn!(
                ?opcode,
                cart = request.cart,
                frame = request.frame,
                "controller rejected command"
            );
            return Err(BusError::Controller { opcode, cart: request.cart, frame: request.frame });
        }

        tracing::trace!(?opcode, cart = request.cart, frame = request.frame, "bus exchange");
        Ok(response)
    }

    /// Connect on first use; later calls are no-ops.
    fn ensure_connected(&mut self) -> Result<&mut TcpStream, BusError> {
        if self.stream.is_none() {
            let stream = TcpStream::connect(self.addr)
                .map_err(|source| BusError::Connect { addr: self.addr, source })?;
            // Word-sized request/response traffic; Nagle only adds latency.
            stream
                .set_nodelay(true)
                .map_err(|source| BusError::Connect { addr: self.addr, source })?;
            tracing::debug!(addr = %self.addr, "connected to controller");
            self.stream = Some(stream);
        }

        Ok(self
            .stream
            .as_mut()
            .unwrap_or_else(|| unreachable!("stream populated by the branch above")))
    }
}
