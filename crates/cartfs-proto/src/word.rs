//! Command word packing and unpacking.
//!
//! Every bus exchange is framed by one 64-bit register word (Big Endian on
//! the wire):
//!
//! ```text
//! bits 63..56  opcode      (8)
//! bits 55..48  key2        (8)   always zero
//! bit  47      ret         (1)   0 = success
//! bits 46..31  cartridge  (16)
//! bits 30..15  frame      (16)
//! bits 14..0   reserved   (15)   always zero
//! ```
//!
//! Field widths are enforced by the parameter types: cartridge and frame
//! indices are `u16`, so an out-of-width value cannot reach `encode`.
//! Range checks against the device geometry are the driver's job, not the
//! codec's.

use crate::errors::ProtocolError;

/// Bus commands understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Initialize the memory system.
    Init = 0,
    /// Zero the currently loaded cartridge.
    Zero = 1,
    /// Load a cartridge, making it the target of READ/WRITE.
    Load = 2,
    /// Read one frame from the loaded cartridge.
    Read = 3,
    /// Write one frame to the loaded cartridge.
    Write = 4,
    /// Shut the controller down; the connection closes after the response.
    Poweroff = 5,
}

impl Opcode {
    /// All opcodes, in wire order.
    pub const ALL: [Opcode; 6] =
        [Self::Init, Self::Zero, Self::Load, Self::Read, Self::Write, Self::Poweroff];

    /// Decode an opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Zero),
            2 => Some(Self::Load),
            3 => Some(Self::Read),
            4 => Some(Self::Write),
            5 => Some(Self::Poweroff),
            _ => None,
        }
    }

    /// Wire value of this opcode.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

const OPCODE_SHIFT: u32 = 56;
const RET_SHIFT: u32 = 47;
const CART_SHIFT: u32 = 31;
const FRAME_SHIFT: u32 = 15;

const RET_MASK: u64 = 1 << RET_SHIFT;
const CART_MASK: u64 = 0xFFFF << CART_SHIFT;
const FRAME_MASK: u64 = 0xFFFF << FRAME_SHIFT;

/// One unpacked bus command or response word.
///
/// # Invariants
///
/// - Round trip: `CommandWord::decode(word.encode())` yields `word` for
///   every representable value.
/// - Reserved bits and the key2 byte are zero in every encoded word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandWord {
    /// Command opcode.
    pub opcode: Opcode,
    /// Cartridge register. Meaningful for LOAD; zero otherwise.
    pub cart: u16,
    /// Frame register. Meaningful for READ/WRITE; zero otherwise.
    pub frame: u16,
    /// Return code. Always false in requests; true in a response means the
    /// controller rejected the command.
    pub ret: bool,
}

impl CommandWord {
    /// Size of the encoded word on the wire.
    pub const WIRE_SIZE: usize = 8;

    /// Build a request word (return code clear).
    pub fn request(opcode: Opcode, cart: u16, frame: u16) -> Self {
        Self { opcode, cart, frame, ret: false }
    }

    /// Pack into a 64-bit register value.
    pub fn encode(self) -> u64 {
        u64::from(self.opcode.to_u8()) << OPCODE_SHIFT
            | u64::from(self.ret) << RET_SHIFT
            | u64::from(self.cart) << CART_SHIFT
            | u64::from(self.frame) << FRAME_SHIFT
    }

    /// Unpack a 64-bit register value.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownOpcode`] if the opcode byte is outside the
    /// command table. Key2 and reserved bits are ignored.
    pub fn decode(raw: u64) -> Result<Self, ProtocolError> {
        let opcode_byte = (raw >> OPCODE_SHIFT) as u8;
        let opcode =
            Opcode::from_u8(opcode_byte).ok_or(ProtocolError::UnknownOpcode(opcode_byte))?;

        Ok(Self {
            opcode,
            cart: ((raw & CART_MASK) >> CART_SHIFT) as u16,
            frame: ((raw & FRAME_MASK) >> FRAME_SHIFT) as u16,
            ret: raw & RET_MASK != 0,
        })
    }

    /// Encode to network byte order.
    pub fn to_be_bytes(self) -> [u8; Self::WIRE_SIZE] {
        self.encode().to_be_bytes()
    }

    /// Decode from network byte order.
    ///
    /// # Errors
    ///
    /// Same as [`CommandWord::decode`].
    pub fn from_be_bytes(bytes: [u8; Self::WIRE_SIZE]) -> Result<Self, ProtocolError> {
        Self::decode(u64::from_be_bytes(bytes))
    }
}
