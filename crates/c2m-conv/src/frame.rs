//! Classic CAN frame representation

use std::fmt;

use crate::error::{format_can_id, ConvError, ConvResult};

/// Maximum data length of a classic CAN frame
pub const CAN_MAX_DLEN: usize = 8;

/// Extended frame format flag on the raw identifier
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;

/// Mask selecting the 29 identifier bits
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Largest standard (11-bit) identifier
pub const CAN_SFF_MAX: u32 = 0x7FF;

/// A classic CAN frame: identifier, length and a fixed 8-byte buffer
///
/// Only the first `len` bytes of `data` are significant. Use [`CanFrame::data`]
/// to get them; the rest of the buffer is zeroed but must not be relied on.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CanFrame {
    id: u32,
    len: u8,
    data: [u8; CAN_MAX_DLEN],
}

impl CanFrame {
    /// Build a frame from an identifier and up to 8 bytes of data
    pub fn new(id: u32, data: &[u8]) -> ConvResult<Self> {
        if id > CAN_EFF_MASK {
            return Err(ConvError::InvalidCanId(format!("0x{:X}", id)));
        }
        if data.len() > CAN_MAX_DLEN {
            return Err(ConvError::FrameTooLong(data.len()));
        }
        let mut buf = [0u8; CAN_MAX_DLEN];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            id,
            len: data.len() as u8,
            data: buf,
        })
    }

    /// Build a frame from a raw socket identifier, stripping flag bits
    pub fn from_raw(raw_id: u32, data: &[u8]) -> ConvResult<Self> {
        Self::new(raw_id & CAN_EFF_MASK, data)
    }

    /// Identifier without flag bits
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Identifier as written to the bus: the EFF flag is set for ids >= 0x800
    pub fn raw_id(&self) -> u32 {
        if self.is_extended() {
            self.id | CAN_EFF_FLAG
        } else {
            self.id
        }
    }

    pub fn is_extended(&self) -> bool {
        self.id > CAN_SFF_MAX
    }

    /// Replace the identifier, keeping the payload
    pub fn with_id(mut self, id: u32) -> ConvResult<Self> {
        if id > CAN_EFF_MASK {
            return Err(ConvError::InvalidCanId(format!("0x{:X}", id)));
        }
        self.id = id;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The significant bytes of the frame
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanFrame")
            .field("id", &format_args!("0x{:X}", self.id))
            .field("len", &self.len)
            .field("data", &hex::encode(self.data()))
            .finish()
    }
}

/// candump-like notation, e.g. `123#DEADBEEF`
impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}",
            format_can_id(self.id),
            hex::encode_upper(self.data())
        )
    }
}
