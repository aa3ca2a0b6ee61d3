//! Error types for CAN/MQTT payload conversion

use thiserror::Error;

use crate::frame::CAN_EFF_MASK;

/// Errors that can occur during payload conversion
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvError {
    /// Codec name not present in the registry
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// Invalid codec parameters (bit width, repeat count)
    #[error("invalid codec parameters: {0}")]
    InvalidCodec(String),

    /// Invalid CAN identifier string or value
    #[error("invalid CAN ID: {0}")]
    InvalidCanId(String),

    /// More data than a classic CAN frame can carry
    #[error("frame data too long: at most 8 bytes, got {0}")]
    FrameTooLong(usize),

    /// Frame length does not match what the codec expects
    #[error("length mismatch for {codec}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        codec: String,
        expected: usize,
        actual: usize,
    },

    /// Text payload could not be parsed by the codec
    #[error("format error: {0}")]
    Format(String),
}

/// Result type for conversion operations
pub type ConvResult<T> = Result<T, ConvError>;

/// Parse a CAN identifier string to its numeric value
///
/// Accepts decimal ("256") and hex with prefix ("0x100", "0X100").
/// Values outside the 29-bit range are rejected.
pub fn parse_can_id(s: &str) -> ConvResult<u32> {
    let trimmed = s.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse::<u32>(),
    };

    match parsed {
        Ok(id) if id <= CAN_EFF_MASK => Ok(id),
        Ok(id) => Err(ConvError::InvalidCanId(format!(
            "0x{:X} exceeds 29 bits",
            id
        ))),
        Err(_) => Err(ConvError::InvalidCanId(s.to_string())),
    }
}

/// Format a CAN ID the way it is logged (hex, no prefix)
pub fn format_can_id(id: u32) -> String {
    if id >= 0x800 {
        format!("{:08X}", id)
    } else {
        format!("{:03X}", id)
    }
}
