//! Codec variants
//!
//! A codec is a named, stateless transform between CAN frame bytes and an
//! MQTT text payload. The variant family is closed; the registry maps names
//! to instances.

use std::fmt;

use bytes::Bytes;

use crate::error::{ConvError, ConvResult};
use crate::frame::{CanFrame, CAN_MAX_DLEN};
use crate::{decode, encode};

/// Integer signedness for the fixed-width integer codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    Unsigned,
    Signed,
}

impl Signedness {
    fn prefix(self) -> &'static str {
        match self {
            Signedness::Unsigned => "uint",
            Signedness::Signed => "int",
        }
    }
}

/// Fixed-width little-endian integer codec
///
/// `repeat` values of `bits` width each, written into consecutive slots.
/// Text form is decimal values separated by whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerCodec {
    signedness: Signedness,
    bits: u8,
    repeat: u8,
}

impl IntegerCodec {
    /// Allowed bit widths
    pub const WIDTHS: [u8; 4] = [8, 16, 32, 64];

    /// Repeat counts generated by the default registry
    pub const REPEATS: [u8; 4] = [1, 2, 4, 8];

    pub fn new(signedness: Signedness, bits: u8, repeat: u8) -> ConvResult<Self> {
        if !Self::WIDTHS.contains(&bits) {
            return Err(ConvError::InvalidCodec(format!(
                "bit width {} not one of 8, 16, 32, 64",
                bits
            )));
        }
        if repeat == 0 {
            return Err(ConvError::InvalidCodec("repeat count must be >= 1".into()));
        }
        if usize::from(bits) * usize::from(repeat) > CAN_MAX_DLEN * 8 {
            return Err(ConvError::InvalidCodec(format!(
                "{} x {} bits exceeds 64 bits",
                repeat, bits
            )));
        }
        Ok(Self {
            signedness,
            bits,
            repeat,
        })
    }

    pub fn signedness(&self) -> Signedness {
        self.signedness
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn repeat(&self) -> u8 {
        self.repeat
    }

    /// Bytes per value
    pub fn width(&self) -> usize {
        usize::from(self.bits / 8)
    }

    /// Exact frame length this codec produces and accepts
    pub fn frame_len(&self) -> usize {
        self.width() * usize::from(self.repeat)
    }

    /// Registry name, `<repeat><uint|int><bits>2ascii` with repeat omitted when 1
    pub fn name(&self) -> String {
        if self.repeat == 1 {
            format!("{}{}2ascii", self.signedness.prefix(), self.bits)
        } else {
            format!(
                "{}{}{}2ascii",
                self.repeat,
                self.signedness.prefix(),
                self.bits
            )
        }
    }
}

/// A bidirectional CAN <-> text converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Raw bytes, up to 8, copied verbatim
    None,
    /// Fixed-width integers, see [`IntegerCodec`]
    Integer(IntegerCodec),
    /// 16 booleans packed LSB-first into 2 bytes
    ///
    /// Encoding accepts boolean literals (`1`, `t`, `true`, `TRUE`, ...),
    /// decoding always emits `0`/`1`. Text does not round-trip for literals
    /// other than `0` and `1`; consumers may depend on either side of this.
    SixteenBool,
    /// 3 bytes <-> `#rrggbb`
    ByteColor,
    /// 4 bytes `[index, r, g, b]` <-> `<index> #rrggbb`
    PixelColor,
}

impl Codec {
    pub const NONE: &'static str = "none";
    pub const SIXTEEN_BOOL: &'static str = "16bool2ascii";
    pub const BYTE_COLOR: &'static str = "bytecolor2colorcode";
    pub const PIXEL_COLOR: &'static str = "pixelbin2ascii";

    /// Registry name of this codec
    pub fn name(&self) -> String {
        match self {
            Codec::None => Self::NONE.to_string(),
            Codec::Integer(c) => c.name(),
            Codec::SixteenBool => Self::SIXTEEN_BOOL.to_string(),
            Codec::ByteColor => Self::BYTE_COLOR.to_string(),
            Codec::PixelColor => Self::PIXEL_COLOR.to_string(),
        }
    }

    /// Exact frame length required by `decode`, or `None` for variable length
    pub fn frame_len(&self) -> Option<usize> {
        match self {
            Codec::None => None,
            Codec::Integer(c) => Some(c.frame_len()),
            Codec::SixteenBool => Some(2),
            Codec::ByteColor => Some(3),
            Codec::PixelColor => Some(4),
        }
    }

    /// Convert an MQTT payload into a CAN frame
    ///
    /// The returned frame has identifier 0; the caller sets it from the route.
    pub fn encode(&self, payload: &[u8]) -> ConvResult<CanFrame> {
        encode::encode(self, payload)
    }

    /// Convert a CAN frame into an MQTT payload
    pub fn decode(&self, frame: &CanFrame) -> ConvResult<Bytes> {
        decode::decode(self, frame)
    }

    /// Fail with a length mismatch unless `actual` is what this codec needs
    pub(crate) fn check_len(&self, actual: usize) -> ConvResult<()> {
        match self.frame_len() {
            Some(expected) if expected != actual => Err(ConvError::LengthMismatch {
                codec: self.name(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_names() {
        let c = IntegerCodec::new(Signedness::Unsigned, 16, 1).unwrap();
        assert_eq!(c.name(), "uint162ascii");
        let c = IntegerCodec::new(Signedness::Signed, 8, 4).unwrap();
        assert_eq!(c.name(), "4int82ascii");
        let c = IntegerCodec::new(Signedness::Unsigned, 32, 2).unwrap();
        assert_eq!(c.name(), "2uint322ascii");
        assert_eq!(c.frame_len(), 8);
    }

    #[test]
    fn test_integer_limits() {
        assert!(IntegerCodec::new(Signedness::Unsigned, 12, 1).is_err());
        assert!(IntegerCodec::new(Signedness::Unsigned, 8, 0).is_err());
        assert!(IntegerCodec::new(Signedness::Signed, 16, 8).is_err());
        assert!(IntegerCodec::new(Signedness::Signed, 64, 1).is_ok());
        assert!(IntegerCodec::new(Signedness::Signed, 8, 8).is_ok());
    }

    #[test]
    fn test_fixed_lengths() {
        assert_eq!(Codec::None.frame_len(), None);
        assert_eq!(Codec::SixteenBool.frame_len(), Some(2));
        assert_eq!(Codec::ByteColor.frame_len(), Some(3));
        assert_eq!(Codec::PixelColor.frame_len(), Some(4));
    }

    #[test]
    fn test_display() {
        assert_eq!(Codec::ByteColor.to_string(), "bytecolor2colorcode");
        assert_eq!(Codec::None.to_string(), "none");
    }
}
