//! Encoding MQTT text payloads to CAN frames

use crate::codec::{Codec, IntegerCodec, Signedness};
use crate::error::{ConvError, ConvResult};
use crate::frame::{CanFrame, CAN_MAX_DLEN};

/// Encode a payload according to codec
pub fn encode(codec: &Codec, payload: &[u8]) -> ConvResult<CanFrame> {
    match codec {
        Codec::None => encode_none(payload),
        Codec::Integer(c) => encode_integer(c, as_text(payload)?),
        Codec::SixteenBool => encode_sixteen_bool(as_text(payload)?),
        Codec::ByteColor => encode_byte_color(as_text(payload)?),
        Codec::PixelColor => encode_pixel_color(as_text(payload)?),
    }
}

fn as_text(payload: &[u8]) -> ConvResult<&str> {
    std::str::from_utf8(payload)
        .map_err(|e| ConvError::Format(format!("payload is not valid UTF-8: {}", e)))
}

/// Copy up to 8 bytes verbatim, silently truncating the rest
fn encode_none(payload: &[u8]) -> ConvResult<CanFrame> {
    let n = payload.len().min(CAN_MAX_DLEN);
    CanFrame::new(0, &payload[..n])
}

fn encode_integer(codec: &IntegerCodec, text: &str) -> ConvResult<CanFrame> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != usize::from(codec.repeat()) {
        return Err(ConvError::Format(format!(
            "{} expects {} values, got {}",
            codec.name(),
            codec.repeat(),
            fields.len()
        )));
    }

    let width = codec.width();
    let mut buf = [0u8; CAN_MAX_DLEN];
    for (i, field) in fields.iter().enumerate() {
        let raw = parse_integer(codec, field)?;
        buf[i * width..(i + 1) * width].copy_from_slice(&raw.to_le_bytes()[..width]);
    }

    CanFrame::new(0, &buf[..codec.frame_len()])
}

/// Parse one decimal field, returning its two's complement bit pattern
fn parse_integer(codec: &IntegerCodec, field: &str) -> ConvResult<u64> {
    let bits = u32::from(codec.bits());
    let out_of_range = || {
        ConvError::Format(format!(
            "value {:?} does not fit in {} bits ({})",
            field,
            bits,
            codec.name()
        ))
    };

    match codec.signedness() {
        Signedness::Unsigned => {
            let value: u64 = field
                .parse()
                .map_err(|_| ConvError::Format(format!("invalid unsigned integer {:?}", field)))?;
            if bits < 64 && value >> bits != 0 {
                return Err(out_of_range());
            }
            Ok(value)
        }
        Signedness::Signed => {
            let value: i64 = field
                .parse()
                .map_err(|_| ConvError::Format(format!("invalid signed integer {:?}", field)))?;
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if value < min || value > max {
                    return Err(out_of_range());
                }
            }
            Ok(value as u64)
        }
    }
}

fn encode_sixteen_bool(text: &str) -> ConvResult<CanFrame> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 16 {
        return Err(ConvError::Format(format!(
            "expected 16 boolean values, got {}",
            fields.len()
        )));
    }

    let mut bytes = [0u8; 2];
    for (i, field) in fields.iter().enumerate() {
        if parse_bool(field)? {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    CanFrame::new(0, &bytes)
}

/// Boolean literals in the forms accepted by common config tooling
fn parse_bool(field: &str) -> ConvResult<bool> {
    match field {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConvError::Format(format!("invalid boolean {:?}", field))),
    }
}

fn encode_byte_color(text: &str) -> ConvResult<CanFrame> {
    let rgb = parse_color(text)?;
    CanFrame::new(0, &rgb)
}

/// Parse `#rrggbb` or `rrggbb` into three bytes
fn parse_color(text: &str) -> ConvResult<[u8; 3]> {
    let digits = text.strip_prefix('#').unwrap_or(text);
    if digits.contains('#') {
        return Err(ConvError::Format(format!(
            "color {:?} contains more than one '#'",
            text
        )));
    }
    if digits.len() != 6 {
        return Err(ConvError::Format(format!(
            "color needs exactly 6 hex digits, got {}",
            digits.len()
        )));
    }
    let mut rgb = [0u8; 3];
    hex::decode_to_slice(digits, &mut rgb)
        .map_err(|e| ConvError::Format(format!("invalid color {:?}: {}", text, e)))?;
    Ok(rgb)
}

fn encode_pixel_color(text: &str) -> ConvResult<CanFrame> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let [index, color] = fields.as_slice() else {
        return Err(ConvError::Format(format!(
            "expected \"<index> <color>\", got {} fields",
            fields.len()
        )));
    };

    let index: u8 = index
        .parse()
        .map_err(|_| ConvError::Format(format!("invalid pixel index {:?}", index)))?;
    let [r, g, b] = parse_color(color)?;
    CanFrame::new(0, &[index, r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int(signedness: Signedness, bits: u8, repeat: u8) -> Codec {
        Codec::Integer(IntegerCodec::new(signedness, bits, repeat).unwrap())
    }

    #[test]
    fn test_encode_none() {
        let frame = encode(&Codec::None, b"hi").unwrap();
        assert_eq!(frame.data(), b"hi");

        let frame = encode(&Codec::None, b"0123456789").unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.data(), b"01234567");

        let frame = encode(&Codec::None, b"").unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_encode_none_binary() {
        // none does not require text
        let frame = encode(&Codec::None, &[0xFF, 0x00, 0xFE]).unwrap();
        assert_eq!(frame.data(), &[0xFF, 0x00, 0xFE]);
    }

    #[test]
    fn test_encode_uint8() {
        let frame = encode(&int(Signedness::Unsigned, 8, 1), b"200").unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.data(), &[200]);
        assert!(encode(&int(Signedness::Unsigned, 8, 1), b"256").is_err());
        assert!(encode(&int(Signedness::Unsigned, 8, 1), b"-1").is_err());
    }

    #[test]
    fn test_encode_2uint32() {
        let frame = encode(&int(Signedness::Unsigned, 32, 2), b"10 20").unwrap();
        assert_eq!(frame.data(), &[10, 0, 0, 0, 20, 0, 0, 0]);
    }

    #[test]
    fn test_encode_signed() {
        let frame = encode(&int(Signedness::Signed, 16, 1), b"-2").unwrap();
        assert_eq!(frame.data(), &[0xFE, 0xFF]);

        let frame = encode(&int(Signedness::Signed, 8, 4), b"-128 127 0 -1").unwrap();
        assert_eq!(frame.data(), &[0x80, 0x7F, 0x00, 0xFF]);

        assert!(encode(&int(Signedness::Signed, 8, 1), b"128").is_err());
        assert!(encode(&int(Signedness::Signed, 8, 1), b"-129").is_err());
    }

    #[test]
    fn test_encode_64bit_extremes() {
        let frame = encode(&int(Signedness::Unsigned, 64, 1), b"18446744073709551615").unwrap();
        assert_eq!(frame.data(), &[0xFF; 8]);

        let frame = encode(&int(Signedness::Signed, 64, 1), b"-9223372036854775808").unwrap();
        assert_eq!(frame.data(), &[0, 0, 0, 0, 0, 0, 0, 0x80]);
    }

    #[test]
    fn test_encode_integer_field_count() {
        let codec = int(Signedness::Unsigned, 16, 2);
        assert!(encode(&codec, b"1").is_err());
        assert!(encode(&codec, b"1 2 3").is_err());
        assert!(encode(&codec, b"  1\t 2\n").is_ok());
        assert!(encode(&codec, b"1 x").is_err());
    }

    #[test]
    fn test_encode_integer_rejects_non_utf8() {
        let err = encode(&int(Signedness::Unsigned, 8, 1), &[0xFF]).unwrap_err();
        assert!(matches!(err, ConvError::Format(_)));
    }

    #[test]
    fn test_encode_sixteen_bool() {
        let text = "1 0 0 0 0 0 0 0 true false F T 0 0 0 1";
        let frame = encode(&Codec::SixteenBool, text.as_bytes()).unwrap();
        assert_eq!(frame.data(), &[0b0000_0001, 0b1000_1001]);

        assert!(encode(&Codec::SixteenBool, b"1 0 1").is_err());
        let bad = "yes 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        assert!(encode(&Codec::SixteenBool, bad.as_bytes()).is_err());
    }

    #[test]
    fn test_encode_byte_color() {
        let frame = encode(&Codec::ByteColor, b"#00ff00").unwrap();
        assert_eq!(frame.data(), &[0x00, 0xFF, 0x00]);

        let frame = encode(&Codec::ByteColor, b"A0B1C2").unwrap();
        assert_eq!(frame.data(), &[0xA0, 0xB1, 0xC2]);
    }

    #[test]
    fn test_encode_byte_color_errors() {
        assert!(encode(&Codec::ByteColor, b"##00ff00").is_err());
        assert!(encode(&Codec::ByteColor, b"#00f#00").is_err());
        assert!(encode(&Codec::ByteColor, b"#00ff0").is_err());
        assert!(encode(&Codec::ByteColor, b"#00ff000").is_err());
        assert!(encode(&Codec::ByteColor, b"#00gg00").is_err());
    }

    #[test]
    fn test_encode_pixel_color() {
        let frame = encode(&Codec::PixelColor, b"7 #102030").unwrap();
        assert_eq!(frame.data(), &[7, 0x10, 0x20, 0x30]);

        let frame = encode(&Codec::PixelColor, b"255 ffffff").unwrap();
        assert_eq!(frame.data(), &[255, 0xFF, 0xFF, 0xFF]);

        assert!(encode(&Codec::PixelColor, b"256 #000000").is_err());
        assert!(encode(&Codec::PixelColor, b"#000000").is_err());
        assert!(encode(&Codec::PixelColor, b"1 #000000 extra").is_err());
    }

    #[test]
    fn test_encoded_frames_have_zero_id() {
        let frame = encode(&Codec::ByteColor, b"#123456").unwrap();
        assert_eq!(frame.id(), 0);
    }
}
