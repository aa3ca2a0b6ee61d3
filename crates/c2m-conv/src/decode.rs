//! Decoding CAN frames to MQTT text payloads

use bytes::Bytes;

use crate::codec::{Codec, IntegerCodec, Signedness};
use crate::error::ConvResult;
use crate::frame::CanFrame;

/// Decode a frame according to codec
pub fn decode(codec: &Codec, frame: &CanFrame) -> ConvResult<Bytes> {
    codec.check_len(frame.len())?;
    let data = frame.data();

    let text = match codec {
        Codec::None => return Ok(Bytes::copy_from_slice(data)),
        Codec::Integer(c) => decode_integer(c, data),
        Codec::SixteenBool => decode_sixteen_bool(data),
        Codec::ByteColor => format_color(data),
        Codec::PixelColor => format!("{} {}", data[0], format_color(&data[1..4])),
    };
    Ok(Bytes::from(text))
}

fn decode_integer(codec: &IntegerCodec, data: &[u8]) -> String {
    let bits = u32::from(codec.bits());
    data.chunks_exact(codec.width())
        .map(|slot| {
            let mut le = [0u8; 8];
            le[..slot.len()].copy_from_slice(slot);
            let raw = u64::from_le_bytes(le);
            match codec.signedness() {
                Signedness::Unsigned => raw.to_string(),
                Signedness::Signed => {
                    // sign-extend from `bits`
                    let shift = 64 - bits;
                    (((raw << shift) as i64) >> shift).to_string()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_sixteen_bool(data: &[u8]) -> String {
    (0..16)
        .map(|i| if data[i / 8] & (1 << (i % 8)) != 0 { "1" } else { "0" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_color(rgb: &[u8]) -> String {
    format!("#{}", hex::encode(rgb))
}
