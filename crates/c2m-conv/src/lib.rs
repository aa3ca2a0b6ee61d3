//! c2m-conv - CAN frame <-> MQTT payload conversion
//!
//! Codecs that turn the raw bytes of a classic CAN frame into a
//! human-readable MQTT payload and back. Everything here is pure: no I/O,
//! no locking, safe to share between the CAN and MQTT sides of a bridge.
//!
//! # Quick Start
//!
//! ```rust
//! use c2m_conv::{CanFrame, CodecRegistry};
//!
//! let registry = CodecRegistry::new();
//! let codec = registry.get("2uint322ascii").unwrap();
//!
//! let frame = codec.encode(b"10 20").unwrap();
//! assert_eq!(frame.data(), &[10, 0, 0, 0, 20, 0, 0, 0]);
//!
//! let text = codec.decode(&frame).unwrap();
//! assert_eq!(&text[..], b"10 20");
//! ```
//!
//! # Codecs
//!
//! | Name | Frame | Text |
//! |------|-------|------|
//! | `none` | 0-8 bytes, verbatim | same bytes |
//! | `uint82ascii` ... `int642ascii`, `2uint322ascii`, `8int82ascii`, ... | `repeat * bits/8` bytes, little-endian | decimal values separated by spaces |
//! | `16bool2ascii` | 2 bytes, bit 0 = LSB of byte 0 | 16 booleans, `0`/`1` on decode |
//! | `bytecolor2colorcode` | 3 bytes `r g b` | `#rrggbb` |
//! | `pixelbin2ascii` | 4 bytes `index r g b` | `<index> #rrggbb` |

pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod frame;
pub mod registry;

pub use codec::{Codec, IntegerCodec, Signedness};
pub use error::{format_can_id, parse_can_id, ConvError, ConvResult};
pub use frame::{CanFrame, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_MAX_DLEN, CAN_SFF_MAX};
pub use registry::CodecRegistry;

/// Prelude for common imports
pub mod prelude {
    pub use crate::codec::{Codec, IntegerCodec, Signedness};
    pub use crate::error::{ConvError, ConvResult};
    pub use crate::frame::CanFrame;
    pub use crate::registry::CodecRegistry;
}
