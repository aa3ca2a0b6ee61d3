//! Name -> codec lookup

use std::collections::BTreeMap;

use crate::codec::{Codec, IntegerCodec, Signedness};
use crate::error::{ConvError, ConvResult};

/// Registry of known codecs, keyed by name
///
/// Populated once and then only read, so it can be shared freely behind an
/// `Arc` without locking.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Codec>,
}

impl CodecRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// The standard codec set
    ///
    /// `none`, every `{uint,int} x {8,16,32,64} x {1,2,4,8}` combination that
    /// fits in 64 bits, `16bool2ascii`, `bytecolor2colorcode` and
    /// `pixelbin2ascii`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Codec::None);

        for signedness in [Signedness::Unsigned, Signedness::Signed] {
            for bits in IntegerCodec::WIDTHS {
                for repeat in IntegerCodec::REPEATS {
                    if let Ok(codec) = IntegerCodec::new(signedness, bits, repeat) {
                        registry.register(Codec::Integer(codec));
                    }
                }
            }
        }

        registry.register(Codec::SixteenBool);
        registry.register(Codec::ByteColor);
        registry.register(Codec::PixelColor);
        registry
    }

    /// Add a codec under its own name, replacing any previous entry
    pub fn register(&mut self, codec: Codec) {
        self.codecs.insert(codec.name(), codec);
    }

    /// Look up a codec by name
    pub fn get(&self, name: &str) -> ConvResult<Codec> {
        self.codecs
            .get(name)
            .copied()
            .ok_or_else(|| ConvError::UnknownCodec(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
