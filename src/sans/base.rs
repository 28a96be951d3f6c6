//! Primitive wire types and byte order.

use thiserror::Error;

/// Byte order of multi-byte values under a definition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    #[default]
    Little,
    Big,
}

/// An unknown architecture byte in a definition record.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Unknown architecture ({0}).")]
pub struct UnknownArchitecture(pub u8);

impl Architecture {
    /// The architecture byte stored in a definition record.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Little => 0,
            Self::Big => 1,
        }
    }

    /// Look up an architecture by the byte stored in a definition record.
    pub fn from_byte(b: u8) -> Result<Self, UnknownArchitecture> {
        match b {
            0 => Ok(Self::Little),
            1 => Ok(Self::Big),
            _ => Err(UnknownArchitecture(b)),
        }
    }

    /// Read an unsigned integer of up to eight bytes, zero-extended.
    pub(crate) fn read_bits(self, r: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
        match self {
            Self::Little => r.iter().rev().fold(0, fold),
            Self::Big => r.iter().fold(0, fold),
        }
    }

    /// Write the low `width` bytes of an unsigned integer.
    pub(crate) fn write_bits(self, bits: u64, width: usize, w: &mut alloc::vec::Vec<u8>) {
        let bytes = bits.to_le_bytes();
        match self {
            Self::Little => w.extend_from_slice(&bytes[..width]),
            Self::Big => w.extend(bytes[..width].iter().rev()),
        }
    }

    pub(crate) fn u16_from(self, r: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(r),
            Self::Big => u16::from_be_bytes(r),
        }
    }

    pub(crate) fn u16_to(self, x: u16) -> [u8; 2] {
        match self {
            Self::Little => x.to_le_bytes(),
            Self::Big => x.to_be_bytes(),
        }
    }
}

/// A primitive wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Enum,
    Sint8,
    Uint8,
    Sint16,
    Uint16,
    Sint32,
    Uint32,
    String,
    Float32,
    Float64,
    Uint8z,
    Uint16z,
    Uint32z,
    Byte,
    Sint64,
    Uint64,
    Uint64z,
}

/// An unknown base type byte in a definition record.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Unknown base type ({0:#04x}).")]
pub struct UnknownBaseType(pub u8);

/// Signedness and representation of a base type's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Unsigned,
    Signed,
    Float,
}

impl BaseType {
    /// Every base type, in order of base type number.
    pub const ALL: [BaseType; 17] = [
        Self::Enum,
        Self::Sint8,
        Self::Uint8,
        Self::Sint16,
        Self::Uint16,
        Self::Sint32,
        Self::Uint32,
        Self::String,
        Self::Float32,
        Self::Float64,
        Self::Uint8z,
        Self::Uint16z,
        Self::Uint32z,
        Self::Byte,
        Self::Sint64,
        Self::Uint64,
        Self::Uint64z,
    ];

    /// Look up a base type by the byte stored in a definition record.
    ///
    /// Only the base type number (the low five bits) is significant, so bytes
    /// written without the endian-capable flag are accepted.
    pub fn from_id(id: u8) -> Result<Self, UnknownBaseType> {
        Self::ALL
            .get((id & 0x1F) as usize)
            .copied()
            .ok_or(UnknownBaseType(id))
    }

    /// The canonical byte stored in a definition record.
    pub fn id(self) -> u8 {
        match self {
            Self::Enum => 0x00,
            Self::Sint8 => 0x01,
            Self::Uint8 => 0x02,
            Self::Sint16 => 0x83,
            Self::Uint16 => 0x84,
            Self::Sint32 => 0x85,
            Self::Uint32 => 0x86,
            Self::String => 0x07,
            Self::Float32 => 0x88,
            Self::Float64 => 0x89,
            Self::Uint8z => 0x0A,
            Self::Uint16z => 0x8B,
            Self::Uint32z => 0x8C,
            Self::Byte => 0x0D,
            Self::Sint64 => 0x8E,
            Self::Uint64 => 0x8F,
            Self::Uint64z => 0x90,
        }
    }

    /// Size in bytes of a single value.
    pub fn width(self) -> usize {
        match self {
            Self::Enum | Self::Sint8 | Self::Uint8 | Self::String | Self::Uint8z | Self::Byte => 1,
            Self::Sint16 | Self::Uint16 | Self::Uint16z => 2,
            Self::Sint32 | Self::Uint32 | Self::Float32 | Self::Uint32z => 4,
            Self::Float64 | Self::Sint64 | Self::Uint64 | Self::Uint64z => 8,
        }
    }

    /// Signedness and representation of values.
    pub fn kind(self) -> Kind {
        match self {
            Self::Sint8 | Self::Sint16 | Self::Sint32 | Self::Sint64 => Kind::Signed,
            Self::Float32 | Self::Float64 => Kind::Float,
            _ => Kind::Unsigned,
        }
    }

    /// Raw bits of the 'invalid' marker value.
    pub fn invalid_bits(self) -> u64 {
        match self {
            Self::Enum | Self::Uint8 | Self::Byte => 0xFF,
            Self::Sint8 => 0x7F,
            Self::Sint16 => 0x7FFF,
            Self::Uint16 => 0xFFFF,
            Self::Sint32 => 0x7FFF_FFFF,
            Self::Uint32 | Self::Float32 => 0xFFFF_FFFF,
            Self::String | Self::Uint8z | Self::Uint16z | Self::Uint32z | Self::Uint64z => 0,
            Self::Sint64 => 0x7FFF_FFFF_FFFF_FFFF,
            Self::Uint64 | Self::Float64 => 0xFFFF_FFFF_FFFF_FFFF,
        }
    }

    /// Whether a field of this type may hold several values.
    ///
    /// Strings are a single value regardless of their size.
    pub fn is_array_eligible(self) -> bool {
        self != Self::String
    }

    /// Whether values of this type depend on the architecture.
    pub fn is_endian_capable(self) -> bool {
        self.id() & 0x80 != 0
    }
}
