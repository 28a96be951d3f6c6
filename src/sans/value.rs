//! Conversion between field bytes and numeric values.
//!
//! Raw values are read according to their [`BaseType`] and [`Architecture`],
//! and compared bit-for-bit against the base type's 'invalid' marker value. A
//! [`Resolution`] then maps raw values to physical ones:
//!
//! ```text
//! stored    = (physical + offset) * scale
//! physical  = stored / scale - offset
//! ```

use alloc::{string::String, vec::Vec};

use super::base::{Architecture, BaseType, Kind};

/// A raw value read from a single element of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Unsigned(x) => x as f64,
            Self::Signed(x) => x as f64,
            Self::Float(x) => x,
        }
    }
}

/// Read a single element of a base type.
///
/// Any bytes beyond `base_type.width()` are ignored.
///
/// # Panics
///
/// Panics if `r` is shorter than `base_type.width()`.
pub fn decode_numeric(r: &[u8], base_type: BaseType, architecture: Architecture) -> Number {
    let width = base_type.width();
    let bits = architecture.read_bits(&r[..width]);

    match (base_type.kind(), width) {
        (Kind::Unsigned, _) => Number::Unsigned(bits),
        (Kind::Signed, _) => {
            let shift = 64 - 8 * width as u32;
            Number::Signed(((bits << shift) as i64) >> shift)
        }
        (Kind::Float, 4) => Number::Float(f32::from_bits(bits as u32) as f64),
        (Kind::Float, _) => Number::Float(f64::from_bits(bits)),
    }
}

/// Whether a single element of a base type holds the 'invalid' marker value.
///
/// # Panics
///
/// Panics if `r` is shorter than `base_type.width()`.
pub fn is_invalid(r: &[u8], base_type: BaseType, architecture: Architecture) -> bool {
    architecture.read_bits(&r[..base_type.width()]) == base_type.invalid_bits()
}

/// Whether a whole field holds a value.
///
/// Numeric and byte arrays are invalid only if every element is invalid, and
/// strings if they are empty.
pub fn is_valid(r: &[u8], base_type: BaseType, architecture: Architecture) -> bool {
    match base_type {
        BaseType::String => !terminated(r).is_empty(),
        _ => r
            .chunks_exact(base_type.width())
            .any(|e| !is_invalid(e, base_type, architecture)),
    }
}

/// The bytes of a string field before its null terminator.
pub fn terminated(r: &[u8]) -> &[u8] {
    let end = r.iter().position(|b| *b == 0).unwrap_or(r.len());
    &r[..end]
}

/// Append a single element of a base type, rounding to the nearest
/// representable value and saturating at the range of the type.
pub fn encode_numeric(
    x: f64,
    base_type: BaseType,
    architecture: Architecture,
    w: &mut Vec<u8>,
) {
    let width = base_type.width();
    let mask = u64::MAX >> (64 - 8 * width as u32);

    let bits = match base_type.kind() {
        Kind::Unsigned => (round(x) as u64).min(mask),
        Kind::Signed => {
            let max = (mask >> 1) as i64;
            let min = -max - 1;
            (round(x) as i64).clamp(min, max) as u64 & mask
        }
        Kind::Float if width == 4 => (x as f32).to_bits() as u64,
        Kind::Float => x.to_bits(),
    };

    architecture.write_bits(bits, width, w);
}

/// Append the 'invalid' marker value of a base type.
pub fn encode_invalid(base_type: BaseType, architecture: Architecture, w: &mut Vec<u8>) {
    architecture.write_bits(base_type.invalid_bits(), base_type.width(), w);
}

/// Round half away from zero, without relying on `std`.
fn round(x: f64) -> f64 {
    if x >= 0.0 { x + 0.5 } else { x - 0.5 }
}

/// A scale and offset converting stored integers to physical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub scale: f64,
    pub offset: f64,
}

impl Resolution {
    /// The resolution of fields stored as physical values.
    pub const IDENTITY: Self = Self::new(1.0, 0.0);

    /// A scale and offset, as applied in `stored = (physical + offset) * scale`.
    pub const fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Convert a stored value to a physical value.
    pub fn apply(&self, raw: f64) -> f64 {
        raw / self.scale - self.offset
    }

    /// Convert a physical value to a stored value, before rounding.
    pub fn undo(&self, physical: f64) -> f64 {
        (physical + self.offset) * self.scale
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Treatment of fields holding their 'invalid' marker value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DecodingStrategy {
    /// Omit invalid fields and array elements.
    #[default]
    DropInvalid,
    /// Keep invalid fields, flagged as such, with the marker's scaled value.
    KeepSentinel,
}

/// A field converted to physical values.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: ResolvedValue,
    /// False if the field held its 'invalid' marker value.
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
    Bytes(Vec<u8>),
}

impl Resolved {
    /// The value of a single-element numeric field.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            ResolvedValue::Number(x) => Some(*x),
            _ => None,
        }
    }

    /// The text of a string field.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ResolvedValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Convert the bytes of a field to physical values.
///
/// Validity is decided for the whole field, as in [`is_valid`]. Returns `None`
/// for invalid fields under [`DecodingStrategy::DropInvalid`].
pub fn resolve(
    r: &[u8],
    base_type: BaseType,
    architecture: Architecture,
    resolution: Resolution,
    strategy: DecodingStrategy,
) -> Option<Resolved> {
    let valid = is_valid(r, base_type, architecture);

    let value = match base_type {
        BaseType::String => {
            ResolvedValue::Text(String::from_utf8_lossy(terminated(r)).into_owned())
        }
        BaseType::Byte => ResolvedValue::Bytes(r.to_vec()),
        _ => {
            let mut values: Vec<f64> = r
                .chunks_exact(base_type.width())
                .map(|e| resolution.apply(decode_numeric(e, base_type, architecture).as_f64()))
                .collect();

            match values.len() {
                1 => ResolvedValue::Number(values.remove(0)),
                _ => ResolvedValue::Numbers(values),
            }
        }
    };

    if !valid && strategy == DecodingStrategy::DropInvalid {
        None
    } else {
        Some(Resolved { value, valid })
    }
}
