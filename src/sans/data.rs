//! States processing data records, and the messages they carry.

use alloc::vec::Vec;

use thiserror::Error;

use super::{
    base::{Architecture, BaseType},
    definition::{DeveloperFieldDefinition, FieldDefinition, MessageDefinition},
    header::RecordHeader,
    timestamp::TIMESTAMP_FIELD,
    value::{self, DecodingStrategy, Number, Resolution, Resolved},
};

/// A data record payload whose length disagrees with its definition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Expected {expected} payload bytes, found {found}.")]
pub struct PayloadSizeError {
    pub expected: usize,
    pub found: usize,
}

/// State token to decode a data record.
#[derive(Debug)]
pub struct Data {
    time_offset: Option<u8>,
}

impl Data {
    pub(super) fn new(time_offset: Option<u8>) -> Self {
        Self { time_offset }
    }

    /// The five-bit time offset, for records with a compressed timestamp
    /// header.
    pub fn time_offset(&self) -> Option<u8> {
        self.time_offset
    }

    /// Transition to another state by decoding a data record.
    ///
    /// `r` must hold exactly [`MessageDefinition::data_size`] bytes, split
    /// between fields in definition order.
    ///
    /// Returns the message, and a successor state token. The message's
    /// compressed timestamp is left for the caller to reconstruct.
    pub fn advance(
        self,
        definition: &MessageDefinition,
        r: &[u8],
    ) -> Result<(Message, RecordHeader), PayloadSizeError> {
        let expected = definition.data_size();
        if r.len() != expected {
            Err(PayloadSizeError {
                expected,
                found: r.len(),
            })?;
        }

        let mut r = r;
        let mut take = |size: u8| {
            let (head, tail) = r.split_at(size as usize);
            r = tail;
            head.to_vec()
        };

        let fields = definition
            .fields
            .iter()
            .map(|f| Field::new(f.number, f.base_type, take(f.size)))
            .collect();

        let developer_fields = definition
            .developer_fields
            .iter()
            .map(|f| DeveloperField::new(f.developer_index, f.number, take(f.size)))
            .collect();

        let message = Message {
            global: definition.global,
            architecture: definition.architecture,
            fields,
            developer_fields,
            compressed_timestamp: None,
        };

        Ok((message, RecordHeader(())))
    }
}

/// A decoded message, or a message to encode.
///
/// Field bytes are stored as they appear on the wire, in the byte order of the
/// message's architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub global: u16,
    pub architecture: Architecture,
    pub fields: Vec<Field>,
    pub developer_fields: Vec<DeveloperField>,
    /// Timestamp reconstructed from a compressed timestamp header.
    pub compressed_timestamp: Option<u32>,
}

impl Message {
    /// An empty little-endian message.
    pub fn new(global: u16) -> Self {
        Self {
            global,
            architecture: Architecture::Little,
            fields: Vec::new(),
            developer_fields: Vec::new(),
            compressed_timestamp: None,
        }
    }

    /// Set the byte order in which field bytes are stored.
    ///
    /// Existing field bytes are not converted.
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Append a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a developer field.
    pub fn with_developer_field(mut self, field: DeveloperField) -> Self {
        self.developer_fields.push(field);
        self
    }

    /// The first field with a field number.
    pub fn field(&self, number: u8) -> Option<&Field> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// The first developer field with a developer index and field number.
    pub fn developer_field(&self, developer_index: u8, number: u8) -> Option<&DeveloperField> {
        self.developer_fields
            .iter()
            .find(|f| f.developer_index == developer_index && f.number == number)
    }

    /// The absolute timestamp of this message, from its timestamp field or
    /// its compressed timestamp header.
    pub fn timestamp(&self) -> Option<u32> {
        self.field(TIMESTAMP_FIELD)
            .and_then(|f| f.timestamp(self.architecture))
            .or(self.compressed_timestamp)
    }

    /// Read the first element of a field, if valid.
    pub fn number(&self, number: u8) -> Option<Number> {
        self.field(number)?.number(self.architecture)
    }

    /// Convert a field to physical values.
    pub fn resolve(
        &self,
        number: u8,
        resolution: Resolution,
        strategy: DecodingStrategy,
    ) -> Option<Resolved> {
        self.field(number)?
            .resolve(self.architecture, resolution, strategy)
    }

    /// The definition describing this message's fields.
    ///
    /// Field sizes are truncated to a byte; see the encoder for validation.
    pub fn definition(&self) -> MessageDefinition {
        MessageDefinition {
            global: self.global,
            architecture: self.architecture,
            fields: self.fields.iter().map(Field::definition).collect(),
            developer_fields: self
                .developer_fields
                .iter()
                .map(DeveloperField::definition)
                .collect(),
        }
    }
}

/// The bytes of a field in a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub number: u8,
    pub base_type: BaseType,
    pub bytes: Vec<u8>,
}

impl Field {
    /// A field holding raw bytes, in the byte order of its message.
    pub fn new(number: u8, base_type: BaseType, bytes: Vec<u8>) -> Self {
        Self {
            number,
            base_type,
            bytes,
        }
    }

    /// A single-element field holding a stored value.
    pub fn from_value(number: u8, base_type: BaseType, architecture: Architecture, x: f64) -> Self {
        Self::from_values(number, base_type, architecture, &[x])
    }

    /// An array field holding stored values.
    pub fn from_values(
        number: u8,
        base_type: BaseType,
        architecture: Architecture,
        xs: &[f64],
    ) -> Self {
        let mut bytes = Vec::with_capacity(xs.len() * base_type.width());
        for x in xs {
            value::encode_numeric(*x, base_type, architecture, &mut bytes);
        }
        Self::new(number, base_type, bytes)
    }

    /// A single-element field holding a physical value.
    pub fn scaled(
        number: u8,
        base_type: BaseType,
        architecture: Architecture,
        physical: f64,
        resolution: Resolution,
    ) -> Self {
        Self::from_value(number, base_type, architecture, resolution.undo(physical))
    }

    /// A null-terminated string field.
    pub fn string(number: u8, s: &str) -> Self {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        Self::new(number, BaseType::String, bytes)
    }

    /// A field of `count` elements holding the 'invalid' marker value.
    pub fn invalid(number: u8, base_type: BaseType, architecture: Architecture, count: usize) -> Self {
        let mut bytes = Vec::with_capacity(count * base_type.width());
        for _ in 0..count {
            value::encode_invalid(base_type, architecture, &mut bytes);
        }
        Self::new(number, base_type, bytes)
    }

    /// The field definition describing this field.
    pub fn definition(&self) -> FieldDefinition {
        FieldDefinition {
            number: self.number,
            size: self.bytes.len() as u8,
            base_type: self.base_type,
        }
    }

    /// Iterate over elements, paired with whether each is valid.
    pub fn elements(
        &self,
        architecture: Architecture,
    ) -> impl Iterator<Item = (Number, bool)> + '_ {
        self.bytes.chunks_exact(self.base_type.width()).map(move |e| {
            (
                value::decode_numeric(e, self.base_type, architecture),
                !value::is_invalid(e, self.base_type, architecture),
            )
        })
    }

    /// The first element, if valid.
    pub fn number(&self, architecture: Architecture) -> Option<Number> {
        self.elements(architecture)
            .next()
            .and_then(|(x, valid)| valid.then_some(x))
    }

    /// Whether the field holds a value, as in [`value::is_valid`].
    pub fn is_valid(&self, architecture: Architecture) -> bool {
        value::is_valid(&self.bytes, self.base_type, architecture)
    }

    /// Convert to physical values.
    pub fn resolve(
        &self,
        architecture: Architecture,
        resolution: Resolution,
        strategy: DecodingStrategy,
    ) -> Option<Resolved> {
        value::resolve(&self.bytes, self.base_type, architecture, resolution, strategy)
    }

    /// The value of a valid timestamp field.
    pub(crate) fn timestamp(&self, architecture: Architecture) -> Option<u32> {
        if self.bytes.len() != 4 || self.base_type.width() != 4 {
            return None;
        }

        match self.number(architecture)? {
            Number::Unsigned(x) => Some(x as u32),
            _ => None,
        }
    }
}

/// The bytes of a developer field in a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeveloperField {
    pub developer_index: u8,
    pub number: u8,
    pub bytes: Vec<u8>,
}

impl DeveloperField {
    /// A developer field holding raw bytes.
    pub fn new(developer_index: u8, number: u8, bytes: Vec<u8>) -> Self {
        Self {
            developer_index,
            number,
            bytes,
        }
    }

    /// The developer field definition describing this field.
    pub fn definition(&self) -> DeveloperFieldDefinition {
        DeveloperFieldDefinition {
            number: self.number,
            size: self.bytes.len() as u8,
            developer_index: self.developer_index,
        }
    }
}
