//! States processing definition records.

use alloc::vec::Vec;

use either::Either::{self, Left, Right};
use thiserror::Error;
use tracing::trace;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{
    base::{Architecture, BaseType, UnknownArchitecture, UnknownBaseType},
    header::RecordHeader,
};

/// An error advancing over a definition record.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionError {
    #[error(transparent)]
    Architecture(#[from] UnknownArchitecture),
    #[error(transparent)]
    BaseType(#[from] UnknownBaseType),
}

/// A field of a message definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDefinition {
    pub number: u8,
    /// Size in bytes, a multiple of the base type's width.
    pub size: u8,
    pub base_type: BaseType,
}

/// A developer field of a message definition.
///
/// The base type and resolution of these fields are declared by field
/// description messages, see [`super::developer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeveloperFieldDefinition {
    pub number: u8,
    pub size: u8,
    pub developer_index: u8,
}

/// The layout of data records bound to a local message number.
///
/// Two definitions are interchangeable only if they are equal in every part,
/// including field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageDefinition {
    pub global: u16,
    pub architecture: Architecture,
    pub fields: Vec<FieldDefinition>,
    pub developer_fields: Vec<DeveloperFieldDefinition>,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct DefinitionPrelude {
    _reserved: u8,
    architecture: u8,
    global_message: [u8; 2],
    fields: u8,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct FieldHeader {
    field: u8,
    size: u8,
    base_type: u8,
}

impl MessageDefinition {
    /// Number of bytes in each data record using this definition.
    pub fn data_size(&self) -> usize {
        let fields = self.fields.iter().map(|f| f.size as usize);
        let developer_fields = self.developer_fields.iter().map(|f| f.size as usize);
        fields.chain(developer_fields).sum()
    }

    /// Whether this definition must be written with the developer flag.
    pub fn has_developer_fields(&self) -> bool {
        !self.developer_fields.is_empty()
    }

    /// Append the body of a definition record (excluding its record header).
    ///
    /// Callers must ensure there are at most 255 fields of each kind.
    pub fn encode(&self, w: &mut Vec<u8>) {
        let prelude = DefinitionPrelude {
            _reserved: 0,
            architecture: self.architecture.to_byte(),
            global_message: self.architecture.u16_to(self.global),
            fields: self.fields.len() as u8,
        };
        w.extend_from_slice(prelude.as_bytes());

        for f in &self.fields {
            let header = FieldHeader {
                field: f.number,
                size: f.size,
                base_type: f.base_type.id(),
            };
            w.extend_from_slice(header.as_bytes());
        }

        if self.has_developer_fields() {
            w.push(self.developer_fields.len() as u8);

            for f in &self.developer_fields {
                let header = FieldHeader {
                    field: f.number,
                    size: f.size,
                    base_type: f.developer_index,
                };
                w.extend_from_slice(header.as_bytes());
            }
        }
    }
}

/// Successor of a state within a definition record.
pub type DefinitionSuccessor =
    Either<DefinitionField, Either<DeveloperFieldCount, (MessageDefinition, RecordHeader)>>;

/// State token to decode a definition message.
#[derive(Debug)]
pub struct Definition {
    developer: bool,
}

impl Definition {
    pub(super) fn new(developer: bool) -> Self {
        Self { developer }
    }

    /// Whether the record declares developer fields after its fields.
    pub fn has_developer_fields(&self) -> bool {
        self.developer
    }

    /// Transition to another state by decoding a definition message.
    ///
    /// Returns a successor state token.
    pub fn advance(self, r: [u8; 5]) -> Result<DefinitionSuccessor, DefinitionError> {
        let DefinitionPrelude {
            architecture,
            global_message,
            fields,
            ..
        } = zerocopy::transmute!(r);

        let architecture = Architecture::from_byte(architecture)?;

        let definition = MessageDefinition {
            global: architecture.u16_from(global_message),
            architecture,
            fields: Vec::with_capacity(fields as usize),
            developer_fields: Vec::new(),
        };

        Ok(if fields != 0 {
            Left(DefinitionField {
                definition,
                fields_remaining: fields,
                developer: self.developer,
            })
        } else {
            Right(after_fields(definition, self.developer))
        })
    }
}

/// State token to decode a definition field.
#[derive(Debug)]
pub struct DefinitionField {
    definition: MessageDefinition,
    fields_remaining: u8,
    developer: bool,
}

impl DefinitionField {
    /// Transition to another state by decoding a definition field.
    ///
    /// A field whose size is not a multiple of its base type's width is
    /// demoted to an array of bytes.
    ///
    /// Returns a successor state token.
    pub fn advance(mut self, r: [u8; 3]) -> Result<DefinitionSuccessor, DefinitionError> {
        let FieldHeader {
            field,
            size,
            base_type,
        } = zerocopy::transmute!(r);

        let mut base_type = BaseType::from_id(base_type)?;

        if size as usize % base_type.width() != 0 {
            trace!(field, size, ?base_type, "Field size is not a multiple of its width");
            base_type = BaseType::Byte;
        }

        self.definition.fields.push(FieldDefinition {
            number: field,
            size,
            base_type,
        });

        self.fields_remaining -= 1;

        Ok(if self.fields_remaining != 0 {
            Left(self)
        } else {
            Right(after_fields(self.definition, self.developer))
        })
    }
}

fn after_fields(
    definition: MessageDefinition,
    developer: bool,
) -> Either<DeveloperFieldCount, (MessageDefinition, RecordHeader)> {
    if developer {
        Left(DeveloperFieldCount { definition })
    } else {
        Right((definition, RecordHeader(())))
    }
}

/// State token to decode the number of developer fields in a definition.
#[derive(Debug)]
pub struct DeveloperFieldCount {
    definition: MessageDefinition,
}

impl DeveloperFieldCount {
    /// Transition to another state by decoding the number of developer fields.
    ///
    /// Returns a successor state token, or the completed definition.
    pub fn advance(
        self,
        r: [u8; 1],
    ) -> Either<DeveloperDefinitionField, (MessageDefinition, RecordHeader)> {
        let [fields] = r;

        if fields != 0 {
            Left(DeveloperDefinitionField {
                definition: self.definition,
                fields_remaining: fields,
            })
        } else {
            Right((self.definition, RecordHeader(())))
        }
    }
}

/// State token to decode a developer field definition.
#[derive(Debug)]
pub struct DeveloperDefinitionField {
    definition: MessageDefinition,
    fields_remaining: u8,
}

impl DeveloperDefinitionField {
    /// Transition to another state by decoding a developer field definition.
    ///
    /// Returns a successor state token, or the completed definition.
    pub fn advance(mut self, r: [u8; 3]) -> Either<Self, (MessageDefinition, RecordHeader)> {
        let FieldHeader {
            field,
            size,
            base_type: developer_index,
        } = zerocopy::transmute!(r);

        self.definition.developer_fields.push(DeveloperFieldDefinition {
            number: field,
            size,
            developer_index,
        });

        self.fields_remaining -= 1;

        if self.fields_remaining != 0 {
            Left(self)
        } else {
            Right((self.definition, RecordHeader(())))
        }
    }
}
