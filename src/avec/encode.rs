//! Encoding messages into a document.
//!
//! The [`Encoder`] accepts messages in order and decides how to lay them out.
//! Each message's definition is derived from its fields, bound to a local
//! message number (reusing, taking, or evicting the least recently used
//! binding), and preceded by a definition record only when the binding
//! changes. Messages are validated completely before any state changes, so a
//! rejected message leaves no trace in the document.

use alloc::vec::Vec;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    catalog::{Catalog, ValidityStrategy},
    sans::{
        base::BaseType,
        check::Checksum,
        data::{DeveloperField, Field, Message},
        definition::MessageDefinition,
        developer::{
            DEVELOPER_DATA_ID, DeveloperDataId, DeveloperFieldError, DeveloperRegistry,
            FIELD_DESCRIPTION, FieldDescription, MalformedDeclaration,
        },
        header::{FileHeader, RecordKind},
        table::{Assignment, COMPRESSED_LOCAL_MESSAGES, NORMAL_LOCAL_MESSAGES, SlotAllocator},
        timestamp::{RollingTimestamp, TIMESTAMP_FIELD},
    },
};

/// Protocol version written by default (2.0).
pub const PROTOCOL_VERSION: u8 = 0x20;

/// Profile version written by default (21.32).
pub const PROFILE_VERSION: u16 = 2132;

/// Options for an encoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub protocol_version: u8,
    pub profile_version: u16,
    /// Write a 14-byte header carrying its own check value.
    pub extended_header: bool,
    /// Write timestamps as offsets in record headers where possible.
    pub compressed_timestamps: bool,
    /// Checks applied against the catalog before writing each message.
    pub validity: ValidityStrategy,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            profile_version: PROFILE_VERSION,
            extended_header: true,
            compressed_timestamps: false,
            validity: ValidityStrategy::None,
        }
    }
}

impl EncodeOptions {
    pub fn with_protocol_version(mut self, protocol_version: u8) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    pub fn with_profile_version(mut self, profile_version: u16) -> Self {
        self.profile_version = profile_version;
        self
    }

    pub fn with_extended_header(mut self, extended_header: bool) -> Self {
        self.extended_header = extended_header;
        self
    }

    pub fn with_compressed_timestamps(mut self, compressed_timestamps: bool) -> Self {
        self.compressed_timestamps = compressed_timestamps;
        self
    }

    pub fn with_validity(mut self, validity: ValidityStrategy) -> Self {
        self.validity = validity;
        self
    }
}

/// A message the encoder refused to write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot encode message {message} ({global}): {kind}")]
pub struct EncodeError {
    /// Index of the message among those written in the session.
    pub message: usize,
    pub global: u16,
    pub kind: EncodeErrorKind,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeErrorKind {
    #[error("Message has no fields.")]
    NoFields,
    #[error("Message has {0} fields of a kind, exceeding 255.")]
    TooManyFields(usize),
    #[error("Field {field} is empty.")]
    EmptyField { field: u8 },
    #[error("Field {field} is {size} bytes long, exceeding 255.")]
    FieldTooLong { field: u8, size: usize },
    #[error("Field {field} is {size} bytes long, not a multiple of the width of {base_type:?}.")]
    FieldSize {
        field: u8,
        size: usize,
        base_type: BaseType,
    },
    #[error(transparent)]
    UndeclaredDeveloperField(#[from] DeveloperFieldError),
    #[error(transparent)]
    MalformedDeclaration(#[from] MalformedDeclaration),
    #[error("Developer fields require protocol version 2.0 or later.")]
    DeveloperFieldsRequireProtocol2,
    #[error("Required field {field} is missing or invalid.")]
    RequiredField { field: u8 },
    #[error("Document exceeds the maximum record section size.")]
    DataTooLarge,
}

enum Declaration {
    Developer(DeveloperDataId),
    Field(FieldDescription),
}

/// A session encoding messages into a single document.
#[derive(Debug)]
pub struct Encoder<'c, C: Catalog + ?Sized = ()> {
    catalog: &'c C,
    options: EncodeOptions,
    slots: SlotAllocator,
    timestamp: RollingTimestamp,
    developer: DeveloperRegistry,
    /// The record section, excluding header and trailer.
    records: Vec<u8>,
    written: usize,
}

impl Encoder<'static> {
    pub fn new(options: EncodeOptions) -> Self {
        Self::with_catalog(&(), options)
    }
}

impl<'c, C: Catalog + ?Sized> Encoder<'c, C> {
    /// Construct an encoder validating messages against a catalog.
    pub fn with_catalog(catalog: &'c C, options: EncodeOptions) -> Self {
        Self {
            catalog,
            options,
            slots: SlotAllocator::new(),
            timestamp: RollingTimestamp::new(),
            developer: DeveloperRegistry::new(),
            records: Vec::new(),
            written: 0,
        }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Developer declarations written so far.
    pub fn developer(&self) -> &DeveloperRegistry {
        &self.developer
    }

    /// Local message number bindings after the last message written.
    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Number of messages written.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Append a message, preceded by a definition record if its definition
    /// is not bound to a local message number.
    ///
    /// On error, nothing is written.
    pub fn write(&mut self, m: &Message) -> Result<(), EncodeError> {
        let index = self.written;
        let fail = |kind| EncodeError {
            message: index,
            global: m.global,
            kind,
        };

        self.validate(m).map_err(fail)?;
        let declaration = declaration(m).map_err(|e| fail(e.into()))?;

        let timestamp = m.timestamp();
        let offset = timestamp
            .filter(|_| self.options.compressed_timestamps)
            .and_then(|t| self.timestamp.compress(t));

        // A compressed timestamp header replaces the timestamp field, and a
        // timestamp only held in a header is written as a field otherwise.
        let synthesized;
        let mut fields: Vec<&Field> = m
            .fields
            .iter()
            .filter(|f| offset.is_none() || f.number != TIMESTAMP_FIELD)
            .collect();

        if let (None, None, Some(t)) = (offset, m.field(TIMESTAMP_FIELD), m.compressed_timestamp) {
            synthesized = Field::from_value(TIMESTAMP_FIELD, BaseType::Uint32, m.architecture, t as f64);
            fields.insert(0, &synthesized);
        }

        if fields.len() > u8::MAX as usize {
            Err(fail(EncodeErrorKind::TooManyFields(fields.len())))?;
        }

        let definition = MessageDefinition {
            global: m.global,
            architecture: m.architecture,
            fields: fields.iter().map(|f| f.definition()).collect(),
            developer_fields: m
                .developer_fields
                .iter()
                .map(DeveloperField::definition)
                .collect(),
        };

        let mut body = Vec::new();
        definition.encode(&mut body);

        let mut payload = Vec::with_capacity(definition.data_size());
        for f in &fields {
            payload.extend_from_slice(&f.bytes);
        }
        for f in &m.developer_fields {
            payload.extend_from_slice(&f.bytes);
        }

        // Both record headers, the definition, and the payload.
        let size = self.records.len() + 2 + body.len() + payload.len();
        if size > u32::MAX as usize {
            Err(fail(EncodeErrorKind::DataTooLarge))?;
        }

        let range = match offset {
            Some(_) => COMPRESSED_LOCAL_MESSAGES,
            None => NORMAL_LOCAL_MESSAGES,
        };

        let assignment = self.slots.assign(&definition, range);
        let local = assignment.local();

        if let Assignment::Define(local) = assignment {
            debug!(local, global = m.global, "Writing definition record");

            let developer = definition.has_developer_fields();
            self.records.push(RecordKind::Definition { developer }.encode(local));
            self.records.extend_from_slice(&body);
        }

        let kind = match offset {
            Some(offset) => RecordKind::CompressedTimestamp { offset },
            None => RecordKind::Data,
        };

        trace!(index, local, global = m.global, ?kind, "Writing data record");

        self.records.push(kind.encode(local));
        self.records.extend_from_slice(&payload);

        if let Some(t) = timestamp {
            self.timestamp.observe(t);
        }

        match declaration {
            Some(Declaration::Developer(id)) => self.developer.register_developer_data(id),
            Some(Declaration::Field(description)) => {
                self.developer.register_field_description(description)
            }
            None => {}
        }

        self.written += 1;
        Ok(())
    }

    fn validate(&self, m: &Message) -> Result<(), EncodeErrorKind> {
        if m.fields.is_empty() && m.developer_fields.is_empty() {
            Err(EncodeErrorKind::NoFields)?;
        }

        for count in [m.fields.len(), m.developer_fields.len()] {
            if count > u8::MAX as usize {
                Err(EncodeErrorKind::TooManyFields(count))?;
            }
        }

        for f in &m.fields {
            check_size(f.number, f.bytes.len(), f.base_type)?;
        }

        if !m.developer_fields.is_empty() && self.options.protocol_version >> 4 < 2 {
            Err(EncodeErrorKind::DeveloperFieldsRequireProtocol2)?;
        }

        for f in &m.developer_fields {
            let description = self.developer.resolve(f.developer_index, f.number)?;
            check_size(f.number, f.bytes.len(), description.base_type)?;
        }

        if let Some(profile) = self.catalog.message(m.global) {
            if let Some(field) = profile.missing_field(m, self.options.validity) {
                Err(EncodeErrorKind::RequiredField { field })?;
            }
        }

        Ok(())
    }

    fn header(&self) -> FileHeader {
        FileHeader {
            header_size: if self.options.extended_header { 14 } else { 12 },
            protocol_version: self.options.protocol_version,
            profile_version: self.options.profile_version,
            data_size: self.records.len() as u32,
        }
    }

    /// Complete the document, returning its bytes.
    pub fn finish(self) -> Vec<u8> {
        let mut w = Vec::with_capacity(14 + self.records.len() + 2);
        self.header().encode(&mut w);
        w.extend_from_slice(&self.records);

        let mut checksum = Checksum::new();
        checksum.update(&w);
        w.extend_from_slice(&checksum.finalize());

        debug!(messages = self.written, size = w.len(), "Finished document");
        w
    }

    /// Complete the document, writing its bytes.
    ///
    /// _Requires Cargo feature `std`._
    #[cfg(feature = "std")]
    pub fn finish_to_writer(self, w: &mut impl std::io::Write) -> std::io::Result<()> {
        let mut header = Vec::with_capacity(14);
        self.header().encode(&mut header);

        let mut checksum = Checksum::new();
        checksum.update(&header);
        checksum.update(&self.records);

        w.write_all(&header)?;
        w.write_all(&self.records)?;
        w.write_all(&checksum.finalize())
    }
}

fn check_size(field: u8, size: usize, base_type: BaseType) -> Result<(), EncodeErrorKind> {
    if size == 0 {
        Err(EncodeErrorKind::EmptyField { field })?;
    }
    if size > u8::MAX as usize {
        Err(EncodeErrorKind::FieldTooLong { field, size })?;
    }
    if size % base_type.width() != 0 {
        Err(EncodeErrorKind::FieldSize {
            field,
            size,
            base_type,
        })?;
    }
    Ok(())
}

fn declaration(m: &Message) -> Result<Option<Declaration>, MalformedDeclaration> {
    Ok(match m.global {
        DEVELOPER_DATA_ID => Some(Declaration::Developer(DeveloperDataId::from_message(m)?)),
        FIELD_DESCRIPTION => Some(Declaration::Field(FieldDescription::from_message(m)?)),
        _ => None,
    })
}

/// Encode messages into a document.
pub fn encode<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
    options: EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    encode_with_catalog(&(), messages, options)
}

/// Encode messages into a document, validating them against a catalog.
pub fn encode_with_catalog<'a, C: Catalog + ?Sized>(
    catalog: &C,
    messages: impl IntoIterator<Item = &'a Message>,
    options: EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::with_catalog(catalog, options);

    for m in messages {
        encoder.write(m)?;
    }

    Ok(encoder.finish())
}

