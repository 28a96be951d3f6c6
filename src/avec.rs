//! Convenience interfaces for common decoding and encoding patterns.
//!
//! [`Messages`] decodes a document lazily, one message at a time. Construct it
//! over a slice with [`slice::messages`], or over a reader with
//! [`reader::messages`]. Each session owns all of its protocol state, so
//! independent documents may be decoded concurrently in separate sessions.
//!
//! The `decode` functions drive a session to completion, publishing to the
//! [`FromRecords`] and [`FromRecord`] traits. In many cases (when records are
//! of a known shape), these traits can be derived. See the
//! [`FromRecords`](macro@FromRecords) and [`FromRecord`](macro@FromRecord)
//! macros for details.
//!
//! The [`encode`] module writes messages back into a document.

pub mod encode;
#[cfg(feature = "std")]
pub mod reader;
pub mod slice;

pub use encode::{Encoder, encode};
#[cfg(feature = "std")]
pub use reader::decode as decode_reader;
pub use slice::decode as decode_slice;

use alloc::vec::Vec;
use core::{iter::FusedIterator, mem};

use either::Either::{Left, Right};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::sans::{
    Decoder,
    base::{Architecture, BaseType},
    check::Checksum,
    data::{Data, Field, Message, PayloadSizeError},
    definition::{Definition, DefinitionError},
    developer::{DeveloperFieldError, DeveloperRegistry, FieldDescription, MalformedDeclaration},
    header::{DocumentHeaderError, FileHeader, RecordHeader},
    table::{LocalMessageTable, UndefinedLocalMessage},
    timestamp::{MissingReference, RollingTimestamp},
    value::{self, DecodingStrategy, Number, Resolved},
};

/// Options for a decoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Treatment of fields holding their 'invalid' marker value.
    pub strategy: DecodingStrategy,
    /// Fail, rather than warn, when a document's check value does not match.
    pub require_checksum: bool,
    /// Continue with further documents following the first.
    pub chained: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strategy: DecodingStrategy::DropInvalid,
            require_checksum: false,
            chained: true,
        }
    }
}

impl DecodeOptions {
    pub fn with_strategy(mut self, strategy: DecodingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_require_checksum(mut self, require_checksum: bool) -> Self {
        self.require_checksum = require_checksum;
        self
    }

    pub fn with_chained(mut self, chained: bool) -> Self {
        self.chained = chained;
        self
    }
}

/// Errors ending a decoding session.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the supplied reader.
    #[cfg(feature = "std")]
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Unexpectedly reached the end of the document.
    #[error("Unexpectedly reached the end of the document at byte {offset}.")]
    Truncated { offset: usize },
    /// Incorrect file header.
    #[error("Incorrect file header: {0}")]
    Header(#[from] DocumentHeaderError),
    /// Malformed definition record.
    #[error("Malformed definition record: {0}")]
    Definition(#[from] DefinitionError),
    /// Malformed data record.
    #[error("Malformed data record: {0}")]
    Payload(#[from] PayloadSizeError),
    /// A record extends beyond the size declared in the file header.
    #[error("Records extend beyond the declared size ({consumed} of {declared} bytes).")]
    DataSize { declared: u32, consumed: usize },
    /// A data record referenced an undefined local message.
    #[error(transparent)]
    UndefinedLocalMessage(#[from] UndefinedLocalMessage),
    /// A compressed timestamp appeared before any absolute timestamp.
    #[error(transparent)]
    MissingReference(#[from] MissingReference),
    /// Calculated and found CRC values do not match.
    #[error("Calculated ({calculated}) and found ({found}) CRC values do not match.")]
    CyclicRedundancyCheck { found: u16, calculated: u16 },
}

/// Broad categories of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document is malformed or truncated.
    Structural,
    /// Records are well-formed, but cannot be interpreted in sequence.
    ProtocolState,
    /// A check value did not match.
    Integrity,
    /// The reader failed.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "std")]
            Self::Io(_) => ErrorKind::Io,
            Self::Truncated { .. }
            | Self::Header(_)
            | Self::Definition(_)
            | Self::Payload(_)
            | Self::DataSize { .. } => ErrorKind::Structural,
            Self::UndefinedLocalMessage(_) | Self::MissingReference(_) => ErrorKind::ProtocolState,
            Self::CyclicRedundancyCheck { .. } => ErrorKind::Integrity,
        }
    }
}

/// Problems found while decoding that do not end the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Calculated and found CRC values do not match.
    #[error("Calculated ({calculated}) and found ({found}) CRC values do not match.")]
    Checksum { found: u16, calculated: u16 },
    /// Calculated and found file header CRC values do not match.
    #[error("Calculated ({calculated}) and found ({found}) header CRC values do not match.")]
    HeaderChecksum { found: u16, calculated: u16 },
    /// A developer field could not be resolved, and was left untyped.
    #[error("Message {message}: {source}")]
    UnresolvedDeveloperField {
        message: usize,
        source: DeveloperFieldError,
    },
    /// A developer declaration could not be registered.
    #[error("Message {message}: {source}")]
    MalformedDeclaration {
        message: usize,
        source: MalformedDeclaration,
    },
}

/// A source of document bytes.
pub trait Source {
    /// Fill a buffer entirely, failing with [`Error::Truncated`] at the end of
    /// the document.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Error>;

    /// Whether every byte has been read.
    fn is_empty(&mut self) -> Result<bool, Error>;

    /// Fail with [`Error::Truncated`] if fewer than `n` unread bytes remain.
    ///
    /// Sources that cannot know their length accept any `n`, and truncation
    /// is found when reading instead.
    fn require(&self, n: usize) -> Result<(), Error> {
        let _ = n;
        Ok(())
    }
}

#[derive(Debug)]
enum State {
    Document,
    Records { header: RecordHeader, end: usize },
    Done,
}

/// A lazy sequence of the messages in a document.
///
/// Messages are decoded as they are pulled. The sequence ends after the last
/// document in the source, or after the first error.
#[derive(Debug)]
pub struct Messages<S> {
    source: S,
    options: DecodeOptions,
    state: State,
    /// Bytes read from the current document, used to end decoding.
    read: usize,
    checksum: Checksum,
    header: Option<FileHeader>,
    table: LocalMessageTable,
    timestamp: RollingTimestamp,
    developer: DeveloperRegistry,
    warnings: Vec<Warning>,
    documents: usize,
    messages: usize,
}

impl<S: Source> Messages<S> {
    pub fn new(source: S, options: DecodeOptions) -> Self {
        Self {
            source,
            options,
            state: State::Document,
            read: 0,
            checksum: Checksum::new(),
            header: None,
            table: LocalMessageTable::new(),
            timestamp: RollingTimestamp::new(),
            developer: DeveloperRegistry::new(),
            warnings: Vec::new(),
            documents: 0,
            messages: 0,
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// The header of the document being decoded.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Developer declarations in effect after the last message pulled.
    pub fn developer(&self) -> &DeveloperRegistry {
        &self.developer
    }

    /// Warnings raised so far, in order.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    fn warn(&mut self, warning: Warning) {
        warn!(%warning, "Decoding warning");
        self.warnings.push(warning);
    }

    /// Take an exact number of bytes, advancing the counter and accumulating
    /// the CRC value.
    fn take<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut buf = [0; N];
        self.source.read(&mut buf)?;

        self.read += N;
        self.checksum.update(&buf);

        Ok(buf)
    }

    fn take_vec(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let mut buf = alloc::vec![0; n];
        self.source.read(&mut buf)?;

        self.read += n;
        self.checksum.update(&buf);

        Ok(buf)
    }

    fn next_message(&mut self) -> Result<Option<Message>, Error> {
        loop {
            match mem::replace(&mut self.state, State::Done) {
                State::Done => return Ok(None),
                State::Document => {
                    if self.documents > 0 && (!self.options.chained || self.source.is_empty()?) {
                        return Ok(None);
                    }

                    let (header, end) = self.begin_document()?;
                    self.state = State::Records { header, end };
                }
                State::Records { end, .. } if self.read >= end => {
                    self.end_document()?;
                    self.state = State::Document;
                }
                State::Records { header, end } => {
                    let (local, successor) = header.advance(self.take()?);

                    let (header, message) = match successor {
                        Left(state) => (self.decode_definition(local, state)?, None),
                        Right(state) => {
                            let (message, header) = self.decode_data(local, state)?;
                            (header, Some(message))
                        }
                    };

                    if self.read > end {
                        let header = self.header.map_or(0, |h| h.header_size as usize);
                        Err(Error::DataSize {
                            declared: self.header.map_or(0, |h| h.data_size),
                            consumed: self.read - header,
                        })?;
                    }

                    self.state = State::Records { header, end };

                    if message.is_some() {
                        return Ok(message);
                    }
                }
            }
        }
    }

    fn begin_document(&mut self) -> Result<(RecordHeader, usize), Error> {
        self.read = 0;
        self.checksum = Checksum::new();
        self.table.clear();
        self.timestamp = RollingTimestamp::new();
        self.developer.clear();

        let (header, successor) = Decoder::advance(self.take()?)?;

        let record_header = match successor {
            Left(state) => {
                let (check, state) = state.advance(self.take()?);
                if !check.is_valid() {
                    self.warn(Warning::HeaderChecksum {
                        found: check.found,
                        calculated: check.calculated,
                    });
                }
                state
            }
            Right(state) => state,
        };

        debug!(
            document = self.documents,
            protocol_version = header.protocol_version,
            profile_version = header.profile_version,
            data_size = header.data_size,
            "Decoding document"
        );

        self.header = Some(header);

        // Records and the trailer.
        self.source.require(header.data_size as usize + 2)?;

        // Offset to the end of the record section.
        Ok((record_header, self.read + header.data_size as usize))
    }

    fn end_document(&mut self) -> Result<(), Error> {
        let calculated = self.checksum.value();

        let mut found = [0; 2];
        self.source.read(&mut found)?;
        let found = u16::from_le_bytes(found);

        if found != calculated {
            if self.options.require_checksum {
                Err(Error::CyclicRedundancyCheck { found, calculated })?;
            }
            self.warn(Warning::Checksum { found, calculated });
        }

        self.documents += 1;
        Ok(())
    }

    fn decode_definition(&mut self, local: u8, state: Definition) -> Result<RecordHeader, Error> {
        let mut successor = state.advance(self.take()?)?;

        let (definition, record_header) = loop {
            successor = match successor {
                Left(state) => state.advance(self.take()?)?,
                Right(Left(state)) => {
                    break match state.advance(self.take()?) {
                        Left(mut state) => loop {
                            state = match state.advance(self.take()?) {
                                Left(state) => state,
                                Right(complete) => break complete,
                            }
                        },
                        Right(complete) => complete,
                    };
                }
                Right(Right(complete)) => break complete,
            };
        };

        debug!(
            local,
            global = definition.global,
            fields = definition.fields.len(),
            developer_fields = definition.developer_fields.len(),
            "Defined local message"
        );

        self.table.define(local, definition);
        Ok(record_header)
    }

    fn decode_data(&mut self, local: u8, state: Data) -> Result<(Message, RecordHeader), Error> {
        let size = self.table.lookup(local)?.data_size();

        let timestamp = state
            .time_offset()
            .map(|offset| self.timestamp.expand(offset))
            .transpose()?;

        let payload = self.take_vec(size)?;
        let (mut message, record_header) = state.advance(self.table.lookup(local)?, &payload)?;
        message.compressed_timestamp = timestamp;

        trace!(local, global = message.global, ?timestamp, "Decoded data record");

        if let Some(timestamp) = message.timestamp() {
            self.timestamp.observe(timestamp);
        }

        let index = self.messages;
        self.messages += 1;

        if let Err(source) = self.developer.observe(&message) {
            self.warn(Warning::MalformedDeclaration {
                message: index,
                source,
            });
        }

        for f in &message.developer_fields {
            if let Err(source) = self.developer.resolve(f.developer_index, f.number) {
                self.warn(Warning::UnresolvedDeveloperField {
                    message: index,
                    source,
                });
            }
        }

        Ok((message, record_header))
    }
}

impl<S: Source> Iterator for Messages<S> {
    type Item = Result<Message, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

impl<S: Source> FusedIterator for Messages<S> {}

/// Drive a session to completion, publishing to a receiver.
///
/// Returns the warnings raised while decoding.
pub fn decode<S: Source>(
    mut messages: Messages<S>,
    o: &mut (impl FromRecords + ?Sized),
) -> Result<Vec<Warning>, Error> {
    let strategy = messages.options().strategy;

    while let Some(message) = messages.next() {
        let message = message?;

        // Shadow the document receiver with that of a single record.
        if let Some(o) = o.add_record(message.global) {
            publish(o, &message, strategy, messages.developer());
        }
    }

    Ok(messages.into_warnings())
}

/// Publish a message's fields to a record receiver.
pub fn publish(
    o: &mut dyn FromRecord,
    m: &Message,
    strategy: DecodingStrategy,
    developer: &DeveloperRegistry,
) {
    if let Some(timestamp) = m.compressed_timestamp {
        o.add_timestamp(timestamp);
    }

    for f in &m.fields {
        publish_field(o, f, m.architecture, strategy);
    }

    for f in &m.developer_fields {
        let description = developer.resolve(f.developer_index, f.number).ok();
        let value = description.and_then(|d| d.resolve(&f.bytes, m.architecture, strategy));

        // Described fields with no value were dropped as invalid.
        if description.is_some() && value.is_none() {
            continue;
        }

        o.add_developer_field(&DeveloperValue {
            developer_index: f.developer_index,
            number: f.number,
            description,
            bytes: &f.bytes,
            value,
        });
    }
}

/// Publish every element of a field, or none of it.
fn publish_field(o: &mut dyn FromRecord, f: &Field, a: Architecture, strategy: DecodingStrategy) {
    let valid = f.is_valid(a);
    if !valid && strategy == DecodingStrategy::DropInvalid {
        return;
    }

    // Valid strings end at their terminator.
    let bytes = match f.base_type {
        BaseType::String if valid => value::terminated(&f.bytes),
        _ => f.bytes.as_slice(),
    };

    let elements = bytes
        .chunks_exact(f.base_type.width())
        .map(|e| value::decode_numeric(e, f.base_type, a));

    macro_rules! publish_elements {
        ($add:ident, $variant:ident, $t:ty) => {
            for x in elements {
                if let Number::$variant(x) = x {
                    o.$add(f.number, x as $t);
                }
            }
        };
    }

    match f.base_type {
        BaseType::Enum
        | BaseType::Uint8
        | BaseType::Uint8z
        | BaseType::String
        | BaseType::Byte => publish_elements!(add_u8, Unsigned, u8),
        BaseType::Uint16 | BaseType::Uint16z => publish_elements!(add_u16, Unsigned, u16),
        BaseType::Uint32 | BaseType::Uint32z => publish_elements!(add_u32, Unsigned, u32),
        BaseType::Uint64 | BaseType::Uint64z => publish_elements!(add_u64, Unsigned, u64),

        BaseType::Sint8 => publish_elements!(add_i8, Signed, i8),
        BaseType::Sint16 => publish_elements!(add_i16, Signed, i16),
        BaseType::Sint32 => publish_elements!(add_i32, Signed, i32),
        BaseType::Sint64 => publish_elements!(add_i64, Signed, i64),

        BaseType::Float32 => publish_elements!(add_f32, Float, f32),
        BaseType::Float64 => publish_elements!(add_f64, Float, f64),
    }
}

/// A developer field, as published to a record receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct DeveloperValue<'a> {
    pub developer_index: u8,
    pub number: u8,
    /// The field's description, if one was declared.
    pub description: Option<&'a FieldDescription>,
    pub bytes: &'a [u8],
    /// Physical values, if the field is described.
    pub value: Option<Resolved>,
}

impl DeveloperValue<'_> {
    /// The value of a single-element numeric field.
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_ref()?.as_f64()
    }

    /// The name from the field's description.
    pub fn name(&self) -> Option<&str> {
        self.description.map(|d| d.name.as_str())
    }
}

/// Derive [`FromRecords`] for a struct holding a collection of records.
///
/// _Requires Cargo feature `derive`._
///
/// # Example
///
/// To collect a single record, add the `record(N)` attribute to an `Option<T>`
/// struct field, where `N` is the global message number and `T` is a type
/// implementing [`FromRecord`] and [`Default`]. Additional records received
/// for the same message number will overwrite earlier ones. To collect multiple
/// occurrences of a record, apply the attribute to a `Vec<T>` instead.
///
/// ```
/// #[derive(Debug, Default, FromRecords)]
/// struct ActivityRecordSet {
///     #[record(0)]
///     file_id: Option<FileId>,
///     #[record(20)]
///     records: Vec<Record>,
/// }
/// ```
#[cfg(feature = "derive")]
pub use cassette_derive::FromRecords;

/// Produce record receivers for a document.
///
/// See the [`FromRecords`](macro@FromRecords) derive macro for an automatic
/// implementation of this trait.
pub trait FromRecords {
    /// Retrieve a receiver for a record, if one exists.
    fn add_record(&mut self, id: u16) -> Option<&mut dyn FromRecord>;
}

/// Derive [`FromRecord`] for a struct representing a single record.
///
/// _Requires Cargo feature `derive`._
///
/// # Examples
///
/// To receive a single value for a record field, add the `field(N)` attribute
/// to an `Option<T>` struct field, where `N` is the field number and `T` is the
/// corresponding Rust primitive. Additional values received for the same field
/// will replace earlier ones.
///
/// To receive the timestamp reconstructed from a compressed timestamp header,
/// supply `time` in place of a field number. To receive the value of a
/// described developer field, use the `developer(I, N)` attribute on an
/// `Option<f64>`, where `I` is the developer data index and `N` the field
/// number.
///
/// ```
/// #[derive(Debug, Default, FromRecord)]
/// struct Record {
///     #[field(time)]
///     time: Option<u32>,
///     #[field(253)]
///     timestamp: Option<u32>,
///     #[field(2)]
///     altitude: Option<u16>,
///     #[developer(0, 1)]
///     power: Option<f64>,
/// }
/// ```
///
/// To receive arrays or arbitrary types (for example, decoding directly into an
/// enumeration), supply an accumulator closure. Since the element type cannot
/// be inferred, the second argument must be typed.
///
/// ```
/// #[derive(Debug, Default, FromRecord)]
/// struct Course {
///     #[field(5, |v, c: u8| v.push(c))]
///     name: Vec<u8>,
/// }
/// ```
#[cfg(feature = "derive")]
pub use cassette_derive::FromRecord;

/// Receive field values for a record.
///
/// Before publishing, fields are converted to their corresponding Rust
/// primitive, and those holding the 'invalid' marker value are skipped unless
/// decoding with [`DecodingStrategy::KeepSentinel`]. Array types (including
/// strings) are published item-by-item, calling the receiver repeatedly.
///
/// The default implementation of each method ignores received values.
///
/// See the [`FromRecord`](macro@FromRecord) derive macro for an automatic
/// implementation of this trait.
#[allow(unused_variables)]
pub trait FromRecord {
    /// Add the timestamp reconstructed from a compressed timestamp header.
    fn add_timestamp(&mut self, _: u32) {}
    /// Add a `u8` for a field to the record.
    ///
    /// This method receives values for fields represented by a, or an array of,
    /// unsigned bytes. This includes the base types `enum`, `string`, and
    /// `byte`.
    fn add_u8(&mut self, field: u8, _: u8) {}
    /// Add a `u16` for a field to the record.
    fn add_u16(&mut self, field: u8, _: u16) {}
    /// Add a `u32` for a field to the record.
    fn add_u32(&mut self, field: u8, _: u32) {}
    /// Add a `u64` for a field to the record.
    fn add_u64(&mut self, field: u8, _: u64) {}

    /// Add a `i8` for a field to the record.
    fn add_i8(&mut self, field: u8, _: i8) {}
    /// Add a `i16` for a field to the record.
    fn add_i16(&mut self, field: u8, _: i16) {}
    /// Add a `i32` for a field to the record.
    fn add_i32(&mut self, field: u8, _: i32) {}
    /// Add a `i64` for a field to the record.
    fn add_i64(&mut self, field: u8, _: i64) {}

    /// Add a `f32` for a field to the record.
    fn add_f32(&mut self, field: u8, _: f32) {}
    /// Add a `f64` for a field to the record.
    fn add_f64(&mut self, field: u8, _: f64) {}

    /// Add a developer field to the record.
    ///
    /// Fields without a description are published untyped; described fields
    /// holding their 'invalid' marker value are skipped as above.
    fn add_developer_field(&mut self, field: &DeveloperValue<'_>) {}
}
