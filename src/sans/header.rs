//! States processing document and record headers.

use alloc::vec::Vec;

use either::Either::{self, Left, Right};
use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::little_endian::{U16, U32},
};

use super::{check::compute_crc, data::Data, definition::Definition};

/// An error advancing over a document header.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DocumentHeaderError {
    /// Incorrect filetype marker.
    #[error("Incorrect file type marker.")]
    NotFitData,
    /// Unknown header length.
    #[error("Unknown header length ({0}).")]
    UnknownHeaderLength(u8),
    /// Protocol major version newer than supported.
    #[error("Unsupported protocol version ({0:#04x}).")]
    UnsupportedProtocol(u8),
}

/// Highest supported protocol major version.
const PROTOCOL_MAJOR: u8 = 2;

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct FileHeaderLayout {
    header_size: u8,
    protocol_version: u8,
    profile_version: U16,
    data_size: U32,
    data_type: [u8; 4],
}

/// Fields of a document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// 12, or 14 if the header carries its own check value.
    pub header_size: u8,
    pub protocol_version: u8,
    pub profile_version: u16,
    /// Number of record bytes between the header and the trailer.
    pub data_size: u32,
}

impl FileHeader {
    pub const MAGIC: [u8; 4] = *b".FIT";

    /// Append the header, including its check value when 14 bytes long.
    pub fn encode(&self, w: &mut Vec<u8>) {
        let layout = FileHeaderLayout {
            header_size: self.header_size,
            protocol_version: self.protocol_version,
            profile_version: U16::new(self.profile_version),
            data_size: U32::new(self.data_size),
            data_type: Self::MAGIC,
        };

        let r: [u8; 12] = zerocopy::transmute!(layout);
        w.extend_from_slice(&r);

        if self.header_size == 14 {
            w.extend_from_slice(&compute_crc(0, &r).to_le_bytes());
        }
    }
}

/// State token to decode a document header.
#[derive(Debug)]
pub struct DocumentHeader;

impl DocumentHeader {
    /// Transition to another state by decoding a document header.
    ///
    /// Returns the header fields, and a successor state token.
    pub fn advance(
        r: [u8; 12],
    ) -> Result<(FileHeader, Either<ExtendedDocumentHeader, RecordHeader>), DocumentHeaderError>
    {
        let calculated = compute_crc(0, &r);

        let FileHeaderLayout {
            header_size,
            protocol_version,
            profile_version,
            data_size,
            data_type,
        } = zerocopy::transmute!(r);

        if data_type != FileHeader::MAGIC {
            Err(DocumentHeaderError::NotFitData)?;
        }

        if protocol_version >> 4 > PROTOCOL_MAJOR {
            Err(DocumentHeaderError::UnsupportedProtocol(protocol_version))?;
        }

        let successor = match header_size {
            14 => Left(ExtendedDocumentHeader { calculated }),
            12 => Right(RecordHeader(())),
            _ => Err(DocumentHeaderError::UnknownHeaderLength(header_size))?,
        };

        let header = FileHeader {
            header_size,
            protocol_version,
            profile_version: profile_version.get(),
            data_size: data_size.get(),
        };

        Ok((header, successor))
    }
}

/// State token to decode additional bytes of an extended document header.
#[derive(Debug)]
pub struct ExtendedDocumentHeader {
    calculated: u16,
}

/// The check value stored in an extended document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCheck {
    pub found: u16,
    pub calculated: u16,
}

impl HeaderCheck {
    /// Whether the check passed. A zero check value is not checked.
    pub fn is_valid(&self) -> bool {
        self.found == 0 || self.found == self.calculated
    }
}

impl ExtendedDocumentHeader {
    /// Transition to another state by decoding the additional bytes of an
    /// extended document header.
    ///
    /// Returns the header's check value, and the successor state token.
    pub fn advance(self, r: [u8; 2]) -> (HeaderCheck, RecordHeader) {
        let check = HeaderCheck {
            found: u16::from_le_bytes(r),
            calculated: self.calculated,
        };

        (check, RecordHeader(()))
    }
}

bitfield! {
    struct Shape(u8) {
        [7] is_compressed,
    }
}

bitfield! {
    struct NormalHeader(u8) {
        [0..4] local_message: u8,
        [5] is_developer,
        [6] is_definition,
    }
}

bitfield! {
    struct CompressedHeader(u8) {
        [0..5] time_offset: u8,
        [5..7] local_message: u8,
        [7] is_compressed,
    }
}

/// State token to decode a record header.
#[derive(Debug)]
pub struct RecordHeader(pub(super) ());

impl RecordHeader {
    /// Transition to another state by decoding a record header.
    ///
    /// Returns the local message number, and a successor state token.
    pub fn advance(self, r: [u8; 1]) -> (u8, Either<Definition, Data>) {
        let r = r[0];

        if Shape(r).is_compressed() {
            let header = CompressedHeader(r);
            let successor = Right(Data::new(Some(header.time_offset())));

            (header.local_message(), successor)
        } else {
            let header = NormalHeader(r);

            let successor = if header.is_definition() {
                Left(Definition::new(header.is_developer()))
            } else {
                Right(Data::new(None))
            };

            (header.local_message(), successor)
        }
    }
}

/// The shape of a record, for encoding its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A definition record, with or without developer field definitions.
    Definition { developer: bool },
    /// A data record with a normal header.
    Data,
    /// A data record carrying the low five bits of its timestamp.
    CompressedTimestamp { offset: u8 },
}

impl RecordKind {
    /// Encode a record header for a local message number.
    ///
    /// Compressed timestamp headers only address local message numbers 0 to 3.
    pub fn encode(self, local: u8) -> u8 {
        match self {
            Self::Definition { developer } => {
                let mut header = NormalHeader(0);
                header.set_local_message(local);
                header.set_is_developer(developer);
                header.set_is_definition(true);
                header.0
            }
            Self::Data => {
                let mut header = NormalHeader(0);
                header.set_local_message(local);
                header.0
            }
            Self::CompressedTimestamp { offset } => {
                debug_assert!(local < 4);
                let mut header = CompressedHeader(0);
                header.set_time_offset(offset);
                header.set_local_message(local);
                header.set_is_compressed(true);
                header.0
            }
        }
    }
}
