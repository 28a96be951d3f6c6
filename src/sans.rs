//! Internal finite-state machine and protocol state for implementing codecs.
//!
//! This module is intended for advanced applications that need fine control
//! over codec internals. See [`crate::avec`] for implementations covering
//! common decoding and encoding patterns.
//!
//! **Implementing a custom decoder requires a basic understanding of the
//! structure of FIT protocol data.**
//!
//! # Architecture
//!
//! Every state of the record stream is represented by a non-copy token. Once
//! enough bytes are ready, transition to another state by calling the token's
//! `advance` method. This will return a successor state token, along with any
//! extracted data. Tokens for definition records carry the definition built so
//! far; all other tokens are small and cheap to move.
//!
//! Only the initial state, re-exported for convenience as [`Decoder`], can be
//! constructed.
//!
//! State that outlives a single record is kept in plain values owned by the
//! caller:
//!
//! - [`table::LocalMessageTable`] binds local message types to definitions
//! while decoding, and [`table::SlotAllocator`] chooses local message types
//! while encoding.
//!
//! - [`timestamp::RollingTimestamp`] expands the offsets carried by compressed
//! timestamp headers.
//!
//! - [`developer::DeveloperRegistry`] resolves developer fields through the
//! field descriptions seen earlier in the document.
//!
//! Some areas of the decoding process are not represented in the finite-state
//! machine and must be carefully written:
//!
//! - Reading bytes from the correct place in the document, including buffering
//! or seeking as necessary.
//!
//! - Ending decoding once the specified number of document bytes have been
//! read.
//!
//! - Applying cyclic redundancy checks. A helper is provided in the [`check`]
//! module.
//!
//! Implementers are recommended to begin by studying and modifying a decoder
//! from the [`crate::avec`] module.

pub mod base;
pub mod check;
pub mod data;
pub mod definition;
pub mod developer;
pub mod header;
pub mod table;
pub mod timestamp;
pub mod value;

/// Entrypoint to the finite-state machine.
pub type Decoder = header::DocumentHeader;
