#![no_std]

//! A codec for Garmin's Flexible and Interoperable Data Transfer protocol.
//!
//! Cassette decodes FIT documents into a lazy sequence of messages and encodes
//! messages back into minimal, valid documents. The record protocol engine is
//! exposed as a sans-IO finite-state machine for applications needing finer
//! control over internals.
//!
//! Most users should begin with the functions and derive macros in the [`avec`]
//! module. The engine is agnostic to what any field means: semantic
//! interpretation is looked up through a [`catalog::Catalog`], supplied by the
//! application. If the convenience interfaces prove insufficient, consider
//! implementing a decoder as described in the [`sans`] module.
//!
//! ## Cargo Features
//!
//! The following crate feature flags are available:
//!
//! - `derive`: enable derive macros (default).
//! - `std`: enable reader-based decoding and writer-based encoding (default).

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod avec;
pub mod catalog;
pub mod sans;
