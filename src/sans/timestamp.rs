//! Expansion of compressed timestamp headers.
//!
//! A compressed timestamp header stores only the low five bits of its record's
//! timestamp. The full value is recovered against the most recent absolute
//! timestamp in the document, as the smallest value not before it with the
//! same low bits.

use thiserror::Error;

/// Field number reserved for timestamps in every message.
pub const TIMESTAMP_FIELD: u8 = 253;

const OFFSET_MASK: u32 = 0x1F;

/// A compressed timestamp header found before any absolute timestamp.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Found a compressed timestamp before any reference timestamp.")]
pub struct MissingReference;

/// The most recent absolute timestamp in a document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollingTimestamp {
    reference: Option<u32>,
}

impl RollingTimestamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last absolute timestamp observed or expanded.
    pub fn reference(&self) -> Option<u32> {
        self.reference
    }

    /// Record an absolute timestamp.
    pub fn observe(&mut self, timestamp: u32) {
        self.reference = Some(timestamp);
    }

    /// Reconstruct the timestamp of a compressed timestamp header, and adopt
    /// it as the new reference.
    pub fn expand(&mut self, offset: u8) -> Result<u32, MissingReference> {
        let reference = self.reference.ok_or(MissingReference)?;

        let delta = (offset as u32).wrapping_sub(reference) & OFFSET_MASK;
        let timestamp = reference.wrapping_add(delta);

        self.reference = Some(timestamp);
        Ok(timestamp)
    }

    /// The offset to store in a compressed timestamp header, if the timestamp
    /// can be reconstructed from the current reference.
    pub fn compress(&self, timestamp: u32) -> Option<u8> {
        let reference = self.reference?;
        let delta = timestamp.checked_sub(reference)?;

        (delta <= OFFSET_MASK).then_some((timestamp & OFFSET_MASK) as u8)
    }
}
