//! Slice-based decoder implementation.

use alloc::vec::Vec;

use super::{DecodeOptions, Error, FromRecords, Messages, Source, Warning};

/// A document held in memory.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    r: &'a [u8],
    /// Counter of bytes read, used to read bytes from the tip.
    i: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(r: &'a [u8]) -> Self {
        Self { r, i: 0 }
    }
}

impl Source for SliceSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let s = self.i;
        let e = s + buf.len();

        let bytes = self.r.get(s..e).ok_or(Error::Truncated {
            offset: self.r.len(),
        })?;
        buf.copy_from_slice(bytes);

        self.i = e;
        Ok(())
    }

    fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.i >= self.r.len())
    }

    fn require(&self, n: usize) -> Result<(), Error> {
        if self.r.len().saturating_sub(self.i) < n {
            Err(Error::Truncated {
                offset: self.r.len(),
            })?;
        }
        Ok(())
    }
}

/// Decode messages lazily from a slice of a document.
pub fn messages(r: &[u8], options: DecodeOptions) -> Messages<SliceSource<'_>> {
    Messages::new(SliceSource::new(r), options)
}

/// Decode records from a slice of a document, publishing to a receiver.
///
/// This method is also re-exported as `cassette::avec::decode_slice`.
pub fn decode(r: &[u8], o: &mut impl FromRecords) -> Result<Vec<Warning>, Error> {
    decode_with(r, o, DecodeOptions::default())
}

/// Decode records from a slice of a document with options, publishing to a
/// receiver.
pub fn decode_with(
    r: &[u8],
    o: &mut impl FromRecords,
    options: DecodeOptions,
) -> Result<Vec<Warning>, Error> {
    super::decode(messages(r, options), o)
}
