//! Reader-based decoder implementation.
//!
//! _Requires Cargo feature `std`._

use std::{
    io::{ErrorKind, Read},
    vec::Vec,
};

use super::{DecodeOptions, Error, FromRecords, Messages, Source, Warning};

/// A document read incrementally.
///
/// One byte may be read ahead to detect the end of a chain of documents.
#[derive(Debug)]
pub struct ReaderSource<R> {
    r: R,
    /// Counter of bytes read, used to report truncation.
    i: usize,
    peeked: Option<u8>,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            i: 0,
            peeked: None,
        }
    }

    /// Recover the reader. A byte peeked to detect a chained document is lost.
    pub fn into_inner(self) -> R {
        self.r
    }
}

impl<R: Read> Source for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }

        let buf = match self.peeked.take() {
            Some(b) => {
                buf[0] = b;
                self.i += 1;
                &mut buf[1..]
            }
            None => buf,
        };

        match self.r.read_exact(buf) {
            Ok(()) => {
                self.i += buf.len();
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(Error::Truncated { offset: self.i })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_empty(&mut self) -> Result<bool, Error> {
        if self.peeked.is_some() {
            return Ok(false);
        }

        let mut buf = [0];
        loop {
            match self.r.read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.peeked = Some(buf[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Decode messages lazily from a reader of a document.
///
/// _Requires Cargo feature `std`._
pub fn messages<R: Read>(r: R, options: DecodeOptions) -> Messages<ReaderSource<R>> {
    Messages::new(ReaderSource::new(r), options)
}

/// Decode records from a reader of a document, publishing to a receiver.
///
/// This method is also re-exported as `cassette::avec::decode_reader`.
///
/// _Requires Cargo feature `std`._
pub fn decode(r: &mut impl Read, o: &mut impl FromRecords) -> Result<Vec<Warning>, Error> {
    decode_with(r, o, DecodeOptions::default())
}

/// Decode records from a reader of a document with options, publishing to a
/// receiver.
///
/// _Requires Cargo feature `std`._
pub fn decode_with(
    r: &mut impl Read,
    o: &mut impl FromRecords,
    options: DecodeOptions,
) -> Result<Vec<Warning>, Error> {
    super::decode(messages(r, options), o)
}
