//! The byte transport seam between the reader and wherever the capture
//! lives.
//!
//! A capture may come from a file on disk, a pipe from a still-running
//! process, or a socket. The reader only ever pulls bytes forward, so the
//! whole surface is [`read_exact`], [`read_until`], and open/close state.
//!
//! [`read_exact`]: Source::read_exact
//! [`read_until`]: Source::read_until

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// A transport from which the reader pulls the capture stream.
///
/// Implementations signal a short read by returning `false`; the reader
/// decides whether that is a clean end of stream or a truncation based on
/// where in the stream it happened. There is no seeking and no peeking.
pub trait Source {
    /// Fill `buf` completely from the stream.
    ///
    /// Returns `false` if the source is closed or ends before `buf` is
    /// full. The stream position after a short read is unspecified; the
    /// reader treats the source as unusable from then on.
    fn read_exact(&mut self, buf: &mut [u8]) -> bool;

    /// Read bytes into `out` up to and including `delim`.
    ///
    /// The delimiter is consumed from the stream but excluded from `out`.
    /// Returns `false` if the source is closed or ends before the delimiter
    /// is found. `out` is cleared first.
    fn read_until(&mut self, delim: u8, out: &mut Vec<u8>) -> bool;

    /// Whether the source can still be read from.
    fn is_open(&self) -> bool;

    /// Close the source. Idempotent.
    ///
    /// This does not unblock a read already in progress on another thread;
    /// tearing down the transport underneath is the caller's job.
    fn close(&mut self);
}

/// A blocking [`Source`] over any [`Read`] transport.
pub struct ReaderSource<R> {
    inner: Option<BufReader<R>>,
}

impl<R: Read> ReaderSource<R> {
    /// Create a source over `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(BufReader::new(inner)),
        }
    }
}

impl ReaderSource<File> {
    /// Open a capture file at `path`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> Source for ReaderSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> bool {
        match &mut self.inner {
            Some(reader) => reader.read_exact(buf).is_ok(),
            None => false,
        }
    }

    fn read_until(&mut self, delim: u8, out: &mut Vec<u8>) -> bool {
        let Some(reader) = self.inner.as_mut() else {
            return false;
        };

        out.clear();
        match reader.read_until(delim, out) {
            // read_until also returns Ok on EOF; only a buffer that actually
            // ends with the delimiter is a complete field.
            Ok(_) if out.last() == Some(&delim) => {
                out.pop();
                true
            }
            _ => false,
        }
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

/// An in-memory [`Source`] over a byte slice.
///
/// Mainly useful for tests and doc examples, mirroring how captures small
/// enough to sit in memory are fed to the reader.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
    open: bool,
}

impl<'a> SliceSource<'a> {
    /// Create a source over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            open: true,
        }
    }
}

impl Source for SliceSource<'_> {
    fn read_exact(&mut self, buf: &mut [u8]) -> bool {
        if !self.open {
            return false;
        }

        let rest = &self.data[self.pos..];
        if rest.len() < buf.len() {
            return false;
        }

        buf.copy_from_slice(&rest[..buf.len()]);
        self.pos += buf.len();
        true
    }

    fn read_until(&mut self, delim: u8, out: &mut Vec<u8>) -> bool {
        if !self.open {
            return false;
        }

        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == delim) {
            Some(at) => {
                out.clear();
                out.extend_from_slice(&rest[..at]);
                self.pos += at + 1;
                true
            }
            None => false,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_read_until_excludes_delimiter() {
        let mut source = SliceSource::new(b"hello\0rest");
        let mut out = Vec::new();

        assert!(source.read_until(0, &mut out));
        assert_eq!(out, b"hello");

        let mut rest = [0u8; 4];
        assert!(source.read_exact(&mut rest));
        assert_eq!(&rest, b"rest");
    }

    #[test]
    fn slice_read_until_fails_without_delimiter() {
        let mut source = SliceSource::new(b"no terminator");
        let mut out = Vec::new();

        assert!(!source.read_until(0, &mut out));
    }

    #[test]
    fn slice_short_read() {
        let mut source = SliceSource::new(&[1, 2]);
        let mut buf = [0u8; 4];

        assert!(!source.read_exact(&mut buf));
    }

    #[test]
    fn closed_source_reads_nothing() {
        let mut source = SliceSource::new(&[1, 2, 3]);
        source.close();
        source.close();

        let mut buf = [0u8; 1];
        assert!(!source.read_exact(&mut buf));
        assert!(!source.is_open());
    }

    #[test]
    fn reader_source_over_read() {
        let data: &[u8] = b"abc\0\x01\x02";
        let mut source = ReaderSource::new(data);

        let mut out = Vec::new();
        assert!(source.read_until(0, &mut out));
        assert_eq!(out, b"abc");

        let mut buf = [0u8; 2];
        assert!(source.read_exact(&mut buf));
        assert_eq!(buf, [1, 2]);

        assert!(!source.read_exact(&mut buf));
    }
}
