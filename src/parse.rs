//! Parsing primitives for decoding record payloads from a [`Source`].
//!
//! All parsing in this crate goes through [`Parser`], a thin cursor over a
//! byte source that knows the wire conventions: little-endian fixed-width
//! integers, host-word-width `usize` fields, unsigned LEB128 varints, and
//! NUL-terminated strings. Record types implement [`Parse`] to describe
//! their own layout field by field.
//!
//! The wire format is produced and consumed on the same machine, so numeric
//! fields are always little-endian and `usize`-shaped fields take the host
//! word size; cross-architecture captures are out of scope.

use crate::error::{ErrorKind, ReadError, Result};
use crate::source::Source;

/// A type that can be parsed from the record stream.
pub(crate) trait Parse: Sized {
    /// Parse `Self` using the provided [`Parser`] instance.
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self>;
}

/// A decoding cursor over a [`Source`].
///
/// Short reads surface as [`ErrorKind::TruncatedBody`]; callers decoding
/// the stream header remap that to [`ErrorKind::TruncatedHeader`].
pub(crate) struct Parser<'s, S> {
    source: &'s mut S,
}

impl<'s, S: Source> Parser<'s, S> {
    pub(crate) fn new(source: &'s mut S) -> Self {
        Self { source }
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.source.read_exact(buf) {
            Ok(())
        } else {
            Err(ReadError::truncated())
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        self.read_exact(&mut array)?;
        Ok(array)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.read_array()?;
        Ok(byte)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a host-word-width unsigned integer (`uintptr`/`usize` fields).
    pub(crate) fn read_usize(&mut self) -> Result<usize> {
        let mut array = [0u8; std::mem::size_of::<usize>()];
        self.read_exact(&mut array)?;
        Ok(usize::from_le_bytes(array))
    }

    /// Decode an unsigned LEB128 varint.
    ///
    /// Each byte contributes seven payload bits, high bit set while more
    /// follow. A varint whose shift reaches 64 bits without terminating is
    /// malformed, not truncated.
    pub(crate) fn read_varint(&mut self) -> Result<usize> {
        let mut value = 0u64;
        let mut shift = 0u32;

        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value as usize);
            }

            shift += 7;
            if shift >= 64 {
                return Err(ReadError::custom(
                    ErrorKind::InvalidFormat,
                    "varint continues past 64 bits",
                ));
            }
        }
    }

    /// Read a NUL-terminated string, excluding the terminator.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the producer records
    /// raw process strings (command lines, paths) with no encoding
    /// guarantee.
    pub(crate) fn read_cstring(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        if self.source.read_until(0, &mut buf) {
            Ok(String::from_utf8_lossy(&buf).into_owned())
        } else {
            Err(ReadError::truncated())
        }
    }

    /// Parse a type.
    pub(crate) fn parse<P: Parse>(&mut self) -> Result<P> {
        P::parse(self)
    }
}

impl Parse for u8 {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        p.read_u8()
    }
}

impl Parse for u32 {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        p.read_u32()
    }
}

impl Parse for u64 {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        p.read_u64()
    }
}

impl Parse for i32 {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        p.read_i32()
    }
}

impl Parse for i64 {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        p.read_i64()
    }
}

impl Parse for usize {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        p.read_usize()
    }
}
