use crate::error::{ErrorKind, ReadError, Result};
use crate::parse::Parser;
use crate::source::Source;

/// The magic bytes every capture stream starts with.
pub const MAGIC: [u8; 8] = *b"memtrace";

/// The stream format version this crate reads and nothing else.
pub const FORMAT_VERSION: u32 = 1;

/// Aggregate statistics the producer wrote when the capture finished.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Total number of allocation records in the stream.
    pub n_allocations: u64,
    /// Total number of frame dictionary entries in the stream.
    pub n_frames: u64,
    /// Capture start, milliseconds since the epoch.
    pub start_time: i64,
    /// Capture end, milliseconds since the epoch.
    pub end_time: i64,
}

/// The memory allocator the traced interpreter was configured with.
///
/// Decoding is lenient: a kind byte outside the known set is preserved
/// as-is and prints with an empty label.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PythonAllocator(u8);

#[allow(missing_docs)]
impl PythonAllocator {
    pub const PYMALLOC: Self = Self(1);
    pub const PYMALLOC_DEBUG: Self = Self(2);
    pub const MALLOC: Self = Self(3);
    pub const OTHER: Self = Self(4);
}

impl PythonAllocator {
    fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    pub fn raw(&self) -> u8 {
        self.0
    }

    // The MALLOC kind has always printed as "pymalloc" in record dumps;
    // that spelling is part of the observable output.
    pub(crate) fn label(&self) -> &'static str {
        match *self {
            Self::PYMALLOC => "pymalloc",
            Self::PYMALLOC_DEBUG => "pymalloc debug",
            Self::MALLOC => "pymalloc",
            Self::OTHER => "other",
            _ => "",
        }
    }
}

/// The stream header, decoded once when the reader is constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderRecord {
    /// The magic bytes, always [`MAGIC`] once decoding succeeded.
    pub magic: [u8; 8],
    /// Format version, always [`FORMAT_VERSION`] once decoding succeeded.
    pub version: u32,
    /// Whether the producer captured native frame chains.
    pub native_traces: bool,
    /// End-of-capture statistics.
    pub stats: TrackerStats,
    /// Command line of the traced process.
    pub command_line: String,
    /// Process id of the traced process.
    pub pid: i32,
    /// Allocator the traced interpreter ran with.
    pub python_allocator: PythonAllocator,
}

impl HeaderRecord {
    /// Decode the header from the start of `source`.
    ///
    /// Errors are eager and fatal: a reader whose header did not decode is
    /// unusable.
    pub(crate) fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        let header = |e: ReadError| e.with_kind(ErrorKind::TruncatedHeader);

        let mut magic = [0u8; 8];
        p.read_exact(&mut magic).map_err(header)?;
        if magic != MAGIC {
            return Err(ReadError::custom(
                ErrorKind::InvalidFormat,
                "input does not look like a capture produced by this tracer",
            ));
        }

        let version = p.read_u32().map_err(header)?;
        if version != FORMAT_VERSION {
            return Err(ReadError::custom(
                ErrorKind::VersionMismatch,
                "input was produced by an incompatible tracer version",
            ));
        }

        let native_traces = p.read_u8().map_err(header)? != 0;
        let stats = TrackerStats {
            n_allocations: p.read_u64().map_err(header)?,
            n_frames: p.read_u64().map_err(header)?,
            start_time: p.read_i64().map_err(header)?,
            end_time: p.read_i64().map_err(header)?,
        };
        let command_line = p.read_cstring().map_err(header)?;
        let pid = p.read_i32().map_err(header)?;
        let python_allocator = PythonAllocator::from_raw(p.read_u8().map_err(header)?);

        Ok(Self {
            magic,
            version,
            native_traces,
            stats,
            command_line,
            pid,
            python_allocator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    fn sample_header() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.push(1); // native_traces
        data.extend_from_slice(&3u64.to_le_bytes());
        data.extend_from_slice(&2u64.to_le_bytes());
        data.extend_from_slice(&100i64.to_le_bytes());
        data.extend_from_slice(&200i64.to_le_bytes());
        data.extend_from_slice(b"python demo.py\0");
        data.extend_from_slice(&4321i32.to_le_bytes());
        data.push(PythonAllocator::PYMALLOC.raw());
        data
    }

    #[test]
    fn parses_well_formed_header() {
        let data = sample_header();
        let mut source = SliceSource::new(&data);
        let header = HeaderRecord::parse(&mut Parser::new(&mut source)).unwrap();

        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version, FORMAT_VERSION);
        assert!(header.native_traces);
        assert_eq!(header.stats.n_allocations, 3);
        assert_eq!(header.stats.n_frames, 2);
        assert_eq!(header.stats.start_time, 100);
        assert_eq!(header.stats.end_time, 200);
        assert_eq!(header.command_line, "python demo.py");
        assert_eq!(header.pid, 4321);
        assert_eq!(header.python_allocator, PythonAllocator::PYMALLOC);
    }

    #[test]
    fn unknown_allocator_kind_is_preserved() {
        let mut data = sample_header();
        *data.last_mut().unwrap() = 9;

        let mut source = SliceSource::new(&data);
        let header = HeaderRecord::parse(&mut Parser::new(&mut source)).unwrap();
        assert_eq!(header.python_allocator.raw(), 9);
        assert_eq!(header.python_allocator.label(), "");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = sample_header();
        data[0] = b'X';

        let mut source = SliceSource::new(&data);
        let err = HeaderRecord::parse(&mut Parser::new(&mut source)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut data = sample_header();
        data[8..12].copy_from_slice(&99u32.to_le_bytes());

        let mut source = SliceSource::new(&data);
        let err = HeaderRecord::parse(&mut Parser::new(&mut source)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    }

    #[test]
    fn short_header_is_truncated() {
        let data = sample_header();
        let mut source = SliceSource::new(&data[..20]);
        let err = HeaderRecord::parse(&mut Parser::new(&mut source)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedHeader);
    }
}
