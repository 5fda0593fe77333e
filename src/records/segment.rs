use crate::prelude::*;

/// One mapped region of a loaded file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Virtual address of the region, relative to the group's base.
    pub vaddr: usize,
    /// Size of the region in bytes.
    pub memsz: usize,
}

impl Parse for Segment {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            vaddr: p.parse()?,
            memsz: p.parse()?,
        })
    }
}

/// Introduces a group of segments loaded from one file.
///
/// Exactly `num_segments` records tagged [`Segment`] must follow; any other
/// tag in that window is a format error.
///
/// [`Segment`]: crate::records::RecordType::Segment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Path of the mapped file.
    pub filename: String,
    /// Number of segment records that follow.
    pub num_segments: usize,
    /// Base address the file was loaded at.
    pub addr: usize,
}

impl Parse for SegmentHeader {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            filename: p.read_cstring()?,
            num_segments: p.parse()?,
            addr: p.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    #[test]
    fn parse_segment_header() {
        let mut data = Vec::new();
        data.extend_from_slice(b"/usr/lib/libc.so\0");
        data.extend_from_slice(&2usize.to_le_bytes());
        data.extend_from_slice(&0x1000_usize.to_le_bytes());

        let mut source = SliceSource::new(&data);
        let header: SegmentHeader = Parser::new(&mut source).parse().unwrap();

        assert_eq!(header.filename, "/usr/lib/libc.so");
        assert_eq!(header.num_segments, 2);
        assert_eq!(header.addr, 0x1000);
    }

    #[test]
    fn parse_segment() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x800_usize.to_le_bytes());
        data.extend_from_slice(&0x400_usize.to_le_bytes());

        let mut source = SliceSource::new(&data);
        let segment: Segment = Parser::new(&mut source).parse().unwrap();

        assert_eq!(segment.vaddr, 0x800);
        assert_eq!(segment.memsz, 0x400);
    }
}
