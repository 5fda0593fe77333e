use crate::prelude::*;

/// A periodic sample of the traced process's resident memory.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryRecord {
    /// Sample time, milliseconds since the epoch.
    pub ms_since_epoch: i64,
    /// Resident set size in bytes.
    pub rss: usize,
}

impl Parse for MemoryRecord {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            ms_since_epoch: p.parse()?,
            rss: p.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    #[test]
    fn parse_memory_record() {
        let mut data = Vec::new();
        data.extend_from_slice(&1_700_000_000_000_i64.to_le_bytes());
        data.extend_from_slice(&(64usize << 20).to_le_bytes());

        let mut source = SliceSource::new(&data);
        let record: MemoryRecord = Parser::new(&mut source).parse().unwrap();

        assert_eq!(record.ms_since_epoch, 1_700_000_000_000);
        assert_eq!(record.rss, 64usize << 20);
    }
}
