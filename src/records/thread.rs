use crate::prelude::*;

/// A human-readable name for the current thread. Last write wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadRecord {
    pub name: String,
}

impl Parse for ThreadRecord {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            name: p.read_cstring()?,
        })
    }
}

/// Switches the stream to describing another thread.
///
/// Every stack motion, thread record and allocation that follows applies to
/// this thread until the next switch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContextSwitch {
    pub tid: u64,
}

impl Parse for ContextSwitch {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            tid: p.parse()?,
        })
    }
}
