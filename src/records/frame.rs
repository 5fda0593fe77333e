use crate::prelude::*;

/// A managed call-site descriptor, keyed by its producer-assigned frame id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Name of the function the frame executes.
    pub function_name: String,
    /// Source file the function lives in.
    pub filename: String,
    /// Line number of the call site.
    pub lineno: i32,
}

/// A managed frame entered on the current thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FramePush {
    pub frame_id: u64,
}

impl Parse for FramePush {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            frame_id: p.parse()?,
        })
    }
}

/// One or more managed frames left on the current thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FramePop {
    pub count: u8,
}

impl Parse for FramePop {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            count: p.parse()?,
        })
    }
}

/// A frame dictionary entry binding a frame id to its descriptor.
///
/// Frame ids are unique for the lifetime of the stream; a second entry with
/// an already-registered id is a format error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameIndex {
    pub frame_id: u64,
    pub frame: Frame,
}

impl Parse for FrameIndex {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            frame_id: p.parse()?,
            frame: Frame {
                function_name: p.read_cstring()?,
                filename: p.read_cstring()?,
                lineno: p.parse()?,
            },
        })
    }
}
