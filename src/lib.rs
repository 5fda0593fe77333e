//! Read the binary record stream emitted by a process-memory-profiling
//! tracer and reconstruct the state it describes.
//!
//! This crate is organized like this:
//! - The root re-exports the record types a capture stream can carry along
//!   with the [`RecordReader`] that decodes them. Records are a compact
//!   custom format: a fixed header followed by typed, variable-length
//!   records describing allocations, call-stack motions, thread context
//!   switches, loaded segments and periodic memory samples.
//! - The [`Source`] trait is the transport seam; anything that can hand
//!   out bytes in order (a file, a pipe, a socket) can feed a reader.
//! - The [`SymbolResolver`] trait is the symbolization seam; the reader
//!   forwards segment-map updates to it and consults it when a native
//!   stack is walked.
//!
//! The reader is pull-driven: call [`RecordReader::next_record`] until it
//! reports an allocation, a memory sample, or the end of the stream, then
//! copy out the matching snapshot. Stack motions, dictionary entries and
//! the rest are folded into internal state along the way.
//!
//! # Example
//! Reading a single allocation out of an in-memory capture.
//! ```
//! # fn main() -> memtrace_reader::Result<()> {
//! use memtrace_reader::{NullResolver, RecordReader, RecordResult, SliceSource};
//!
//! let data: &[u8] = // ...
//! #    memtrace_reader::doctest::SINGLE_ALLOCATION;
//! let source = SliceSource::new(data);
//! let mut reader = RecordReader::new(source, true, NullResolver::default())?;
//!
//! assert_eq!(reader.next_record()?, RecordResult::Allocation);
//! let allocation = reader.latest_allocation().unwrap();
//! assert_eq!(allocation.tid, 7);
//! assert_eq!(allocation.size, 128);
//!
//! assert_eq!(reader.next_record()?, RecordResult::EndOfFile);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;
mod frame_tree;
mod parse;
mod reader;
mod records;
mod resolver;
mod source;

mod prelude {
    pub(crate) use crate::error::{ErrorKind, ReadError, Result};
    pub(crate) use crate::parse::{Parse, Parser};
    pub(crate) use crate::source::Source;
}

pub use crate::error::{ErrorKind, ReadError, Result};
pub use crate::frame_tree::FrameTreeIndex;
pub use crate::reader::{RecordReader, RecordResult};
pub use crate::records::*;
pub use crate::resolver::{NullResolver, ResolvedFrame, SymbolResolver};
pub use crate::source::{ReaderSource, SliceSource, Source};

/// Common data used in doctests.
///
/// This way it doesn't need to be repeated multiple times unless we want to
/// show it as part of the doc test.
#[doc(hidden)]
pub mod doctest {
    /// A 64-bit-host capture: header, `CONTEXT_SWITCH tid=7`, then
    /// `ALLOCATION allocator=malloc address=0xdead size=128`.
    pub const SINGLE_ALLOCATION: &[u8] = &[
        b'm', b'e', b'm', b't', b'r', b'a', b'c', b'e', // magic
        1, 0, 0, 0, // version
        0, // native_traces
        1, 0, 0, 0, 0, 0, 0, 0, // n_allocations
        0, 0, 0, 0, 0, 0, 0, 0, // n_frames
        0, 0, 0, 0, 0, 0, 0, 0, // start_time
        0, 0, 0, 0, 0, 0, 0, 0, // end_time
        b'd', b'e', b'm', b'o', 0, // command_line
        42, 0, 0, 0, // pid
        1, // python_allocator
        0x0c, 7, 0, 0, 0, 0, 0, 0, 0, // CONTEXT_SWITCH tid=7
        0x11, 0xad, 0xde, 0, 0, 0, 0, 0, 0, 0x80, 0x01, // ALLOCATION
    ];
}
