//! The record types carried by the capture stream.
//!
//! This is mostly to separate them from the support code of this crate.
//! Every record starts with a single [`RecordTypeAndFlags`] byte; the
//! payload layout for each type lives with its struct.

mod allocation;
mod frame;
mod header;
mod memory;
mod native_frame;
mod segment;
mod thread;

pub use self::allocation::*;
pub use self::frame::*;
pub use self::header::*;
pub use self::memory::*;
pub use self::native_frame::*;
pub use self::segment::*;
pub use self::thread::*;

/// Tag identifying each record kind, carried in the low four bits of the
/// record header byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// Trailing padding; consumed and ignored.
    Uninitialized = 0,
    /// An allocation or deallocation with a managed stack only.
    Allocation = 1,
    /// An allocation or deallocation that also carries a native frame chain.
    AllocationWithNative = 2,
    /// A managed frame entered on the current thread.
    FramePush = 3,
    /// One or more managed frames left on the current thread.
    FramePop = 4,
    /// A frame dictionary entry.
    FrameIndex = 5,
    /// A native frame appended to the native-frame list.
    NativeTraceIndex = 6,
    /// The process memory map was reset; segment groups follow.
    MemoryMapStart = 7,
    /// Introduces a group of segments loaded from one file.
    SegmentHeader = 8,
    /// One segment; only valid inside a [`SegmentHeader`] group.
    Segment = 9,
    /// A human-readable name for the current thread.
    ThreadRecord = 10,
    /// A periodic resident-memory sample.
    MemoryRecord = 11,
    /// The stream switches to describing another thread.
    ContextSwitch = 12,
}

impl RecordType {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => RecordType::Uninitialized,
            1 => RecordType::Allocation,
            2 => RecordType::AllocationWithNative,
            3 => RecordType::FramePush,
            4 => RecordType::FramePop,
            5 => RecordType::FrameIndex,
            6 => RecordType::NativeTraceIndex,
            7 => RecordType::MemoryMapStart,
            8 => RecordType::SegmentHeader,
            9 => RecordType::Segment,
            10 => RecordType::ThreadRecord,
            11 => RecordType::MemoryRecord,
            12 => RecordType::ContextSwitch,
            _ => return None,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            RecordType::Uninitialized => "padding",
            RecordType::Allocation => "allocation",
            RecordType::AllocationWithNative => "allocation with native info",
            RecordType::FramePush => "frame push",
            RecordType::FramePop => "frame pop",
            RecordType::FrameIndex => "frame index",
            RecordType::NativeTraceIndex => "native frame index",
            RecordType::MemoryMapStart => "memory map start",
            RecordType::SegmentHeader => "segment header",
            RecordType::Segment => "segment",
            RecordType::ThreadRecord => "thread record",
            RecordType::MemoryRecord => "memory record",
            RecordType::ContextSwitch => "context switch",
        }
    }
}

/// The typed record header: one byte, low four bits the [`RecordType`] tag,
/// high four bits a per-type flag field.
///
/// For allocation records the flag field carries the [`Allocator`] that
/// performed the operation; every other type leaves it zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecordTypeAndFlags {
    raw: u8,
}

impl RecordTypeAndFlags {
    pub(crate) fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    /// The record type, or `None` for a tag this crate does not know.
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_tag(self.raw & 0x0f)
    }

    /// The raw four-bit type tag, known or not.
    pub fn raw_type(&self) -> u8 {
        self.raw & 0x0f
    }

    /// The four-bit flag field.
    pub fn flags(&self) -> u8 {
        self.raw >> 4
    }
}

/// The host allocator routine an allocation record describes, carried in
/// the record header's flag field.
///
/// Decoding is lenient: a value outside the known set is preserved as-is
/// and only surfaces as an explicit "unknown" label when printed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Allocator(u8);

#[allow(missing_docs)]
impl Allocator {
    pub const MALLOC: Self = Self(1);
    pub const FREE: Self = Self(2);
    pub const CALLOC: Self = Self(3);
    pub const REALLOC: Self = Self(4);
    pub const POSIX_MEMALIGN: Self = Self(5);
    pub const MEMALIGN: Self = Self(6);
    pub const VALLOC: Self = Self(7);
    pub const PVALLOC: Self = Self(8);
    pub const MMAP: Self = Self(9);
    pub const MUNMAP: Self = Self(10);
}

impl Allocator {
    pub(crate) fn from_flags(flags: u8) -> Self {
        Self(flags)
    }

    /// The raw wire value.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// The routine's name as it appears in diagnostic output, or `None`
    /// for a value this crate does not know.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::MALLOC => "malloc",
            Self::FREE => "free",
            Self::CALLOC => "calloc",
            Self::REALLOC => "realloc",
            Self::POSIX_MEMALIGN => "posix_memalign",
            Self::MEMALIGN => "memalign",
            Self::VALLOC => "valloc",
            Self::PVALLOC => "pvalloc",
            Self::MMAP => "mmap",
            Self::MUNMAP => "munmap",
            _ => return None,
        })
    }
}
