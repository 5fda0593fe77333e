use crate::prelude::*;
use crate::records::Allocator;

/// An allocation or deallocation carrying only a managed stack.
///
/// The allocator comes from the record header's flag field; the body is the
/// address followed by the size as a varint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub address: usize,
    pub size: usize,
    pub allocator: Allocator,
}

impl AllocationRecord {
    pub(crate) fn parse<S: Source>(p: &mut Parser<'_, S>, flags: u8) -> Result<Self> {
        Ok(Self {
            address: p.parse()?,
            size: p.read_varint()?,
            allocator: Allocator::from_flags(flags),
        })
    }
}

/// An allocation or deallocation that also references the head of a native
/// frame chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NativeAllocationRecord {
    pub address: usize,
    pub size: usize,
    pub allocator: Allocator,
    /// Head of the native frame chain, an index into the native-frame list.
    pub native_frame_id: usize,
}

impl NativeAllocationRecord {
    pub(crate) fn parse<S: Source>(p: &mut Parser<'_, S>, flags: u8) -> Result<Self> {
        Ok(Self {
            address: p.parse()?,
            size: p.read_varint()?,
            native_frame_id: p.read_varint()?,
            allocator: Allocator::from_flags(flags),
        })
    }
}

/// The reader's snapshot of the most recently decoded allocation.
///
/// `frame_index` is the top of the owning thread's stack at the moment the
/// record was decoded, and `native_segment_generation` is the resolver
/// generation in force at that moment. Pass the same generation back when
/// resolving the native chain, so an allocation captured before a map reset
/// is not symbolized against a later map.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Thread the allocation happened on.
    pub tid: u64,
    /// Address returned (or freed) by the allocator routine.
    pub address: usize,
    /// Requested size in bytes; zero for deallocations.
    pub size: usize,
    /// The allocator routine involved.
    pub allocator: Allocator,
    /// Frame-tree index of the managed stack top, 0 for an empty stack.
    pub frame_index: u32,
    /// Head of the native frame chain, 0 when absent.
    pub native_frame_id: usize,
    /// Resolver generation the native chain must be resolved against.
    pub native_segment_generation: usize,
    /// Always 1 at the reader; coalescing is a consumer concern.
    pub n_allocations: usize,
}
