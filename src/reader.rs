//! The stateful record reader.
//!
//! [`RecordReader`] pulls typed records out of a [`Source`] and folds them
//! into the state downstream reporters ask about: one logical call stack
//! per thread, the deduplicated frame dictionary, the native-frame list,
//! the loaded-segment registry (owned by the resolver collaborator), and
//! the most recent allocation and memory sample.
//!
//! Control flow is pull-driven: [`next_record`] consumes records until it
//! hits one the caller cares about (an allocation or a memory sample) and
//! returns its kind; everything else updates internal state silently. A
//! short read at a record boundary is a clean [`RecordResult::EndOfFile`],
//! never an error.
//!
//! [`next_record`]: RecordReader::next_record

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::error;

use crate::error::{ErrorKind, ReadError, Result};
use crate::frame_tree::{FrameTree, FrameTreeIndex};
use crate::parse::Parser;
use crate::records::{
    Allocation, AllocationRecord, Allocator, ContextSwitch, Frame, FrameIndex, FramePop,
    FramePush, HeaderRecord, MemoryRecord, NativeAllocationRecord, RecordType,
    RecordTypeAndFlags, Segment, SegmentHeader, ThreadRecord, UnresolvedNativeFrame,
};
use crate::resolver::{ResolvedFrame, SymbolResolver};
use crate::source::Source;

/// Outcome of a successful [`RecordReader::next_record`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RecordResult {
    /// An allocation record was decoded; read it with
    /// [`RecordReader::latest_allocation`].
    Allocation,
    /// A memory sample was decoded; read it with
    /// [`RecordReader::latest_memory_record`].
    Memory,
    /// The stream ended cleanly at a record boundary.
    EndOfFile,
}

// Tables shared between the parsing loop and the query surface. Everything
// in here is only touched under the reader's coarse mutex so that a stack
// walk sees a coherent view.
struct SharedTables<R> {
    frames: HashMap<u64, Frame>,
    tree: FrameTree,
    native_frames: Vec<UnresolvedNativeFrame>,
    resolver: R,
}

/// Reads a capture stream and reconstructs the state it describes.
///
/// The header is decoded eagerly at construction and is immutable
/// afterwards. Everything else evolves as [`next_record`] walks the body.
///
/// [`next_record`]: RecordReader::next_record
pub struct RecordReader<S, R> {
    source: S,
    track_stacks: bool,
    header: HeaderRecord,
    shared: Mutex<SharedTables<R>>,
    stacks: HashMap<u64, Vec<FrameTreeIndex>>,
    current_thread: u64,
    thread_names: HashMap<u64, String>,
    latest_allocation: Option<Allocation>,
    latest_memory_record: Option<MemoryRecord>,
}

impl<S: Source, R: SymbolResolver> RecordReader<S, R> {
    /// Decode the stream header from `source` and set up a reader.
    ///
    /// With `track_stacks` disabled the stack, frame and segment records
    /// are still parsed (the stream has to advance past them) but their
    /// payloads are discarded, and allocation snapshots carry zeroed stack
    /// fields.
    pub fn new(mut source: S, track_stacks: bool, resolver: R) -> Result<Self> {
        let header = HeaderRecord::parse(&mut Parser::new(&mut source))?;

        let mut frames = HashMap::new();
        let mut native_frames = Vec::new();
        if track_stacks {
            // Pre-size from the header's own claim, capped so a hostile
            // header cannot force an arbitrary allocation.
            frames.reserve(header.stats.n_frames.min(1 << 20) as usize);
            if header.native_traces {
                native_frames.reserve(2048);
            }
        }

        Ok(Self {
            source,
            track_stacks,
            header,
            shared: Mutex::new(SharedTables {
                frames,
                tree: FrameTree::default(),
                native_frames,
                resolver,
            }),
            stacks: HashMap::new(),
            current_thread: 0,
            thread_names: HashMap::with_capacity(16),
            latest_allocation: None,
            latest_memory_record: None,
        })
    }

    fn shared(&self) -> MutexGuard<'_, SharedTables<R>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume records until an allocation or memory sample is decoded.
    ///
    /// Internal records (stack motions, dictionary entries, context
    /// switches, segment groups) are absorbed silently. A short read while
    /// looking for the next record header is a clean
    /// [`RecordResult::EndOfFile`]; a failure anywhere inside a record is
    /// an error, after which the stream must be considered desynchronised.
    pub fn next_record(&mut self) -> Result<RecordResult> {
        loop {
            let mut tag = [0u8; 1];
            if !self.source.read_exact(&mut tag) {
                return Ok(RecordResult::EndOfFile);
            }

            let hdr = RecordTypeAndFlags::from_raw(tag[0]);
            match self.dispatch(hdr) {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => continue,
                Err(err) => {
                    // Stay quiet when another thread already closed the
                    // source; a capture truncated at shutdown is expected.
                    if self.source.is_open() {
                        match hdr.record_type() {
                            Some(ty) => error!("failed to process {} record: {err}", ty.name()),
                            None => error!("invalid record type {}: {err}", hdr.raw_type()),
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    fn dispatch(&mut self, hdr: RecordTypeAndFlags) -> Result<Option<RecordResult>> {
        let Some(record_type) = hdr.record_type() else {
            return Err(ReadError::from_kind(ErrorKind::UnknownRecordType));
        };

        match record_type {
            // Trailing padding; all remaining bytes should be zero.
            RecordType::Uninitialized => Ok(None),
            RecordType::Allocation => {
                let record = AllocationRecord::parse(&mut Parser::new(&mut self.source), hdr.flags())?;
                self.process_allocation(record);
                Ok(Some(RecordResult::Allocation))
            }
            RecordType::AllocationWithNative => {
                let record =
                    NativeAllocationRecord::parse(&mut Parser::new(&mut self.source), hdr.flags())?;
                self.process_native_allocation(record);
                Ok(Some(RecordResult::Allocation))
            }
            RecordType::MemoryRecord => {
                let record: MemoryRecord = Parser::new(&mut self.source).parse()?;
                self.latest_memory_record = Some(record);
                Ok(Some(RecordResult::Memory))
            }
            RecordType::ContextSwitch => {
                let record: ContextSwitch = Parser::new(&mut self.source).parse()?;
                self.current_thread = record.tid;
                Ok(None)
            }
            RecordType::FramePush => {
                let record: FramePush = Parser::new(&mut self.source).parse()?;
                self.process_frame_push(record);
                Ok(None)
            }
            RecordType::FramePop => {
                let record: FramePop = Parser::new(&mut self.source).parse()?;
                self.process_frame_pop(record)?;
                Ok(None)
            }
            RecordType::FrameIndex => {
                let record: FrameIndex = Parser::new(&mut self.source).parse()?;
                self.process_frame_index(record)?;
                Ok(None)
            }
            RecordType::NativeTraceIndex => {
                let record: UnresolvedNativeFrame = Parser::new(&mut self.source).parse()?;
                if self.track_stacks {
                    self.shared().native_frames.push(record);
                }
                Ok(None)
            }
            RecordType::MemoryMapStart => {
                self.shared().resolver.clear_segments();
                Ok(None)
            }
            RecordType::SegmentHeader => {
                let record: SegmentHeader = Parser::new(&mut self.source).parse()?;
                self.process_segment_group(record)?;
                Ok(None)
            }
            RecordType::Segment => Err(ReadError::custom(
                ErrorKind::UnexpectedTag,
                "segment record outside of a segment group",
            )),
            RecordType::ThreadRecord => {
                let record: ThreadRecord = Parser::new(&mut self.source).parse()?;
                self.thread_names.insert(self.current_thread, record.name);
                Ok(None)
            }
        }
    }

    fn process_frame_push(&mut self, record: FramePush) {
        if !self.track_stacks {
            return;
        }

        let tid = self.current_thread;
        let parent = self
            .stacks
            .get(&tid)
            .and_then(|stack| stack.last().copied())
            .unwrap_or(0);
        let index = self.shared().tree.get_trace_index(parent, record.frame_id);

        self.stacks
            .entry(tid)
            .or_insert_with(|| Vec::with_capacity(1024))
            .push(index);
    }

    fn process_frame_pop(&mut self, record: FramePop) -> Result<()> {
        if !self.track_stacks {
            return Ok(());
        }

        let stack = self.stacks.get_mut(&self.current_thread);
        let depth = stack.as_ref().map_or(0, |stack| stack.len());
        let count = usize::from(record.count);
        if count > depth {
            return Err(ReadError::custom(
                ErrorKind::CorruptState,
                "frame pop underflows the thread's stack",
            ));
        }

        if let Some(stack) = stack {
            stack.truncate(depth - count);
        }
        Ok(())
    }

    fn process_frame_index(&mut self, record: FrameIndex) -> Result<()> {
        if !self.track_stacks {
            return Ok(());
        }

        match self.shared().frames.entry(record.frame_id) {
            Entry::Occupied(_) => Err(ReadError::custom(
                ErrorKind::DuplicateFrameId,
                "two frame dictionary entries share the same id",
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.frame);
                Ok(())
            }
        }
    }

    fn process_segment_group(&mut self, header: SegmentHeader) -> Result<()> {
        let mut segments = Vec::with_capacity(header.num_segments.min(4096));
        for _ in 0..header.num_segments {
            let mut tag = [0u8; 1];
            if !self.source.read_exact(&mut tag) {
                return Err(ReadError::truncated());
            }
            if RecordTypeAndFlags::from_raw(tag[0]).record_type() != Some(RecordType::Segment) {
                return Err(ReadError::custom(
                    ErrorKind::UnexpectedTag,
                    "segment group interrupted by a non-segment record",
                ));
            }

            let segment: Segment = Parser::new(&mut self.source).parse()?;
            if self.track_stacks {
                segments.push(segment);
            }
        }

        if self.track_stacks {
            let mut shared = self.shared();
            shared
                .resolver
                .add_segments(&header.filename, header.addr, segments);
        }
        Ok(())
    }

    fn current_stack_top(&self) -> FrameTreeIndex {
        self.stacks
            .get(&self.current_thread)
            .and_then(|stack| stack.last().copied())
            .unwrap_or(0)
    }

    fn process_allocation(&mut self, record: AllocationRecord) {
        let frame_index = if self.track_stacks {
            self.current_stack_top()
        } else {
            0
        };

        self.latest_allocation = Some(Allocation {
            tid: self.current_thread,
            address: record.address,
            size: record.size,
            allocator: record.allocator,
            frame_index,
            native_frame_id: 0,
            native_segment_generation: 0,
            n_allocations: 1,
        });
    }

    fn process_native_allocation(&mut self, record: NativeAllocationRecord) {
        let (frame_index, native_frame_id, generation) = if self.track_stacks {
            (
                self.current_stack_top(),
                record.native_frame_id,
                self.shared().resolver.current_segment_generation(),
            )
        } else {
            (0, 0, 0)
        };

        self.latest_allocation = Some(Allocation {
            tid: self.current_thread,
            address: record.address,
            size: record.size,
            allocator: record.allocator,
            frame_index,
            native_frame_id,
            native_segment_generation: generation,
            n_allocations: 1,
        });
    }

    /// A copy of the stream header.
    pub fn header(&self) -> HeaderRecord {
        self.header.clone()
    }

    /// The name recorded for `tid`, or an empty string if none was seen.
    pub fn thread_name(&self, tid: u64) -> String {
        self.thread_names.get(&tid).cloned().unwrap_or_default()
    }

    /// The most recently decoded allocation, if any.
    pub fn latest_allocation(&self) -> Option<Allocation> {
        self.latest_allocation
    }

    /// The most recently decoded memory sample, if any.
    pub fn latest_memory_record(&self) -> Option<MemoryRecord> {
        self.latest_memory_record
    }

    /// Walk the managed stack starting at frame-tree `index`, innermost
    /// frame first, emitting at most `max_frames` descriptors.
    ///
    /// The walk holds the reader's mutex for its whole duration so it sees
    /// a coherent dictionary and tree.
    pub fn stack_frames(&self, index: FrameTreeIndex, max_frames: usize) -> Result<Vec<Frame>> {
        if !self.track_stacks {
            return Err(ReadError::from_kind(ErrorKind::StackTrackingDisabled));
        }

        let shared = self.shared();
        let mut frames = Vec::new();
        let mut current = index;

        while current != 0 && frames.len() < max_frames {
            let (frame_id, parent) = shared.tree.next_node(current).ok_or_else(|| {
                ReadError::custom(
                    ErrorKind::CorruptState,
                    "stack index points outside the frame tree",
                )
            })?;
            let frame = shared.frames.get(&frame_id).ok_or_else(|| {
                ReadError::custom(
                    ErrorKind::CorruptState,
                    "frame id missing from the frame dictionary",
                )
            })?;

            frames.push(frame.clone());
            current = parent;
        }

        Ok(frames)
    }

    /// Walk the native frame chain starting at `index`, resolving each
    /// instruction pointer against the segment map identified by
    /// `generation`.
    ///
    /// `generation` must be the [`Allocation::native_segment_generation`]
    /// of the allocation under investigation. Pointers the resolver cannot
    /// symbolize are skipped, not treated as the end of the chain.
    pub fn native_stack_frames(
        &self,
        index: usize,
        generation: usize,
        max_frames: usize,
    ) -> Result<Vec<ResolvedFrame>> {
        if !self.track_stacks {
            return Err(ReadError::from_kind(ErrorKind::StackTrackingDisabled));
        }

        let shared = self.shared();
        let mut frames = Vec::new();
        let mut current = index;

        while current != 0 && frames.len() < max_frames {
            let frame = shared
                .native_frames
                .get(current - 1)
                .copied()
                .ok_or_else(|| {
                    ReadError::custom(
                        ErrorKind::CorruptState,
                        "native frame id points outside the native-frame list",
                    )
                })?;
            current = frame.parent_index;

            let Some(resolved) = shared.resolver.resolve(frame.ip, generation) else {
                continue;
            };
            frames.extend(resolved);
        }

        Ok(frames)
    }

    /// Whether the underlying source can still be read from.
    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    /// Close the underlying source. Idempotent.
    pub fn close(&mut self) {
        self.source.close();
    }

    /// Print every remaining record to `out` in stream order.
    ///
    /// Diagnostic only: record parsers run but no state is mutated. The
    /// dump stops cleanly on a short read and checks `cancelled` between
    /// records so a host can interrupt it.
    pub fn dump_all_records<W: Write>(
        &mut self,
        out: &mut W,
        cancelled: impl Fn() -> bool,
    ) -> Result<()> {
        let header = &self.header;
        writeln!(
            out,
            "HEADER magic={} version={} native_traces={} n_allocations={} n_frames={} \
             start_time={} end_time={} pid={} command_line={} python_allocator={}",
            String::from_utf8_lossy(&header.magic),
            header.version,
            header.native_traces,
            header.stats.n_allocations,
            header.stats.n_frames,
            header.stats.start_time,
            header.stats.end_time,
            header.pid,
            header.command_line,
            header.python_allocator.label(),
        )?;

        loop {
            if cancelled() {
                return Ok(());
            }

            let mut tag = [0u8; 1];
            if !self.source.read_exact(&mut tag) {
                return Ok(());
            }

            let hdr = RecordTypeAndFlags::from_raw(tag[0]);
            let mut p = Parser::new(&mut self.source);
            let Some(record_type) = hdr.record_type() else {
                writeln!(out, "UNKNOWN RECORD TYPE {}", hdr.raw_type())?;
                return Ok(());
            };

            match record_type {
                RecordType::Uninitialized => {}
                RecordType::Allocation => {
                    let Ok(record) = AllocationRecord::parse(&mut p, hdr.flags()) else {
                        return Ok(());
                    };
                    writeln!(
                        out,
                        "ALLOCATION address={:#x} size={} allocator={}",
                        record.address,
                        record.size,
                        allocator_label(record.allocator),
                    )?;
                }
                RecordType::AllocationWithNative => {
                    let Ok(record) = NativeAllocationRecord::parse(&mut p, hdr.flags()) else {
                        return Ok(());
                    };
                    writeln!(
                        out,
                        "ALLOCATION_WITH_NATIVE address={:#x} size={} allocator={} \
                         native_frame_id={}",
                        record.address,
                        record.size,
                        allocator_label(record.allocator),
                        record.native_frame_id,
                    )?;
                }
                RecordType::FramePush => {
                    let Ok(record) = p.parse::<FramePush>() else { return Ok(()) };
                    writeln!(out, "FRAME_PUSH frame_id={}", record.frame_id)?;
                }
                RecordType::FramePop => {
                    let Ok(record) = p.parse::<FramePop>() else { return Ok(()) };
                    writeln!(out, "FRAME_POP count={}", record.count)?;
                }
                RecordType::FrameIndex => {
                    let Ok(record) = p.parse::<FrameIndex>() else { return Ok(()) };
                    writeln!(
                        out,
                        "FRAME_ID frame_id={} function_name={} filename={} lineno={}",
                        record.frame_id,
                        record.frame.function_name,
                        record.frame.filename,
                        record.frame.lineno,
                    )?;
                }
                RecordType::NativeTraceIndex => {
                    let Ok(record) = p.parse::<UnresolvedNativeFrame>() else { return Ok(()) };
                    writeln!(
                        out,
                        "NATIVE_FRAME_ID ip={:#x} index={}",
                        record.ip, record.parent_index,
                    )?;
                }
                RecordType::MemoryMapStart => {
                    writeln!(out, "MEMORY_MAP_START")?;
                }
                RecordType::SegmentHeader => {
                    let Ok(record) = p.parse::<SegmentHeader>() else { return Ok(()) };
                    writeln!(
                        out,
                        "SEGMENT_HEADER filename={} num_segments={} addr={:#x}",
                        record.filename, record.num_segments, record.addr,
                    )?;
                }
                RecordType::Segment => {
                    let Ok(record) = p.parse::<Segment>() else { return Ok(()) };
                    writeln!(out, "SEGMENT {:#x} {:x}", record.vaddr, record.memsz)?;
                }
                RecordType::ThreadRecord => {
                    let Ok(record) = p.parse::<ThreadRecord>() else { return Ok(()) };
                    writeln!(out, "THREAD {}", record.name)?;
                }
                RecordType::MemoryRecord => {
                    let Ok(record) = p.parse::<MemoryRecord>() else { return Ok(()) };
                    writeln!(
                        out,
                        "MEMORY_RECORD time={} memory={:x}",
                        record.ms_since_epoch, record.rss,
                    )?;
                }
                RecordType::ContextSwitch => {
                    let Ok(record) = p.parse::<ContextSwitch>() else { return Ok(()) };
                    writeln!(out, "CONTEXT_SWITCH tid={}", record.tid)?;
                }
            }
        }
    }
}

fn allocator_label(allocator: Allocator) -> String {
    match allocator.name() {
        Some(name) => name.to_string(),
        None => format!("<unknown allocator {}>", allocator.raw()),
    }
}
