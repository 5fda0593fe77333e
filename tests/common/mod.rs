//! Support code for the integration tests: a companion writer that encodes
//! capture streams byte for byte, and a resolver double that records every
//! call the reader makes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use memtrace_reader::{
    Allocator, PythonAllocator, RecordType, ResolvedFrame, Segment, SymbolResolver, TrackerStats,
    FORMAT_VERSION, MAGIC,
};

/// Builds capture streams for tests, mirroring the wire format the reader
/// decodes.
pub struct StreamBuilder {
    data: Vec<u8>,
}

impl StreamBuilder {
    /// A stream with an unremarkable header and no records yet.
    pub fn new() -> Self {
        Self::with_header(
            false,
            TrackerStats::default(),
            "python demo.py",
            1234,
            PythonAllocator::PYMALLOC,
        )
    }

    pub fn with_header(
        native_traces: bool,
        stats: TrackerStats,
        command_line: &str,
        pid: i32,
        allocator: PythonAllocator,
    ) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.push(u8::from(native_traces));
        data.extend_from_slice(&stats.n_allocations.to_le_bytes());
        data.extend_from_slice(&stats.n_frames.to_le_bytes());
        data.extend_from_slice(&stats.start_time.to_le_bytes());
        data.extend_from_slice(&stats.end_time.to_le_bytes());
        data.extend_from_slice(command_line.as_bytes());
        data.push(0);
        data.extend_from_slice(&pid.to_le_bytes());
        data.push(allocator.raw());
        Self { data }
    }

    fn tag(&mut self, ty: RecordType, flags: u8) {
        self.data.push((ty as u8) | (flags << 4));
    }

    fn varint(&mut self, mut value: usize) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.data.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn cstring(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    pub fn context_switch(mut self, tid: u64) -> Self {
        self.tag(RecordType::ContextSwitch, 0);
        self.data.extend_from_slice(&tid.to_le_bytes());
        self
    }

    pub fn allocation(mut self, allocator: Allocator, address: usize, size: usize) -> Self {
        self.tag(RecordType::Allocation, allocator.raw());
        self.data.extend_from_slice(&address.to_le_bytes());
        self.varint(size);
        self
    }

    pub fn native_allocation(
        mut self,
        allocator: Allocator,
        address: usize,
        size: usize,
        native_frame_id: usize,
    ) -> Self {
        self.tag(RecordType::AllocationWithNative, allocator.raw());
        self.data.extend_from_slice(&address.to_le_bytes());
        self.varint(size);
        self.varint(native_frame_id);
        self
    }

    pub fn frame_push(mut self, frame_id: u64) -> Self {
        self.tag(RecordType::FramePush, 0);
        self.data.extend_from_slice(&frame_id.to_le_bytes());
        self
    }

    pub fn frame_pop(mut self, count: u8) -> Self {
        self.tag(RecordType::FramePop, 0);
        self.data.push(count);
        self
    }

    pub fn frame_index(
        mut self,
        frame_id: u64,
        function_name: &str,
        filename: &str,
        lineno: i32,
    ) -> Self {
        self.tag(RecordType::FrameIndex, 0);
        self.data.extend_from_slice(&frame_id.to_le_bytes());
        self.cstring(function_name);
        self.cstring(filename);
        self.data.extend_from_slice(&lineno.to_le_bytes());
        self
    }

    pub fn native_trace_index(mut self, ip: usize, parent_index: usize) -> Self {
        self.tag(RecordType::NativeTraceIndex, 0);
        self.data.extend_from_slice(&ip.to_le_bytes());
        self.varint(parent_index);
        self
    }

    pub fn memory_map_start(mut self) -> Self {
        self.tag(RecordType::MemoryMapStart, 0);
        self
    }

    pub fn segment_header(mut self, filename: &str, num_segments: usize, addr: usize) -> Self {
        self.tag(RecordType::SegmentHeader, 0);
        self.cstring(filename);
        self.data.extend_from_slice(&num_segments.to_le_bytes());
        self.data.extend_from_slice(&addr.to_le_bytes());
        self
    }

    pub fn segment(mut self, vaddr: usize, memsz: usize) -> Self {
        self.tag(RecordType::Segment, 0);
        self.data.extend_from_slice(&vaddr.to_le_bytes());
        self.data.extend_from_slice(&memsz.to_le_bytes());
        self
    }

    pub fn thread_record(mut self, name: &str) -> Self {
        self.tag(RecordType::ThreadRecord, 0);
        self.cstring(name);
        self
    }

    pub fn memory_record(mut self, ms_since_epoch: i64, rss: usize) -> Self {
        self.tag(RecordType::MemoryRecord, 0);
        self.data.extend_from_slice(&ms_since_epoch.to_le_bytes());
        self.data.extend_from_slice(&rss.to_le_bytes());
        self
    }

    pub fn padding(mut self, count: usize) -> Self {
        self.data.extend(std::iter::repeat(0).take(count));
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Everything a [`RecordingResolver`] has seen.
#[derive(Default)]
pub struct ResolverState {
    pub generation: usize,
    /// The registry currently in force; cleared on every map reset.
    pub segments: Vec<(String, usize, Vec<Segment>)>,
    /// Every `add_segments` call ever made.
    pub add_calls: Vec<(String, usize, Vec<Segment>)>,
    /// Every `resolve` call ever made, as `(ip, generation)`.
    pub resolve_calls: Vec<(usize, usize)>,
    pub symbols: HashMap<usize, Vec<ResolvedFrame>>,
}

/// A resolver double that records calls and resolves from a fixed table.
#[derive(Default)]
pub struct RecordingResolver {
    state: Arc<Mutex<ResolverState>>,
}

impl RecordingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto the shared state, for inspection after the reader has
    /// taken ownership of the resolver.
    pub fn state(&self) -> Arc<Mutex<ResolverState>> {
        Arc::clone(&self.state)
    }

    pub fn with_symbol(self, ip: usize, frames: Vec<ResolvedFrame>) -> Self {
        self.state.lock().unwrap().symbols.insert(ip, frames);
        self
    }
}

impl SymbolResolver for RecordingResolver {
    fn clear_segments(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.segments.clear();
        state.generation += 1;
    }

    fn add_segments(&mut self, filename: &str, base: usize, segments: Vec<Segment>) {
        let mut state = self.state.lock().unwrap();
        state
            .segments
            .push((filename.to_owned(), base, segments.clone()));
        state.add_calls.push((filename.to_owned(), base, segments));
    }

    fn resolve(&self, ip: usize, generation: usize) -> Option<Vec<ResolvedFrame>> {
        let mut state = self.state.lock().unwrap();
        state.resolve_calls.push((ip, generation));
        state.symbols.get(&ip).cloned()
    }

    fn current_segment_generation(&self) -> usize {
        self.state.lock().unwrap().generation
    }
}

pub fn resolved(symbol: &str) -> ResolvedFrame {
    ResolvedFrame {
        symbol: symbol.to_owned(),
        filename: String::new(),
        lineno: 0,
    }
}
