// The log ring: one contiguous byte region holding variable-length records
// back to back, wrapping at the physical end.

use super::layout::RingHeader;

use std::sync::atomic::AtomicBool;

/// A view over a ring header and its data region.
///
/// This struct is NOT stored in shared memory. It holds pointers into a
/// segment owned elsewhere (`LogSegment`, or a test harness), and every
/// process attached to the segment builds its own view.
///
/// ### Concurrency Design:
/// - **Append**: takes the header lock, picks the placement, evicts unread
///   records the new bytes would overwrite, copies the record, moves the
///   write cursor, releases the lock. Readers never observe a half-written
///   record because they need the same lock.
/// - **Drain**: one consumer at a time. A snapshot of the write cursor bounds
///   the drain; each step takes the lock, copies one record out and moves
///   the read cursor.
/// - The ring is never allowed to become completely full, so
///   `read == write` always means empty and `read > write` always means the
///   unread region wraps.
pub struct RingBuffer {
    /// Pointer to the control block.
    pub(crate) header: *const RingHeader,

    /// Pointer to the start of the data region (`initial_capacity` bytes).
    pub(crate) data: *mut u8,

    /// Whether this process already suggested a larger buffer.
    pub(crate) eviction_reported: AtomicBool,
}

unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

/// Cursor snapshot, as reported by `RingBuffer::position`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cursors {
    pub write: usize,
    pub read: usize,
    pub wrapped: bool,
}

/// What one append did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AppendStats {
    /// Offset of the record's first byte.
    pub offset: usize,
    /// Encoded length, padding included.
    pub len: usize,
    /// Unread records dropped to make room.
    pub evicted: usize,
    /// The placement ran past the physical end.
    pub wrapped: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: usize,
    /// Bytes between the read and write cursors.
    pub used: usize,
    pub appended: u64,
    pub evicted: u64,
}

/// Where a record of a given length goes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Placement {
    pub start: usize,
    /// New write cursor.
    pub end: usize,
    /// No room for a header at the old cursor; the tail was abandoned.
    pub skipped: bool,
    pub wrapped: bool,
    /// Bytes consumed from the old write cursor on: abandoned tail plus record.
    pub span: usize,
}

/// Per-drain bookkeeping.
#[derive(Copy, Clone, Debug)]
pub(crate) struct DrainState {
    pub until: usize,
    pub was_wrapped: bool,
    pub done: bool,
}
