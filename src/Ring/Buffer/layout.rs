use crate::Core::lock::ShmMutex;
use crate::Ring::Record::Record::ALL_FIELDS;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64};

/// "DMXP_LOG"
pub const RING_MAGIC: u64 = 0x444D_5850_5F4C_4F47;
pub const RING_VERSION: u32 = 1;

/// Producers store records (cleared = every append is a no-op).
pub const FLAG_ENABLED: u32 = 1 << 0;
/// Producers drop records flagged `hide_statement`.
pub const FLAG_IGNORE_STATEMENTS: u32 = 1 << 1;

/// Control block at the very beginning of a log ring segment; the data
/// region of `initial_capacity` bytes follows it directly.
///
/// Every field a producer or consumer reads is atomic so the header can be
/// shared between processes without `UnsafeCell` games. Cursors, `wrapped`,
/// `capacity` and the data bytes are only ever *changed* while `lock` is
/// held; the counters and flags may be read without it.
#[repr(C, align(128))]
pub struct RingHeader {
    /// A "magic number" to identify the memory region as a log ring.
    pub magic: u64,

    /// The version of the memory layout.
    pub version: u32,

    /// `FLAG_*` bits shared by every attached process.
    pub flags: AtomicU32,

    /// Size of the data region. Capacity never exceeds it.
    pub initial_capacity: u64,

    /// Bytes of the data region currently in use as the ring.
    pub capacity: AtomicU64,

    /// Offset where the next record will be placed.
    pub write_cursor: AtomicU64,

    /// Offset of the oldest unread record.
    pub read_cursor: AtomicU64,

    /// Set while the unread region runs past the physical end of the data
    /// region and no drain has picked that up yet.
    pub wrapped: AtomicBool,

    /// Set while a drain owns the read cursor.
    pub reader_active: AtomicBool,

    /// Bitmask of `Field::bit()` values producers keep.
    pub included_fields: AtomicU32,

    /// Records written since creation.
    pub appended: AtomicU64,

    /// Unread records overwritten since creation.
    pub evicted: AtomicU64,

    /// Guards cursor and data mutations. Padded so producers spinning on the
    /// lock do not bounce the line holding the counters.
    pub lock: CachePadded<ShmMutex>,
}

impl RingHeader {
    pub fn new(capacity: usize) -> Self {
        Self {
            magic: RING_MAGIC,
            version: RING_VERSION,
            flags: AtomicU32::new(FLAG_ENABLED),
            initial_capacity: capacity as u64,
            capacity: AtomicU64::new(capacity as u64),
            write_cursor: AtomicU64::new(0),
            read_cursor: AtomicU64::new(0),
            wrapped: AtomicBool::new(false),
            reader_active: AtomicBool::new(false),
            included_fields: AtomicU32::new(ALL_FIELDS),
            appended: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            lock: CachePadded::new(ShmMutex::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.magic == RING_MAGIC && self.version == RING_VERSION
    }
}
