use crate::Core::error::{LogRingError, Result};
use crate::Core::SharedMemory::{self, SharedMemoryBackend, SEGMENT_ALIGN};
use crate::Ring::Buffer::layout::{RingHeader, RING_MAGIC, RING_VERSION};
use crate::Ring::Buffer::RingBuffer;
use crate::Ring::Record::codec::{align_down, RECORD_HEADER_LEN};
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::fence;
use std::sync::atomic::Ordering::{Acquire, Release};
use tracing::info;
mod debug;
mod getters;

/// Smallest ring that can hold one record without any text.
pub const MIN_CAPACITY: usize = 2 * RECORD_HEADER_LEN;

/// Bytes in front of the data region.
const CONTROL_SIZE: usize = size_of::<RingHeader>();

/// A memory segment laid out as `[RingHeader | data]`, together with the
/// ring view every producer and consumer of this process goes through.
pub struct LogSegment {
    shm: Box<dyn SharedMemoryBackend>,
    /// Name under /dev/shm; `None` for a private heap segment.
    name: Option<String>,
    ring: RingBuffer,
}

impl LogSegment {
    /// Create (or truncate) the named segment and initialize an empty ring
    /// of `capacity` bytes in it.
    pub fn new(capacity: usize, name: &str) -> Result<Self> {
        let capacity = checked_capacity(capacity)?;
        let shm = SharedMemory::create_shared_memory(segment_size(capacity), name)?;
        let segment = Self::init(shm, capacity, Some(name.to_owned()))?;
        info!(name, capacity, "created log ring segment");
        Ok(segment)
    }

    /// Create the named segment only if it does not exist yet. An existing
    /// segment is left alone and reported as an `AlreadyExists` I/O error.
    pub fn create_new(capacity: usize, name: &str) -> Result<Self> {
        let capacity = checked_capacity(capacity)?;
        let shm = SharedMemory::create_new_shared_memory(segment_size(capacity), name)?;
        let segment = Self::init(shm, capacity, Some(name.to_owned()))?;
        info!(name, capacity, "created log ring segment");
        Ok(segment)
    }

    /// A ring in process-private memory. Behaves exactly like a named one,
    /// minus the sharing.
    pub fn private(capacity: usize) -> Result<Self> {
        let capacity = checked_capacity(capacity)?;
        let shm = SharedMemory::heap_memory(segment_size(capacity))?;
        Self::init(shm, capacity, None)
    }

    /// Attach to a segment another process created with [`LogSegment::new`].
    pub fn attach(name: &str) -> Result<Self> {
        let shm = SharedMemory::attach_shared_memory(name, CONTROL_SIZE)?;
        let header_ptr = shm.as_ptr() as *const RingHeader;
        if (header_ptr as usize) % SEGMENT_ALIGN != 0 {
            return Err(LogRingError::InvalidSegment(format!(
                "{name}: mapping is not {SEGMENT_ALIGN}-byte aligned"
            )));
        }

        // Safety: the mapping is at least CONTROL_SIZE bytes and aligned
        let magic = unsafe { ptr::read_volatile(ptr::addr_of!((*header_ptr).magic)) };
        fence(Acquire);
        if magic != RING_MAGIC {
            return Err(LogRingError::InvalidSegment(format!(
                "{name}: bad magic number 0x{magic:x}, segment not initialized"
            )));
        }
        let header = unsafe { &*header_ptr };
        if header.version != RING_VERSION {
            return Err(LogRingError::InvalidSegment(format!(
                "{name}: layout version {} (expected {RING_VERSION})",
                header.version
            )));
        }
        let capacity = header.initial_capacity as usize;
        if shm.size() < CONTROL_SIZE + capacity {
            return Err(LogRingError::InvalidSegment(format!(
                "{name}: {} bytes mapped, ring needs {}",
                shm.size(),
                CONTROL_SIZE + capacity
            )));
        }

        // Safety: header and data region validated above, kept alive by `shm`
        let ring = unsafe { RingBuffer::new(header_ptr, shm.as_ptr().add(CONTROL_SIZE)) };
        info!(name, capacity, "attached to log ring segment");
        Ok(Self {
            shm,
            name: Some(name.to_owned()),
            ring,
        })
    }

    fn init(
        shm: Box<dyn SharedMemoryBackend>,
        capacity: usize,
        name: Option<String>,
    ) -> Result<Self> {
        let header_ptr = shm.as_ptr() as *mut RingHeader;
        if (header_ptr as usize) % SEGMENT_ALIGN != 0 {
            return Err(LogRingError::InvalidSegment(
                "shared memory not properly aligned".into(),
            ));
        }

        // Safety: the region is segment_size(capacity) bytes, aligned, and
        // nobody else uses it before the magic number is written
        let ring = unsafe {
            let header = RingHeader {
                magic: 0,
                ..RingHeader::new(capacity)
            };
            ptr::write(header_ptr, header);
            // The magic number goes in last and attachers check it first.
            fence(Release);
            ptr::write_volatile(ptr::addr_of_mut!((*header_ptr).magic), RING_MAGIC);
            RingBuffer::new(header_ptr, shm.as_ptr().add(CONTROL_SIZE))
        };
        Ok(Self { shm, name, ring })
    }

    /// The ring living in this segment.
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Unlink the named segment. Mappings, including this one, stay valid.
    pub fn unlink(&self) -> Result<()> {
        if let Some(name) = &self.name {
            SharedMemory::remove_shared_memory(name)?;
            info!(name = name.as_str(), "removed log ring segment");
        }
        Ok(())
    }
}

/// Total mapping size for a ring of `capacity` bytes.
pub fn segment_size(capacity: usize) -> usize {
    (CONTROL_SIZE + capacity + SEGMENT_ALIGN - 1) & !(SEGMENT_ALIGN - 1)
}

fn checked_capacity(requested: usize) -> Result<usize> {
    let capacity = align_down(requested);
    if capacity < MIN_CAPACITY {
        return Err(LogRingError::CapacityTooSmall {
            requested,
            minimum: MIN_CAPACITY,
        });
    }
    // Stored record lengths are 32-bit.
    if capacity > u32::MAX as usize {
        return Err(LogRingError::InvalidSegment(format!(
            "capacity {requested} exceeds the 4 GiB record addressing limit"
        )));
    }
    Ok(capacity)
}

// The ring view points into `shm`, which lives as long as the segment.
unsafe impl Send for LogSegment {}
unsafe impl Sync for LogSegment {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_below_minimum_is_rejected() {
        match LogSegment::private(RECORD_HEADER_LEN) {
            Err(LogRingError::CapacityTooSmall { requested, minimum }) => {
                assert_eq!(requested, RECORD_HEADER_LEN);
                assert_eq!(minimum, MIN_CAPACITY);
            }
            other => panic!("expected CapacityTooSmall, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn capacity_is_rounded_down_to_record_alignment() {
        let segment = LogSegment::private(4096 + 3).unwrap();
        assert_eq!(segment.ring().capacity(), 4096);
        assert_eq!(segment.ring().initial_capacity(), 4096);
    }

    #[test]
    fn fresh_segment_is_initialized_and_empty() {
        let segment = LogSegment::private(4096).unwrap();
        assert!(segment.is_initialized());
        assert!(segment.ring().is_empty());
        assert!(segment.ring().is_enabled());
        assert!(segment.size() >= segment_size(4096));
    }
}
