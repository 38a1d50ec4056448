use super::*;

/// Accessors used for monitoring and by the debug formatter.
impl LogSegment {
    /// Get a reference to the underlying shared memory backend
    ///
    /// # Safety
    /// The returned reference must not outlive the LogSegment
    pub unsafe fn shm(&self) -> &dyn SharedMemoryBackend {
        &*self.shm
    }

    /// Name of the segment under /dev/shm, `None` for private segments.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Size of the whole mapping, header included.
    pub fn size(&self) -> usize {
        self.shm.size()
    }

    /// Get the raw pointer to the RingHeader
    pub fn header_ptr(&self) -> *const RingHeader {
        self.ring.header
    }

    /// Check that the segment carries a ring of the current layout.
    pub fn is_initialized(&self) -> bool {
        // Safety: the header pointer is valid while the segment exists
        unsafe { !self.ring.header.is_null() && (*self.ring.header).is_initialized() }
    }
}
