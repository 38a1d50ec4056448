use crate::Core::alloc::LogSegment;
use crate::Core::error::Result;
use crate::Ring::Buffer::Buffer::DrainState;
use crate::Ring::Buffer::{Cursors, RingBuffer, RingStats};
use crate::Ring::Record::DecodedRecord;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Reads records out of a log ring.
///
/// Only one drain may run against a segment at a time, across all
/// processes; a second one fails with `ConsumerBusy`.
pub struct Consumer {
    segment: Arc<LogSegment>,
    /// Reused for every record copied out of the ring.
    scratch: Vec<u8>,
}

impl Consumer {
    pub fn new(segment: Arc<LogSegment>) -> Self {
        Self {
            segment,
            scratch: Vec::new(),
        }
    }

    /// Start draining every record written before this call.
    ///
    /// Records appended while the drain runs are left for the next one.
    /// Each yielded record has been removed from the ring; records a
    /// producer evicts mid-drain are simply not seen.
    pub fn drain(&mut self) -> Result<Drain<'_>> {
        let ring = self.segment.ring();
        let state = ring.begin_drain()?;
        Ok(Drain {
            ring,
            scratch: &mut self.scratch,
            state,
        })
    }

    /// Drain everything currently buffered into a vector, stopping at the
    /// first damaged record.
    pub fn drain_all(&mut self) -> Result<Vec<DecodedRecord>> {
        self.drain()?.collect()
    }

    /// Discard all unread records and release a drain that never ended.
    pub fn reset(&self) {
        self.ring().reset();
    }

    /// Shrink an empty ring. Returns the capacity actually applied.
    pub fn shrink(&self, new_capacity: usize) -> Result<usize> {
        self.ring().shrink(new_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.ring().capacity()
    }

    pub fn position(&self) -> Cursors {
        self.ring().position()
    }

    pub fn stats(&self) -> RingStats {
        self.ring().stats()
    }

    pub fn ring(&self) -> &RingBuffer {
        self.segment.ring()
    }

    pub fn segment(&self) -> &Arc<LogSegment> {
        &self.segment
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("segment", &self.segment.name())
            .finish_non_exhaustive()
    }
}

/// Iterator over one drain. Dropping it ends the drain; records it did not
/// reach stay in the ring.
pub struct Drain<'a> {
    ring: &'a RingBuffer,
    scratch: &'a mut Vec<u8>,
    state: DrainState,
}

impl Iterator for Drain<'_> {
    type Item = Result<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ring.drain_next(&mut self.state, self.scratch)
    }
}

impl FusedIterator for Drain<'_> {}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        self.ring.end_drain(&self.state);
    }
}

impl fmt::Debug for Drain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drain").field("state", &self.state).finish()
    }
}
