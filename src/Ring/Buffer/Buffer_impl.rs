use std::ptr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use tracing::{debug, error, warn};

use super::layout::{RingHeader, FLAG_ENABLED, FLAG_IGNORE_STATEMENTS};
use super::Buffer::{AppendStats, Cursors, DrainState, Placement, RingBuffer, RingStats};
use crate::Core::error::{LogRingError, Result};
use crate::Ring::Record::codec::{
    self, align_down, encoded_len, max_record_len, validate_total_len, RECORD_HEADER_LEN,
    SKIP_SENTINEL,
};
use crate::Ring::Record::{DecodedRecord, ErrorRecord, Field};

/// Bytes between `read` and `write`, following the ring forward.
/// The ring is never full, so `read == write` is always empty.
#[inline]
pub(crate) fn used(capacity: usize, read: usize, write: usize) -> usize {
    if read <= write {
        write - read
    } else {
        capacity - read + write
    }
}

/// Pick the offset for a record of `len` bytes given the write cursor.
///
/// If not even a header fits before the physical end the tail is abandoned
/// and the record starts at 0; otherwise it starts at the write cursor and
/// may run past the end, in which case its bytes continue at offset 0.
pub(crate) fn placement(capacity: usize, write: usize, len: usize) -> Placement {
    let (start, skipped) = if write + RECORD_HEADER_LEN > capacity {
        (0, true)
    } else {
        (write, false)
    };

    let mut end = start + len;
    let split = end >= capacity;
    if split {
        end -= capacity;
    }

    let span = if skipped { capacity - write + len } else { len };
    Placement {
        start,
        end,
        skipped,
        wrapped: skipped || split,
        span,
    }
}

/// One step of the read cursor.
enum Step {
    /// Jump to offset 0 over an abandoned tail.
    Skip,
    /// Step over a record of `len` bytes.
    Record { len: usize, next: usize },
}

impl RingBuffer {
    /// Create a ring buffer view over an existing header and data region.
    ///
    /// # Safety
    /// `header` must point to an initialized `RingHeader`, and `data` to at
    /// least `initial_capacity` writable bytes, both outliving the view.
    pub unsafe fn new(header: *const RingHeader, data: *mut u8) -> Self {
        Self {
            header,
            data,
            eviction_reported: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn header(&self) -> &RingHeader {
        // Safety: guaranteed by the contract of `new`
        unsafe { &*self.header }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.header().capacity.load(Relaxed) as usize
    }

    #[inline]
    pub fn initial_capacity(&self) -> usize {
        self.header().initial_capacity as usize
    }

    /// Largest encoded record the ring currently accepts.
    pub fn max_record_len(&self) -> usize {
        max_record_len(self.capacity())
    }

    pub fn position(&self) -> Cursors {
        let header = self.header();
        let _guard = header.lock.lock();
        Cursors {
            write: header.write_cursor.load(Relaxed) as usize,
            read: header.read_cursor.load(Relaxed) as usize,
            wrapped: header.wrapped.load(Relaxed),
        }
    }

    pub fn stats(&self) -> RingStats {
        let header = self.header();
        let _guard = header.lock.lock();
        let capacity = header.capacity.load(Relaxed) as usize;
        RingStats {
            capacity,
            used: used(
                capacity,
                header.read_cursor.load(Relaxed) as usize,
                header.write_cursor.load(Relaxed) as usize,
            ),
            appended: header.appended.load(Relaxed),
            evicted: header.evicted.load(Relaxed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats().used == 0
    }

    /// Whether some view currently holds the ring lock.
    pub fn is_locked(&self) -> bool {
        self.header().lock.is_locked()
    }

    // ---- shared toggles ------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.header().flags.load(Relaxed) & FLAG_ENABLED != 0
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.set_flag(FLAG_ENABLED, enabled);
    }

    pub fn ignores_statements(&self) -> bool {
        self.header().flags.load(Relaxed) & FLAG_IGNORE_STATEMENTS != 0
    }

    pub fn set_ignore_statements(&self, ignore: bool) {
        self.set_flag(FLAG_IGNORE_STATEMENTS, ignore);
    }

    fn set_flag(&self, flag: u32, on: bool) {
        let flags = &self.header().flags;
        if on {
            flags.fetch_or(flag, Relaxed);
        } else {
            flags.fetch_and(!flag, Relaxed);
        }
        debug!(flag, on, "log ring flag changed");
    }

    pub fn included_fields(&self) -> u32 {
        self.header().included_fields.load(Relaxed)
    }

    pub fn set_included_fields(&self, mask: u32) {
        self.header().included_fields.store(mask, Relaxed);
    }

    /// Store or drop the query text and its cursor position.
    pub fn set_query_fields(&self, include: bool) {
        let fields = &self.header().included_fields;
        if include {
            fields.fetch_or(Field::Query.bit(), Relaxed);
        } else {
            fields.fetch_and(!Field::Query.bit(), Relaxed);
        }
    }

    // ---- append ----------------------------------------------------------

    /// Copy `record` into the ring, evicting the oldest unread records if
    /// the new bytes would overwrite them.
    pub fn append(&self, record: &ErrorRecord<'_>) -> Result<AppendStats> {
        let len = encoded_len(record);
        let header = self.header();
        let guard = header.lock.lock();

        let capacity = header.capacity.load(Relaxed) as usize;
        let max = max_record_len(capacity);
        if len > max {
            return Err(LogRingError::RecordTooLarge { len, max });
        }

        let write = header.write_cursor.load(Relaxed) as usize;
        let mut read = header.read_cursor.load(Relaxed) as usize;
        let place = placement(capacity, write, len);

        // Keep strictly more free bytes than we are about to consume so the
        // cursors never meet on a full ring.
        let mut evicted = 0;
        let mut crossed = false;
        while capacity - used(capacity, read, write) <= place.span {
            match self.step(capacity, read, write)? {
                Step::Skip => {
                    read = 0;
                    crossed = true;
                }
                Step::Record { next, .. } => {
                    crossed |= next < read;
                    read = next;
                    evicted += 1;
                }
            }
        }

        unsafe {
            if place.skipped && write + 4 <= capacity {
                ptr::write_unaligned(self.data.add(write) as *mut u32, SKIP_SENTINEL);
            }
            let mut pos = place.start;
            codec::write_chunks(record, len, |chunk| {
                pos = self.copy_in(pos, capacity, chunk);
            });
        }

        header.write_cursor.store(place.end as u64, Relaxed);
        header.read_cursor.store(read as u64, Relaxed);
        if place.wrapped || crossed {
            header.wrapped.store(read > place.end, Relaxed);
        }
        header.appended.fetch_add(1, Relaxed);
        if evicted > 0 {
            header.evicted.fetch_add(evicted as u64, Relaxed);
        }
        drop(guard);

        // Reported after unlocking and never through the ring itself.
        if evicted > 0 && !self.eviction_reported.swap(true, Relaxed) {
            warn!(
                capacity,
                evicted,
                read_cursor = read,
                "log ring overwrote unread records; consider increasing the buffer size"
            );
        }

        Ok(AppendStats {
            offset: place.start,
            len,
            evicted,
            wrapped: place.wrapped,
        })
    }

    // ---- drain -----------------------------------------------------------

    /// Claim the read cursor and snapshot the drain bound.
    pub(crate) fn begin_drain(&self) -> Result<DrainState> {
        let header = self.header();
        let _guard = header.lock.lock();
        if header.reader_active.swap(true, Acquire) {
            return Err(LogRingError::ConsumerBusy);
        }
        Ok(DrainState {
            until: header.write_cursor.load(Relaxed) as usize,
            // the wrap counts as reported from here on
            was_wrapped: header.wrapped.swap(false, Relaxed),
            done: false,
        })
    }

    /// Copy out the next record inside the drain bound, if any.
    pub(crate) fn drain_next(
        &self,
        state: &mut DrainState,
        scratch: &mut Vec<u8>,
    ) -> Option<Result<DecodedRecord>> {
        if state.done {
            return None;
        }

        let offset = match self.copy_next(state, scratch) {
            Ok(Some(offset)) => offset,
            Ok(None) => {
                state.done = true;
                return None;
            }
            Err(e) => {
                state.done = true;
                return Some(Err(e));
            }
        };

        let decoded = codec::decode(scratch).map_err(|e| match e {
            LogRingError::Corrupted { total_len, .. } => self.corrupted(offset, total_len),
            other => other,
        });
        if decoded.is_err() {
            state.done = true;
        }
        Some(decoded)
    }

    /// Under the lock: skip abandoned tails, copy one record into `scratch`
    /// and advance the read cursor past it. Returns the record's offset.
    fn copy_next(&self, state: &mut DrainState, scratch: &mut Vec<u8>) -> Result<Option<usize>> {
        let header = self.header();
        let _guard = header.lock.lock();
        let capacity = header.capacity.load(Relaxed) as usize;

        loop {
            let read = header.read_cursor.load(Relaxed) as usize;
            let write = header.write_cursor.load(Relaxed) as usize;

            let pending = (!state.was_wrapped && read < state.until)
                || (state.was_wrapped && read > state.until);
            // read == write: a producer evicted everything we were heading for
            if !pending || read == write {
                return Ok(None);
            }

            match self.step(capacity, read, write)? {
                Step::Skip => {
                    header.read_cursor.store(0, Relaxed);
                    state.was_wrapped = false;
                }
                Step::Record { len, next } => {
                    unsafe { self.copy_out(read, capacity, len, scratch) };
                    if next < read {
                        state.was_wrapped = false;
                    }
                    header.read_cursor.store(next as u64, Relaxed);
                    return Ok(Some(read));
                }
            }
        }
    }

    /// Release the read cursor. A drain that stopped before crossing the
    /// physical end hands the wrap back so the next drain still follows it.
    pub(crate) fn end_drain(&self, state: &DrainState) {
        let header = self.header();
        let _guard = header.lock.lock();
        let read = header.read_cursor.load(Relaxed);
        let write = header.write_cursor.load(Relaxed);
        if state.was_wrapped && read > write {
            header.wrapped.store(true, Relaxed);
        }
        header.reader_active.store(false, Release);
    }

    // ---- administration ---------------------------------------------------

    /// Discard everything unread.
    ///
    /// Also releases the read cursor, so a drain that never ended (leaked,
    /// or held by a process that died) no longer blocks every consumer.
    pub fn reset(&self) {
        let header = self.header();
        let _guard = header.lock.lock();
        header.read_cursor.store(0, Relaxed);
        header.write_cursor.store(0, Relaxed);
        header.wrapped.store(false, Relaxed);
        let was_draining = header.reader_active.swap(false, Release);
        debug!(was_draining, "log ring reset");
    }

    /// Reduce the capacity of an empty ring. Growing needs a new segment.
    pub fn shrink(&self, new_capacity: usize) -> Result<usize> {
        let requested = new_capacity;
        let new_capacity = align_down(new_capacity);
        let reject = |reason| LogRingError::ShrinkRejected { requested, reason };

        let header = self.header();
        let _guard = header.lock.lock();
        if new_capacity < RECORD_HEADER_LEN {
            return Err(reject("smaller than one record header"));
        }
        if new_capacity as u64 > header.initial_capacity {
            return Err(reject("a ring cannot grow past its initial capacity"));
        }
        if header.read_cursor.load(Relaxed) != header.write_cursor.load(Relaxed) {
            return Err(reject("the ring still holds unread records"));
        }

        header.capacity.store(new_capacity as u64, Relaxed);
        header.read_cursor.store(0, Relaxed);
        header.write_cursor.store(0, Relaxed);
        header.wrapped.store(false, Relaxed);
        debug!(capacity = new_capacity, "log ring shrunk");
        Ok(new_capacity)
    }

    // ---- raw access (lock held) -----------------------------------------

    /// Where the read cursor goes next from `read`. Fails if the stored
    /// length is impossible or would carry the cursor past `write`.
    fn step(&self, capacity: usize, read: usize, write: usize) -> Result<Step> {
        if read + RECORD_HEADER_LEN > capacity {
            return Ok(Step::Skip);
        }

        // Abandoned tails are always shorter than a header, so a zero word
        // here is damage like any other bad length.
        let total_len = unsafe { ptr::read_unaligned(self.data.add(read) as *const u32) };
        let len = validate_total_len(total_len, capacity, read)
            .map_err(|_| self.corrupted(read, total_len as usize))?;
        let mut next = read + len;
        if next >= capacity {
            next -= capacity;
        }
        if used(capacity, next, write) >= used(capacity, read, write) {
            return Err(self.corrupted(read, len));
        }
        Ok(Step::Record { len, next })
    }

    fn corrupted(&self, offset: usize, total_len: usize) -> LogRingError {
        error!(offset, total_len, "log ring data corrupted");
        LogRingError::Corrupted { offset, total_len }
    }

    /// Copy `bytes` to `pos`, continuing at offset 0 past the physical end.
    /// Returns the position after the last byte.
    ///
    /// # Safety
    /// Lock held; `pos < capacity` and `bytes.len() < capacity`.
    unsafe fn copy_in(&self, pos: usize, capacity: usize, bytes: &[u8]) -> usize {
        let room = capacity - pos;
        if bytes.len() < room {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.data.add(pos), bytes.len());
            pos + bytes.len()
        } else {
            let (first, second) = bytes.split_at(room);
            ptr::copy_nonoverlapping(first.as_ptr(), self.data.add(pos), first.len());
            ptr::copy_nonoverlapping(second.as_ptr(), self.data, second.len());
            second.len()
        }
    }

    /// Copy the `len`-byte record at `pos` into `out`, joining the two parts
    /// of a record that runs past the physical end.
    ///
    /// # Safety
    /// Lock held; `pos < capacity` and `len < capacity`.
    unsafe fn copy_out(&self, pos: usize, capacity: usize, len: usize, out: &mut Vec<u8>) {
        out.clear();
        let first = len.min(capacity - pos);
        out.extend_from_slice(std::slice::from_raw_parts(self.data.add(pos), first));
        if first < len {
            out.extend_from_slice(std::slice::from_raw_parts(self.data, len - first));
        }
    }
}
