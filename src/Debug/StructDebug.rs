use crate::Core::alloc::LogSegment;
use crate::Ring::Buffer::RingBuffer;
use std::fmt;

/// Debug function for LogSegment
///
/// Shows the segment name, header location, mapping size and whether the
/// header carries a valid magic number. The mapping itself stays opaque.
pub fn debug_log_segment(segment: &LogSegment, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LogSegment")
        .field("name", &segment.name())
        .field("shm", &"<opaque>")
        .field("header", &format_args!("{:p}", segment.header_ptr()))
        .field("size", &segment.size())
        .field("initialized", &segment.is_initialized())
        .field("ring", segment.ring())
        .finish()
}

/// Debug function for RingBuffer
///
/// Takes the ring lock once to report a consistent cursor snapshot.
pub fn debug_ring_buffer(buffer: &RingBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let position = buffer.position();
    let stats = buffer.stats();
    f.debug_struct("RingBuffer")
        .field("data", &format_args!("0x{:x}", buffer.data as usize))
        .field("capacity", &stats.capacity)
        .field("write", &position.write)
        .field("read", &position.read)
        .field("wrapped", &position.wrapped)
        .field("appended", &stats.appended)
        .field("evicted", &stats.evicted)
        .finish_non_exhaustive()
}
