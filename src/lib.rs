// Module naming follows project convention (Core = shared memory plumbing, Ring = log ring engine)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Ring;
#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}

pub use Core::alloc::LogSegment;
pub use Core::error::{LogRingError, Result};
pub use Ring::Buffer::{AppendStats, Cursors, RingBuffer, RingStats};
pub use Ring::Record::{DecodedRecord, ErrorLevel, ErrorRecord, Field, RecordMeta};
pub use Ring::{
    AppendOutcome, Consumer, Drain, EventDispatcher, EventSubscriber, LogRingBuilder, Producer,
    RecordFilter, SubscriberId,
};
