mod builder;
mod consumer;
pub mod guard;
mod producer;
mod subscribers;

pub use builder::LogRingBuilder;
pub use consumer::{Consumer, Drain};
pub use producer::{AppendOutcome, Producer, RecordFilter};
pub use subscribers::{EventDispatcher, EventSubscriber, SubscriberId};

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::{AppendStats, Cursors, RingBuffer, RingStats}; // re-export for stable path
}

pub mod Record {
    pub mod Record;
    pub mod codec;
    pub mod level;
    pub use codec::{decode, encode, encoded_len, RECORD_ALIGN, RECORD_HEADER_LEN};
    pub use level::ErrorLevel;
    pub use Record::{DecodedRecord, ErrorRecord, Field, RecordHeader, RecordMeta, ALL_FIELDS};
}
