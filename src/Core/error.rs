//! Error type shared by the segment, the store and the codec.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogRingError>;

#[derive(Error, Debug)]
pub enum LogRingError {
    /// The requested capacity cannot hold a single record header.
    #[error("ring capacity {requested} is too small: at least {minimum} bytes are required")]
    CapacityTooSmall { requested: usize, minimum: usize },

    /// A record would not fit in `capacity - header size`.
    #[error("encoded record of {len} bytes exceeds the {max} bytes a record may occupy")]
    RecordTooLarge { len: usize, max: usize },

    /// A stored length is impossible for this ring; the region is damaged.
    #[error("ring data corrupted at offset {offset}: stored length {total_len}")]
    Corrupted { offset: usize, total_len: usize },

    #[error("unknown error level: {0:?}")]
    UnknownLevel(String),

    #[error("cannot shrink ring to {requested} bytes: {reason}")]
    ShrinkRejected { requested: usize, reason: &'static str },

    /// Another drain holds the read cursor.
    #[error("another consumer is already draining this ring")]
    ConsumerBusy,

    #[error("invalid log ring segment: {0}")]
    InvalidSegment(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
