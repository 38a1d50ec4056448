// Record types: the borrowed record producers append, the fixed header that
// precedes every record in the ring, and the owned record a drain returns.

use super::level::ErrorLevel;
use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of variable-length text fields in a record.
pub const FIELD_COUNT: usize = 13;

/// Bitmask with every text field included.
pub const ALL_FIELDS: u32 = (1 << FIELD_COUNT) - 1;

const EMPTY: &[u8] = &[];

/// Variable-length fields, in the canonical order they are laid out after the
/// record header. Encode and decode both walk `Field::ALL`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Message,
    Detail,
    DetailLog,
    Hint,
    Context,
    Domain,
    ContextDomain,
    InternalQuery,
    ApplicationName,
    RemoteHost,
    CommandTag,
    VirtualTxid,
    Query,
}

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::Message,
        Field::Detail,
        Field::DetailLog,
        Field::Hint,
        Field::Context,
        Field::Domain,
        Field::ContextDomain,
        Field::InternalQuery,
        Field::ApplicationName,
        Field::RemoteHost,
        Field::CommandTag,
        Field::VirtualTxid,
        Field::Query,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit of this field in an inclusion mask.
    #[inline]
    pub fn bit(self) -> u32 {
        1 << self.index()
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Message => "message",
            Field::Detail => "detail",
            Field::DetailLog => "detail_log",
            Field::Hint => "hint",
            Field::Context => "context",
            Field::Domain => "domain",
            Field::ContextDomain => "context_domain",
            Field::InternalQuery => "internal_query",
            Field::ApplicationName => "application_name",
            Field::RemoteHost => "remote_host",
            Field::CommandTag => "command_tag",
            Field::VirtualTxid => "virtual_txid",
            Field::Query => "query",
        }
    }
}

/// Fixed header written at the start of every record in the ring.
/// ABI-stable; `total_len` must stay at offset 0 because eviction and drain
/// read only that word to step over a record.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordHeader {
    /// Size of the whole record, header and padding included. 0 = skip to start.
    pub total_len: u32,
    pub level: i32,
    pub log_time: i64,
    pub session_start: i64,
    pub log_line_number: u64,
    pub txid: u64,
    pub saved_errno: i32,
    pub sqlerrcode: i32,
    pub pid: u32,
    pub database_id: u32,
    pub user_id: u32,
    pub internal_pos: i32,
    pub query_pos: i32,
    /// Byte length of each text field, indexed by `Field::index`.
    pub field_lens: [u32; FIELD_COUNT],
}

/// Fixed metadata of a diagnostic event.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub level: ErrorLevel,
    pub saved_errno: i32,
    /// Numeric status code (SQLSTATE packed into an integer).
    pub sqlerrcode: i32,
    pub pid: u32,
    /// 0 when not connected to a database.
    pub database_id: u32,
    /// 0 for background processes without a session user.
    pub user_id: u32,
    /// Top-level transaction id, 0 outside a transaction.
    pub txid: u64,
    /// Microseconds since the Unix epoch.
    pub log_time: i64,
    pub session_start: i64,
    /// Per-producer sequence number, assigned on append.
    pub log_line_number: u64,
    pub internal_pos: i32,
    /// Cursor position inside `Field::Query`, 0 if unknown.
    pub query_pos: i32,
}

impl RecordMeta {
    /// Metadata stamped with the current time and process id.
    pub fn now(level: ErrorLevel) -> Self {
        Self {
            level,
            pid: std::process::id(),
            log_time: now_micros(),
            ..Default::default()
        }
    }
}

pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

/// A record as handed to `Producer::append`: metadata plus borrowed text.
/// Nothing is copied until the bytes land in the ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrorRecord<'a> {
    pub meta: RecordMeta,
    /// Marks an echo of the executed statement; dropped when the ring
    /// ignores statements. Not stored.
    pub hide_statement: bool,
    texts: [&'a [u8]; FIELD_COUNT],
}

impl Default for ErrorRecord<'_> {
    fn default() -> Self {
        Self::with_meta(RecordMeta::default())
    }
}

impl<'a> ErrorRecord<'a> {
    pub fn new(level: ErrorLevel, message: &'a str) -> Self {
        Self::with_meta(RecordMeta::now(level)).with_field(Field::Message, message)
    }

    pub fn with_meta(meta: RecordMeta) -> Self {
        Self {
            meta,
            hide_statement: false,
            texts: [EMPTY; FIELD_COUNT],
        }
    }

    pub fn with_field<T>(mut self, field: Field, value: &'a T) -> Self
    where
        T: AsRef<[u8]> + ?Sized,
    {
        self.texts[field.index()] = value.as_ref();
        self
    }

    pub fn set_field(&mut self, field: Field, value: &'a [u8]) {
        self.texts[field.index()] = value;
    }

    #[inline]
    pub fn field(&self, field: Field) -> &'a [u8] {
        self.texts[field.index()]
    }

    #[inline]
    pub fn fields(&self) -> &[&'a [u8]; FIELD_COUNT] {
        &self.texts
    }

    /// Copy with every field outside `included` emptied. Dropping the query
    /// also drops its cursor position.
    pub fn masked(&self, included: u32) -> Self {
        let mut out = *self;
        for field in Field::ALL {
            if included & field.bit() == 0 {
                out.texts[field.index()] = EMPTY;
            }
        }
        if included & Field::Query.bit() == 0 {
            out.meta.query_pos = 0;
        }
        out
    }

    pub fn to_decoded(&self) -> DecodedRecord {
        DecodedRecord {
            meta: self.meta,
            texts: std::array::from_fn(|i| self.texts[i].to_vec()),
        }
    }
}

/// An owned record copied out of the ring. Independent of the segment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedRecord {
    pub meta: RecordMeta,
    texts: [Vec<u8>; FIELD_COUNT],
}

impl DecodedRecord {
    pub(crate) fn from_parts(meta: RecordMeta, texts: [Vec<u8>; FIELD_COUNT]) -> Self {
        Self { meta, texts }
    }

    #[inline]
    pub fn field(&self, field: Field) -> &[u8] {
        &self.texts[field.index()]
    }

    /// Field as text; invalid UTF-8 is replaced.
    pub fn text(&self, field: Field) -> Cow<'_, str> {
        String::from_utf8_lossy(self.field(field))
    }

    pub fn message(&self) -> Cow<'_, str> {
        self.text(Field::Message)
    }

    pub fn level(&self) -> ErrorLevel {
        self.meta.level
    }
}

impl PartialEq<ErrorRecord<'_>> for DecodedRecord {
    fn eq(&self, other: &ErrorRecord<'_>) -> bool {
        self.meta == other.meta
            && Field::ALL
                .iter()
                .all(|&f| self.field(f) == other.field(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_bits_are_distinct() {
        let mask = Field::ALL.iter().fold(0u32, |acc, f| {
            assert_eq!(acc & f.bit(), 0);
            acc | f.bit()
        });
        assert_eq!(mask, ALL_FIELDS);
    }

    #[test]
    fn masked_drops_excluded_fields_and_query_pos() {
        let mut record = ErrorRecord::new(ErrorLevel::Error, "boom")
            .with_field(Field::Hint, "try again")
            .with_field(Field::Query, "select 1/0");
        record.meta.query_pos = 9;

        let masked = record.masked(ALL_FIELDS & !Field::Query.bit() & !Field::Hint.bit());
        assert_eq!(masked.field(Field::Message), b"boom");
        assert!(masked.field(Field::Hint).is_empty());
        assert!(masked.field(Field::Query).is_empty());
        assert_eq!(masked.meta.query_pos, 0);

        let kept = record.masked(ALL_FIELDS);
        assert_eq!(kept, record);
    }

    #[test]
    fn decoded_compares_with_borrowed() {
        let record = ErrorRecord::new(ErrorLevel::Notice, "hello").with_field(Field::Detail, "d");
        let owned = record.to_decoded();
        assert_eq!(owned, record);
        assert_eq!(owned.message(), "hello");
        assert_eq!(owned.level(), ErrorLevel::Notice);
    }
}
