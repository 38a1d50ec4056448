use super::level::ErrorLevel;
use super::Record::{DecodedRecord, ErrorRecord, RecordHeader, RecordMeta, FIELD_COUNT};
use crate::Core::error::{LogRingError, Result};
use std::mem::size_of;
use std::{ptr, slice};

/// Size of the fixed header in front of every record.
pub const RECORD_HEADER_LEN: usize = size_of::<RecordHeader>();

/// Records are padded to the platform word so every record, and therefore
/// every cursor, stays word aligned.
pub const RECORD_ALIGN: usize = size_of::<usize>();

/// `total_len` value reserved for "nothing here, continue at offset 0".
pub const SKIP_SENTINEL: u32 = 0;

#[inline]
pub const fn align_up(len: usize) -> usize {
    (len + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1)
}

#[inline]
pub const fn align_down(len: usize) -> usize {
    len & !(RECORD_ALIGN - 1)
}

/// Largest encoded record a ring of `capacity` bytes accepts.
#[inline]
pub fn max_record_len(capacity: usize) -> usize {
    capacity.saturating_sub(RECORD_HEADER_LEN)
}

/// Total bytes the record occupies in the ring, padding included.
pub fn encoded_len(record: &ErrorRecord<'_>) -> usize {
    align_up(RECORD_HEADER_LEN + record.fields().iter().map(|f| f.len()).sum::<usize>())
}

impl RecordHeader {
    pub fn for_record(record: &ErrorRecord<'_>, total_len: usize) -> Self {
        let meta = &record.meta;
        Self {
            total_len: total_len as u32,
            level: meta.level.code(),
            log_time: meta.log_time,
            session_start: meta.session_start,
            log_line_number: meta.log_line_number,
            txid: meta.txid,
            saved_errno: meta.saved_errno,
            sqlerrcode: meta.sqlerrcode,
            pid: meta.pid,
            database_id: meta.database_id,
            user_id: meta.user_id,
            internal_pos: meta.internal_pos,
            query_pos: meta.query_pos,
            field_lens: std::array::from_fn(|i| record.fields()[i].len() as u32),
        }
    }

    /// Read a header from the front of `bytes`, if there are enough of them.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_HEADER_LEN {
            return None;
        }
        // Every field is a plain integer, so any bit pattern is a valid header.
        Some(unsafe { ptr::read_unaligned(bytes.as_ptr() as *const RecordHeader) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        // repr(C) with no padding between or after fields (see tests/layout.rs)
        unsafe { slice::from_raw_parts(self as *const Self as *const u8, RECORD_HEADER_LEN) }
    }

    /// Sum of the text field lengths.
    pub fn payload_len(&self) -> usize {
        self.field_lens.iter().map(|&l| l as usize).sum()
    }

    pub fn meta(&self) -> Option<RecordMeta> {
        Some(RecordMeta {
            level: ErrorLevel::from_code(self.level)?,
            saved_errno: self.saved_errno,
            sqlerrcode: self.sqlerrcode,
            pid: self.pid,
            database_id: self.database_id,
            user_id: self.user_id,
            txid: self.txid,
            log_time: self.log_time,
            session_start: self.session_start,
            log_line_number: self.log_line_number,
            internal_pos: self.internal_pos,
            query_pos: self.query_pos,
        })
    }
}

/// Emit the record as a sequence of byte chunks: header first, then every
/// field in canonical order. Padding is not emitted.
pub(crate) fn write_chunks<F>(record: &ErrorRecord<'_>, total_len: usize, mut put: F)
where
    F: FnMut(&[u8]),
{
    let header = RecordHeader::for_record(record, total_len);
    put(header.as_bytes());
    for field in record.fields() {
        if !field.is_empty() {
            put(field);
        }
    }
}

/// Encode into a fresh buffer of exactly `encoded_len(record)` bytes.
pub fn encode(record: &ErrorRecord<'_>, max_len: usize) -> Result<Vec<u8>> {
    let total_len = encoded_len(record);
    if total_len > max_len || total_len > u32::MAX as usize {
        return Err(LogRingError::RecordTooLarge {
            len: total_len,
            max: max_len,
        });
    }

    let mut out = Vec::with_capacity(total_len);
    write_chunks(record, total_len, |chunk| out.extend_from_slice(chunk));
    out.resize(total_len, 0);
    Ok(out)
}

/// Check a `total_len` read from the ring at `offset`.
pub(crate) fn validate_total_len(total_len: u32, capacity: usize, offset: usize) -> Result<usize> {
    let len = total_len as usize;
    if len < RECORD_HEADER_LEN || len > max_record_len(capacity) || len % RECORD_ALIGN != 0 {
        return Err(LogRingError::Corrupted {
            offset,
            total_len: len,
        });
    }
    Ok(len)
}

/// Decode one record from the front of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<DecodedRecord> {
    let corrupted = |total_len: usize| LogRingError::Corrupted {
        offset: 0,
        total_len,
    };

    let header = RecordHeader::read_from(bytes).ok_or_else(|| corrupted(bytes.len()))?;
    let total_len = header.total_len as usize;
    if total_len < RECORD_HEADER_LEN
        || total_len > bytes.len()
        || RECORD_HEADER_LEN + header.payload_len() > total_len
    {
        return Err(corrupted(total_len));
    }
    let meta = header.meta().ok_or_else(|| corrupted(total_len))?;

    let mut offset = RECORD_HEADER_LEN;
    let texts: [Vec<u8>; FIELD_COUNT] = std::array::from_fn(|i| {
        let len = header.field_lens[i] as usize;
        let text = bytes[offset..offset + len].to_vec();
        offset += len;
        text
    });
    Ok(DecodedRecord::from_parts(meta, texts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ring::Record::Field;

    fn full_record() -> ErrorRecord<'static> {
        let mut record = ErrorRecord::new(ErrorLevel::Error, "division by zero")
            .with_field(Field::Detail, "detail text")
            .with_field(Field::DetailLog, "detail for the server log")
            .with_field(Field::Hint, "check the divisor")
            .with_field(Field::Context, "PL/pgSQL function f() line 3")
            .with_field(Field::Domain, "postgres-16")
            .with_field(Field::ContextDomain, "plpgsql-16")
            .with_field(Field::InternalQuery, "select 1/$1")
            .with_field(Field::ApplicationName, "psql")
            .with_field(Field::RemoteHost, "10.0.0.7")
            .with_field(Field::CommandTag, "SELECT")
            .with_field(Field::VirtualTxid, "3/17")
            .with_field(Field::Query, "select f();");
        record.meta.saved_errno = 22;
        record.meta.sqlerrcode = 0x0208_2000;
        record.meta.database_id = 16384;
        record.meta.user_id = 10;
        record.meta.txid = 7421;
        record.meta.session_start = 1_700_000_000_000_000;
        record.meta.log_line_number = 42;
        record.meta.internal_pos = 3;
        record.meta.query_pos = 8;
        record
    }

    #[test]
    fn header_len_is_word_aligned() {
        assert_eq!(RECORD_HEADER_LEN, 120);
        assert_eq!(RECORD_HEADER_LEN % RECORD_ALIGN, 0);
    }

    #[test]
    fn round_trip_every_field() {
        let record = full_record();
        let bytes = encode(&record, usize::MAX).unwrap();
        assert_eq!(bytes.len(), encoded_len(&record));
        assert_eq!(bytes.len() % RECORD_ALIGN, 0);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.text(Field::VirtualTxid), "3/17");
    }

    #[test]
    fn round_trip_header_only() {
        let record = ErrorRecord::with_meta(RecordMeta::now(ErrorLevel::Log));
        let bytes = encode(&record, usize::MAX).unwrap();
        assert_eq!(bytes.len(), RECORD_HEADER_LEN);
        assert_eq!(decode(&bytes).unwrap(), record);
    }

    #[test]
    fn length_is_header_plus_fields_rounded_up() {
        let record = ErrorRecord::new(ErrorLevel::Info, "abc");
        assert_eq!(encoded_len(&record), align_up(RECORD_HEADER_LEN + 3));
        assert_eq!(encoded_len(&record) - RECORD_HEADER_LEN, RECORD_ALIGN);
    }

    #[test]
    fn encode_rejects_oversized_record() {
        let message = "x".repeat(200);
        let record = ErrorRecord::new(ErrorLevel::Error, &message);
        let max = max_record_len(256);
        match encode(&record, max) {
            Err(LogRingError::RecordTooLarge { len, max: m }) => {
                assert_eq!(len, encoded_len(&record));
                assert_eq!(m, max);
            }
            other => panic!("expected RecordTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_truncated_span() {
        let bytes = encode(&full_record(), usize::MAX).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - RECORD_ALIGN]),
            Err(LogRingError::Corrupted { .. })
        ));
        assert!(matches!(
            decode(&bytes[..RECORD_HEADER_LEN - 1]),
            Err(LogRingError::Corrupted { .. })
        ));
    }

    #[test]
    fn decode_rejects_lengths_past_total() {
        let mut bytes = encode(&full_record(), usize::MAX).unwrap();
        let mut header = RecordHeader::read_from(&bytes).unwrap();
        header.field_lens[0] += 4096;
        bytes[..RECORD_HEADER_LEN].copy_from_slice(header.as_bytes());
        assert!(matches!(decode(&bytes), Err(LogRingError::Corrupted { .. })));
    }

    #[test]
    fn decode_rejects_unknown_level() {
        let mut bytes = encode(&full_record(), usize::MAX).unwrap();
        let mut header = RecordHeader::read_from(&bytes).unwrap();
        header.level = 99;
        bytes[..RECORD_HEADER_LEN].copy_from_slice(header.as_bytes());
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn stored_length_validation() {
        let capacity = 1024;
        assert!(validate_total_len(RECORD_HEADER_LEN as u32, capacity, 0).is_ok());
        assert!(validate_total_len(SKIP_SENTINEL, capacity, 0).is_err());
        assert!(validate_total_len((RECORD_HEADER_LEN + 1) as u32, capacity, 0).is_err());
        assert!(validate_total_len(capacity as u32, capacity, 0).is_err());
        assert!(validate_total_len(max_record_len(capacity) as u32, capacity, 0).is_ok());
    }
}
