use crate::Core::alloc::LogSegment;
use crate::Core::error::LogRingError;
use crate::Ring::guard::ReentrancyGuard;
use crate::Ring::subscribers::EventSubscriber;
use crate::Ring::Buffer::RingBuffer;
use crate::Ring::Record::ErrorRecord;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Predicate deciding whether an event is stored. Returning false drops it.
pub type RecordFilter = Arc<dyn Fn(&ErrorRecord<'_>) -> bool + Send + Sync>;

/// What happened to one event handed to [`Producer::append`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored; `evicted` unread records were overwritten to make room.
    Written { evicted: usize },
    /// The ring is switched off.
    Disabled,
    /// Dropped by the statement filter or the user predicate.
    Filtered,
    /// This thread is already inside an append; the nested event is dropped.
    Reentrant,
    /// The store refused the record (too large, or the ring is damaged).
    /// The reason has been logged.
    Rejected,
}

impl AppendOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, AppendOutcome::Written { .. })
    }
}

/// Writes diagnostic events into a log ring.
///
/// Any number of producers, in any number of threads or processes, may
/// append to the same segment. Appending never blocks on the consumer and
/// never fails from the caller's point of view: when the ring is full the
/// oldest unread records are overwritten.
pub struct Producer {
    segment: Arc<LogSegment>,
    line_number: AtomicU64,
    filter: RwLock<Option<RecordFilter>>,
}

impl Producer {
    pub fn new(segment: Arc<LogSegment>) -> Self {
        Self {
            segment,
            line_number: AtomicU64::new(0),
            filter: RwLock::new(None),
        }
    }

    /// Store one event.
    ///
    /// Fields excluded by the ring's field mask are dropped and the record is
    /// stamped with this producer's next log line number. Does not allocate.
    pub fn append(&self, record: &ErrorRecord<'_>) -> AppendOutcome {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return AppendOutcome::Reentrant;
        };

        let ring = self.ring();
        if !ring.is_enabled() {
            return AppendOutcome::Disabled;
        }
        if record.hide_statement && ring.ignores_statements() {
            return AppendOutcome::Filtered;
        }
        // Cloned out so a filter may replace itself.
        let filter = self.filter.read().clone();
        if let Some(filter) = filter {
            if !filter(record) {
                return AppendOutcome::Filtered;
            }
        }

        let mut record = record.masked(ring.included_fields());
        record.meta.log_line_number = self.line_number.fetch_add(1, Ordering::Relaxed) + 1;

        match ring.append(&record) {
            Ok(stats) => AppendOutcome::Written {
                evicted: stats.evicted,
            },
            Err(LogRingError::RecordTooLarge { len, max }) => {
                error!(len, max, level = %record.meta.level, "log record dropped: too large for the ring");
                AppendOutcome::Rejected
            }
            Err(e) => {
                // corruption is reported by the store itself
                debug!(error = %e, "log record dropped");
                AppendOutcome::Rejected
            }
        }
    }

    /// Install a predicate run before every append.
    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&ErrorRecord<'_>) -> bool + Send + Sync + 'static,
    {
        *self.filter.write() = Some(Arc::new(filter));
    }

    pub fn clear_filter(&self) {
        *self.filter.write() = None;
    }

    /// Line number of the last record this producer stored.
    pub fn line_number(&self) -> u64 {
        self.line_number.load(Ordering::Relaxed)
    }

    pub fn ring(&self) -> &RingBuffer {
        self.segment.ring()
    }

    pub fn segment(&self) -> &Arc<LogSegment> {
        &self.segment
    }

    /// Largest encoded record this producer can store right now.
    pub fn max_record_len(&self) -> usize {
        self.ring().max_record_len()
    }
}

impl EventSubscriber for Producer {
    fn on_event(&self, record: &ErrorRecord<'_>) {
        self.append(record);
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("segment", &self.segment.name())
            .field("line_number", &self.line_number())
            .field("filtered", &self.filter.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ring::Record::{ErrorLevel, Field};

    fn producer(capacity: usize) -> Producer {
        Producer::new(Arc::new(LogSegment::private(capacity).unwrap()))
    }

    #[test]
    fn line_numbers_count_stored_records_only() {
        let p = producer(4096);
        assert!(p.append(&ErrorRecord::new(ErrorLevel::Log, "one")).is_written());
        p.ring().set_enabled(false);
        assert_eq!(
            p.append(&ErrorRecord::new(ErrorLevel::Log, "off")),
            AppendOutcome::Disabled
        );
        p.ring().set_enabled(true);
        assert!(p.append(&ErrorRecord::new(ErrorLevel::Log, "two")).is_written());
        assert_eq!(p.line_number(), 2);
    }

    #[test]
    fn oversized_record_is_rejected_not_stored() {
        let p = producer(1024);
        let big = "x".repeat(2048);
        assert_eq!(
            p.append(&ErrorRecord::new(ErrorLevel::Error, &big)),
            AppendOutcome::Rejected
        );
        assert!(p.ring().is_empty());
    }

    #[test]
    fn nested_append_from_filter_is_reentrant() {
        let p = Arc::new(producer(4096));
        let inner = Arc::downgrade(&p);
        let nested = Arc::new(parking_lot::Mutex::new(None));
        let seen = nested.clone();
        p.set_filter(move |_| {
            if let Some(p) = inner.upgrade() {
                *seen.lock() = Some(p.append(&ErrorRecord::new(ErrorLevel::Log, "inner")));
            }
            true
        });

        assert!(p.append(&ErrorRecord::new(ErrorLevel::Log, "outer")).is_written());
        assert_eq!(*nested.lock(), Some(AppendOutcome::Reentrant));
        assert_eq!(p.ring().stats().appended, 1);
    }

    #[test]
    fn statement_echo_dropped_when_ignoring_statements() {
        let p = producer(4096);
        let mut record = ErrorRecord::new(ErrorLevel::Log, "statement: select 1")
            .with_field(Field::Query, "select 1");
        record.hide_statement = true;

        assert!(p.append(&record).is_written());
        p.ring().set_ignore_statements(true);
        assert_eq!(p.append(&record), AppendOutcome::Filtered);
        record.hide_statement = false;
        assert!(p.append(&record).is_written());
    }
}
