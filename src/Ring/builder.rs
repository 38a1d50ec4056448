use super::{Consumer, Producer};
use crate::Core::alloc::LogSegment;
use crate::Core::error::{LogRingError, Result};
use crate::Ring::Record::{Field, ALL_FIELDS};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configures and opens a log ring.
///
/// Without a name the ring lives in private heap memory and is only useful
/// through [`LogRingBuilder::build_pair`]. With a name it lives in
/// `/dev/shm/<name>` and can be shared between processes. The toggles are
/// written into the segment when it is created; a process that attaches to
/// an existing segment keeps whatever the segment holds.
#[derive(Clone, Debug)]
pub struct LogRingBuilder {
    capacity: usize,
    name: Option<String>,
    enabled: bool,
    ignore_statements: bool,
    included_fields: u32,
}

impl Default for LogRingBuilder {
    fn default() -> Self {
        Self {
            capacity: 10 * 1024 * 1024, // 10MB default
            name: None,
            enabled: true,
            ignore_statements: false,
            included_fields: ALL_FIELDS,
        }
    }
}

impl LogRingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_ignore_statements(mut self, ignore: bool) -> Self {
        self.ignore_statements = ignore;
        self
    }

    /// Keep the query text and cursor position in stored records.
    pub fn with_query_fields(mut self, include: bool) -> Self {
        if include {
            self.included_fields |= Field::Query.bit();
        } else {
            self.included_fields &= !Field::Query.bit();
        }
        self
    }

    pub fn with_included_fields(mut self, mask: u32) -> Self {
        self.included_fields = mask & ALL_FIELDS;
        self
    }

    /// Attach to the named segment, creating it if it does not exist yet.
    ///
    /// A live segment is never truncated: creation is exclusive, and a
    /// producer that loses the race to create attaches to the winner's
    /// segment once it has been initialized.
    pub fn build_producer(self) -> Result<Producer> {
        let segment = match &self.name {
            Some(name) => self.attach_or_create(name)?,
            None => self.create()?,
        };
        Ok(Producer::new(Arc::new(segment)))
    }

    /// Attach to an existing named segment.
    pub fn build_consumer(self) -> Result<Consumer> {
        let name = self.name.as_deref().ok_or_else(|| {
            LogRingError::InvalidSegment("a consumer needs a segment name to attach to".into())
        })?;
        Ok(Consumer::new(Arc::new(LogSegment::attach(name)?)))
    }

    /// Create a fresh segment (truncating a named one) and return a producer
    /// and a consumer sharing it.
    pub fn build_pair(self) -> Result<(Producer, Consumer)> {
        let segment = Arc::new(self.create()?);
        Ok((Producer::new(segment.clone()), Consumer::new(segment)))
    }

    fn create(&self) -> Result<LogSegment> {
        let segment = match &self.name {
            Some(name) => LogSegment::new(self.capacity, name)?,
            None => LogSegment::private(self.capacity)?,
        };
        Ok(self.configure(segment))
    }

    fn attach_or_create(&self, name: &str) -> Result<LogSegment> {
        let deadline = Instant::now() + INIT_TIMEOUT;
        loop {
            let err = match LogSegment::attach(name) {
                Ok(segment) => return Ok(segment),
                Err(e) => e,
            };
            match err {
                LogRingError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                    match LogSegment::create_new(self.capacity, name) {
                        Ok(segment) => return Ok(self.configure(segment)),
                        Err(LogRingError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                            debug!(name, "segment appeared while creating it, attaching");
                        }
                        Err(e) => return Err(e),
                    }
                }
                // Its creator has not sized or stamped it yet.
                e if still_initializing(&e) => {
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    thread::sleep(INIT_POLL);
                }
                e => return Err(e),
            }
        }
    }

    fn configure(&self, segment: LogSegment) -> LogSegment {
        let ring = segment.ring();
        ring.set_enabled(self.enabled);
        ring.set_ignore_statements(self.ignore_statements);
        ring.set_included_fields(self.included_fields);
        segment
    }
}

/// How long a producer waits for another process to finish initializing a
/// segment before giving up on it.
const INIT_TIMEOUT: Duration = Duration::from_millis(500);
const INIT_POLL: Duration = Duration::from_millis(1);

fn still_initializing(err: &LogRingError) -> bool {
    match err {
        LogRingError::InvalidSegment(_) => true,
        LogRingError::Io(e) => e.kind() == io::ErrorKind::InvalidData,
        _ => false,
    }
}
