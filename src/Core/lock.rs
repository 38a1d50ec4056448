// Process-shared mutex whose whole state is one futex word, so it can be
// placed inside a shared memory header and used by every attached process.

use super::futex::{futex_wait, futex_wake};
use crossbeam_utils::Backoff;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
/// Locked, and at least one waiter may be asleep on the futex.
const CONTENDED: u32 = 2;

/// A mutex usable across processes.
///
/// The state word is the only field, and a zeroed word is a valid unlocked
/// mutex, so a freshly mapped segment needs no initialization. A process
/// that dies while holding the lock leaves it locked forever; recovering from
/// that is left to whoever owns the segment.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct ShmMutex {
    state: AtomicU32,
}

/// RAII guard; the lock is released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ShmMutexGuard<'a> {
    mutex: &'a ShmMutex,
}

impl ShmMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    #[inline]
    pub fn lock(&self) -> ShmMutexGuard<'_> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
        ShmMutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<ShmMutexGuard<'_>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .ok()
            .map(|_| ShmMutexGuard { mutex: self })
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Relaxed) != UNLOCKED
    }

    #[cold]
    fn lock_contended(&self) {
        // Critical sections are short memcpys; spin a little before sleeping.
        let backoff = Backoff::new();
        while !backoff.is_completed() {
            if self
                .state
                .compare_exchange_weak(UNLOCKED, LOCKED, Acquire, Relaxed)
                .is_ok()
            {
                return;
            }
            backoff.snooze();
        }

        // From here on we may sleep, so advertise a waiter by storing CONTENDED.
        while self.state.swap(CONTENDED, Acquire) != UNLOCKED {
            futex_wait(&self.state, CONTENDED);
        }
    }

    #[inline]
    fn unlock(&self) {
        if self.state.swap(UNLOCKED, Release) == CONTENDED {
            futex_wake(&self.state);
        }
    }
}

impl Drop for ShmMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;
    use std::sync::Arc;
    use std::thread;

    struct Counter {
        lock: ShmMutex,
        value: UnsafeCell<u64>,
    }
    unsafe impl Sync for Counter {}

    #[test]
    fn try_lock_fails_while_held() {
        let m = ShmMutex::new();
        let guard = m.lock();
        assert!(m.is_locked());
        assert!(m.try_lock().is_none());
        drop(guard);
        assert!(!m.is_locked());
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn excludes_concurrent_writers() {
        let counter = Arc::new(Counter {
            lock: ShmMutex::new(),
            value: UnsafeCell::new(0),
        });
        let threads = 8;
        let per_thread = 10_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        let _guard = counter.lock.lock();
                        unsafe { *counter.value.get() += 1 };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let _guard = counter.lock.lock();
        assert_eq!(unsafe { *counter.value.get() }, threads * per_thread);
    }
}
