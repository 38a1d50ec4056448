// Per-thread reentrancy flag. An append that triggers code which appends
// again on the same thread (a subscriber, a tracing layer feeding the ring)
// must not recurse into the store.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static IN_APPEND: Cell<bool> = const { Cell::new(false) };
}

/// Held for the duration of one append on the current thread.
#[must_use]
pub struct ReentrancyGuard {
    // Tied to the thread whose flag it set.
    _not_send: PhantomData<*const ()>,
}

impl ReentrancyGuard {
    /// `None` if this thread is already inside an append.
    pub fn enter() -> Option<Self> {
        IN_APPEND.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(Self {
                    _not_send: PhantomData,
                })
            }
        })
    }

    pub fn is_active() -> bool {
        IN_APPEND.with(Cell::get)
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_APPEND.with(|flag| flag.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_enter_is_refused() {
        let outer = ReentrancyGuard::enter().expect("first entry");
        assert!(ReentrancyGuard::is_active());
        assert!(ReentrancyGuard::enter().is_none());
        drop(outer);
        assert!(!ReentrancyGuard::is_active());
        assert!(ReentrancyGuard::enter().is_some());
    }

    #[test]
    fn flag_is_per_thread() {
        let _outer = ReentrancyGuard::enter().expect("first entry");
        std::thread::spawn(|| {
            assert!(!ReentrancyGuard::is_active());
            assert!(ReentrancyGuard::enter().is_some());
        })
        .join()
        .unwrap();
    }
}
