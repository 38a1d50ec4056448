pub mod SharedMemory;
pub mod alloc;
pub mod error;
pub mod futex;
pub mod lock;

pub use SharedMemory::{
    attach_shared_memory, create_new_shared_memory, create_shared_memory, heap_memory,
    remove_shared_memory, RawHandle, SharedMemoryBackend,
};
pub use alloc::LogSegment;
pub use lock::{ShmMutex, ShmMutexGuard};
