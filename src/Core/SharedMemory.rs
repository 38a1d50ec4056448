// Shared memory backends for the log ring
// Named segments live in /dev/shm and are mapped MAP_SHARED so every process
// attached to the same name sees the same header and data region.

use std::alloc::{self, Layout};
use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

/// Alignment of every segment base; the ring header is `align(128)`.
pub const SEGMENT_ALIGN: usize = 128;

/// Shared memory backend trait for cross-platform memory mapping
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying handle
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor of a /dev/shm object (Linux)
    Fd(i32),
    /// Process-private heap allocation
    Heap,
}

/// Create (or truncate) a named shared memory region of `size` bytes.
///
/// The region is zero-filled by the kernel. An existing object with the same
/// name is truncated and reused, so callers that want to join a live segment
/// must use [`attach_shared_memory`] instead.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(size, name)?))
}

/// Create a named shared memory region of `size` bytes only if no object
/// with that name exists. Fails with [`io::ErrorKind::AlreadyExists`]
/// otherwise, leaving the existing object untouched.
#[cfg(target_os = "linux")]
pub fn create_new_shared_memory(
    size: usize,
    name: &str,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create_new(size, name)?))
}

/// Attach to an existing named shared memory region.
///
/// # Arguments
/// * `name` - Name of the region under /dev/shm
/// * `min_size` - Smallest acceptable size; the whole object is mapped
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach(name, min_size)?))
}

/// Remove a named region. Existing mappings stay valid until dropped.
#[cfg(target_os = "linux")]
pub fn remove_shared_memory(name: &str) -> io::Result<()> {
    match std::fs::remove_file(shm_path(name)) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn create_new_shared_memory(
    _size: usize,
    _name: &str,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn remove_shared_memory(_name: &str) -> io::Result<()> {
    Ok(())
}

/// Allocate a zeroed, process-private region. Used for rings that never
/// leave the current process (and by the tests).
pub fn heap_memory(size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(HeapMemory::new(size)?))
}

#[cfg(target_os = "linux")]
fn shm_path(name: &str) -> String {
    format!("/dev/shm/{}", name)
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    /// Create a new shared memory region using /dev/shm, truncating any
    /// object already there.
    pub fn create(size: usize, name: &str) -> io::Result<Self> {
        Self::open_sized(size, name, false)
    }

    /// Like [`LinuxSharedMemory::create`], but an existing object is an
    /// `AlreadyExists` error instead of being truncated.
    pub fn create_new(size: usize, name: &str) -> io::Result<Self> {
        Self::open_sized(size, name, true)
    }

    fn open_sized(size: usize, name: &str, exclusive: bool) -> io::Result<Self> {
        use std::fs::OpenOptions;
        use std::os::fd::{AsRawFd, IntoRawFd};
        use std::os::unix::fs::OpenOptionsExt;

        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Shared memory size must be non-zero",
            ));
        }

        let path = shm_path(name);
        let mut options = OpenOptions::new();
        options.read(true).write(true).mode(0o600);
        if exclusive {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let file = options
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to create shared memory file at {}: {}", path, e),
                )
            })?;

        if unsafe { libc::ftruncate(file.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let fd = file.into_raw_fd();
        let ptr = unsafe { Self::map(fd, size)? };
        Ok(Self { ptr, size, fd })
    }

    /// Map an existing /dev/shm object, checking it is at least `min_size` bytes.
    pub fn attach(name: &str, min_size: usize) -> io::Result<Self> {
        use std::fs::OpenOptions;
        use std::os::fd::IntoRawFd;

        let path = shm_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to open shared memory at {}: {}", path, e),
                )
            })?;

        let size = file.metadata()?.len() as usize;
        if size < min_size || size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Shared memory size too small: expected at least {} bytes, got {}",
                    min_size, size
                ),
            ));
        }

        let fd = file.into_raw_fd();
        let ptr = unsafe { Self::map(fd, size)? };
        Ok(Self { ptr, size, fd })
    }

    /// # Safety
    /// `fd` must be an open descriptor of an object at least `size` bytes long.
    /// On failure the descriptor is closed.
    unsafe fn map(fd: i32, size: usize) -> io::Result<NonNull<u8>> {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }
        // mmap never hands back a null mapping on success
        Ok(NonNull::new_unchecked(ptr as *mut u8))
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}

/// Zeroed heap block aligned like a mapping.
#[derive(Debug)]
pub struct HeapMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapMemory {}
unsafe impl Sync for HeapMemory {}

impl HeapMemory {
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Heap segment size must be non-zero",
            ));
        }
        let layout = Layout::from_size_align(size, SEGMENT_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("Failed to allocate {} bytes for heap segment", size),
            )
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapMemory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl SharedMemoryBackend for HeapMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }
}
