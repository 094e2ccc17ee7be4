use core::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    arena::Arena,
    config::{HeapConfig, Offset},
    error::{HeapError, Result},
    utils::align,
};

/// Virtual memory page size of the computer. This is usually 4096, but we
/// can't know it at compile time, so it is asked once and cached here.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Marker type the platform-specific memory operations are implemented on.
pub(crate) struct Kernel;

/// This trait provides an abstraction over the operating system calls we
/// need to place an arena in its own pages. The heap itself has nothing to
/// do with the concrete APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { Kernel::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use core::{
        ffi::{c_int, c_void},
        ptr::NonNull,
    };
    use libc::{mmap, munmap, off_t, size_t};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = core::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use core::{ffi::c_void, mem::MaybeUninit, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

/// Arena living in its own pages, mapped from the operating system once when
/// it is created and handed back when it is dropped.
///
/// This is the hosted counterpart of a static arena: useful for tests and
/// tools that want a heap of a size chosen at run time. The heap never maps
/// more memory afterwards, and never returns single blocks to the system.
pub struct MappedArena {
    base: NonNull<u8>,
    len: usize,
}

impl MappedArena {
    /// Maps at least `len` bytes, rounded up to whole pages.
    pub fn new(len: usize) -> Result<Self> {
        let len = align(len.max(1), page_size());

        // SAFETY: a fresh anonymous mapping aliases nothing.
        let base = unsafe { Kernel::request_memory(len) }.ok_or(HeapError::MapFailed { len })?;

        Ok(Self { base, len })
    }

    /// Maps an arena big enough for `config` with offsets of type `O`.
    pub fn for_config<O: Offset>(config: &HeapConfig) -> Result<Self> {
        Self::new(config.arena_bytes::<O>())
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MappedArena {
    fn drop(&mut self) {
        // SAFETY: `base` and `len` are exactly what `request_memory` gave us.
        unsafe { Kernel::return_memory(self.base.as_ptr(), self.len) }
    }
}

// SAFETY: the mapping is private to this value.
unsafe impl Send for MappedArena {}
unsafe impl Sync for MappedArena {}

unsafe impl Arena for MappedArena {
    fn region(&self) -> (*mut u8, usize) {
        (self.base.as_ptr(), self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn mapped_arena_is_page_rounded_and_writable() {
        let arena = MappedArena::new(100).unwrap();
        let (base, len) = arena.region();

        assert_eq!(len, page_size());
        assert_eq!(base as usize % page_size(), 0);

        unsafe {
            base.write_bytes(0x5A, len);
            assert_eq!(*base.add(len - 1), 0x5A);
        }
    }

    #[test]
    fn mapped_arena_for_config() {
        let config = HeapConfig::new(100_000);
        let arena = MappedArena::for_config::<u32>(&config).unwrap();

        assert!(arena.len() >= config.arena_bytes::<u32>());
    }

    #[test]
    fn wide_heap_on_mapped_arena() {
        use crate::{critical::Unprotected, heap::Heap};

        let config = HeapConfig::new(100_000);
        let arena = MappedArena::for_config::<u32>(&config).unwrap();
        let heap: Heap<_, u32, Unprotected> = Heap::new(arena, config, Unprotected);

        let big = heap.malloc(70_000).unwrap();
        let small = heap.malloc(16).unwrap();
        assert!(small.as_ptr() as usize > big.as_ptr() as usize + 70_000);
        heap.check().unwrap();

        unsafe {
            heap.free(big.as_ptr());
            heap.free(small.as_ptr());
        }

        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 100_000 - 12);
    }
}
