//! Backing storage for a heap.
//!
//! A heap manages exactly one arena for its whole life. The arena only has
//! to say where its bytes are; the heap aligns the base and lays the block
//! chain over it on initialization.

use core::cell::UnsafeCell;

/// A fixed region of memory a [`crate::Heap`] can manage.
///
/// The heap takes its arena by value, so one arena backs exactly one heap.
/// A shared reference is not an arena:
///
/// ```compile_fail
/// use osmem::{Heap, HeapConfig, StaticArena, Unprotected};
///
/// let arena = StaticArena::<84>::new();
/// let first = Heap::new(&arena, HeapConfig::new(64), Unprotected);
/// let second = Heap::new(&arena, HeapConfig::new(64), Unprotected);
///
/// assert_ne!(first.malloc(10), second.malloc(10));
/// ```
///
/// # Safety
///
/// `region` must return the same length on every call, and the same pointer
/// as long as the arena value is not moved. A moved arena must carry its
/// bytes along. The region must be valid for reads and writes of `len` bytes
/// for as long as the arena lives, and must not be accessed by anything but
/// the heap that owns the arena.
pub unsafe trait Arena {
    /// Start and length of the region. A null start means the region is not
    /// available and makes initialization fail.
    fn region(&self) -> (*mut u8, usize);
}

/// Statically reserved arena of `N` bytes.
///
/// Use [`crate::HeapConfig::arena_bytes`] to size it:
///
/// ```
/// use osmem::{Heap, HeapConfig, SpinLock, StaticArena};
///
/// const CONFIG: HeapConfig = HeapConfig::new(2048);
///
/// static HEAP: Heap<StaticArena<{ CONFIG.arena_bytes::<u16>() }>, u16, SpinLock> =
///     Heap::new(StaticArena::new(), CONFIG, SpinLock::new());
///
/// let ptr = HEAP.malloc(100).unwrap();
/// unsafe { HEAP.free(ptr.as_ptr()) };
/// ```
pub struct StaticArena<const N: usize> {
    memory: UnsafeCell<[u8; N]>,
}

impl<const N: usize> StaticArena<N> {
    pub const fn new() -> Self {
        Self {
            memory: UnsafeCell::new([0; N]),
        }
    }
}

impl<const N: usize> Default for StaticArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the buffer is only reached through `region`, and only the owning
// heap dereferences that pointer, inside its critical section.
unsafe impl<const N: usize> Sync for StaticArena<N> {}

unsafe impl<const N: usize> Arena for StaticArena<N> {
    fn region(&self) -> (*mut u8, usize) {
        (self.memory.get().cast(), N)
    }
}

/// Arena placed at an address chosen by the platform, for example a linker
/// section in external RAM.
pub struct ExternalArena {
    base: *mut u8,
    len: usize,
}

impl ExternalArena {
    /// Wraps `len` bytes starting at `base`.
    ///
    /// # Safety
    ///
    /// The region must satisfy the [`Arena`] contract: valid for reads and
    /// writes for the arena's lifetime and used by nothing else.
    pub const unsafe fn new(base: *mut u8, len: usize) -> Self {
        Self { base, len }
    }
}

// SAFETY: the region is exclusively owned by the heap, see `new`.
unsafe impl Send for ExternalArena {}
unsafe impl Sync for ExternalArena {}

unsafe impl Arena for ExternalArena {
    fn region(&self) -> (*mut u8, usize) {
        (self.base, self.len)
    }
}
