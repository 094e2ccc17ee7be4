//! Mutual exclusion for heap operations.
//!
//! Every operation that touches the block chain runs as one indivisible step
//! inside [`CriticalSection::with`]. What "exclusive" means is up to the
//! platform: masking interrupts on a single core, a spin lock on several
//! cores, or nothing at all for a heap that never leaves one thread.

/// Capability to run a closure with concurrent heap callers excluded.
///
/// The section is released when the closure returns, on every path out of
/// it. The heap never enters the section again from inside the closure.
pub trait CriticalSection {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// Marker for critical sections that really exclude other threads and
/// interrupt handlers. A [`crate::Heap`] is `Sync` only with one of these.
///
/// # Safety
///
/// While one call to [`CriticalSection::with`] runs its closure, no other
/// call on the same value may run its closure, from any thread or interrupt
/// context.
pub unsafe trait SharedCriticalSection: CriticalSection {}

/// Critical section provided by the platform through the
/// [`critical_section`] crate, usually by disabling interrupts.
///
/// The platform (or a HAL crate) registers the implementation with
/// `critical_section::set_impl!`. Hosted builds can use the crate's `std`
/// feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interrupts;

impl CriticalSection for Interrupts {
    #[inline]
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_| f())
    }
}

// SAFETY: `critical_section::with` is a global, exclusive section.
unsafe impl SharedCriticalSection for Interrupts {}

/// Spin lock for multi-core targets and hosted programs.
pub struct SpinLock {
    inner: spin::Mutex<()>,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            inner: spin::Mutex::new(()),
        }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl CriticalSection for SpinLock {
    #[inline]
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }
}

// SAFETY: the guard is held for the whole closure.
unsafe impl SharedCriticalSection for SpinLock {}

/// No exclusion at all. A heap using it is not `Sync`, so it can only be
/// reached from the thread that owns it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unprotected;

impl CriticalSection for Unprotected {
    #[inline]
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }
}
