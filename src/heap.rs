use core::{
    cell::UnsafeCell,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    arena::Arena,
    block::{BlockInfo, Header},
    chain::Chain,
    config::{Geometry, HeapConfig, Offset},
    critical::{CriticalSection, Interrupts, SharedCriticalSection},
    error::{Corruption, HeapError, Result},
    freelist::FreeList,
    utils::align_addr,
};

/// A heap over a single fixed arena.
///
/// `A` is where the bytes live, `O` the width of the offsets stored in the
/// block headers and `S` the critical section protecting every operation.
///
/// The block chain is laid over the arena by [`Heap::init`], or lazily by the
/// first call that needs it. From then on the arena is never resized and no
/// memory is ever handed back to anyone but the heap itself.
///
/// # Moving
///
/// Headers are linked by offset, so a heap that stores its arena inline (a
/// [`crate::StaticArena`]) may be moved after initialization: the chain is
/// found again from wherever the arena now lives. Pointers handed out before
/// the move point into the old location and are ignored by [`Heap::free`].
pub struct Heap<A, O = u16, S = Interrupts> {
    arena: A,
    config: HeapConfig,
    lock: S,
    /// Bytes between the arena start and the first header, `UNINIT` until
    /// the chain has been laid out.
    padding: AtomicUsize,
    free_list: UnsafeCell<FreeList<O>>,
}

const UNINIT: usize = usize::MAX;

// SAFETY: the chain and the free list are only reached inside the critical
// section, which `SharedCriticalSection` guarantees to be exclusive.
unsafe impl<A, O, S> Sync for Heap<A, O, S>
where
    A: Arena + Sync,
    O: Offset,
    S: SharedCriticalSection + Sync,
{
}

/// Usage figures of a heap, see [`Heap::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Aligned capacity, i.e. the offset of the end block.
    pub capacity: usize,
    pub used_blocks: usize,
    /// Payload bytes of used blocks, headers excluded.
    pub used_bytes: usize,
    pub free_blocks: usize,
    /// Payload bytes of free blocks, headers excluded.
    pub free_bytes: usize,
    /// Biggest request that can currently succeed.
    pub largest_free: usize,
    /// Offset of the lowest free block, or `capacity` when nothing is free.
    pub lowest_free: usize,
}

/// What [`Heap::trim`] did with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shrink {
    /// The block is not handed out, nothing to shrink.
    NotLive,
    Grow,
    Unchanged,
    /// The free successor moved down over the released tail.
    Absorbed,
    /// The tail became a new free block.
    Split,
    /// The tail is too small for a block of its own and stays attached.
    Kept,
}

impl<A, O: Offset, S> Heap<A, O, S> {
    /// Creates a heap over `arena`. Nothing is written to the arena until
    /// the heap is initialized.
    pub const fn new(arena: A, config: HeapConfig, lock: S) -> Self {
        Self {
            arena,
            config,
            lock,
            padding: AtomicUsize::new(UNINIT),
            free_list: UnsafeCell::new(FreeList::new()),
        }
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.padding.load(Ordering::Acquire) != UNINIT
    }
}

impl<A: Arena, O: Offset, S: CriticalSection> Heap<A, O, S> {
    /// Whether `ptr` may be the payload of a block: past the first header
    /// and before the end block. Only reads the arena bounds, never the
    /// chain, so it runs outside the critical section.
    fn contains(&self, ptr: *mut u8) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let Ok(geometry) = self.config.geometry::<O>() else {
            return false;
        };

        let begin = align_addr(self.arena.region().0, geometry.alignment) as usize;
        let addr = ptr as usize;

        addr >= begin + geometry.header && addr < begin + geometry.capacity
    }

    /// Lays the block chain over the arena: one free block spanning the
    /// whole capacity followed by the end block.
    ///
    /// Calling it on an initialized heap does nothing. It only has to be
    /// called to catch configuration errors early, since every allocation
    /// initializes the heap on first use.
    pub fn init(&self) -> Result<()> {
        self.locked(|_, _| ())
    }

    /// Lays out a fresh chain even if the heap is already initialized.
    ///
    /// # Safety
    ///
    /// Every pointer handed out before is invalidated: no allocation may be
    /// live, and none may be freed or trimmed afterwards.
    pub unsafe fn reset(&self) -> Result<()> {
        let geometry = self.config.geometry::<O>()?;
        self.lock.with(|| self.lay_out(&geometry).map(|_| ()))?;

        heap_log!(debug, "reset: capacity {} bytes", self.config.capacity());

        Ok(())
    }

    /// Runs `f` over the chain inside the critical section, laying the
    /// chain out first if needed.
    fn locked<R>(&self, f: impl FnOnce(&Chain<O>, &mut FreeList<O>) -> R) -> Result<R> {
        let geometry = self.config.geometry::<O>()?;

        let (fresh, result) = self.lock.with(|| -> Result<_> {
            let (fresh, begin) = match self.padding.load(Ordering::Acquire) {
                UNINIT => (true, self.lay_out(&geometry)?),
                padding => (false, self.find_chain(padding, &geometry)?),
            };

            // SAFETY: we are inside the critical section, nothing else
            // touches the chain or the free list until it ends.
            let chain = unsafe { Chain::new(begin, geometry) };
            let free_list = unsafe { &mut *self.free_list.get() };

            Ok((fresh, f(&chain, free_list)))
        })?;

        if fresh {
            heap_log!(
                debug,
                "init: capacity {} bytes, alignment {}, {}-bit offsets",
                self.config.capacity(),
                self.config.alignment(),
                O::BITS
            );
        }

        Ok(result)
    }

    /// Validates the arena, then writes a fresh chain. Must run inside the
    /// critical section.
    fn lay_out(&self, geometry: &Geometry) -> Result<NonNull<u8>> {
        let (base, len) = self.arena.region();

        if base.is_null() {
            return Err(HeapError::NullArena);
        }

        let required = self.config.arena_bytes::<O>();
        if len < required {
            return Err(HeapError::ArenaTooSmall {
                required,
                actual: len,
            });
        }

        let begin = NonNull::new(align_addr(base, geometry.alignment)).ok_or(HeapError::NullArena)?;

        // SAFETY: the arena holds `required` bytes, which covers the
        // alignment padding plus `capacity + header`.
        let chain = unsafe { Chain::<O>::new(begin, *geometry) };
        chain.lay_out();

        // SAFETY: inside the critical section.
        unsafe { &mut *self.free_list.get() }.reset(0);

        self.padding
            .store(begin.as_ptr() as usize - base as usize, Ordering::Release);

        Ok(begin)
    }

    /// Aligned base of a laid-out chain, taken from where the arena is now.
    ///
    /// Moving the heap moves the arena bytes with it. If the new address
    /// needs a different padding to reach the alignment, the chain is shifted
    /// to the new aligned base; offsets between headers stay the same. Must
    /// run inside the critical section.
    fn find_chain(&self, padding: usize, geometry: &Geometry) -> Result<NonNull<u8>> {
        let (base, _) = self.arena.region();
        let begin = NonNull::new(align_addr(base, geometry.alignment)).ok_or(HeapError::NullArena)?;
        let current = begin.as_ptr() as usize - base as usize;

        if current != padding {
            // SAFETY: both paddings are below the alignment and the arena
            // was validated to hold `capacity + header` bytes past either.
            unsafe {
                core::ptr::copy(
                    base.add(padding),
                    begin.as_ptr(),
                    geometry.capacity + geometry.header,
                );
            }

            self.padding.store(current, Ordering::Release);
        }

        Ok(begin)
    }

    /// Allocates a block of at least `size` bytes.
    ///
    /// The returned pointer is aligned to the configured alignment. Returns
    /// `None` for a zero-sized request, for a request bigger than the heap,
    /// when no free block is big enough, or when the heap cannot be
    /// initialized. It never waits for memory to be freed.
    pub fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            heap_log!(warn, "malloc(0) -> null");
            return None;
        }

        let result = self.locked(|chain, free_list| {
            let geometry = *chain.geometry();
            let size = geometry.round(size)?;
            let offset = free_list.find_free_block(chain, size)?;

            if geometry.can_split(chain.size_of(offset), size) {
                chain.split(offset, size);
            }
            // Near or exact fit: the next block is used (free blocks are
            // never adjacent), so the slack simply stays with this block.
            chain.set_used(offset, true);

            if offset == free_list.lowest() {
                free_list.advance(chain);
            }

            Some(chain.payload(offset))
        });

        match result {
            Ok(Some(ptr)) => {
                heap_log!(trace, "malloc({}) -> {:p}", size, ptr);
                Some(ptr)
            }
            Ok(None) => {
                heap_log!(warn, "malloc({}) -> null (out of memory)", size);
                None
            }
            Err(err) => {
                heap_log!(warn, "malloc({}) -> null ({})", size, err);
                None
            }
        }
    }

    /// Allocates room for `count` elements of `size` bytes and zeroes it.
    ///
    /// An overflowing `count * size` is rejected like any other request that
    /// cannot fit.
    pub fn calloc(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let Some(len) = count.checked_mul(size) else {
            heap_log!(warn, "calloc({}, {}) -> null (overflow)", count, size);
            return None;
        };

        let ptr = self.malloc(len)?;

        // SAFETY: `malloc` handed out at least `len` bytes.
        unsafe { ptr.as_ptr().write_bytes(0, len) };

        Some(ptr)
    }

    /// Gives a block back to the heap and merges it with free neighbours.
    ///
    /// Null pointers and pointers outside the arena are ignored, and so is a
    /// pointer whose block is already free.
    ///
    /// # Safety
    ///
    /// A non-null pointer inside the arena must have been returned by this
    /// heap. The `used` flag is the only guard: freeing a pointer whose block
    /// was handed out again frees the new owner's block.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        if !self.contains(ptr) {
            heap_log!(warn, "free({:p}) -> ignored (outside the arena)", ptr);
            return;
        }

        let freed = self.locked(|chain, free_list| {
            let offset = chain.offset_of(ptr);

            if !chain.is_used(offset) {
                return false;
            }

            chain.set_used(offset, false);
            free_list.lower_to(offset);
            chain.coalesce(offset, free_list);

            true
        });

        match freed {
            Ok(true) => heap_log!(trace, "free({:p})", ptr),
            _ => heap_log!(warn, "free({:p}) -> ignored (not in use)", ptr),
        }
    }

    /// Shrinks a block in place to at least `new_size` bytes and returns the
    /// same pointer.
    ///
    /// The released tail is handed to a free successor when there is one, or
    /// becomes a free block of its own when it can hold a header plus a
    /// minimum block. A smaller tail stays with the block.
    ///
    /// Returns `None` if `new_size` is larger than the block: growing is not
    /// supported and the block is left untouched. Pointers outside the arena
    /// and blocks that are not in use are returned unchanged.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::free`].
    pub unsafe fn trim(&self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        let geometry = self.config.geometry::<O>().ok()?;

        let Some(size) = geometry.round(new_size) else {
            heap_log!(warn, "trim({:p}, {}) -> null (larger than the heap)", ptr, new_size);
            return None;
        };

        if !self.contains(ptr.as_ptr()) {
            heap_log!(warn, "trim({:p}, {}) -> ignored (outside the arena)", ptr, new_size);
            return Some(ptr);
        }

        let shrink = self.locked(|chain, free_list| {
            let offset = chain.offset_of(ptr.as_ptr());

            if !chain.is_used(offset) {
                return Shrink::NotLive;
            }

            let current = chain.size_of(offset);
            if size > current {
                return Shrink::Grow;
            }
            if size == current {
                return Shrink::Unchanged;
            }

            let next = chain.next(offset);

            if !chain.is_used(next) {
                // Slide the free successor down so it starts right after the
                // shrunk payload. It was free before and still is, so there
                // is nothing new to merge.
                let moved = offset + geometry.header + size;
                let after = chain.next(next);

                free_list.retarget(next, moved);
                chain.write(moved, Header::new(after, offset, false));
                chain.set_next(offset, moved);
                chain.link_back(after, moved);

                Shrink::Absorbed
            } else if geometry.can_split(current, size) {
                let tail = chain.split(offset, size);
                free_list.lower_to(tail);

                Shrink::Split
            } else {
                Shrink::Kept
            }
        });

        match shrink {
            Ok(Shrink::Grow) => {
                heap_log!(warn, "trim({:p}, {}) -> null (cannot grow)", ptr, new_size);
                None
            }
            Ok(shrink) => {
                heap_log!(trace, "trim({:p}, {}) -> {:?}", ptr, new_size, shrink);
                Some(ptr)
            }
            Err(_) => Some(ptr),
        }
    }

    /// Payload capacity of a live block, which may exceed what was asked for
    /// because of rounding and unsplit slack.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::free`].
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        if !self.contains(ptr.as_ptr()) {
            return None;
        }

        self.locked(|chain, _| {
            let offset = chain.offset_of(ptr.as_ptr());

            chain.is_used(offset).then(|| chain.size_of(offset))
        })
        .ok()
        .flatten()
    }

    /// Current usage figures. A heap that cannot be initialized reports
    /// all zeroes.
    pub fn stats(&self) -> HeapStats {
        self.locked(|chain, free_list| {
            let mut stats = HeapStats {
                capacity: chain.end(),
                lowest_free: free_list.lowest(),
                ..HeapStats::default()
            };

            for block in chain.iter() {
                if block.used {
                    stats.used_blocks += 1;
                    stats.used_bytes += block.size;
                } else {
                    stats.free_blocks += 1;
                    stats.free_bytes += block.size;
                    stats.largest_free = stats.largest_free.max(block.size);
                }
            }

            stats
        })
        .unwrap_or_default()
    }

    /// Copies the block layout, in address order and without the end block,
    /// into `out`. Returns the total number of blocks, which may be larger
    /// than `out`.
    pub fn blocks(&self, out: &mut [BlockInfo]) -> usize {
        self.locked(|chain, _| {
            let mut count = 0;

            for block in chain.iter() {
                if let Some(slot) = out.get_mut(count) {
                    *slot = block;
                }
                count += 1;
            }

            count
        })
        .unwrap_or(0)
    }

    /// Walks the whole chain and verifies the heap invariants: blocks tile
    /// the arena in address order with consistent back-links, no two free
    /// blocks are adjacent, every payload holds a minimum block, the end
    /// block is used and self-linked, and the lowest-free cache names the
    /// first free block.
    pub fn check(&self) -> Result<()> {
        self.locked(verify)?
    }
}

fn verify<O: Offset>(chain: &Chain<O>, free_list: &mut FreeList<O>) -> Result<()> {
    let geometry = *chain.geometry();
    let end = chain.end();

    let corrupt = |offset, reason| Err(HeapError::Corrupt { offset, reason });

    let sentinel = chain.header(end);
    if !sentinel.is_used() || sentinel.next.to_usize() != end || sentinel.prev.to_usize() != end {
        return corrupt(end, Corruption::BadSentinel);
    }

    let mut offset = 0;
    let mut prev = 0;
    let mut prev_free = false;
    let mut first_free = None;

    // `next` strictly increases and is bounded by `end`, so this terminates.
    while offset != end {
        let header = chain.header(offset);
        let next = header.next.to_usize();

        if offset % geometry.alignment != 0 {
            return corrupt(offset, Corruption::Misaligned);
        }
        if next <= offset || next > end {
            return corrupt(offset, Corruption::OutOfOrder);
        }
        if header.prev.to_usize() != prev {
            return corrupt(offset, Corruption::BrokenBackLink);
        }
        if next < offset + geometry.header + geometry.min_block {
            return corrupt(offset, Corruption::Undersized);
        }

        let free = !header.is_used();
        if free && prev_free {
            return corrupt(offset, Corruption::AdjacentFree);
        }
        if free && first_free.is_none() {
            first_free = Some(offset);
        }

        prev_free = free;
        prev = offset;
        offset = next;
    }

    if free_list.lowest() != first_free.unwrap_or(end) {
        return corrupt(free_list.lowest(), Corruption::StaleLowestFree);
    }

    Ok(())
}
