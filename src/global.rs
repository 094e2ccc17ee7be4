use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use crate::{arena::Arena, config::Offset, critical::CriticalSection, heap::Heap};

/// A heap can serve as the global allocator of a program:
///
/// ```no_run
/// use osmem::{Heap, HeapConfig, SpinLock, StaticArena};
///
/// const CONFIG: HeapConfig = HeapConfig::new(32 * 1024).with_alignment(8);
///
/// #[global_allocator]
/// static HEAP: Heap<StaticArena<{ CONFIG.arena_bytes::<u16>() }>, u16, SpinLock> =
///     Heap::new(StaticArena::new(), CONFIG, SpinLock::new());
///
/// fn main() {
///     let numbers = vec![1, 2, 3];
///     assert_eq!(numbers.len(), 3);
/// }
/// ```
///
/// Every block is aligned to the configured alignment and nothing more, so
/// layouts asking for a stricter alignment are refused with a null pointer.
unsafe impl<A: Arena, O: Offset, S: CriticalSection> GlobalAlloc for Heap<A, O, S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > self.config().alignment() {
            return ptr::null_mut();
        }

        self.malloc(layout.size().max(1))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > self.config().alignment() {
            return ptr::null_mut();
        }

        self.calloc(1, layout.size().max(1))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.free(ptr) }
    }

    /// Shrinking stays in place. Growing takes the provided allocate, copy
    /// and free path, since blocks never grow in place.
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(block) = NonNull::new(ptr) else {
            return ptr::null_mut();
        };

        if let Some(block) = unsafe { self.trim(block, new_size.max(1)) } {
            return block.as_ptr();
        }

        unsafe { Moving(self).realloc(ptr, layout, new_size) }
    }
}

/// Forwards `alloc` and `dealloc` to a heap and keeps the trait's own
/// `realloc`, which moves the block to a new allocation.
struct Moving<'a, H>(&'a H);

unsafe impl<H: GlobalAlloc> GlobalAlloc for Moving<'_, H> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { self.0.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.0.dealloc(ptr, layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::StaticArena, config::HeapConfig, critical::Unprotected};

    const CONFIG: HeapConfig = HeapConfig::new(256).with_alignment(8);

    fn heap() -> Heap<StaticArena<{ CONFIG.arena_bytes::<u16>() }>, u16, Unprotected> {
        Heap::new(StaticArena::new(), CONFIG, Unprotected)
    }

    #[test]
    fn alloc_and_dealloc() {
        let heap = heap();
        let layout = Layout::new::<u64>();

        unsafe {
            let ptr = heap.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % layout.align(), 0);

            ptr.cast::<u64>().write(0xDEAD_BEEF);
            assert_eq!(ptr.cast::<u64>().read(), 0xDEAD_BEEF);

            heap.dealloc(ptr, layout);
        }

        assert_eq!(heap.stats().used_blocks, 0);
    }

    #[test]
    fn stricter_alignment_is_refused() {
        let heap = heap();
        let layout = Layout::from_size_align(32, 16).unwrap();

        unsafe {
            assert!(heap.alloc(layout).is_null());
            assert!(heap.alloc_zeroed(layout).is_null());
        }
    }

    #[test]
    fn alloc_zeroed_clears_reused_memory() {
        let heap = heap();
        let layout = Layout::array::<u8>(64).unwrap();

        unsafe {
            let dirty = heap.alloc(layout);
            dirty.write_bytes(0xFF, 64);
            heap.dealloc(dirty, layout);

            let ptr = heap.alloc_zeroed(layout);
            let bytes = core::slice::from_raw_parts(ptr, 64);
            assert!(bytes.iter().all(|&byte| byte == 0));
        }
    }

    #[test]
    fn realloc_shrinks_in_place() {
        let heap = heap();
        let layout = Layout::array::<u8>(128).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            let shrunk = heap.realloc(ptr, layout, 16);

            assert_eq!(shrunk, ptr);
            assert_eq!(heap.usable_size(NonNull::new(shrunk).unwrap()), Some(16));
        }

        heap.check().unwrap();
    }

    #[test]
    fn realloc_grows_by_moving() {
        let heap = heap();
        let layout = Layout::array::<u8>(16).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            for i in 0..16 {
                ptr.add(i).write(i as u8);
            }
            // Pin the successor so the block cannot be reused for growth.
            let _pin = heap.alloc(layout);

            let grown = heap.realloc(ptr, layout, 64);
            assert!(!grown.is_null());
            assert_ne!(grown, ptr);

            let bytes = core::slice::from_raw_parts(grown, 16);
            assert!(bytes.iter().enumerate().all(|(i, &byte)| byte == i as u8));
        }

        heap.check().unwrap();
        assert_eq!(heap.stats().used_blocks, 2);
    }

    #[test]
    fn realloc_growth_frees_the_old_block() {
        let heap = heap();
        let layout = Layout::array::<u8>(16).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            let _pin = heap.alloc(layout);

            let grown = heap.realloc(ptr, layout, 40);
            assert_eq!(heap.usable_size(NonNull::new(ptr).unwrap()), None);
            assert_eq!(heap.usable_size(NonNull::new(grown).unwrap()), Some(40));

            // The freed slot is first fit again.
            assert_eq!(heap.alloc(layout), ptr);
        }

        heap.check().unwrap();
    }

    #[test]
    fn failed_realloc_keeps_the_block() {
        let heap = heap();
        let layout = Layout::array::<u8>(16).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            ptr.write(42);

            assert!(heap.realloc(ptr, layout, 4096).is_null());
            assert_eq!(ptr.read(), 42);

            heap.dealloc(ptr, layout);
        }

        assert_eq!(heap.stats().free_blocks, 1);
    }
}
