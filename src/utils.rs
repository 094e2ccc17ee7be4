//! This file contains the alignment helpers shared by the whole heap.
//! They don't particularly belong to any concrete module of the allocator.

/// It aligns `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` has to be a power of two. This is used to round request sizes,
/// header sizes and the configured capacity so that every offset we hand out
/// stays a multiple of the heap alignment.
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Like [`align`], but `None` instead of overflowing for values close to
/// `usize::MAX`.
pub const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(alignment - 1) {
        Some(padded) => Some(padded & !(alignment - 1)),
        None => None,
    }
}

/// Aligns a memory address so that `addr % alignment == 0`.
///
/// The arena may be handed to us at any address (a `[u8; N]` has alignment 1),
/// so the first header is placed at the first aligned address inside it.
#[inline]
pub fn align_addr(addr: *mut u8, alignment: usize) -> *mut u8 {
    let padding = align(addr as usize, alignment) - addr as usize;

    addr.wrapping_add(padding)
}
