use core::{marker::PhantomData, ptr::NonNull};

use crate::{
    block::{BlockInfo, Header},
    config::{Geometry, Offset},
};

/// The block chain: every header inside the arena, linked by offset in
/// address order and terminated by the end block.
///
/// ```text
///  offset 0                                                    capacity
/// +--------+---------+--------+-------------------+--------+----------+
/// | Header | payload | Header |      payload      | Header | payload  | End |
/// +--------+---------+--------+-------------------+--------+----------+-----+
///     |  ^               | ^                          | ^                 ^ |
///     +--|---- next -----+ |                          | |     next        | |
///        +---- prev -------+                          +-|-----------------+ |
///                                                       +----- prev --------+
/// ```
///
/// Blocks tile the arena with no gaps, so the payload capacity of a block is
/// simply `next - offset - header`. The end block sits at `capacity`, is
/// always used and points to itself in both directions.
///
/// `Chain` doesn't own the memory, it is a typed view built from the arena
/// base every time the heap enters its critical section. It never allocates:
/// headers are written straight into the arena at the offset they describe.
pub(crate) struct Chain<O> {
    base: NonNull<u8>,
    geometry: Geometry,
    marker: PhantomData<O>,
}

impl<O: Offset> Chain<O> {
    /// **SAFETY**: `base` must be valid for reads and writes of
    /// `geometry.capacity + geometry.header` bytes, and nothing else may
    /// access that memory while the chain is in use.
    pub unsafe fn new(base: NonNull<u8>, geometry: Geometry) -> Self {
        Self {
            base,
            geometry,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Offset of the end block.
    #[inline]
    pub fn end(&self) -> usize {
        self.geometry.capacity
    }

    #[inline]
    pub fn header(&self, offset: usize) -> Header<O> {
        debug_assert!(offset <= self.end());

        // SAFETY: offsets come from the chain itself and stay within
        // `[0, capacity]`, the header at `capacity` is the end block.
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<Header<O>>()
                .read_unaligned()
        }
    }

    #[inline]
    pub fn write(&self, offset: usize, header: Header<O>) {
        debug_assert!(offset <= self.end());

        // SAFETY: see `header`.
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<Header<O>>()
                .write_unaligned(header);
        }
    }

    #[inline]
    pub fn next(&self, offset: usize) -> usize {
        self.header(offset).next.to_usize()
    }

    #[inline]
    pub fn prev(&self, offset: usize) -> usize {
        self.header(offset).prev.to_usize()
    }

    #[inline]
    pub fn is_used(&self, offset: usize) -> bool {
        self.header(offset).is_used()
    }

    pub fn set_next(&self, offset: usize, next: usize) {
        let mut header = self.header(offset);
        header.next = O::from_usize(next);
        self.write(offset, header);
    }

    pub fn set_used(&self, offset: usize, used: bool) {
        let mut header = self.header(offset);
        header.used = used as u8;
        self.write(offset, header);
    }

    /// Points the back-link of the block at `offset` to `prev`. The end block
    /// stays self-linked, so it is never touched.
    pub fn link_back(&self, offset: usize, prev: usize) {
        if offset == self.end() {
            return;
        }

        let mut header = self.header(offset);
        header.prev = O::from_usize(prev);
        self.write(offset, header);
    }

    /// Payload capacity of the block at `offset`.
    #[inline]
    pub fn size_of(&self, offset: usize) -> usize {
        self.next(offset) - offset - self.geometry.header
    }

    /// Address handed to the user for the block at `offset`.
    #[inline]
    pub fn payload(&self, offset: usize) -> NonNull<u8> {
        // SAFETY: `offset + header` is inside the arena for every block
        // before the end block.
        unsafe { self.base.add(offset + self.geometry.header) }
    }

    /// Header offset of a payload address. The caller has already checked
    /// that the address lies inside the arena, past the first header.
    #[inline]
    pub fn offset_of(&self, payload: *mut u8) -> usize {
        payload as usize - self.base.as_ptr() as usize - self.geometry.header
    }

    /// Writes a fresh chain: one free block spanning the whole capacity,
    /// followed by the end block.
    pub fn lay_out(&self) {
        let end = self.end();

        // SAFETY: the chain covers exactly `capacity + header` bytes.
        unsafe {
            self.base
                .as_ptr()
                .write_bytes(0, end + self.geometry.header);
        }

        self.write(0, Header::new(end, 0, false));
        self.write(end, Header::new(end, end, true));
    }

    /// Splits the block at `offset` after `size` payload bytes. The remainder
    /// becomes a new free block inserted as the successor; its offset is
    /// returned. The caller has checked [`Geometry::can_split`].
    pub fn split(&self, offset: usize, size: usize) -> usize {
        let next = self.next(offset);
        let remainder = offset + self.geometry.header + size;

        self.write(remainder, Header::new(next, offset, false));
        self.set_next(offset, remainder);
        self.link_back(next, remainder);

        remainder
    }

    pub fn iter(&self) -> Iter<'_, O> {
        Iter {
            chain: self,
            current: 0,
        }
    }
}

/// Walks the chain in address order, end block excluded.
pub(crate) struct Iter<'a, O> {
    chain: &'a Chain<O>,
    current: usize,
}

impl<O: Offset> Iterator for Iter<'_, O> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current;

        if offset >= self.chain.end() {
            return None;
        }

        let header = self.chain.header(offset);
        let next = header.next.to_usize();

        // A chain that doesn't move forward would never terminate.
        if next <= offset {
            self.current = self.chain.end();
            return None;
        }

        self.current = next;

        Some(BlockInfo {
            offset,
            size: next - offset - self.chain.geometry.header,
            used: header.is_used(),
        })
    }
}
