//! Build-time configuration of a heap: alignment, capacity, minimum block
//! size and the width of the offsets stored in every block header.

use core::{fmt::Debug, mem};

use crate::{
    block::Header,
    error::{HeapError, Result},
    utils::{align, checked_align},
};

/// Unsigned integer used for every offset stored in the block chain.
///
/// Offsets are the compact replacement for pointers inside the arena: a
/// 16-bit offset is enough for small heaps and keeps each header at a few
/// bytes. Use `u16` up to [`u16::MAX_CAPACITY`](Offset::MAX_CAPACITY) bytes
/// and `u32` above that.
pub trait Offset: Copy + Eq + Ord + Debug + Send + Sync + 'static {
    /// Offset of the first header.
    const ZERO: Self;

    /// Largest aligned capacity this width can address. The gap to the
    /// integer's maximum leaves room for alignment and the end block.
    const MAX_CAPACITY: usize;

    /// Number of bits in the offset, for diagnostics.
    const BITS: u32;

    /// Narrows `value`. Callers only pass offsets inside a validated arena.
    fn from_usize(value: usize) -> Self;

    fn to_usize(self) -> usize;
}

impl Offset for u16 {
    const ZERO: Self = 0;
    const MAX_CAPACITY: usize = 64_000;
    const BITS: u32 = u16::BITS;

    #[inline]
    fn from_usize(value: usize) -> Self {
        debug_assert!(value <= u16::MAX as usize);
        value as u16
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl Offset for u32 {
    const ZERO: Self = 0;
    const MAX_CAPACITY: usize = (u32::MAX - 65_535) as usize;
    const BITS: u32 = u32::BITS;

    #[inline]
    fn from_usize(value: usize) -> Self {
        debug_assert!(value <= u32::MAX as usize);
        value as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Heap configuration.
///
/// Every field has a `const fn` builder so a configuration can be a `const`
/// and size a static arena at compile time:
///
/// ```
/// use osmem::{HeapConfig, StaticArena};
///
/// const CONFIG: HeapConfig = HeapConfig::new(1024).with_alignment(8);
/// static ARENA: StaticArena<{ CONFIG.arena_bytes::<u16>() }> = StaticArena::new();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    capacity: usize,
    alignment: usize,
    min_block_size: usize,
}

impl HeapConfig {
    pub const DEFAULT_CAPACITY: usize = 512;
    pub const DEFAULT_ALIGNMENT: usize = 4;
    pub const DEFAULT_MIN_BLOCK_SIZE: usize = 16;

    /// Configuration for a heap of `capacity` bytes with the default
    /// alignment and minimum block size.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            alignment: Self::DEFAULT_ALIGNMENT,
            min_block_size: Self::DEFAULT_MIN_BLOCK_SIZE,
        }
    }

    /// Sets the alignment of every block and returned pointer. Must be a
    /// power of two; this is checked when the heap is initialized.
    pub const fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the smallest payload a block may have. Smaller values waste less
    /// space per allocation, larger ones keep tiny fragments out of the chain.
    pub const fn with_min_block_size(mut self, min_block_size: usize) -> Self {
        self.min_block_size = min_block_size;
        self
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub const fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    /// Size of one block header once padded to the alignment.
    pub const fn header_size<O: Offset>(&self) -> usize {
        align(mem::size_of::<Header<O>>(), self.alignment)
    }

    /// Bytes an arena must provide: the aligned capacity, the end block, one
    /// spare header and room to align the base address.
    pub const fn arena_bytes<O: Offset>(&self) -> usize {
        align(self.capacity, self.alignment) + 2 * self.header_size::<O>() + self.alignment
    }

    /// Checks the configuration against offset width `O` and returns the
    /// derived block geometry.
    pub(crate) fn geometry<O: Offset>(&self) -> Result<Geometry> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(HeapError::BadAlignment(self.alignment));
        }

        // Runtime configurations may hold any value, nothing here may overflow.
        let overflow = HeapError::CapacityOverflow {
            capacity: self.capacity,
            limit: O::MAX_CAPACITY,
        };

        let capacity = checked_align(self.capacity, self.alignment).ok_or(overflow)?;
        if capacity > O::MAX_CAPACITY {
            return Err(HeapError::CapacityOverflow {
                capacity,
                limit: O::MAX_CAPACITY,
            });
        }

        let header = checked_align(mem::size_of::<Header<O>>(), self.alignment).ok_or(overflow)?;
        let min_block = checked_align(self.min_block_size, self.alignment).unwrap_or(usize::MAX);
        let required = header.saturating_add(min_block);

        if capacity < required {
            return Err(HeapError::CapacityTooSmall { capacity, required });
        }

        Ok(Geometry {
            header,
            min_block,
            capacity,
            alignment: self.alignment,
        })
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Sizes derived from a validated [`HeapConfig`]. Every field is a multiple
/// of `alignment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Geometry {
    /// Padded header size.
    pub header: usize,
    /// Smallest payload of any block.
    pub min_block: usize,
    /// Offset of the end block.
    pub capacity: usize,
    pub alignment: usize,
}

impl Geometry {
    /// Rounds a request to a payload size, or `None` if it can never fit.
    /// Zero is rounded up to the minimum block like any other small request.
    #[inline]
    pub fn round(&self, size: usize) -> Option<usize> {
        if size > self.capacity {
            return None;
        }

        Some(core::cmp::max(align(size, self.alignment), self.min_block))
    }

    /// Whether a payload of `capacity` bytes can give away everything past
    /// `size` as a new block with its own header and a minimum payload.
    #[inline]
    pub fn can_split(&self, capacity: usize, size: usize) -> bool {
        capacity >= size + self.header + self.min_block
    }
}
