//! Error types for heap setup and integrity checks.
//!
//! Allocation itself never returns an error: running out of memory, asking
//! for zero bytes or trying to grow a block with [`crate::Heap::trim`] is
//! reported as `None`. These types only cover placing the arena and
//! verifying the block chain.

use thiserror::Error;

/// Errors that can occur while setting up or checking a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The arena handed to the heap starts at a null address.
    #[error("arena base address is null")]
    NullArena,

    /// The arena cannot hold the configured capacity plus headers and slack.
    #[error("arena of {actual} bytes is smaller than the {required} bytes the configuration needs")]
    ArenaTooSmall {
        /// Bytes the configuration needs.
        required: usize,
        /// Bytes the arena provides.
        actual: usize,
    },

    /// The configured alignment is zero or not a power of two.
    #[error("alignment {0} is not a power of two")]
    BadAlignment(usize),

    /// The aligned capacity does not fit the chosen offset width.
    #[error("capacity {capacity} exceeds the {limit} bytes the offset type can address")]
    CapacityOverflow {
        /// Aligned capacity in bytes.
        capacity: usize,
        /// Largest capacity the offset type supports.
        limit: usize,
    },

    /// The capacity cannot hold even one header plus a minimum block.
    #[error("capacity {capacity} is below the {required} bytes of a single block")]
    CapacityTooSmall {
        /// Aligned capacity in bytes.
        capacity: usize,
        /// Header plus minimum payload.
        required: usize,
    },

    /// The operating system refused to map an arena.
    #[error("failed to map an arena of {len} bytes")]
    MapFailed {
        /// Requested mapping length.
        len: usize,
    },

    /// The block chain violates one of the heap invariants.
    #[error("corrupt block chain at offset {offset}: {reason}")]
    Corrupt {
        /// Offset of the header where the walk stopped.
        offset: usize,
        /// Which invariant failed.
        reason: Corruption,
    },
}

/// The invariant a corrupt chain breaks, reported by [`crate::Heap::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Corruption {
    #[error("next offset does not move forward inside the arena")]
    OutOfOrder,

    #[error("previous offset does not point at the preceding header")]
    BrokenBackLink,

    #[error("two adjacent blocks are both free")]
    AdjacentFree,

    #[error("payload is smaller than the minimum block size")]
    Undersized,

    #[error("end block is not used and self-linked")]
    BadSentinel,

    #[error("lowest-free cache does not name the first free block")]
    StaleLowestFree,

    #[error("header is not aligned to the heap alignment")]
    Misaligned,
}

/// Result type for heap setup and checks.
pub type Result<T> = core::result::Result<T, HeapError>;
