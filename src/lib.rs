//! # osmem - fixed arena heap for small real-time kernels
//!
//! This crate provides the dynamic memory of a small kernel: one arena of
//! fixed size, reserved up front, managed as a first-fit list of blocks that
//! are split on allocation and merged back on free.
//!
//! ## Overview
//!
//! ```text
//!   Arena (aligned base)
//!
//!   ┌────────┬─────────┬────────┬──────────────┬────────┬──────────┬─────┐
//!   │ Header │ Used    │ Header │ Free         │ Header │ Used     │ End │
//!   └────────┴─────────┴────────┴──────────────┴────────┴──────────┴─────┘
//!   0                  ▲                                           ▲
//!                      └── lowest free block (search starts here)  └── capacity
//! ```
//!
//! - Block headers are linked by **offset** from the arena base, not by
//!   pointer. Offsets are `u16` for heaps up to 64,000 bytes and `u32` above.
//! - [`Heap::malloc`] walks the chain from the lowest free block and takes the
//!   first block big enough, splitting off the remainder when it can hold a
//!   header plus a minimum block.
//! - [`Heap::free`] merges the block with free neighbours, so two free blocks
//!   are never adjacent.
//! - [`Heap::trim`] shrinks a block in place. Growing is not supported.
//! - Every operation runs inside a [`CriticalSection`] and never waits:
//!   exhaustion is reported immediately as `None`.
//!
//! ## Quick Start
//!
//! ```rust
//! use osmem::{Heap, HeapConfig, StaticArena, Unprotected};
//!
//! const CONFIG: HeapConfig = HeapConfig::new(512);
//!
//! let heap: Heap<StaticArena<{ CONFIG.arena_bytes::<u16>() }>, u16, Unprotected> =
//!     Heap::new(StaticArena::new(), CONFIG, Unprotected);
//!
//! let ptr = heap.malloc(64).expect("fresh heap has room");
//! let ptr = unsafe { heap.trim(ptr, 16) }.expect("shrinking never fails");
//! unsafe { heap.free(ptr.as_ptr()) };
//!
//! assert!(heap.check().is_ok());
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   osmem
//!   ├── arena     - Arena trait, StaticArena, ExternalArena
//!   ├── kernel    - MappedArena over mmap / VirtualAlloc ("mapped" feature)
//!   ├── config    - HeapConfig, Offset widths
//!   ├── critical  - CriticalSection: Interrupts, SpinLock, Unprotected
//!   ├── heap      - Heap: init, malloc, calloc, free, trim, introspection
//!   ├── global    - GlobalAlloc adapter
//!   └── error     - HeapError
//! ```
//!
//! ## Features
//!
//! - `mapped` (default): [`MappedArena`], an arena in its own OS pages.
//! - `log` (default): operations are logged through the [`log`] facade under
//!   the `osmem` target. Turn it off when the heap is the global allocator
//!   and the installed logger allocates.
//!
//! ## Safety
//!
//! [`Heap::free`] and [`Heap::trim`] trust that the pointer they get was
//! returned by the same heap. The `used` flag of a block is the only guard:
//! freeing a pointer twice is a silent no-op only as long as the block has
//! not been handed out again.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "log")]
macro_rules! heap_log {
    ($level:ident, $($arg:tt)*) => {
        log::$level!(target: "osmem", $($arg)*)
    };
}

#[cfg(not(feature = "log"))]
macro_rules! heap_log {
    ($level:ident, $($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

pub mod arena;
mod block;
mod chain;
mod coalesce;
pub mod config;
pub mod critical;
pub mod error;
mod freelist;
mod global;
mod heap;
#[cfg(feature = "mapped")]
mod kernel;
pub mod utils;

pub use arena::{Arena, ExternalArena, StaticArena};
pub use block::BlockInfo;
pub use config::{HeapConfig, Offset};
pub use critical::{CriticalSection, Interrupts, SharedCriticalSection, SpinLock, Unprotected};
pub use error::{Corruption, HeapError};
pub use heap::{Heap, HeapStats};
#[cfg(feature = "mapped")]
pub use kernel::MappedArena;
