use crate::config::Offset;

/// Value of [`Header::used`] for an occupied block.
pub(crate) const USED: u8 = 1;

/// This is the structure of a block header as it is stored inside the arena.
/// The payload is placed right after this header, once it has been padded to
/// the heap alignment.
///
/// ```text
/// +---------------------+ <------+  offset
/// |        next         |        |
/// +---------------------+        |
/// |        prev         |        | -> Header (padded)
/// +---------------------+        |
/// |      used (1b)      |        |
/// +---------------------+ <------+  offset + header size (returned pointer)
/// |       Content       |        |
/// |         ...         |        | -> Payload, `next - offset - header` bytes
/// |                     |        |
/// +---------------------+ <------+  next
/// ```
///
/// `next` and `prev` are offsets from the aligned arena base, not pointers.
/// That keeps a header at a handful of bytes and avoids a graph of raw
/// pointers between nodes. Headers are read and written as plain values at
/// their offset (see [`crate::chain::Chain`]).
///
/// `used` is a byte instead of a `bool` so that reading a header at a wrong
/// offset can never produce an invalid value.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header<O> {
    pub next: O,
    pub prev: O,
    pub used: u8,
}

impl<O: Offset> Header<O> {
    pub fn new(next: usize, prev: usize, used: bool) -> Self {
        Self {
            next: O::from_usize(next),
            prev: O::from_usize(prev),
            used: used as u8,
        }
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.used == USED
    }
}

/// Snapshot of a single block, as reported by [`crate::Heap::blocks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block header from the aligned arena base.
    pub offset: usize,
    /// Payload capacity in bytes, header excluded.
    pub size: usize,
    /// Whether the block is handed out.
    pub used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_stores_offsets() {
        let header = Header::<u16>::new(64, 8, true);

        assert_eq!(header.next, 64);
        assert_eq!(header.prev, 8);
        assert!(header.is_used());
        assert!(!Header::<u32>::new(0, 0, false).is_used());
    }

    #[test]
    fn only_the_used_value_marks_a_block_used() {
        let header = Header::<u16> {
            next: 0,
            prev: 0,
            used: 0xAA,
        };

        assert!(!header.is_used());
    }
}
