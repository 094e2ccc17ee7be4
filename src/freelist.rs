use crate::{chain::Chain, config::Offset};

/// Tracks the lowest free block of the chain.
///
/// Free blocks are not kept in a separate list: they are identified by the
/// `used` flag of their header while walking the chain. What we do keep is
/// the offset of the free block with the smallest address, so a first-fit
/// search never has to walk over the (usually fully used) front of the heap.
///
/// ```text
///                      lowest
///                        |
///                        v
/// +------+    +------+    +------+    +------+    +------+    +-----+
/// | Used | -> | Used | -> | Free | -> | Used | -> | Free | -> | End |
/// +------+    +------+    +------+    +------+    +------+    +-----+
/// ```
///
/// The cache is exact: after every heap operation it names the first free
/// block, or the end block if nothing is free.
pub(crate) struct FreeList<O> {
    lowest: O,
}

impl<O: Offset> FreeList<O> {
    pub const fn new() -> Self {
        Self { lowest: O::ZERO }
    }

    #[inline]
    pub fn lowest(&self) -> usize {
        self.lowest.to_usize()
    }

    #[inline]
    pub fn reset(&mut self, offset: usize) {
        self.lowest = O::from_usize(offset);
    }

    /// A block at `offset` just became free.
    #[inline]
    pub fn lower_to(&mut self, offset: usize) {
        if offset < self.lowest() {
            self.reset(offset);
        }
    }

    /// The block at `from` moved to `to` or was merged into it.
    #[inline]
    pub fn retarget(&mut self, from: usize, to: usize) {
        if self.lowest() == from {
            self.reset(to);
        }
    }

    /// The cached block was handed out: walk forward to the next free block,
    /// stopping at the end block.
    pub fn advance(&mut self, chain: &Chain<O>) {
        let mut offset = self.lowest();

        while chain.is_used(offset) && offset != chain.end() {
            offset = chain.next(offset);
        }

        self.reset(offset);
    }

    /// Returns the first free block, starting from the lowest one, whose
    /// payload can hold `size` bytes.
    ///
    /// This is the first-fit algorithm. The walk stops once a block would
    /// start past `capacity - size`: from there on not even the rest of the
    /// arena could hold the request.
    pub fn find_free_block(&self, chain: &Chain<O>, size: usize) -> Option<usize> {
        let limit = chain.end() - size;
        let mut offset = self.lowest();

        while offset < limit {
            if !chain.is_used(offset) && chain.size_of(offset) >= size {
                return Some(offset);
            }

            offset = chain.next(offset);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use core::ptr::NonNull;

    use super::*;
    use crate::config::HeapConfig;

    fn with_chain(test: impl FnOnce(&Chain<u16>)) {
        let mut buffer = [0u8; 72];
        let geometry = HeapConfig::new(64).geometry::<u16>().unwrap();
        let base = NonNull::new(buffer.as_mut_ptr()).unwrap();
        let chain = unsafe { Chain::new(base, geometry) };

        chain.lay_out();
        test(&chain);
    }

    #[test]
    fn first_fit_on_fresh_chain() {
        with_chain(|chain| {
            let free_list = FreeList::<u16>::new();

            assert_eq!(free_list.find_free_block(chain, 16), Some(0));
            assert_eq!(free_list.find_free_block(chain, 56), Some(0));
            // Not even the whole chain fits, the scan does not start.
            assert_eq!(free_list.find_free_block(chain, 64), None);
        });
    }

    #[test]
    fn skips_used_blocks() {
        with_chain(|chain| {
            chain.split(0, 16);
            chain.set_used(0, true);

            let free_list = FreeList::<u16>::new();
            assert_eq!(free_list.find_free_block(chain, 16), Some(24));
            assert_eq!(free_list.find_free_block(chain, 32), Some(24));
            assert_eq!(free_list.find_free_block(chain, 36), None);
        });
    }

    #[test]
    fn advance_walks_to_next_free_or_end() {
        with_chain(|chain| {
            let mut free_list = FreeList::<u16>::new();

            chain.split(0, 16);
            chain.set_used(0, true);
            free_list.advance(chain);
            assert_eq!(free_list.lowest(), 24);

            chain.set_used(24, true);
            free_list.advance(chain);
            assert_eq!(free_list.lowest(), 64);
        });
    }

    #[test]
    fn lower_and_retarget() {
        let mut free_list = FreeList::<u16>::new();
        free_list.reset(40);

        free_list.lower_to(48);
        assert_eq!(free_list.lowest(), 40);

        free_list.lower_to(24);
        assert_eq!(free_list.lowest(), 24);

        free_list.retarget(40, 8);
        assert_eq!(free_list.lowest(), 24);

        free_list.retarget(24, 8);
        assert_eq!(free_list.lowest(), 8);
    }
}
