use crate::{chain::Chain, config::Offset, freelist::FreeList};

impl<O: Offset> Chain<O> {
    /// Merges the freshly freed block at `offset` with its free neighbours.
    ///
    /// Before this call no two adjacent blocks are free, so one merge forward
    /// and one backward are enough to restore that property.
    pub(crate) fn coalesce(&self, offset: usize, free_list: &mut FreeList<O>) {
        if self.is_used(offset) {
            return;
        }

        self.merge_with_next(offset, free_list);
        self.merge_with_prev(offset, free_list);
    }

    /// Absorbs the next block into the one at `offset` if the next one is
    /// free. The end block is always used, so it is never absorbed.
    pub(crate) fn merge_with_next(&self, offset: usize, free_list: &mut FreeList<O>) {
        let next = self.next(offset);

        if next == offset || next == self.end() || self.is_used(next) {
            return;
        }

        free_list.retarget(next, offset);

        let after = self.next(next);
        self.set_next(offset, after);
        self.link_back(after, offset);
    }

    /// Absorbs the block at `offset` into the previous one if that one is
    /// free. Returns the offset of the resulting block.
    pub(crate) fn merge_with_prev(&self, offset: usize, free_list: &mut FreeList<O>) -> usize {
        let prev = self.prev(offset);

        if prev == offset || self.is_used(prev) {
            return offset;
        }

        free_list.retarget(offset, prev);

        let next = self.next(offset);
        self.set_next(prev, next);
        self.link_back(next, prev);

        prev
    }
}

#[cfg(test)]
mod tests {
    use core::ptr::NonNull;

    use super::*;
    use crate::{block::BlockInfo, config::HeapConfig};

    /// Builds a chain of 4 blocks of 8 bytes each (header 8) over a
    /// 64 byte capacity, all of them used.
    fn with_four_blocks(test: impl FnOnce(&Chain<u16>, &mut FreeList<u16>)) {
        let mut buffer = [0u8; 72];
        let geometry = HeapConfig::new(64)
            .with_min_block_size(8)
            .geometry::<u16>()
            .unwrap();
        let base = NonNull::new(buffer.as_mut_ptr()).unwrap();
        let chain = unsafe { Chain::new(base, geometry) };

        chain.lay_out();
        for offset in [0, 16, 32] {
            chain.split(offset, 8);
        }
        for offset in [0, 16, 32, 48] {
            chain.set_used(offset, true);
        }

        let mut free_list = FreeList::new();
        free_list.reset(chain.end());

        test(&chain, &mut free_list);
    }

    fn layout(chain: &Chain<u16>) -> Vec<(usize, usize, bool)> {
        chain
            .iter()
            .map(|BlockInfo { offset, size, used }| (offset, size, used))
            .collect()
    }

    fn free(chain: &Chain<u16>, free_list: &mut FreeList<u16>, offset: usize) {
        chain.set_used(offset, false);
        free_list.lower_to(offset);
        chain.coalesce(offset, free_list);
    }

    #[test]
    fn isolated_free_does_not_merge() {
        with_four_blocks(|chain, free_list| {
            free(chain, free_list, 16);

            assert_eq!(
                layout(chain),
                vec![(0, 8, true), (16, 8, false), (32, 8, true), (48, 8, true)]
            );
            assert_eq!(free_list.lowest(), 16);
        });
    }

    #[test]
    fn merges_forward() {
        with_four_blocks(|chain, free_list| {
            free(chain, free_list, 32);
            free(chain, free_list, 16);

            assert_eq!(
                layout(chain),
                vec![(0, 8, true), (16, 24, false), (48, 8, true)]
            );
            assert_eq!(chain.prev(48), 16);
            assert_eq!(free_list.lowest(), 16);
        });
    }

    #[test]
    fn merges_backward() {
        with_four_blocks(|chain, free_list| {
            free(chain, free_list, 16);
            free(chain, free_list, 32);

            assert_eq!(
                layout(chain),
                vec![(0, 8, true), (16, 24, false), (48, 8, true)]
            );
            assert_eq!(chain.prev(48), 16);
            assert_eq!(free_list.lowest(), 16);
        });
    }

    #[test]
    fn merges_both_ways() {
        with_four_blocks(|chain, free_list| {
            free(chain, free_list, 0);
            free(chain, free_list, 32);
            free(chain, free_list, 16);

            assert_eq!(layout(chain), vec![(0, 40, false), (48, 8, true)]);
            assert_eq!(chain.prev(48), 0);
            assert_eq!(free_list.lowest(), 0);
        });
    }

    #[test]
    fn last_block_never_absorbs_end() {
        with_four_blocks(|chain, free_list| {
            free(chain, free_list, 48);

            assert_eq!(chain.next(48), 64);
            let end = chain.header(64);
            assert!(end.is_used());
            assert_eq!((end.next, end.prev), (64, 64));
        });
    }
}
