//! Segregated free-list index.
//!
//! Free blocks are threaded into doubly-linked lists through the two link
//! words at the start of their payload; this module owns only the flat table
//! of list heads, indexed by size class. Small sizes get one exact-fit class
//! per 8-byte step up to [`EXACT_LIMIT`]; larger sizes fall into a short
//! tail of power-of-two classes kept sorted by non-decreasing size, so the
//! first admissible entry during search is also the best fit.

use crate::layout::{self, ALIGN, MIN_BLOCK, NIL};
use crate::region::Region;

/// Largest block size served by the exact-fit classes.
pub const EXACT_LIMIT: usize = 256;
/// Number of exact-fit classes (block sizes 16, 24, ..., 256).
pub const EXACT_CLASSES: usize = (EXACT_LIMIT - MIN_BLOCK) / ALIGN + 1;
/// Total number of bins: the exact classes plus the power-of-two tail.
pub const BIN_COUNT: usize = EXACT_CLASSES + 7;

/// Maps a block size to its bin index.
///
/// Sizes at most [`EXACT_LIMIT`] map one-to-one onto the exact classes;
/// larger sizes halve their way into the power-of-two tail, capping at the
/// last bin.
#[must_use]
pub fn class_of(size: usize) -> usize {
    debug_assert!(size >= MIN_BLOCK && size % ALIGN == 0);
    if size <= EXACT_LIMIT {
        return (size - MIN_BLOCK) / ALIGN;
    }
    let mut class = EXACT_CLASSES - 1;
    let mut s = size;
    while class < BIN_COUNT - 1 && s > EXACT_LIMIT {
        s /= 2;
        class += 1;
    }
    class
}

/// Exact block size served by an exact-fit class.
#[must_use]
pub fn exact_class_size(class: usize) -> usize {
    debug_assert!(class < EXACT_CLASSES);
    MIN_BLOCK + class * ALIGN
}

/// Flat table of per-class list heads.
#[derive(Debug)]
pub struct FreeIndex {
    heads: [usize; BIN_COUNT],
}

impl FreeIndex {
    /// Creates an index with every class empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heads: [NIL; BIN_COUNT],
        }
    }

    /// Empties every class list.
    pub fn clear(&mut self) {
        self.heads = [NIL; BIN_COUNT];
    }

    /// The head table, for offline verification.
    #[must_use]
    pub fn heads(&self) -> &[usize; BIN_COUNT] {
        &self.heads
    }

    /// Links the free block at `bp` into its class.
    ///
    /// Exact classes push at the head (every member has the same size, so
    /// the most recently freed block is reused first). Power-of-two classes
    /// splice before the first member of equal or greater size, keeping the
    /// list non-decreasing.
    pub fn insert(&mut self, region: &mut Region, bp: usize) {
        let size = layout::block_size(region, bp);
        let class = class_of(size);
        if class < EXACT_CLASSES {
            self.push_front(region, class, bp);
            return;
        }

        let mut after = NIL;
        let mut cur = self.heads[class];
        while cur != NIL && layout::block_size(region, cur) < size {
            after = cur;
            cur = layout::link_next(region, cur);
        }
        layout::set_link_next(region, bp, cur);
        layout::set_link_prev(region, bp, after);
        if cur != NIL {
            layout::set_link_prev(region, cur, bp);
        }
        if after == NIL {
            self.heads[class] = bp;
        } else {
            layout::set_link_next(region, after, bp);
        }
    }

    fn push_front(&mut self, region: &mut Region, class: usize, bp: usize) {
        let head = self.heads[class];
        layout::set_link_next(region, bp, head);
        layout::set_link_prev(region, bp, NIL);
        if head != NIL {
            layout::set_link_prev(region, head, bp);
        }
        self.heads[class] = bp;
    }

    /// Removes the free block at `bp` from its class list.
    pub fn unlink(&mut self, region: &mut Region, bp: usize) {
        let class = class_of(layout::block_size(region, bp));
        let next = layout::link_next(region, bp);
        let prev = layout::link_prev(region, bp);
        if next != NIL {
            layout::set_link_prev(region, next, prev);
        }
        if prev != NIL {
            layout::set_link_next(region, prev, next);
        } else {
            self.heads[class] = next;
        }
    }

    /// Finds a free block of at least `size` bytes, or `None`.
    ///
    /// Starts at the class `size` maps to, skips entries too small to serve
    /// it, and advances class by class. Because power-of-two classes are
    /// sorted, the first admissible entry is the best fit in its class.
    #[must_use]
    pub fn find_fit(&self, region: &Region, size: usize) -> Option<usize> {
        let mut class = class_of(size);
        while class < BIN_COUNT {
            let mut cur = self.heads[class];
            while cur != NIL && layout::block_size(region, cur) < size {
                cur = layout::link_next(region, cur);
            }
            if cur != NIL {
                return Some(cur);
            }
            class += 1;
        }
        None
    }
}

impl Default for FreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a region holding free blocks of the given sizes, back to back
    /// after the 16-byte initial overhead, and returns their payloads.
    fn region_with_free_blocks(sizes: &[usize]) -> (Region, Vec<usize>) {
        let total: usize = 16 + sizes.iter().sum::<usize>() + 16;
        let mut region = Region::new(total.next_power_of_two());
        region.sbrk(total).unwrap();
        let mut payloads = Vec::new();
        let mut bp = 16;
        for &size in sizes {
            let tag = layout::pack(size, true, false);
            layout::write_header(&mut region, bp, tag);
            layout::write_footer(&mut region, bp, tag);
            payloads.push(bp);
            bp += size;
        }
        (region, payloads)
    }

    #[test]
    fn test_class_of_exact_range() {
        assert_eq!(class_of(16), 0);
        assert_eq!(class_of(24), 1);
        assert_eq!(class_of(256), EXACT_CLASSES - 1);
        for class in 0..EXACT_CLASSES {
            assert_eq!(class_of(exact_class_size(class)), class);
        }
    }

    #[test]
    fn test_class_of_power_tail_monotone_and_capped() {
        let mut last = 0;
        for size in [264, 512, 520, 1024, 2048, 4096, 16384, 1 << 20, 1 << 30] {
            let class = class_of(size);
            assert!(class >= EXACT_CLASSES - 1);
            assert!(class < BIN_COUNT);
            assert!(class >= last, "class mapping must be monotone in size");
            last = class;
        }
        assert_eq!(class_of(1 << 30), BIN_COUNT - 1);
    }

    #[test]
    fn test_exact_insert_is_lifo() {
        let (mut region, bps) = region_with_free_blocks(&[32, 32, 32]);
        let mut index = FreeIndex::new();
        for &bp in &bps {
            index.insert(&mut region, bp);
        }
        // Most recently inserted first.
        assert_eq!(index.find_fit(&region, 32), Some(bps[2]));
    }

    #[test]
    fn test_power_class_insert_keeps_sorted_order() {
        let (mut region, bps) = region_with_free_blocks(&[1024, 520, 768]);
        let mut index = FreeIndex::new();
        for &bp in &bps {
            index.insert(&mut region, bp);
        }
        let class = class_of(520);
        assert_eq!(class, class_of(768));
        assert_eq!(class, class_of(1024));

        let first = index.heads()[class];
        let second = layout::link_next(&region, first);
        let third = layout::link_next(&region, second);
        assert_eq!(layout::block_size(&region, first), 520);
        assert_eq!(layout::block_size(&region, second), 768);
        assert_eq!(layout::block_size(&region, third), 1024);
        assert_eq!(layout::link_next(&region, third), NIL);
    }

    #[test]
    fn test_unlink_head_middle_tail() {
        let (mut region, bps) = region_with_free_blocks(&[520, 768, 1024]);
        let mut index = FreeIndex::new();
        for &bp in &bps {
            index.insert(&mut region, bp);
        }
        let class = class_of(520);

        // Middle.
        index.unlink(&mut region, bps[1]);
        assert_eq!(index.heads()[class], bps[0]);
        assert_eq!(layout::link_next(&region, bps[0]), bps[2]);
        assert_eq!(layout::link_prev(&region, bps[2]), bps[0]);

        // Head.
        index.unlink(&mut region, bps[0]);
        assert_eq!(index.heads()[class], bps[2]);
        assert_eq!(layout::link_prev(&region, bps[2]), NIL);

        // Tail (now the only entry).
        index.unlink(&mut region, bps[2]);
        assert_eq!(index.heads()[class], NIL);
    }

    #[test]
    fn test_find_fit_skips_undersized_and_advances_classes() {
        let (mut region, bps) = region_with_free_blocks(&[24, 1024]);
        let mut index = FreeIndex::new();
        for &bp in &bps {
            index.insert(&mut region, bp);
        }
        // 32 has an empty exact class; search climbs into the power tail.
        assert_eq!(index.find_fit(&region, 32), Some(bps[1]));
        assert_eq!(index.find_fit(&region, 24), Some(bps[0]));
        assert_eq!(index.find_fit(&region, 2048), None);
    }

    #[test]
    fn test_find_fit_best_fit_within_power_class() {
        let (mut region, bps) = region_with_free_blocks(&[1000, 600]);
        let mut index = FreeIndex::new();
        for &bp in &bps {
            index.insert(&mut region, bp);
        }
        // Both live in the same sorted class; the smaller admissible one wins.
        assert_eq!(class_of(600), class_of(1000));
        assert_eq!(index.find_fit(&region, 584), Some(bps[1]));
        assert_eq!(index.find_fit(&region, 608), Some(bps[0]));
    }

    #[test]
    fn test_clear_empties_every_class() {
        let (mut region, bps) = region_with_free_blocks(&[32, 512]);
        let mut index = FreeIndex::new();
        for &bp in &bps {
            index.insert(&mut region, bp);
        }
        index.clear();
        assert!(index.heads().iter().all(|&h| h == NIL));
    }
}
