//! Offline heap invariant verifier.
//!
//! Walks the physical block chain and every class list, validating the full
//! set of structural invariants: sentinel integrity, alignment, tag
//! consistency, previous-allocation bits, coalescing completeness, bin
//! membership, class ranges, ordering, and link reciprocity. Used by tests
//! and the replay harness; never called on the hot path.

use std::collections::HashSet;

use thiserror::Error;

use crate::bins::{EXACT_CLASSES, class_of, exact_class_size};
use crate::heap::Heap;
use crate::layout::{
    self, ALIGN, FIRST_PAYLOAD, MIN_BLOCK, NIL, TAG, WORD, pack, tag_alloc, tag_prev_alloc,
    tag_size,
};

/// First invariant violation found in a heap.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// The prologue sentinel words were overwritten.
    #[error("prologue sentinel corrupted")]
    BadPrologue,
    /// A zero-size tag appeared somewhere other than the region end, or the
    /// end tag is malformed.
    #[error("epilogue tag at offset {at} is corrupt or misplaced")]
    BadEpilogue {
        /// Offset of the offending tag.
        at: usize,
    },
    /// A block payload is not 8-aligned.
    #[error("block at {at} is not aligned")]
    Misaligned {
        /// Payload offset of the block.
        at: usize,
    },
    /// A block size is below the minimum, not a multiple of 8, or runs past
    /// the region end.
    #[error("block at {at} has invalid size {size}")]
    BadSize {
        /// Payload offset of the block.
        at: usize,
        /// Size read from its header.
        size: usize,
    },
    /// A free block's header and footer disagree.
    #[error("free block at {at}: header {header:#x} != footer {footer:#x}")]
    FooterMismatch {
        /// Payload offset of the block.
        at: usize,
        /// Header tag.
        header: u32,
        /// Footer tag.
        footer: u32,
    },
    /// A block's previous-allocation bit disagrees with its predecessor's
    /// allocation bit.
    #[error("block at {at}: previous-allocation bit disagrees with predecessor")]
    PrevBitMismatch {
        /// Payload offset of the block.
        at: usize,
    },
    /// Two physically adjacent blocks are both free.
    #[error("adjacent free blocks at {first} and {second}")]
    AdjacentFree {
        /// Payload offset of the earlier block.
        first: usize,
        /// Payload offset of the later block.
        second: usize,
    },
    /// A class list links an offset that is not a free block.
    #[error("bin {class} links offset {at}, which is not a free block")]
    BinnedNotFree {
        /// Bin index.
        class: usize,
        /// Linked offset.
        at: usize,
    },
    /// A class list holds a block whose size maps to a different class.
    #[error("bin {class} holds block at {at} of size {size}, outside its range")]
    WrongClass {
        /// Bin index.
        class: usize,
        /// Payload offset of the block.
        at: usize,
        /// Size read from its header.
        size: usize,
    },
    /// A class list is not sorted by non-decreasing size.
    #[error("bin {class} is not sorted at {at}")]
    UnsortedBin {
        /// Bin index.
        class: usize,
        /// Payload offset of the out-of-order block.
        at: usize,
    },
    /// A class list has a cycle or inconsistent next/prev links.
    #[error("bin {class} has inconsistent links at {at}")]
    BadLinks {
        /// Bin index.
        class: usize,
        /// Payload offset where the inconsistency was found.
        at: usize,
    },
    /// The physical free-block count disagrees with the binned count.
    #[error("free-block count mismatch: {physical} physical, {binned} binned")]
    CountMismatch {
        /// Maximal free runs found by the physical walk.
        physical: usize,
        /// Blocks found across all class lists.
        binned: usize,
    },
}

/// Summary of a heap that passed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapReport {
    /// Total blocks between the sentinels.
    pub block_count: usize,
    /// Blocks currently allocated.
    pub allocated_blocks: usize,
    /// Blocks currently free (equals the maximal free runs in the region).
    pub free_blocks: usize,
    /// Total bytes held by free blocks.
    pub free_bytes: usize,
    /// Largest single free block.
    pub largest_free: usize,
    /// Current region size.
    pub region_bytes: usize,
}

/// Verifies every structural invariant of `heap`.
///
/// Returns a summary on success or the first violation found.
pub fn check_heap(heap: &Heap) -> Result<HeapReport, CheckError> {
    let region = heap.region();
    let hi = region.hi();

    let prologue = pack(WORD, true, true);
    if region.read_word(4) != prologue || region.read_word(8) != prologue {
        return Err(CheckError::BadPrologue);
    }

    let mut report = HeapReport {
        block_count: 0,
        allocated_blocks: 0,
        free_blocks: 0,
        free_bytes: 0,
        largest_free: 0,
        region_bytes: hi,
    };
    let mut free_set = HashSet::new();
    let mut prev_allocated = true;
    let mut prev_free_at: Option<usize> = None;
    let mut bp = FIRST_PAYLOAD;

    loop {
        let tag = region.read_word(bp - TAG);
        let size = tag_size(tag);
        if size == 0 {
            // Must be the epilogue: at the region end, allocated, with a
            // previous-allocation bit matching the last real block.
            if bp != hi || !tag_alloc(tag) {
                return Err(CheckError::BadEpilogue { at: bp - TAG });
            }
            if tag_prev_alloc(tag) != prev_allocated {
                return Err(CheckError::PrevBitMismatch { at: bp });
            }
            break;
        }

        if bp % ALIGN != 0 {
            return Err(CheckError::Misaligned { at: bp });
        }
        if size % ALIGN != 0 || size < MIN_BLOCK || bp + size > hi {
            return Err(CheckError::BadSize { at: bp, size });
        }
        if tag_prev_alloc(tag) != prev_allocated {
            return Err(CheckError::PrevBitMismatch { at: bp });
        }

        if tag_alloc(tag) {
            report.allocated_blocks += 1;
        } else {
            if let Some(first) = prev_free_at {
                return Err(CheckError::AdjacentFree { first, second: bp });
            }
            let footer = layout::footer(region, bp);
            if footer != tag {
                return Err(CheckError::FooterMismatch {
                    at: bp,
                    header: tag,
                    footer,
                });
            }
            free_set.insert(bp);
            report.free_blocks += 1;
            report.free_bytes += size;
            report.largest_free = report.largest_free.max(size);
        }

        prev_allocated = tag_alloc(tag);
        prev_free_at = (!prev_allocated).then_some(bp);
        report.block_count += 1;
        bp += size;
    }

    // Class-list walk: membership before any dereference, so a corrupted
    // link word cannot send the checker off into unmapped offsets.
    let mut seen = HashSet::new();
    for (class, &head) in heap.index().heads().iter().enumerate() {
        let mut prev = NIL;
        let mut last_size = 0;
        let mut cur = head;
        while cur != NIL {
            if !seen.insert(cur) {
                return Err(CheckError::BadLinks { class, at: cur });
            }
            if !free_set.contains(&cur) {
                return Err(CheckError::BinnedNotFree { class, at: cur });
            }
            let size = layout::block_size(region, cur);
            if class_of(size) != class
                || (class < EXACT_CLASSES && size != exact_class_size(class))
            {
                return Err(CheckError::WrongClass {
                    class,
                    at: cur,
                    size,
                });
            }
            if size < last_size {
                return Err(CheckError::UnsortedBin { class, at: cur });
            }
            if layout::link_prev(region, cur) != prev {
                return Err(CheckError::BadLinks { class, at: cur });
            }
            last_size = size;
            prev = cur;
            cur = layout::link_next(region, cur);
        }
    }
    if seen.len() != free_set.len() {
        return Err(CheckError::CountMismatch {
            physical: free_set.len(),
            binned: seen.len(),
        });
    }

    Ok(report)
}
