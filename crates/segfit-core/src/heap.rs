//! The allocator: initialization, coalescing, placement, and the four
//! public operations.
//!
//! A [`Heap`] owns a [`Region`] and a [`FreeIndex`] and keeps them mutually
//! consistent: between public calls every free block is linked in exactly
//! one class list, no two free blocks are physically adjacent, and every
//! block's previous-allocation bit mirrors its predecessor's state. Inside
//! a call blocks pass through transient states (unlinked, half-written
//! tags); none of that is observable from the outside.
//!
//! Pointers are byte offsets from the region base; `0` is the null pointer.
//! User payload bytes live inside the region and are reached through
//! [`Heap::payload`] / [`Heap::payload_mut`].

use crate::bins::FreeIndex;
use crate::config::HeapConfig;
use crate::layout::{self, ALIGN, DWORD, FIRST_PAYLOAD, MIN_BLOCK, NIL, TAG, WORD, round_up};
use crate::metrics::HeapMetrics;
use crate::region::Region;

/// A segregated-fit heap over a simulated region.
///
/// ```
/// use segfit_core::Heap;
///
/// let mut heap = Heap::new();
/// let p = heap.allocate(100).unwrap();
/// heap.payload_mut(p, 4).unwrap().copy_from_slice(b"data");
/// let q = heap.reallocate(p, 200).unwrap();
/// assert_eq!(heap.payload(q, 4).unwrap(), b"data");
/// heap.release(q);
/// ```
#[derive(Debug)]
pub struct Heap {
    region: Region,
    index: FreeIndex,
    metrics: HeapMetrics,
    config: HeapConfig,
    active_count: usize,
    allocated_bytes: usize,
    peak_allocated: usize,
}

impl Heap {
    /// Creates a heap with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a heap with the given configuration (normalized first, so
    /// construction always succeeds).
    #[must_use]
    pub fn with_config(config: HeapConfig) -> Self {
        let config = config.normalized();
        let mut heap = Self {
            region: Region::new(config.max_heap_bytes),
            index: FreeIndex::new(),
            metrics: HeapMetrics::default(),
            config,
            active_count: 0,
            allocated_bytes: 0,
            peak_allocated: 0,
        };
        heap.bootstrap();
        heap
    }

    /// Rebuilds the heap from scratch: fresh region, sentinels, empty bins,
    /// zeroed counters. Safe to call at any time.
    pub fn reset(&mut self) {
        self.region = Region::new(self.config.max_heap_bytes);
        self.index.clear();
        self.metrics = HeapMetrics::default();
        self.active_count = 0;
        self.allocated_bytes = 0;
        self.peak_allocated = 0;
        self.bootstrap();
    }

    /// Installs the alignment padding, the prologue sentinel block, and the
    /// epilogue tag, then seeds the heap with one chunk-sized free block.
    fn bootstrap(&mut self) {
        // The normalized config ceiling always covers the sentinels and one
        // chunk, so neither extension here can fail.
        if self.region.sbrk(FIRST_PAYLOAD).is_ok() {
            self.region.write_word(0, 0);
            self.region.write_word(4, layout::pack(WORD, true, true));
            self.region.write_word(8, layout::pack(WORD, true, true));
            self.region.write_word(12, layout::pack(0, true, true));
            let _ = self.extend(self.config.chunk_bytes);
        }
    }

    // -----------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------

    /// Allocates `size` bytes, returning an 8-aligned payload offset.
    ///
    /// Returns `None` for a zero-byte request or when the region cannot
    /// grow to satisfy the rounded request.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        let Some(asize) = round_request(size) else {
            self.metrics.failed_allocations += 1;
            return None;
        };
        let bp = match self.index.find_fit(&self.region, asize) {
            Some(bp) => bp,
            None => {
                if self.extend(asize.max(self.config.chunk_bytes)).is_err() {
                    self.metrics.failed_allocations += 1;
                    return None;
                }
                // The freshly coalesced tail is at least `asize` bytes, so
                // the retry cannot miss.
                self.index.find_fit(&self.region, asize)?
            }
        };
        let placed = self.place(bp, asize);
        self.metrics.allocations += 1;
        self.active_count += 1;
        self.allocated_bytes += placed;
        self.peak_allocated = self.peak_allocated.max(self.allocated_bytes);
        Some(bp)
    }

    /// Releases the block at `ptr`.
    ///
    /// Null, misaligned, out-of-region, and already-free pointers are
    /// absorbed silently (and counted in the metrics).
    pub fn release(&mut self, ptr: usize) {
        if ptr == NIL {
            return;
        }
        if !self.is_user_payload(ptr) {
            self.metrics.foreign_releases += 1;
            return;
        }
        if !layout::is_alloc(&self.region, ptr) {
            self.metrics.double_releases += 1;
            return;
        }

        let size = layout::block_size(&self.region, ptr);
        let tag = layout::pack(size, layout::prev_alloc(&self.region, ptr), false);
        layout::write_header(&mut self.region, ptr, tag);
        layout::write_footer(&mut self.region, ptr, tag);
        let next = layout::next_block(&self.region, ptr);
        layout::set_prev_alloc(&mut self.region, next, false);

        self.active_count -= 1;
        self.allocated_bytes -= size;
        self.metrics.releases += 1;
        self.coalesce(ptr);
    }

    /// Resizes the block at `ptr` to `size` bytes.
    ///
    /// A null `ptr` behaves like [`Heap::allocate`]; a zero `size` behaves
    /// like [`Heap::release`] and returns `None`. An invalid `ptr` returns
    /// `None` without side effects. The block is shrunk or grown in place
    /// when possible; otherwise the payload moves to a fresh block and the
    /// old one is released.
    pub fn reallocate(&mut self, ptr: usize, size: usize) -> Option<usize> {
        if ptr == NIL {
            return self.allocate(size);
        }
        if size == 0 {
            self.release(ptr);
            return None;
        }
        if !self.is_user_payload(ptr) || !layout::is_alloc(&self.region, ptr) {
            return None;
        }
        let asize = round_request(size)?;
        let osize = layout::block_size(&self.region, ptr);

        if asize <= osize {
            self.shrink_in_place(ptr, osize, asize);
            self.metrics.reallocs_in_place += 1;
            return Some(ptr);
        }

        // In-place grow: fold in a free successor when it covers the deficit.
        let next = layout::next_block(&self.region, ptr);
        if !layout::is_alloc(&self.region, next) {
            let merged = osize + layout::block_size(&self.region, next);
            if merged >= asize {
                self.index.unlink(&mut self.region, next);
                let tag = layout::pack(merged, layout::prev_alloc(&self.region, ptr), true);
                layout::write_header(&mut self.region, ptr, tag);
                layout::set_prev_alloc(&mut self.region, ptr + merged, true);
                self.allocated_bytes += merged - osize;
                self.shrink_in_place(ptr, merged, asize);
                self.peak_allocated = self.peak_allocated.max(self.allocated_bytes);
                self.metrics.reallocs_in_place += 1;
                return Some(ptr);
            }
        }

        // Relocate: fresh block, copy, release the old one.
        let fresh = self.allocate(size)?;
        let copy_len = size.min(osize - TAG);
        self.region.copy_within(ptr, fresh, copy_len);
        self.release(ptr);
        self.metrics.reallocs_moved += 1;
        Some(fresh)
    }

    /// Allocates a zero-filled array of `count` elements of `size` bytes.
    ///
    /// Returns `None` when the product overflows, is zero, or cannot be
    /// allocated.
    pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> Option<usize> {
        let total = count.checked_mul(size)?;
        if total == 0 {
            return None;
        }
        let ptr = self.allocate(total)?;
        self.region.fill(ptr, total, 0);
        self.metrics.zeroed_allocations += 1;
        Some(ptr)
    }

    // -----------------------------------------------------------------
    // Payload access and introspection
    // -----------------------------------------------------------------

    /// A view of the first `len` payload bytes of the allocated block at
    /// `ptr`, or `None` if the pointer or length is invalid.
    #[must_use]
    pub fn payload(&self, ptr: usize, len: usize) -> Option<&[u8]> {
        let usable = self.usable_size(ptr)?;
        (len <= usable).then(|| self.region.bytes(ptr, len))
    }

    /// A mutable view of the first `len` payload bytes of the allocated
    /// block at `ptr`, or `None` if the pointer or length is invalid.
    pub fn payload_mut(&mut self, ptr: usize, len: usize) -> Option<&mut [u8]> {
        let usable = self.usable_size(ptr)?;
        (len <= usable).then(|| self.region.bytes_mut(ptr, len))
    }

    /// Usable payload bytes of the allocated block at `ptr`, or `None` if
    /// `ptr` is not a live allocation.
    #[must_use]
    pub fn usable_size(&self, ptr: usize) -> Option<usize> {
        (self.is_user_payload(ptr) && layout::is_alloc(&self.region, ptr))
            .then(|| layout::block_size(&self.region, ptr) - TAG)
    }

    /// Current region size in bytes (monotonically non-decreasing).
    #[must_use]
    pub fn region_bytes(&self) -> usize {
        self.region.hi()
    }

    /// Number of live allocations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Total bytes held by live allocations, block overhead included.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// High-water mark of [`Heap::allocated_bytes`].
    #[must_use]
    pub fn peak_allocated(&self) -> usize {
        self.peak_allocated
    }

    /// Total bytes held by free blocks.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.region.hi() - FIRST_PAYLOAD - self.allocated_bytes
    }

    /// Lifecycle counters.
    #[must_use]
    pub fn metrics(&self) -> &HeapMetrics {
        &self.metrics
    }

    pub(crate) fn region(&self) -> &Region {
        &self.region
    }

    pub(crate) fn index(&self) -> &FreeIndex {
        &self.index
    }

    #[cfg(test)]
    pub(crate) fn region_mut(&mut self) -> &mut Region {
        &mut self.region
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn is_user_payload(&self, ptr: usize) -> bool {
        ptr >= FIRST_PAYLOAD && ptr < self.region.hi() && ptr % ALIGN == 0
    }

    /// Grows the region by at least `bytes` (rounded to the granule) and
    /// installs the new tail as a free block, merging it with a free
    /// predecessor. The old epilogue tag becomes the new block's header, so
    /// the previous tail's allocation state carries over automatically.
    fn extend(&mut self, bytes: usize) -> Result<usize, crate::region::RegionError> {
        let size = round_up(bytes, DWORD);
        let bp = self.region.sbrk(size)?;
        let prev_alloc = layout::tag_prev_alloc(self.region.read_word(bp - TAG));
        let tag = layout::pack(size, prev_alloc, false);
        layout::write_header(&mut self.region, bp, tag);
        layout::write_footer(&mut self.region, bp, tag);
        // Fresh epilogue; the new tail block is free.
        self.region
            .write_word(bp + size - TAG, layout::pack(0, false, true));
        self.metrics.extensions += 1;
        self.metrics.extension_bytes += size as u64;
        Ok(self.coalesce(bp))
    }

    /// Merges the free block at `bp` with any free physical neighbors and
    /// links the result into its class. `bp`'s tags must already be written
    /// with the allocation bit clear. Returns the merged payload offset.
    fn coalesce(&mut self, bp: usize) -> usize {
        let prev_free = !layout::prev_alloc(&self.region, bp);
        let next = layout::next_block(&self.region, bp);
        let next_free = !layout::is_alloc(&self.region, next);

        let mut start = bp;
        let mut size = layout::block_size(&self.region, bp);
        if next_free {
            self.index.unlink(&mut self.region, next);
            size += layout::block_size(&self.region, next);
        }
        if prev_free {
            let prev = layout::prev_block(&self.region, bp);
            self.index.unlink(&mut self.region, prev);
            size += layout::block_size(&self.region, prev);
            start = prev;
        }
        if prev_free || next_free {
            let tag = layout::pack(size, layout::prev_alloc(&self.region, start), false);
            layout::write_header(&mut self.region, start, tag);
            layout::write_footer(&mut self.region, start, tag);
            self.metrics.coalesces += 1;
        }
        self.index.insert(&mut self.region, start);
        start
    }

    /// Commits the free block at `bp` to an allocation of `asize` bytes,
    /// splitting off the remainder when it can stand as a block of its own.
    /// Returns the size actually consumed.
    fn place(&mut self, bp: usize, asize: usize) -> usize {
        let osize = layout::block_size(&self.region, bp);
        let prev_alloc = layout::prev_alloc(&self.region, bp);
        self.index.unlink(&mut self.region, bp);

        let rem = osize - asize;
        if rem >= MIN_BLOCK {
            layout::write_header(&mut self.region, bp, layout::pack(asize, prev_alloc, true));
            let split = bp + asize;
            let tag = layout::pack(rem, true, false);
            layout::write_header(&mut self.region, split, tag);
            layout::write_footer(&mut self.region, split, tag);
            // The block after the remainder stayed behind a free block, so
            // its previous-allocation bit is already clear.
            self.index.insert(&mut self.region, split);
            self.metrics.splits += 1;
            asize
        } else {
            layout::write_header(&mut self.region, bp, layout::pack(osize, prev_alloc, true));
            let next = layout::next_block(&self.region, bp);
            layout::set_prev_alloc(&mut self.region, next, true);
            osize
        }
    }

    /// Shrinks the allocated block at `ptr` from `cur` to `asize` bytes,
    /// releasing the tail remainder through the normal coalescing path so
    /// that no two adjacent free blocks survive the call. Keeps the block
    /// whole when the remainder is too small to stand alone.
    fn shrink_in_place(&mut self, ptr: usize, cur: usize, asize: usize) {
        let rem = cur - asize;
        if rem < MIN_BLOCK {
            return;
        }
        let prev_alloc = layout::prev_alloc(&self.region, ptr);
        layout::write_header(&mut self.region, ptr, layout::pack(asize, prev_alloc, true));
        let split = ptr + asize;
        let tag = layout::pack(rem, true, false);
        layout::write_header(&mut self.region, split, tag);
        layout::write_footer(&mut self.region, split, tag);
        let after = layout::next_block(&self.region, split);
        layout::set_prev_alloc(&mut self.region, after, false);
        self.metrics.splits += 1;
        self.allocated_bytes -= rem;
        self.coalesce(split);
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounds a user request up to a serveable block size: tag overhead plus
/// alignment, never below the minimum block. `None` on overflow.
fn round_request(size: usize) -> Option<usize> {
    if size <= MIN_BLOCK - TAG {
        return Some(MIN_BLOCK);
    }
    let padded = size.checked_add(TAG + ALIGN - 1)?;
    Some(padded / ALIGN * ALIGN)
}
