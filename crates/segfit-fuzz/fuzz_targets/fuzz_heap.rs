#![no_main]
use libfuzzer_sys::fuzz_target;

use segfit_core::{Heap, HeapConfig, check_heap};

fuzz_target!(|data: &[u8]| {
    // Interpret the input as a stream of (op, slot, size) triples over a
    // bounded heap; every reachable state must satisfy the invariants.
    if data.len() < 4 {
        return;
    }

    let mut heap = Heap::with_config(HeapConfig {
        chunk_bytes: 256,
        max_heap_bytes: 1 << 20,
    });
    let mut slots = [0usize; 16];

    for chunk in data.chunks(4) {
        if chunk.len() < 4 {
            break;
        }
        let op = chunk[0] % 4;
        let slot = (chunk[1] % 16) as usize;
        let size = u16::from_le_bytes([chunk[2], chunk[3]]) as usize;

        match op {
            0 => {
                if slots[slot] == 0
                    && let Some(ptr) = heap.allocate(size)
                {
                    slots[slot] = ptr;
                }
            }
            1 => {
                heap.release(slots[slot]);
                slots[slot] = 0;
            }
            2 => {
                if slots[slot] != 0 {
                    match heap.reallocate(slots[slot], size) {
                        Some(ptr) => slots[slot] = ptr,
                        None if size == 0 => slots[slot] = 0,
                        None => {}
                    }
                }
            }
            _ => {
                // Hostile pointers: misaligned or out of range, never a
                // plausible payload. Must be absorbed without corruption.
                heap.release(size | 1);
                let _ = heap.reallocate((1 << 20) + size, 32);
            }
        }
    }

    check_heap(&heap).expect("heap invariants violated");

    for ptr in slots {
        heap.release(ptr);
    }
    check_heap(&heap).expect("heap invariants violated after cleanup");
});
