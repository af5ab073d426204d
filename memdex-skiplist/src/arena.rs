use std::{alloc::Layout, cell::UnsafeCell, mem, ptr::NonNull};

use crate::atomic_slot::AtomicSlot;

const ITEM_SIZE: usize = mem::size_of::<u64>();

/// Alignment of every `allocate_aligned` result.
pub const ALIGN: usize = if mem::size_of::<*const ()>() > 8 {
    mem::size_of::<*const ()>()
} else {
    8
};

// Blocks are carved out of `u64` slices, so they start aligned.
const _: () = assert!(ALIGN <= ITEM_SIZE && ALIGN.is_power_of_two());

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

type Block = NonNull<[u64]>;

struct ArenaState {
    blocks: Vec<Block>,
    ptr: NonNull<u8>,
    remaining: usize,
}

impl ArenaState {
    fn bump(&mut self, bytes: usize) -> NonNull<u8> {
        debug_assert!(bytes <= self.remaining);
        let result = self.ptr;
        // SAFETY: `bytes` fits in what is left of the current block.
        self.ptr = unsafe { self.ptr.add(bytes) };
        self.remaining -= bytes;
        result
    }
}

/// Bump allocator handing out byte ranges from large blocks.
///
/// Nothing is freed individually; every block is released when the arena is
/// dropped. Allocation mutates unsynchronized state, so the arena is `Send`
/// but not `Sync`: only one thread may allocate at a time. `memory_usage` is
/// a relaxed statistic and may be read while another thread allocates, the
/// skip list relies on that.
pub struct Arena {
    state: UnsafeCell<ArenaState>,
    block_size: usize,
    memory_usage: AtomicSlot<()>,
}

// SAFETY: the arena owns its blocks; the raw pointers are never shared with
// another arena.
unsafe impl Send for Arena {}

impl Arena {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        assert!(
            block_size > 0 && block_size % ALIGN == 0,
            "block size must be a positive multiple of {ALIGN}, got {block_size}"
        );

        Self {
            state: UnsafeCell::new(ArenaState {
                blocks: Vec::new(),
                ptr: NonNull::dangling(),
                remaining: 0,
            }),
            block_size,
            memory_usage: AtomicSlot::word(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns `bytes` bytes with no alignment guarantee.
    pub fn allocate(&self, bytes: usize) -> NonNull<u8> {
        assert!(bytes > 0);

        // SAFETY: `Arena` is not `Sync` and no borrow of the state outlives
        // this call.
        let state = unsafe { &mut *self.state.get() };
        if bytes <= state.remaining {
            return state.bump(bytes);
        }
        self.allocate_fallback(state, bytes)
    }

    /// Returns `bytes` bytes aligned to [`ALIGN`].
    pub fn allocate_aligned(&self, bytes: usize) -> NonNull<u8> {
        assert!(bytes > 0);

        // SAFETY: see `allocate`.
        let state = unsafe { &mut *self.state.get() };
        let slop = padding(state.ptr.as_ptr().addr(), ALIGN);
        let result = if slop + bytes <= state.remaining {
            state.bump(slop);
            state.bump(bytes)
        } else {
            // Fresh blocks are always aligned.
            self.allocate_fallback(state, bytes)
        };

        debug_assert_eq!(result.as_ptr().addr() & (ALIGN - 1), 0);
        result
    }

    /// Allocation for an arbitrary layout, used for skip list nodes.
    pub fn allocate_layout(&self, layout: Layout) -> NonNull<u8> {
        if layout.align() <= ALIGN {
            return self.allocate_aligned(layout.size().max(1));
        }

        let raw = self.allocate(layout.size() + layout.align() - 1);
        let slop = padding(raw.as_ptr().addr(), layout.align());
        // SAFETY: the over-allocation covers the padding.
        unsafe { raw.add(slop) }
    }

    /// Total bytes of all blocks handed out by the allocator so far.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.relaxed_load_word()
    }

    fn allocate_fallback(&self, state: &mut ArenaState, bytes: usize) -> NonNull<u8> {
        if bytes > self.block_size / 4 {
            // Large requests get their own block so the rest of the current
            // block stays usable.
            return self.allocate_new_block(state, bytes);
        }

        let block = self.allocate_new_block(state, self.block_size);
        state.ptr = block;
        state.remaining = self.block_size;
        state.bump(bytes)
    }

    fn allocate_new_block(&self, state: &mut ArenaState, bytes: usize) -> NonNull<u8> {
        let words = vec![0u64; bytes.div_ceil(ITEM_SIZE)].into_boxed_slice();
        let len = words.len() * ITEM_SIZE;
        let block = NonNull::from(Box::leak(words));
        state.blocks.push(block);

        let usage = self.memory_usage.relaxed_load_word() + len + mem::size_of::<Block>();
        self.memory_usage.relaxed_store_word(usage);
        tracing::trace!(
            "arena block #{} of {} bytes, {} bytes in use",
            state.blocks.len(),
            len,
            usage
        );

        block.cast::<u8>()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for block in self.state.get_mut().blocks.drain(..) {
            // SAFETY: each block came from `Box::leak` and is released once.
            drop(unsafe { Box::from_raw(block.as_ptr()) });
        }
    }
}

fn padding(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    addr.wrapping_neg() & (align - 1)
}

#[cfg(test)]
mod tests {
    use std::alloc::Layout;

    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::{ALIGN, Arena, DEFAULT_BLOCK_SIZE};

    #[test]
    fn test_empty() {
        let arena = Arena::new();
        assert_eq!(arena.memory_usage(), 0);
        assert_eq!(arena.block_size(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_simple() {
        const N: usize = 100_000;

        let arena = Arena::new();
        let mut rng = StdRng::seed_from_u64(301);
        let mut allocated = Vec::with_capacity(N);
        let mut bytes = 0;

        for i in 0..N {
            let mut s = if i % (N / 10) == 0 {
                i
            } else if rng.random_range(0..4000) == 0 {
                rng.random_range(0..6000)
            } else if rng.random_range(0..10) == 0 {
                rng.random_range(0..100)
            } else {
                rng.random_range(0..20)
            };
            if s == 0 {
                s = 1;
            }

            let p = if rng.random_range(0..10) == 0 {
                arena.allocate_aligned(s)
            } else {
                arena.allocate(s)
            };

            for b in 0..s {
                unsafe { p.add(b).write((i % 256) as u8) };
            }
            bytes += s;
            allocated.push((s, p));

            assert!(arena.memory_usage() >= bytes);
            if i > N / 10 {
                assert!(arena.memory_usage() as f64 <= bytes as f64 * 1.10);
            }
        }

        for (i, (s, p)) in allocated.into_iter().enumerate() {
            for b in 0..s {
                assert_eq!(unsafe { p.add(b).read() }, (i % 256) as u8);
            }
        }
    }

    #[test]
    fn test_aligned() {
        let arena = Arena::new();
        for size in 1..200 {
            arena.allocate(size % 7 + 1);
            let p = arena.allocate_aligned(size);
            assert_eq!(p.as_ptr().addr() % ALIGN, 0);
        }
    }

    #[test]
    fn test_large_request_keeps_current_block() {
        let arena = Arena::new();

        let first = arena.allocate(1);
        let usage = arena.memory_usage();
        assert!(usage >= DEFAULT_BLOCK_SIZE);

        let big = arena.allocate(DEFAULT_BLOCK_SIZE * 2);
        assert!(arena.memory_usage() >= usage + DEFAULT_BLOCK_SIZE * 2);
        assert_ne!(big, first);

        let second = arena.allocate(1);
        assert_eq!(second.as_ptr().addr(), first.as_ptr().addr() + 1);
    }

    #[test]
    fn test_small_request_opens_new_block() {
        let arena = Arena::with_block_size(64);
        let first = arena.allocate(16);
        for i in 1..4 {
            let p = arena.allocate(16);
            assert_eq!(p.as_ptr().addr(), first.as_ptr().addr() + 16 * i);
        }
        let usage = arena.memory_usage();

        arena.allocate(8);
        assert!(arena.memory_usage() >= usage + 64);
    }

    #[test]
    fn test_over_aligned_layout() {
        let arena = Arena::new();
        let layout = Layout::from_size_align(24, 64).unwrap();
        for _ in 0..100 {
            arena.allocate(3);
            let p = arena.allocate_layout(layout);
            assert_eq!(p.as_ptr().addr() % 64, 0);
        }
    }

    #[test]
    #[should_panic(expected = "positive multiple")]
    fn test_bad_block_size() {
        let _ = Arena::with_block_size(12);
    }
}
