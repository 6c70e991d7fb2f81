//! Reference-count pool (spec §4.8).
//!
//! A bump-and-bitmap allocator for 64-bit reference-count cells. Every
//! heap value (`Text`, `Liste von T`) gets one cell from here; the cell's
//! address is what the value's hidden header points at.
//!
//! # Layout
//!
//! The pool is a doubly linked list of [`Block`]s, each holding 64 `i64`
//! slots and a 64-bit occupancy bitmap (`1` = slot in use). Allocation
//! scans from the tail backwards for the first block with a free slot;
//! if none exists, a new block is appended. Freeing locates the owning
//! block by a linear scan (blocks are expected to stay few in practice)
//! and, if the block becomes entirely free, unlinks it — but a small
//! fixed-size cache retains up to [`FREE_BLOCK_CACHE`] freed blocks for
//! reuse instead of returning them to the system allocator immediately.
//!
//! `ffsll(~used)` is the mental model for `first_free_slot`: it must use
//! 64-bit arithmetic throughout, since an off-by-bit here would silently
//! corrupt an arbitrary, unrelated allocation sharing the same block.

use std::ptr;
use std::sync::Mutex;
use std::sync::OnceLock;

const SLOTS_PER_BLOCK: usize = 64;
const FREE_BLOCK_CACHE: usize = 16;

struct Block {
    refcounts: [i64; SLOTS_PER_BLOCK],
    /// Bit `i` set means `refcounts[i]` is occupied.
    used: u64,
    prev: *mut Block,
    next: *mut Block,
}

impl Block {
    fn new_boxed() -> *mut Block {
        Box::into_raw(Box::new(Block {
            refcounts: [0; SLOTS_PER_BLOCK],
            used: 0,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }))
    }

    fn is_full(&self) -> bool {
        self.used == u64::MAX
    }

    fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Index of the first unoccupied slot, `~used`'s lowest set bit.
    fn first_free_slot(&self) -> Option<usize> {
        let inverted: u64 = !self.used;
        if inverted == 0 {
            None
        } else {
            Some(inverted.trailing_zeros() as usize)
        }
    }

    fn reset(&mut self) {
        self.used = 0;
        self.refcounts = [0; SLOTS_PER_BLOCK];
    }
}

struct PoolState {
    head: *mut Block,
    tail: *mut Block,
    /// Freed blocks kept warm for reuse, most-recently-freed last.
    cache: Vec<*mut Block>,
}

// The pool is only ever touched through `POOL`'s mutex; raw pointers to
// heap-allocated blocks are safely `Send` under that external lock.
unsafe impl Send for PoolState {}

impl PoolState {
    const fn empty() -> Self {
        PoolState {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            cache: Vec::new(),
        }
    }

    fn push_new_block(&mut self) -> *mut Block {
        let block = self.cache.pop().unwrap_or_else(Block::new_boxed);
        unsafe {
            (*block).prev = self.tail;
            (*block).next = ptr::null_mut();
            if !self.tail.is_null() {
                (*self.tail).next = block;
            } else {
                self.head = block;
            }
        }
        self.tail = block;
        block
    }

    fn alloc(&mut self) -> *mut i64 {
        // Scan from the tail backwards for the first block with room.
        let mut cursor = self.tail;
        let block = loop {
            if cursor.is_null() {
                break self.push_new_block();
            }
            let not_full = unsafe { (*cursor).is_full() };
            if !not_full {
                break cursor;
            }
            cursor = unsafe { (*cursor).prev };
        };

        unsafe {
            let slot = (*block).first_free_slot().expect("scanned block has room");
            (*block).used |= 1u64 << slot;
            &mut (*block).refcounts[slot] as *mut i64
        }
    }

    fn unlink(&mut self, block: *mut Block) {
        unsafe {
            let prev = (*block).prev;
            let next = (*block).next;
            if !prev.is_null() {
                (*prev).next = next;
            } else {
                self.head = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            } else {
                self.tail = prev;
            }
            (*block).prev = ptr::null_mut();
            (*block).next = ptr::null_mut();
        }
    }

    fn free(&mut self, ptr: *mut i64) {
        // Locate the block owning `ptr` by linear scan; N stays small in
        // practice since a block holds 64 cells.
        let mut cursor = self.head;
        while !cursor.is_null() {
            let base = unsafe { (*cursor).refcounts.as_ptr() as usize };
            let addr = ptr as usize;
            if addr >= base && addr < base + SLOTS_PER_BLOCK * std::mem::size_of::<i64>() {
                let index = (addr - base) / std::mem::size_of::<i64>();
                debug_assert!(index < SLOTS_PER_BLOCK);
                unsafe {
                    (*cursor).used &= !(1u64 << index);
                    if (*cursor).is_empty() {
                        self.unlink(cursor);
                        if self.cache.len() < FREE_BLOCK_CACHE {
                            (*cursor).reset();
                            self.cache.push(cursor);
                        } else {
                            drop(Box::from_raw(cursor));
                        }
                    }
                }
                return;
            }
            cursor = unsafe { (*cursor).next };
        }
        panic!("ddp_refc_free: pointer does not belong to any pool block");
    }

    fn teardown(&mut self) {
        let mut cursor = self.head;
        while !cursor.is_null() {
            let next = unsafe { (*cursor).next };
            unsafe {
                drop(Box::from_raw(cursor));
            }
            cursor = next;
        }
        for block in self.cache.drain(..) {
            unsafe {
                drop(Box::from_raw(block));
            }
        }
        self.head = ptr::null_mut();
        self.tail = ptr::null_mut();
    }
}

static POOL: OnceLock<Mutex<PoolState>> = OnceLock::new();

fn pool() -> &'static Mutex<PoolState> {
    POOL.get_or_init(|| Mutex::new(PoolState::empty()))
}

/// Allocate a fresh refcount cell initialized to `1` and return its address.
/// Called by every `_ddp_*_from_constants` / deep-copy constructor.
#[unsafe(no_mangle)]
pub extern "C" fn ddp_refc_alloc() -> *mut i64 {
    let mut state = pool().lock().expect("refcount pool mutex poisoned");
    let slot = state.alloc();
    unsafe {
        *slot = 1;
    }
    slot
}

/// Return a refcount cell to the pool. The emitter never calls this
/// directly; it is invoked by `_ddp_free_<T>` once a value's count reaches
/// zero.
///
/// # Safety
/// `ptr` must have been returned by [`ddp_refc_alloc`] and not already
/// freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ddp_refc_free(ptr: *mut i64) {
    let mut state = pool().lock().expect("refcount pool mutex poisoned");
    state.free(ptr);
}

/// Increment a value's refcount (taken when a reference is shared, e.g.
/// binding a reference parameter).
///
/// # Safety
/// `ptr` must be a live refcount cell.
pub unsafe fn rc_inc(ptr: *mut i64) {
    unsafe {
        *ptr += 1;
    }
}

/// Decrement a value's refcount and report whether it reached zero (the
/// caller is then responsible for releasing the backing storage and
/// calling [`ddp_refc_free`]).
///
/// # Safety
/// `ptr` must be a live refcount cell.
pub unsafe fn rc_dec(ptr: *mut i64) -> bool {
    unsafe {
        *ptr -= 1;
        *ptr <= 0
    }
}

/// Tear down every block still held by the pool. The runtime entry stub
/// calls this exactly once, at process exit (spec §5).
#[unsafe(no_mangle)]
pub extern "C" fn ddp_free_refc_blocks() {
    if let Some(mutex) = POOL.get() {
        let mut state = mutex.lock().expect("refcount pool mutex poisoned");
        state.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_sets_used_bit_and_clears_on_free() {
        let mut state = PoolState::empty();
        let a = state.alloc();
        let b = state.alloc();
        assert_ne!(a, b);
        unsafe {
            assert_eq!((*state.tail).used.count_ones(), 2);
        }
        state.free(a);
        unsafe {
            assert_eq!((*state.tail).used.count_ones(), 1);
        }
        state.free(b);
        // block became empty and was cached, not leaked
        assert!(state.tail.is_null());
        assert_eq!(state.cache.len(), 1);
        state.teardown();
    }

    #[test]
    fn allocates_new_block_past_sixty_four() {
        let mut state = PoolState::empty();
        let mut ptrs = Vec::new();
        for _ in 0..65 {
            ptrs.push(state.alloc());
        }
        // two blocks now exist
        unsafe {
            assert!(!(*state.head).next.is_null());
        }
        for p in ptrs {
            state.free(p);
        }
        state.teardown();
    }

    #[test]
    fn slot_index_stays_in_range() {
        let mut state = PoolState::empty();
        for _ in 0..64 {
            let p = state.alloc();
            unsafe {
                let base = (*state.tail).refcounts.as_ptr() as usize;
                let index = (p as usize - base) / std::mem::size_of::<i64>();
                assert!(index < SLOTS_PER_BLOCK);
            }
        }
        state.teardown();
    }
}
