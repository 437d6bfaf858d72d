//! A free list of equally sized blocks threaded through a byte range.
//!
//! This is the simplest allocator in the crate: construction chops the
//! range into slots and chains them; `malloc` pops the head and `free`
//! pushes. There is no header, no size tracking, and no validation that a
//! freed pointer came from this list -- the segregated allocator supplies
//! those guarantees one level up.

use core::cell::Cell;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};
use memory_units::Bytes;

use crate::align::{align_ptr_up, round_up_pow2};

#[repr(C)]
struct Slot {
    next: Cell<*const Slot>,
}

/// A fixed-size-block free list over `[beg, end)`.
pub struct FreeList {
    head: Cell<*const Slot>,
}

impl fmt::Debug for FreeList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// The smallest usable block size: a free slot must hold the link to the
/// next one.
pub const MIN_BLOCK_SIZE: Bytes = Bytes(mem::size_of::<usize>());

impl FreeList {
    /// Thread a free list through `[beg, end)` with blocks of `block_size`
    /// bytes (rounded up to [`MIN_BLOCK_SIZE`]). A range with no room for
    /// even one block yields an empty list.
    ///
    /// # Safety
    ///
    /// `[beg, end)` must be a valid, writable byte range that outlives the
    /// list and everything allocated from it, and must not be touched
    /// through any other path while the list is live.
    pub unsafe fn new(beg: *mut u8, end: *mut u8, block_size: Bytes) -> FreeList {
        debug_assert!(!beg.is_null() && beg <= end);
        debug_assert!(block_size.0 >= 1);

        let beg = align_ptr_up(beg, mem::align_of::<Slot>());
        debug_assert!(beg as usize <= end as usize);
        let size = Self::adjust_block_size(block_size).0;

        let list = FreeList {
            head: Cell::new(ptr::null()),
        };
        let num_blocks = (end as usize - beg as usize) / size;
        if num_blocks > 0 {
            let mut cur = beg as *const Slot;
            list.head.set(cur);
            for _ in 1..num_blocks {
                let next = (cur as usize + size) as *const Slot;
                (*cur).next.set(next);
                cur = next;
            }
            (*cur).next.set(ptr::null());
        }
        list
    }

    /// Round a nominal block size up to what the list will actually use:
    /// a multiple of [`MIN_BLOCK_SIZE`]. Size-class layers call this to
    /// compute their real bin sizes.
    #[inline]
    pub fn adjust_block_size(n: Bytes) -> Bytes {
        Bytes(round_up_pow2(n.0, MIN_BLOCK_SIZE.0))
    }

    /// Are there no free blocks left?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.get().is_null()
    }

    /// Pop a block, or `None` when the list is exhausted. The returned
    /// memory is uninitialized.
    #[inline]
    pub fn malloc(&self) -> Option<NonNull<u8>> {
        let head = self.head.get();
        if head.is_null() {
            return None;
        }
        unsafe {
            self.head.set((*head).next.get());
        }
        NonNull::new(head as *mut u8)
    }

    /// Push a block back onto the list.
    ///
    /// # Safety
    ///
    /// `p` must have been returned by `malloc` on this list and not freed
    /// since; no size or ownership validation is performed.
    #[inline]
    pub unsafe fn free(&self, p: NonNull<u8>) {
        let slot = p.as_ptr() as *const Slot;
        (*slot).next.set(self.head.get());
        self.head.set(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_one_word() {
        assert_eq!(mem::size_of::<Slot>(), mem::size_of::<usize>());
        assert!(mem::size_of::<Slot>().is_power_of_two());
    }

    #[test]
    fn block_size_adjustment() {
        let word = MIN_BLOCK_SIZE.0;
        assert_eq!(FreeList::adjust_block_size(Bytes(1)).0, word);
        assert_eq!(FreeList::adjust_block_size(Bytes(word)).0, word);
        assert_eq!(FreeList::adjust_block_size(Bytes(word + 1)).0, 2 * word);
    }

    #[test]
    fn pop_until_exhausted() {
        let mut buf = [0u8; 8 * 8];
        let range = buf.as_mut_ptr_range();
        let list = unsafe { FreeList::new(range.start, range.end, Bytes(16)) };

        let mut n = 0;
        while list.malloc().is_some() {
            n += 1;
        }
        // The buffer itself may start unaligned, so allow one lost block.
        assert!(n == 4 || n == 3);
        assert!(list.is_empty());
    }

    #[test]
    fn freed_block_is_reused_first() {
        let mut buf = [0u8; 64];
        let range = buf.as_mut_ptr_range();
        let list = unsafe { FreeList::new(range.start, range.end, Bytes(16)) };

        let p = list.malloc().unwrap();
        unsafe { list.free(p) };
        let q = list.malloc().unwrap();
        assert_eq!(p, q);
    }
}
