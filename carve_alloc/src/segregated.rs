//! The segregated size-class allocator.
//!
//! Small allocations are grouped into `MAX_BINS` size classes ("bins"),
//! each `size_step` bytes apart starting at `min_bin_size`. Every bin owns
//! a list of OS pages; the first bytes of each page hold a page header
//! and the rest is carved into equally sized slots by a [`FreeList`].
//!
//! The head of a bin's list is the *active* page: all allocations are
//! served from it, and a fresh page is acquired only when it runs dry.
//! When a free refills a page that had no free slots, that page moves to
//! just after the head, so it is the first fallback once the active page
//! runs out. Recovering the page from a freed pointer is a single mask:
//! pages are page-aligned, so `p & !(page_size - 1)` is the page base.
//!
//! Pages are handed back to the OS only when the allocator is dropped.

use core::cmp;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};
use memory_units::Bytes;

use crate::align::{align_ptr_down, is_valid_alignment};
use crate::const_init::ConstInit;
use crate::free_list::{FreeList, MIN_BLOCK_SIZE};
use crate::list::{HasListNode, List, ListNode};
use crate::{imp, AllocErr, RawAlloc};

// Lives at the base of every OS page this allocator owns. The allocator
// owns its pages outright, so the internal element lifetime is 'static.
#[repr(C)]
struct Page {
    list_node: ListNode<'static, Page>,
    free_list: FreeList,
    bin: usize,
}

unsafe impl HasListNode<'static> for Page {
    fn list_node(&self) -> &ListNode<'static, Page> {
        &self.list_node
    }
}

/// An allocator that serves `MAX_BINS` fixed size classes from OS pages.
///
/// Bin `i` serves slots of `min_bin_size + i * size_step` bytes (both
/// parameters rounded up to the free-list block size). Requests above the
/// largest bin fail with [`AllocErr`]; this allocator is meant to sit
/// next to a [`LargeAllocator`](crate::large::LargeAllocator), not to
/// replace it.
pub struct SegregatedAllocator<const MAX_BINS: usize> {
    page_lists: [List<'static, Page>; MAX_BINS],
    min_bin_size: usize,
    size_step: usize,
}

impl<const MAX_BINS: usize> fmt::Debug for SegregatedAllocator<MAX_BINS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SegregatedAllocator")
            .field("max_bins", &MAX_BINS)
            .field("min_bin_size", &self.min_bin_size)
            .field("size_step", &self.size_step)
            .finish()
    }
}

impl<const MAX_BINS: usize> SegregatedAllocator<MAX_BINS> {
    /// Create an allocator with no pages yet; the first allocation in each
    /// bin acquires one.
    pub fn new(min_bin_size: Bytes, size_step: Bytes) -> SegregatedAllocator<MAX_BINS> {
        assert!(MAX_BINS > 0);
        debug_assert!(min_bin_size.0 > 0 && size_step.0 > 0);

        const EMPTY: List<'static, Page> = List::INIT;
        SegregatedAllocator {
            page_lists: [EMPTY; MAX_BINS],
            min_bin_size: FreeList::adjust_block_size(min_bin_size).0,
            size_step: FreeList::adjust_block_size(size_step).0,
        }
    }

    /// The largest request this allocator can serve: the slot size of the
    /// last bin.
    pub fn max_bin_size(&self) -> Bytes {
        Bytes(self.min_bin_size + self.size_step * (MAX_BINS - 1))
    }

    fn bin_for(&self, size: Bytes) -> usize {
        (cmp::max(size.0, self.min_bin_size) - self.min_bin_size + self.size_step - 1)
            / self.size_step
    }
}

impl<const MAX_BINS: usize> RawAlloc for SegregatedAllocator<MAX_BINS> {
    unsafe fn malloc(&mut self, size: Bytes, align: Bytes) -> Result<NonNull<u8>, AllocErr> {
        // Slots sit at free-list-block boundaries; anything stricter needs
        // an AlignedAllocator on top.
        debug_assert!(is_valid_alignment(align) && align <= MIN_BLOCK_SIZE);

        let bin = self.bin_for(size);
        if bin >= MAX_BINS {
            return Err(AllocErr);
        }

        let page: &Page = match self.page_lists[bin].first() {
            Some(page) if !page.free_list.is_empty() => page,
            _ => {
                // Active page exhausted (or bin untouched): start a new one.
                let page_bytes = imp::page_size();
                let base = imp::acquire(page_bytes)?.as_ptr();
                let slot_size = self.min_bin_size + bin * self.size_step;
                ptr::write(
                    base as *mut Page,
                    Page {
                        list_node: ListNode::default(),
                        free_list: FreeList::new(
                            base.add(mem::size_of::<Page>()),
                            base.add(page_bytes.0),
                            Bytes(slot_size),
                        ),
                        bin,
                    },
                );
                let page = &*(base as *const Page);
                self.page_lists[bin].add_first(page);
                page
            }
        };
        page.free_list.malloc().ok_or(AllocErr)
    }

    unsafe fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }

        let page = &*(align_ptr_down(p, imp::page_size().0) as *const Page);
        let was_empty = page.free_list.is_empty();
        page.free_list.free(NonNull::new_unchecked(p));

        // A page that just came back from "full" becomes the first
        // fallback behind the (likely hot) active page.
        if was_empty {
            let list = &mut self.page_lists[page.bin];
            let is_head = list.first().map_or(false, |head| ptr::eq(head, page));
            if !is_head {
                list.remove(page);
                match list.first() {
                    Some(head) => list.insert_after(page, head),
                    None => list.add_first(page),
                }
            }
        }
    }
}

impl<const MAX_BINS: usize> Drop for SegregatedAllocator<MAX_BINS> {
    fn drop(&mut self) {
        let page_bytes = imp::page_size();
        for list in self.page_lists.iter() {
            let mut cur = list.first();
            while let Some(page) = cur {
                cur = page.list_node().next();
                unsafe {
                    imp::release(
                        NonNull::new_unchecked(page as *const Page as *mut u8),
                        page_bytes,
                    );
                }
            }
        }
    }
}
