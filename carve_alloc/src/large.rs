//! The variable-size, coalescing allocator.
//!
//! A [`LargeAllocator`] manages one contiguous, caller-provided byte
//! region. Every block in the region -- allocated or free -- starts with an
//! embedded block header carrying three things:
//!
//! * links for the address-ordered list of *all* blocks, which is what
//!   makes the two neighbors of any block reachable in O(1) for
//!   coalescing;
//! * a red-black tree node, live only while the block is free, keyed by
//!   the block's payload size;
//! * one word holding the payload size in all bits but the lowest, and the
//!   free flag in the lowest bit.
//!
//! `malloc` is best-fit: a `lower_bound` search of the size-keyed tree
//! finds the smallest free block that fits, which is then split when the
//! remainder is worth keeping. `free` merges the block with whichever
//! neighbors are free, so the region never holds two adjacent free blocks.

use core::cell::Cell;
use core::cmp;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

use intrusive_rb_tree::{impl_intrusive_node, Node, RbTree, TreeOrd};
use memory_units::Bytes;

use crate::align::{align_ptr_up, assert_aligned_to, is_valid_alignment, round_up_pow2};
use crate::aligned;
use crate::list::{HasListNode, List, ListNode};
use crate::{AllocErr, RawAlloc};

#[repr(C)]
#[derive(Default)]
struct Block<'a> {
    // Live only while the block is free.
    tree_node: Node<'a>,
    // Always live; orders the blocks by address.
    list_node: ListNode<'a, Block<'a>>,
    // size << 1 | free
    size_and_free: Cell<usize>,
}

const HEADER_SIZE: usize = mem::size_of::<Block<'static>>();
const HEADER_ALIGN: usize = mem::align_of::<Block<'static>>();

impl<'a> Block<'a> {
    #[inline]
    fn size(&self) -> usize {
        self.size_and_free.get() >> 1
    }

    #[inline]
    fn set_size(&self, size: usize) {
        let free = self.size_and_free.get() & 0b1;
        self.size_and_free.set(size << 1 | free);
    }

    #[inline]
    fn is_free(&self) -> bool {
        self.size_and_free.get() & 0b1 != 0
    }

    #[inline]
    fn set_free(&self, free: bool) {
        let size = self.size_and_free.get() & !0b1;
        self.size_and_free.set(size | free as usize);
    }

    #[inline]
    fn total_size(&self) -> usize {
        HEADER_SIZE + self.size()
    }

    #[inline]
    fn set_total_size(&self, total: usize) {
        debug_assert!(total >= HEADER_SIZE);
        self.set_size(total - HEADER_SIZE);
    }

    // The first payload byte, just past this header.
    #[inline]
    fn payload(&self) -> *mut u8 {
        (self as *const Block<'a> as *mut u8).wrapping_add(HEADER_SIZE)
    }
}

unsafe impl<'a> HasListNode<'a> for Block<'a> {
    fn list_node(&self) -> &ListNode<'a, Block<'a>> {
        &self.list_node
    }
}

struct FreeBySize<'a>(PhantomData<&'a Block<'a>>);

impl_intrusive_node! {
    impl<'a> IntrusiveNode<'a> for FreeBySize<'a>
    where
        type Elem = Block<'a>,
        node = tree_node;
}

impl<'a> TreeOrd<'a, FreeBySize<'a>> for Block<'a> {
    fn tree_cmp(&self, rhs: &Block<'a>) -> cmp::Ordering {
        self.size().cmp(&rhs.size())
    }
}

impl<'a> TreeOrd<'a, FreeBySize<'a>> for usize {
    fn tree_cmp(&self, rhs: &Block<'a>) -> cmp::Ordering {
        self.cmp(&rhs.size())
    }
}

// If you see unexpected 0xA5A5A5A5 values, then either (a) you have a
// use-after-free, or (b) there is a bug in the coalescing allocator.
#[cfg(feature = "extra_assertions")]
const FREE_PATTERN: u8 = 0xA5;

extra_only! {
    fn write_free_pattern(block: &Block) {
        unsafe {
            ptr::write_bytes(block.payload(), FREE_PATTERN, block.size());
        }
    }
}

extra_only! {
    fn assert_is_poisoned(block: &Block) {
        unsafe {
            let payload = block.payload();
            for i in 0..block.size() {
                extra_assert_eq!(
                    *payload.add(i),
                    FREE_PATTERN,
                    "freed byte was written through a stale pointer"
                );
            }
        }
    }
}

/// A best-fit, coalescing allocator over a borrowed byte region.
///
/// The region is only borrowed: the allocator never frees it and must not
/// outlive it. Block headers are stored inside the region itself, so the
/// usable capacity is the region length minus one header per live block.
///
/// `malloc` honors alignments up to
/// [`MAX_ALIGN`](crate::aligned::MAX_ALIGN) on its own, without an
/// [`AlignedAllocator`](crate::aligned::AlignedAllocator) on top: it
/// reserves the alignment slack inside the block and records the offset
/// in the byte before the returned pointer.
pub struct LargeAllocator<'a> {
    // all the blocks, allocated or free, ordered by address
    blocks: List<'a, Block<'a>>,
    free_tree: RbTree<'a, FreeBySize<'a>>,
    min_block_size: usize,
    region_beg: *mut u8,
    region_len: usize,
    _region: PhantomData<&'a mut [u8]>,
}

impl<'a> fmt::Debug for LargeAllocator<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LargeAllocator")
            .field("region_len", &self.region_len)
            .field("min_block_size", &self.min_block_size)
            .finish()
    }
}

impl<'a> LargeAllocator<'a> {
    /// Take over `region`, creating one free block spanning all of it
    /// (after aligning the start to the block-header alignment).
    ///
    /// `min_block_size` caps splitting: a split never produces a free
    /// remainder with a payload smaller than this (rounded up to the
    /// header alignment). Zero is fine and means "any remainder that can
    /// hold a header is worth keeping".
    pub fn new(region: &'a mut [u8], min_block_size: Bytes) -> LargeAllocator<'a> {
        let beg = region.as_mut_ptr();
        let end = beg.wrapping_add(region.len());

        let mut allocator = LargeAllocator {
            blocks: List::new(),
            free_tree: RbTree::default(),
            min_block_size: round_up_pow2(min_block_size.0, HEADER_ALIGN),
            region_beg: beg,
            region_len: 0,
            _region: PhantomData,
        };

        let beg = align_ptr_up(beg, HEADER_ALIGN);
        if beg as usize + HEADER_SIZE <= end as usize {
            let total = end as usize - beg as usize;
            unsafe {
                ptr::write(beg as *mut Block<'a>, Block::default());
                let block = &*(beg as *const Block<'a>);
                block.set_free(true);
                block.set_total_size(total);

                allocator.blocks.add_first(block);
                allocator.free_tree.insert(block);
                write_free_pattern(block);
            }
            allocator.region_beg = beg;
            allocator.region_len = total;
        }
        allocator
    }

    /// The length of the managed region after start alignment; the sum of
    /// all block total sizes is always exactly this.
    #[inline]
    pub fn aligned_region_len(&self) -> Bytes {
        Bytes(self.region_len)
    }

    /// Iterate `(total_size, is_free)` over every block in address order.
    pub fn block_spans(&self) -> impl Iterator<Item = (Bytes, bool)> + 'a {
        let mut cur = self.blocks.first();
        core::iter::from_fn(move || {
            let block = cur?;
            cur = block.list_node().next();
            Some((Bytes(block.total_size()), block.is_free()))
        })
    }

    /// Audit every structural invariant: the block list covers the region
    /// contiguously, free bits agree with free-tree membership, no two
    /// adjacent blocks are free, and the free tree itself is a valid
    /// red-black tree.
    ///
    /// This is *O(region)*; with the `extra_assertions` feature it also
    /// runs automatically after every mutation.
    pub fn validate(&self) {
        self.free_tree.validate();

        let mut prev_free = false;
        let mut total = 0usize;
        let mut free_blocks = 0usize;
        let mut expected_addr = self.region_beg as usize;

        let mut cur = self.blocks.first();
        while let Some(block) = cur {
            let addr = block as *const Block<'a> as usize;
            assert_eq!(addr, expected_addr, "block list must cover the region contiguously");
            assert_eq!(
                block.is_free(),
                block.tree_node.is_linked(),
                "free bit and free-tree membership must agree"
            );
            if block.is_free() {
                assert!(!prev_free, "adjacent free blocks must have been coalesced");
                free_blocks += 1;
            }
            prev_free = block.is_free();
            total += block.total_size();
            expected_addr = addr + block.total_size();
            cur = block.list_node().next();
        }

        assert_eq!(total, self.region_len, "blocks must sum to the aligned region length");
        assert_eq!(free_blocks, self.free_tree.iter().count());
    }

    #[cfg(feature = "extra_assertions")]
    fn validate_extra(&self) {
        self.validate();
    }

    #[cfg(not(feature = "extra_assertions"))]
    #[inline(always)]
    fn validate_extra(&self) {}
}

impl<'a> RawAlloc for LargeAllocator<'a> {
    unsafe fn malloc(&mut self, size: Bytes, align: Bytes) -> Result<NonNull<u8>, AllocErr> {
        debug_assert!(size.0 > 0);
        debug_assert!(is_valid_alignment(align) && align <= aligned::MAX_ALIGN);

        let align = cmp::max(align.0, HEADER_ALIGN);
        let payload = round_up_pow2(size.0, HEADER_ALIGN);
        // Reserve enough that `size` bytes remain even after skipping up
        // to `align` bytes to place the returned pointer on a boundary.
        let target = payload + align;

        let block = match self.free_tree.lower_bound(&target).get() {
            Some(block) => block,
            None => return Err(AllocErr),
        };
        self.free_tree.remove(block);
        block.set_free(false);
        assert_is_poisoned(block);

        // Split when the tail is big enough to stand as a block of its own.
        if block.size() >= target + HEADER_SIZE + self.min_block_size {
            let old_size = block.size();
            block.set_size(target);

            let next_addr = block as *const Block<'a> as usize + block.total_size();
            ptr::write(next_addr as *mut Block<'a>, Block::default());
            let next = &*(next_addr as *const Block<'a>);
            next.set_free(true);
            next.set_size(old_size - target - HEADER_SIZE);

            self.blocks.insert_after(next, block);
            self.free_tree.insert(next);
        }

        self.validate_extra();
        let user = aligned::adjust_for_alignment(block.payload(), Bytes(align));
        assert_aligned_to(user, align);
        Ok(NonNull::new_unchecked(user))
    }

    unsafe fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }

        let payload = aligned::recover_base(p);
        let mut block = &*((payload as usize - HEADER_SIZE) as *const Block<'a>);
        extra_assert!(!block.is_free(), "double free");
        block.set_free(true);

        // Coalesce with the previous or the next block if possible.
        if let Some(prev) = block.list_node().prev() {
            if prev.is_free() {
                self.free_tree.remove(prev);
                self.blocks.remove(block);
                prev.set_size(prev.size() + block.total_size());
                block = prev;
            }
        }
        if let Some(next) = block.list_node().next() {
            if next.is_free() {
                self.free_tree.remove(next);
                self.blocks.remove(next);
                block.set_size(block.size() + next.total_size());
            }
        }

        self.free_tree.insert(block);
        write_free_pattern(block);
        self.validate_extra();
    }
}
