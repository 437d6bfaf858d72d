//! Alignment by over-allocation with a stored offset byte.
//!
//! The scheme: ask the base allocator for `size + alignment` bytes, bump
//! the returned pointer up to the next `alignment` boundary *past* at least
//! one byte, and record the distance in the byte just before the pointer we
//! hand out. `free` reads that byte back to find the base allocation. The
//! `+ 1` in the bump guarantees the offset is at least one, so the metadata
//! byte always has a home; since the offset can reach 256 but a byte only
//! holds 255, the value `0` encodes "exactly 256".
//!
//! The [`LargeAllocator`](crate::large::LargeAllocator) uses the same
//! helpers internally so that its own returned pointers carry an offset
//! byte, which is what lets it honor caller-requested alignments without a
//! wrapper.

use core::ptr::NonNull;
use memory_units::Bytes;

use crate::align::{is_valid_alignment, round_up_pow2};
use crate::{AllocErr, RawAlloc};

/// The largest alignment the offset-byte scheme can express.
pub const MAX_ALIGN: Bytes = Bytes(256);

/// Bump `base` to the next `align` boundary strictly past it and record
/// the offset in the byte before the returned pointer.
///
/// # Safety
///
/// `base` must point at an allocation with at least `align` slack bytes.
pub(crate) unsafe fn adjust_for_alignment(base: *mut u8, align: Bytes) -> *mut u8 {
    debug_assert!(!base.is_null());
    debug_assert!(is_valid_alignment(align) && align <= MAX_ALIGN);

    let user = round_up_pow2(base as usize + 1, align.0) as *mut u8;
    let offset = user as usize - base as usize;
    debug_assert!(1 <= offset && offset <= align.0);
    *user.sub(1) = if align == MAX_ALIGN { 0 } else { offset as u8 };
    user
}

/// Recover the base allocation from a pointer produced by
/// [`adjust_for_alignment`].
///
/// # Safety
///
/// `user` must carry an offset byte, i.e. be a pointer previously returned
/// by `adjust_for_alignment`.
pub(crate) unsafe fn recover_base(user: *mut u8) -> *mut u8 {
    debug_assert!(!user.is_null());

    let offset = match *user.sub(1) {
        0 => MAX_ALIGN.0,
        off => off as usize,
    };
    user.sub(offset)
}

/// A wrapper that serves aligned allocations from any byte-granular base
/// allocator.
///
/// Alignments up to [`MAX_ALIGN`] are supported. The wrapper holds an
/// exclusive reference to its base for its whole lifetime; metadata lives
/// inside the base's allocation and dies with it.
#[derive(Debug)]
pub struct AlignedAllocator<'b, A: RawAlloc> {
    base: &'b mut A,
}

impl<'b, A: RawAlloc> AlignedAllocator<'b, A> {
    /// Wrap `base`.
    pub fn new(base: &'b mut A) -> AlignedAllocator<'b, A> {
        AlignedAllocator { base }
    }
}

impl<'b, A: RawAlloc> RawAlloc for AlignedAllocator<'b, A> {
    unsafe fn malloc(&mut self, size: Bytes, align: Bytes) -> Result<NonNull<u8>, AllocErr> {
        debug_assert!(is_valid_alignment(align) && align <= MAX_ALIGN);

        let base = self.base.malloc(size + align, Bytes(1))?;
        let user = adjust_for_alignment(base.as_ptr(), align);
        Ok(NonNull::new_unchecked(user))
    }

    unsafe fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        self.base.free(recover_base(p));
    }
}
