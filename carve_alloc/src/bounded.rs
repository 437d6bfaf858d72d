//! Bounds checking with a canary word past the end of each allocation.
//!
//! Layout of one allocation, from the base pointer handed back by the
//! underlying allocator:
//!
//! ```text
//! base                      user                 user + size
//! |  ...padding...  header  |  ...payload...     | tag |
//!                   ^ 8 bytes, immediately before `user`
//! ```
//!
//! The header records the requested size and the distance back to `base`;
//! the 4-byte tag is rewritten at `user + size` on every allocation and
//! checked on free. A mismatch means something wrote one-past-the-end and
//! is treated as fatal.

use core::cmp;
use core::mem;
use core::ptr::{self, NonNull};
use memory_units::Bytes;

use crate::align::round_up_pow2;
use crate::{AllocErr, RawAlloc};

/// The canary value used when none is supplied.
pub const DEFAULT_TAG: u32 = 0xDEAD_BEAF;

#[repr(C)]
#[derive(Clone, Copy)]
struct Header {
    user_size: u32,
    offset: u32,
}

/// A wrapper that brackets every allocation with a size header and a
/// trailing canary, catching one-past-the-end overruns on free.
#[derive(Debug)]
pub struct BoundedAllocator<'b, A: RawAlloc> {
    base: &'b mut A,
    tag: u32,
}

impl<'b, A: RawAlloc> BoundedAllocator<'b, A> {
    /// Wrap `base` using [`DEFAULT_TAG`] as the canary.
    pub fn new(base: &'b mut A) -> BoundedAllocator<'b, A> {
        BoundedAllocator::with_tag(base, DEFAULT_TAG)
    }

    /// Wrap `base` with a caller-chosen canary word.
    pub fn with_tag(base: &'b mut A, tag: u32) -> BoundedAllocator<'b, A> {
        BoundedAllocator { base, tag }
    }
}

impl<'b, A: RawAlloc> RawAlloc for BoundedAllocator<'b, A> {
    unsafe fn malloc(&mut self, size: Bytes, align: Bytes) -> Result<NonNull<u8>, AllocErr> {
        debug_assert!(size.0 <= u32::MAX as usize);

        let max_align = cmp::max(align.0, mem::align_of::<u32>());
        // header + alignment padding + user memory + tag
        let lead = round_up_pow2(mem::size_of::<Header>(), max_align);
        let total = lead + size.0 + mem::size_of::<u32>();

        let base = self.base.malloc(Bytes(total), Bytes(max_align))?;
        let user = base.as_ptr().add(lead);
        let header = (user as *mut Header).sub(1);
        ptr::write(
            header,
            Header {
                user_size: size.0 as u32,
                offset: lead as u32,
            },
        );
        ptr::write_unaligned(user.add(size.0) as *mut u32, self.tag);
        Ok(NonNull::new_unchecked(user))
    }

    unsafe fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }

        let header = ptr::read((p as *const Header).sub(1));
        // check if the tag was overwritten
        let tag = ptr::read_unaligned(p.add(header.user_size as usize) as *const u32);
        assert_eq!(
            tag, self.tag,
            "canary past the end of a {}-byte allocation was clobbered",
            header.user_size
        );
        self.base.free(p.sub(header.offset as usize));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(mem::size_of::<Header>(), 8);
        assert_eq!(mem::align_of::<Header>(), mem::align_of::<u32>());
    }
}
