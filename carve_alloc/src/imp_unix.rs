use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, warn};
use memory_units::Bytes;

use crate::AllocErr;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// The platform page size. Queried once from the kernel, then cached; it
/// cannot change over the life of the process.
pub(crate) fn page_size() -> Bytes {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return Bytes(cached);
    }
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    debug_assert!(size.is_power_of_two());
    PAGE_SIZE.store(size, Ordering::Relaxed);
    Bytes(size)
}

/// Map `bytes` of zero-initialized, page-aligned, private anonymous
/// memory.
pub(crate) fn acquire(bytes: Bytes) -> Result<NonNull<u8>, AllocErr> {
    unsafe {
        let addr = libc::mmap(
            ptr::null_mut(),
            bytes.0,
            libc::PROT_WRITE | libc::PROT_READ,
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        );
        if addr == libc::MAP_FAILED {
            warn!("mmap of {} bytes failed: {}", bytes.0, errno::errno());
            Err(AllocErr)
        } else {
            debug!("acquired {} page bytes at {:p}", bytes.0, addr);
            NonNull::new(addr as *mut u8).ok_or(AllocErr)
        }
    }
}

/// Unmap a region previously returned by [`acquire`]. Failure here means
/// the caller handed back a bad pointer, which is unrecoverable.
pub(crate) fn release(p: NonNull<u8>, bytes: Bytes) {
    unsafe {
        debug!("releasing {} page bytes at {:p}", bytes.0, p.as_ptr());
        let rc = libc::munmap(p.as_ptr() as *mut libc::c_void, bytes.0);
        assert_eq!(rc, 0, "munmap must succeed: {}", errno::errno());
    }
}
