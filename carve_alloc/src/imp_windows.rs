use core::mem;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, warn};
use memory_units::Bytes;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

use crate::AllocErr;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// The platform page size. Queried once from the system, then cached; it
/// cannot change over the life of the process.
pub(crate) fn page_size() -> Bytes {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return Bytes(cached);
    }
    let size = unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    };
    debug_assert!(size.is_power_of_two());
    PAGE_SIZE.store(size, Ordering::Relaxed);
    Bytes(size)
}

/// Commit `bytes` of zero-initialized, page-aligned memory.
pub(crate) fn acquire(bytes: Bytes) -> Result<NonNull<u8>, AllocErr> {
    unsafe {
        let addr = VirtualAlloc(
            ptr::null_mut(),
            bytes.0,
            MEM_RESERVE | MEM_COMMIT,
            PAGE_READWRITE,
        );
        if addr.is_null() {
            warn!("VirtualAlloc of {} bytes failed", bytes.0);
            Err(AllocErr)
        } else {
            debug!("acquired {} page bytes at {:p}", bytes.0, addr);
            NonNull::new(addr as *mut u8).ok_or(AllocErr)
        }
    }
}

/// Release a region previously returned by [`acquire`]. Failure here means
/// the caller handed back a bad pointer, which is unrecoverable.
pub(crate) fn release(p: NonNull<u8>, bytes: Bytes) {
    unsafe {
        debug!("releasing {} page bytes at {:p}", bytes.0, p.as_ptr());
        let ok = VirtualFree(p.as_ptr() as *mut _, 0, MEM_RELEASE);
        assert_ne!(ok, 0, "VirtualFree must succeed");
    }
}
