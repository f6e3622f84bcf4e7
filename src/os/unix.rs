use crate::{Result, io_error, mmap_error};
use alloc::ffi::CString;
use core::{ffi::c_void, ptr::NonNull};
use libc::{MAP_FAILED, MAP_PRIVATE, O_CLOEXEC, O_RDONLY, PROT_READ, SEEK_END, mmap, munmap};

/// An open file descriptor, closed on drop.
struct RawFile {
    fd: i32,
}

impl Drop for RawFile {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl RawFile {
    fn from_path(path: &str) -> Result<Self> {
        let name = CString::new(path).map_err(|_| io_error("path contains a NUL byte"))?;
        let fd = unsafe { libc::open(name.as_ptr(), O_RDONLY | O_CLOEXEC) };
        if fd == -1 {
            return Err(io_error(alloc::format!("cannot open {path}")));
        }
        Ok(Self { fd })
    }

    fn len(&self) -> Result<usize> {
        let end = unsafe { libc::lseek(self.fd, 0, SEEK_END) };
        if end < 0 {
            return Err(io_error("lseek failed"));
        }
        usize::try_from(end).map_err(|_| io_error("file is too large to map"))
    }
}

/// A read-only private mapping of a whole file, unmapped on drop.
pub(crate) struct Mapping {
    ptr: NonNull<c_void>,
    len: usize,
}

// The mapping is never written through and is owned by exactly one value.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub(crate) fn from_path(path: &str) -> Result<Self> {
        let file = RawFile::from_path(path)?;
        let len = file.len()?;
        if len == 0 {
            return Err(mmap_error(alloc::format!("{path} is empty")));
        }
        let ptr = unsafe { mmap(core::ptr::null_mut(), len, PROT_READ, MAP_PRIVATE, file.fd, 0) };
        if core::ptr::eq(ptr, MAP_FAILED) {
            return Err(mmap_error(alloc::format!("mmap of {path} failed")));
        }
        let ptr = NonNull::new(ptr).ok_or_else(|| mmap_error("mmap returned null"))?;
        #[cfg(feature = "log")]
        log::trace!("mapped [{path}] at {:p}, {len} bytes", ptr.as_ptr());
        Ok(Self { ptr, len })
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe { munmap(self.ptr.as_ptr(), self.len) };
    }
}
