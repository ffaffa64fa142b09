use crate::error::Error;
use log::{info, warn};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{fence, Ordering};

/// Byte level access to the shared window. Nothing here knows about the
/// message layout, it only keeps accesses inside the window.
pub trait SharedRegion {
    fn len(&self) -> usize;

    fn write_block(&mut self, offset: usize, data: &[u8]) -> Result<(), Error>;

    fn read_block(&self, offset: usize, len: usize) -> Result<Vec<u8>, Error>;
}

/// Fails with OutOfBounds unless [offset, offset + len) lies inside a window
/// of `size` bytes.
pub fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => return Ok(()),
        _ => {
            return Err(Error::OutOfBounds {
                offset: offset,
                len: len,
                size: size,
            })
        }
    }
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return 4096;
    }
    return size as usize;
}

pub struct MemRegion {
    // keeps the backing file open for as long as the mapping lives
    _file_fd: OwnedFd,

    // start of the mmap, which is page aligned and may sit before the window
    map_addr: *mut u8,
    map_len: usize,

    // first byte of the window inside the mapping
    addr: *mut u8,
    n_bytes: usize,
}

// The raw pointers are only ever dereferenced through &self/&mut self, callers
// that share a region across threads wrap it in a Mutex.
unsafe impl Send for MemRegion {}

impl MemRegion {
    /// Maps `n_bytes` of `path` starting at `base_address`. For /dev/mem that
    /// is the physical window shared with the host.
    pub fn map(path: &Path, base_address: u64, n_bytes: usize) -> Result<MemRegion, Error> {
        if n_bytes == 0 {
            return Err(Error::Map(format!("refusing to map an empty window")));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|err| Error::Map(format!("Failed to open {}: {}", path.display(), err)))?;

        let page = page_size() as u64;
        let aligned_base = base_address - (base_address % page);
        let delta = (base_address - aligned_base) as usize;
        let region = MemRegion::map_fd(OwnedFd::from(file), aligned_base, delta, n_bytes)?;
        info!(
            "Mapped {} bytes of {} at {:#x}",
            n_bytes,
            path.display(),
            base_address
        );
        return Ok(region);
    }

    /// Anonymous window backed by a memfd, handy when there is no real host.
    pub fn memfd(name: &str, n_bytes: usize) -> Result<MemRegion, Error> {
        let c_name = CString::new(name)
            .map_err(|_| Error::InvalidArgument(format!("memfd name {:?} has a nul", name)))?;
        unsafe {
            let raw_file_fd = libc::memfd_create(c_name.as_ptr(), 0);
            if raw_file_fd < 0 {
                return Err(Error::Map(format!(
                    "Failed to construct memfd: {}",
                    std::io::Error::last_os_error()
                )));
            }
            let file_fd = OwnedFd::from_raw_fd(raw_file_fd);

            if libc::ftruncate(file_fd.as_raw_fd(), n_bytes as libc::off_t) < 0 {
                return Err(Error::Map(format!(
                    "Failed to resize memfd: {}",
                    std::io::Error::last_os_error()
                )));
            }
            return MemRegion::map_fd(file_fd, 0, 0, n_bytes);
        }
    }

    fn map_fd(
        file_fd: OwnedFd,
        aligned_base: u64,
        delta: usize,
        n_bytes: usize,
    ) -> Result<MemRegion, Error> {
        let map_len = delta + n_bytes;
        unsafe {
            let hint: *mut libc::c_void = std::ptr::null_mut();
            let addr = libc::mmap64(
                hint,
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED, // the other side has to see our writes
                file_fd.as_raw_fd(),
                aligned_base as libc::off64_t,
            );

            if addr == libc::MAP_FAILED || addr.is_null() {
                return Err(Error::Map(format!(
                    "Failed to map memory at {:#x}: {}",
                    aligned_base + delta as u64,
                    std::io::Error::last_os_error()
                )));
            }

            let map_addr = addr as *mut u8;
            return Ok(MemRegion {
                _file_fd: file_fd,
                map_addr: map_addr,
                map_len: map_len,
                addr: map_addr.add(delta),
                n_bytes: n_bytes,
            });
        }
    }

    /// Releases the mapping. Dropping the region does the same thing.
    pub fn unmap(self) {
        drop(self);
    }
}

impl SharedRegion for MemRegion {
    fn len(&self) -> usize {
        return self.n_bytes;
    }

    fn write_block(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        check_bounds(offset, data.len(), self.n_bytes)?;
        // byte wise volatile stores, the window may be device memory
        fence(Ordering::SeqCst);
        for (i, byte) in data.iter().enumerate() {
            unsafe {
                std::ptr::write_volatile(self.addr.add(offset + i), *byte);
            }
        }
        fence(Ordering::SeqCst);
        return Ok(());
    }

    fn read_block(&self, offset: usize, len: usize) -> Result<Vec<u8>, Error> {
        check_bounds(offset, len, self.n_bytes)?;
        let mut out = vec![0u8; len];
        fence(Ordering::SeqCst);
        for (i, byte) in out.iter_mut().enumerate() {
            unsafe {
                *byte = std::ptr::read_volatile(self.addr.add(offset + i));
            }
        }
        fence(Ordering::SeqCst);
        return Ok(out);
    }
}

impl Drop for MemRegion {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.map_addr as *mut libc::c_void, self.map_len) };
        if ret != 0 {
            warn!(
                "Failed to unmap shared region: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}
