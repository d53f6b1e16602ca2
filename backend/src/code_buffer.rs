use std::io;
use std::ptr;

/// Executable code cache backed by an anonymous mapping.
///
/// The mapping is writable while blocks are being compiled and executable
/// while they run, never both.
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    offset: usize,
}

// SAFETY: the mapping is owned exclusively by this value.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Map a cache of at least `size` bytes (rounded up to whole pages).
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let size = (size.max(1) + page - 1) & !(page - 1);

        // SAFETY: anonymous private mapping, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
            offset: 0,
        })
    }

    /// Cache top: offset of the next emitted byte.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Host address of `offset`, as stored in lookup tables and emitted as
    /// an absolute jump target.
    #[inline]
    pub fn addr_at(&self, offset: usize) -> usize {
        assert!(offset <= self.size);
        self.ptr as usize + offset
    }

    /// Offset of a host address inside the cache, if it lies inside it.
    pub fn offset_of(&self, addr: usize) -> Option<usize> {
        let base = self.ptr as usize;
        (addr >= base && addr < base + self.size).then(|| addr - base)
    }

    /// Move the cache top, e.g. to drop a half-emitted block.
    #[inline]
    pub fn set_offset(&mut self, offset: usize) {
        assert!(offset <= self.size);
        self.offset = offset;
    }

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        assert!(self.offset < self.size, "code cache overflow");
        // SAFETY: bounds checked above.
        unsafe { self.ptr.add(self.offset).write(val) };
        self.offset += 1;
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        assert!(self.offset + 4 <= self.size, "code cache overflow");
        // SAFETY: bounds checked above.
        unsafe { (self.ptr.add(self.offset) as *mut u32).write_unaligned(val) };
        self.offset += 4;
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        assert!(self.offset + 8 <= self.size, "code cache overflow");
        // SAFETY: bounds checked above.
        unsafe { (self.ptr.add(self.offset) as *mut u64).write_unaligned(val) };
        self.offset += 8;
    }

    /// Overwrite one byte of already emitted code.
    #[inline]
    pub fn patch_u8(&mut self, offset: usize, val: u8) {
        assert!(offset < self.size);
        // SAFETY: bounds checked above.
        unsafe { self.ptr.add(offset).write(val) };
    }

    /// Overwrite a 32-bit displacement or immediate.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        assert!(offset + 4 <= self.size);
        // SAFETY: bounds checked above.
        unsafe { (self.ptr.add(offset) as *mut u32).write_unaligned(val) };
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size);
        // SAFETY: bounds checked above.
        unsafe { (self.ptr.add(offset) as *const u32).read_unaligned() }
    }

    pub fn set_executable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_EXEC)
    }

    pub fn set_writable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_WRITE)
    }

    fn protect(&self, prot: libc::c_int) -> io::Result<()> {
        // SAFETY: the range is exactly our own mapping.
        let ret = unsafe { libc::mprotect(self.ptr as *mut libc::c_void, self.size, prot) };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Bytes emitted so far.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+offset lies within the mapping.
        unsafe { std::slice::from_raw_parts(self.ptr, self.offset) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: unmapping the region mapped in `new`.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
