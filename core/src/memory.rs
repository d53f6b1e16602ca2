use std::ptr::NonNull;

/// Kind of access presented to address translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Fetch,
}

/// Guest physical memory as seen by one core.
///
/// All multi-byte accessors are big-endian: `read32(a)` returns the word
/// whose most significant byte lives at `a`.
pub trait GuestMemory: Send {
    fn read8(&mut self, addr: u32) -> u8;
    fn write8(&mut self, addr: u32, value: u8);

    fn read16(&mut self, addr: u32) -> u16 {
        u16::from_be_bytes([self.read8(addr), self.read8(addr.wrapping_add(1))])
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let hi = self.read16(addr) as u32;
        let lo = self.read16(addr.wrapping_add(2)) as u32;
        (hi << 16) | lo
    }

    fn read64(&mut self, addr: u32) -> u64 {
        let hi = self.read32(addr) as u64;
        let lo = self.read32(addr.wrapping_add(4)) as u64;
        (hi << 32) | lo
    }

    fn write16(&mut self, addr: u32, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.write8(addr, hi);
        self.write8(addr.wrapping_add(1), lo);
    }

    fn write32(&mut self, addr: u32, value: u32) {
        self.write16(addr, (value >> 16) as u16);
        self.write16(addr.wrapping_add(2), value as u16);
    }

    fn write64(&mut self, addr: u32, value: u64) {
        self.write32(addr, (value >> 32) as u32);
        self.write32(addr.wrapping_add(4), value as u32);
    }

    /// Host pointer to the instruction word at `addr`, holding the word's
    /// value in host byte order. `None` when nothing executable is mapped
    /// there.
    ///
    /// The pointer must stay valid for as long as the memory object lives:
    /// generated code compares against it to detect modified instructions.
    fn opcode_ptr(&self, addr: u32) -> Option<NonNull<u32>>;

    /// Effective-to-physical translation for cores with an MMU. Only
    /// consulted while MSR[IR] (fetch) or MSR[DR] (data) is set.
    fn translate(&self, addr: u32, _access: Access) -> Option<u32> {
        Some(addr)
    }
}
