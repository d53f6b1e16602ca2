use std::cell::Cell;
use std::ops::Range;
use std::ptr::NonNull;

use ppcdrc_core::{Access, GuestMemory};
use tracing::trace;

/// Flat big-endian RAM at `base`.
///
/// Storage is one host-order `u32` per aligned guest word, so
/// `opcode_ptr` can hand out a pointer straight into it. Ranges passed to
/// [`unmap`](Self::unmap) fail address translation.
pub struct RamBus {
    base: u32,
    words: Box<[Cell<u32>]>,
    unmapped: Vec<Range<u32>>,
}

impl RamBus {
    /// `size` is rounded up to a whole word.
    pub fn new(base: u32, size: usize) -> Self {
        let words = (0..size.div_ceil(4)).map(|_| Cell::new(0)).collect();
        Self {
            base,
            words,
            unmapped: Vec::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.words.len() * 4
    }

    /// Make translation of `range` fail on MMU cores.
    pub fn unmap(&mut self, range: Range<u32>) {
        self.unmapped.push(range);
    }

    /// Remove every `unmap`ped range.
    pub fn map_all(&mut self) {
        self.unmapped.clear();
    }

    fn word(&self, addr: u32) -> Option<&Cell<u32>> {
        let index = addr.checked_sub(self.base)? as usize / 4;
        self.words.get(index)
    }

    /// Copy `bytes` into RAM starting at `addr`.
    pub fn load_bytes(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.write8(addr.wrapping_add(i as u32), b);
        }
    }

    /// Store consecutive words starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u32]) {
        for (i, &w) in words.iter().enumerate() {
            self.write32(addr.wrapping_add(4 * i as u32), w);
        }
    }
}

impl GuestMemory for RamBus {
    fn read8(&mut self, addr: u32) -> u8 {
        match self.word(addr) {
            Some(w) => (w.get() >> (24 - 8 * (addr & 3))) as u8,
            None => {
                trace!(target: "ppcdrc::cpu", addr, "read outside RAM");
                0
            }
        }
    }

    fn write8(&mut self, addr: u32, value: u8) {
        match self.word(addr) {
            Some(w) => {
                let shift = 24 - 8 * (addr & 3);
                w.set((w.get() & !(0xFF << shift)) | (value as u32) << shift);
            }
            None => trace!(target: "ppcdrc::cpu", addr, "write outside RAM"),
        }
    }

    fn read32(&mut self, addr: u32) -> u32 {
        match self.word(addr) {
            Some(w) if addr & 3 == 0 => w.get(),
            _ => {
                let hi = self.read16(addr) as u32;
                let lo = self.read16(addr.wrapping_add(2)) as u32;
                (hi << 16) | lo
            }
        }
    }

    fn write32(&mut self, addr: u32, value: u32) {
        match self.word(addr) {
            Some(w) if addr & 3 == 0 => w.set(value),
            _ => {
                self.write16(addr, (value >> 16) as u16);
                self.write16(addr.wrapping_add(2), value as u16);
            }
        }
    }

    fn opcode_ptr(&self, addr: u32) -> Option<NonNull<u32>> {
        if addr & 3 != 0 {
            return None;
        }
        self.word(addr).and_then(|w| NonNull::new(w.as_ptr()))
    }

    fn translate(&self, addr: u32, _access: Access) -> Option<u32> {
        if self.unmapped.iter().any(|r| r.contains(&addr)) {
            None
        } else {
            Some(addr)
        }
    }
}
