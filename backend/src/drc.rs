//! Code cache protocol.
//!
//! Guest PCs map to host code through a two-level lookup table. Every
//! unfilled slot points at the recompile stub, so dispatching to a PC that
//! has never been compiled exits to the driver, which compiles it and
//! re-enters at the dispatcher.
//!
//! Layout of the cache after a reset:
//!
//! ```text
//! prologue | exit | out_of_cycles | recompile | dispatch | hook stubs | entry | blocks...
//! ```
//!
//! Blocks are compiled as sequences. Each guest instruction registers its
//! host address as it is emitted, so branches into the middle of a block
//! dispatch straight to it. Branches to PCs that are not compiled yet emit
//! a tentative dispatcher; when the sequence ends, tentative dispatchers
//! whose target landed in the same sequence are patched into direct jumps.

use ppcdrc_core::{DrcConfig, DrcError, Result};
use tracing::{debug, trace};

use crate::code_buffer::CodeBuffer;
use crate::HostCodeGen;

/// Why generated code returned to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitCode {
    /// The timeslice is used up; PC is the next instruction to run.
    OutOfCycles = 1,
    /// No valid translation for PC: lookup miss or failed verify.
    Recompile = 2,
}

impl ExitCode {
    pub fn from_raw(raw: usize) -> Option<Self> {
        match raw {
            1 => Some(ExitCode::OutOfCycles),
            2 => Some(ExitCode::Recompile),
            _ => None,
        }
    }
}

/// Split of a guest PC into lookup table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupGeometry {
    pub l1bits: u32,
    pub l2bits: u32,
    pub l1shift: u32,
    /// PC bits that index the second level, still shifted by `lsbs`.
    pub l2mask: u32,
    pub lsbs: u32,
}

impl LookupGeometry {
    pub fn new(address_bits: u32, lsbs_to_ignore: u32) -> Self {
        let effective = address_bits - lsbs_to_ignore;
        let l2bits = (effective + 1) / 2;
        let l1bits = effective - l2bits;
        Self {
            l1bits,
            l2bits,
            l1shift: address_bits - l1bits,
            l2mask: ((1u32 << l2bits) - 1) << lsbs_to_ignore,
            lsbs: lsbs_to_ignore,
        }
    }

    #[inline]
    pub fn l1mask(&self) -> u32 {
        (1u32 << self.l1bits) - 1
    }

    #[inline]
    pub fn l1_index(&self, pc: u32) -> usize {
        (pc.checked_shr(self.l1shift).unwrap_or(0) & self.l1mask()) as usize
    }

    #[inline]
    pub fn l2_index(&self, pc: u32) -> usize {
        ((pc & self.l2mask) >> self.lsbs) as usize
    }
}

/// Offsets of the framework stubs, valid until the next reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stubs {
    pub exit: usize,
    pub out_of_cycles: usize,
    pub recompile: usize,
    pub dispatch: usize,
    pub entry: usize,
}

/// Callbacks through which the guest frontend plugs into the cache.
pub trait DrcHooks<B: HostCodeGen> {
    /// Append per-reset stubs (exception entry points) after the
    /// framework stubs. Runs before `entry_gen`.
    fn reset(&mut self, drc: &mut DrcCache<B>) -> Result<()>;

    /// Emit the code the entry stub runs before its first dispatch.
    fn entry_gen(&mut self, drc: &mut DrcCache<B>);

    /// Compile the block starting at `pc`.
    fn recompile(&mut self, drc: &mut DrcCache<B>, pc: u32) -> Result<()>;
}

/// One core's code cache and lookup table.
pub struct DrcCache<B: HostCodeGen> {
    buf: CodeBuffer,
    codegen: B,
    config: DrcConfig,
    geom: LookupGeometry,
    pc_offset: i32,
    icount_offset: i32,
    /// First level: host address of each second-level table.
    l1: Box<[usize]>,
    l2: Vec<Option<Box<[usize]>>>,
    /// Shared second level for unpopulated ranges; every slot is the
    /// recompile stub.
    recompile_table: Box<[usize]>,
    sequence: Vec<(u32, usize)>,
    tentative: Vec<(u32, usize)>,
    sequence_start: usize,
    stubs: Stubs,
    cache_base: usize,
    danger: usize,
    resets: u64,
}

impl<B: HostCodeGen> DrcCache<B> {
    /// Map the cache. `pc_offset` and `icount_offset` locate the guest PC
    /// and the cycle counter inside the env block generated code receives.
    ///
    /// The cache is unusable until [`reset`](Self::reset) has run.
    pub fn new(codegen: B, config: DrcConfig, pc_offset: i32, icount_offset: i32) -> Result<Self> {
        config.validate()?;
        let buf = CodeBuffer::new(config.cache_size)?;
        let geom = LookupGeometry::new(config.address_bits, config.lsbs_to_ignore);
        let danger = buf.capacity() - config.danger_margin();
        let recompile_table = vec![0usize; 1 << geom.l2bits].into_boxed_slice();
        let l1 = vec![recompile_table.as_ptr() as usize; 1 << geom.l1bits].into_boxed_slice();
        let l2 = (0..1usize << geom.l1bits).map(|_| None).collect();

        Ok(Self {
            buf,
            codegen,
            config,
            geom,
            pc_offset,
            icount_offset,
            l1,
            l2,
            recompile_table,
            sequence: Vec::new(),
            tentative: Vec::new(),
            sequence_start: 0,
            stubs: Stubs::default(),
            cache_base: 0,
            danger,
            resets: 0,
        })
    }

    /// Discard every translation and regenerate the stubs.
    pub fn reset(&mut self, hooks: &mut dyn DrcHooks<B>) -> Result<()> {
        self.buf.set_writable()?;
        self.buf.set_offset(0);
        self.sequence.clear();
        self.tentative.clear();

        self.codegen.emit_prologue(&mut self.buf);
        self.codegen.emit_epilogue(&mut self.buf);
        self.stubs.exit = self.codegen.epilogue_offset();

        self.stubs.out_of_cycles = self.buf.offset();
        self.codegen.emit_exit(&mut self.buf, ExitCode::OutOfCycles as u32);
        self.stubs.recompile = self.buf.offset();
        self.codegen.emit_exit(&mut self.buf, ExitCode::Recompile as u32);

        let recompile_addr = self.buf.addr_at(self.stubs.recompile);
        self.recompile_table.fill(recompile_addr);
        let empty = self.recompile_table.as_ptr() as usize;
        self.l1.fill(empty);
        self.l2.iter_mut().for_each(|t| *t = None);

        self.stubs.dispatch = self.buf.offset();
        self.append_dispatcher();

        hooks.reset(self)?;
        self.stubs.entry = self.buf.offset();
        hooks.entry_gen(self);
        self.append_dispatcher();

        self.cache_base = self.buf.offset();
        self.resets += 1;
        debug!(
            target: "ppcdrc::cache",
            stub_bytes = self.cache_base,
            resets = self.resets,
            "code cache reset"
        );
        Ok(())
    }

    /// Compile `pc`, resetting the cache first if the top has entered the
    /// danger zone.
    pub fn recompile(&mut self, hooks: &mut dyn DrcHooks<B>, pc: u32) -> Result<()> {
        if self.buf.offset() >= self.danger {
            debug!(target: "ppcdrc::cache", top = self.buf.offset(), "cache full");
            self.reset(hooks)?;
            if self.buf.offset() >= self.danger {
                return Err(DrcError::BlockTooLarge { pc });
            }
        }
        if let Err(e) = hooks.recompile(self, pc) {
            self.abort_sequence();
            return Err(e);
        }
        Ok(())
    }

    /// Run generated code from `target_offset` until it exits.
    ///
    /// # Safety
    /// `env` must point to the block whose layout `pc_offset`,
    /// `icount_offset` and every compiled block were generated against,
    /// and stay valid and unaliased for the duration of the call.
    pub unsafe fn enter(&mut self, env: *mut u8, target_offset: usize) -> Result<usize> {
        self.buf.set_executable()?;
        // Prologue signature:
        //   fn(env: *mut u8, target: *const u8) -> usize
        let prologue: unsafe extern "C" fn(*mut u8, *const u8) -> usize =
            core::mem::transmute(self.buf.base_ptr());
        let raw = prologue(env, self.buf.addr_at(target_offset) as *const u8);
        self.buf.set_writable()?;
        trace!(target: "ppcdrc::cache", raw, "exit from generated code");
        Ok(raw)
    }

    // -- Accessors --

    #[inline]
    pub fn buf(&self) -> &CodeBuffer {
        &self.buf
    }

    /// The buffer to emit into; the cache top is the next block's address.
    #[inline]
    pub fn buf_mut(&mut self) -> &mut CodeBuffer {
        &mut self.buf
    }

    #[inline]
    pub fn codegen(&self) -> &B {
        &self.codegen
    }

    #[inline]
    pub fn stubs(&self) -> &Stubs {
        &self.stubs
    }

    #[inline]
    pub fn config(&self) -> &DrcConfig {
        &self.config
    }

    #[inline]
    pub fn geometry(&self) -> &LookupGeometry {
        &self.geom
    }

    #[inline]
    pub fn pc_offset(&self) -> i32 {
        self.pc_offset
    }

    #[inline]
    pub fn icount_offset(&self) -> i32 {
        self.icount_offset
    }

    /// End of the stubs; blocks start here.
    #[inline]
    pub fn cache_base(&self) -> usize {
        self.cache_base
    }

    /// Number of resets since creation.
    #[inline]
    pub fn resets(&self) -> u64 {
        self.resets
    }

    // -- Lookup table --

    /// Cache offset of the translation registered for `pc`.
    pub fn lookup(&self, pc: u32) -> Option<usize> {
        let table = self.l2[self.geom.l1_index(pc)].as_ref()?;
        let addr = table[self.geom.l2_index(pc)];
        if addr == self.recompile_table[0] {
            return None;
        }
        self.buf.offset_of(addr)
    }

    fn table_for(&mut self, pc: u32) -> &mut [usize] {
        let l1i = self.geom.l1_index(pc);
        let fill = self.recompile_table[0];
        let size = self.recompile_table.len();
        let l1 = &mut self.l1;
        self.l2[l1i].get_or_insert_with(|| {
            let table = vec![fill; size].into_boxed_slice();
            l1[l1i] = table.as_ptr() as usize;
            table
        })
    }

    /// Host address of the lookup slot for `pc`, allocating its table.
    fn slot_addr(&mut self, pc: u32) -> usize {
        let l2i = self.geom.l2_index(pc);
        let table = self.table_for(pc);
        &table[l2i] as *const usize as usize
    }

    fn set_lookup(&mut self, pc: u32, addr: usize) {
        let l2i = self.geom.l2_index(pc);
        self.table_for(pc)[l2i] = addr;
    }

    // -- Sequences --

    /// Start compiling a block at `pc`.
    ///
    /// An older translation of `pc` is overwritten with a jump to the
    /// dispatcher so that blocks linked to it directly re-dispatch.
    pub fn begin_sequence(&mut self, pc: u32) {
        if let Some(old) = self.lookup(pc) {
            let dispatch = self.stubs.dispatch;
            self.codegen.patch_jump(&mut self.buf, old, dispatch);
        }
        self.sequence.clear();
        self.tentative.clear();
        self.sequence_start = self.buf.offset();
        self.register_code_at_cache_top(pc);
    }

    /// Make the cache top the translation of `pc`.
    pub fn register_code_at_cache_top(&mut self, pc: u32) {
        let top = self.buf.offset();
        let addr = self.buf.addr_at(top);
        self.set_lookup(pc, addr);
        self.sequence.push((pc, top));
    }

    /// Finish the current block: tentative dispatchers targeting PCs it
    /// registered become direct jumps. Returns the number patched.
    pub fn end_sequence(&mut self) -> usize {
        let mut patched = 0;
        for &(pc, at) in &self.tentative {
            if let Some(&(_, target)) = self.sequence.iter().find(|(p, _)| *p == pc) {
                self.codegen.patch_jump(&mut self.buf, at, target);
                patched += 1;
            }
        }
        self.sequence.clear();
        self.tentative.clear();
        patched
    }

    /// Drop a partially compiled block.
    pub fn abort_sequence(&mut self) {
        let recompile = self.recompile_table[0];
        let registered = std::mem::take(&mut self.sequence);
        for &(pc, _) in &registered {
            self.set_lookup(pc, recompile);
        }
        self.tentative.clear();
        self.buf.set_offset(self.sequence_start);
    }

    /// Instructions registered in the current sequence.
    pub fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    // -- Code shapes --

    /// Jump to the translation of the PC held in env.
    pub fn append_dispatcher(&mut self) {
        let l1_addr = self.l1.as_ptr() as usize;
        self.codegen
            .emit_dispatch(&mut self.buf, self.pc_offset, &self.geom, l1_addr);
    }

    /// Jump to the translation of a PC known at compile time.
    pub fn append_fixed_dispatcher(&mut self, pc: u32) {
        match self.lookup(pc) {
            Some(target) => self.codegen.emit_jump(&mut self.buf, target),
            None => {
                let slot = self.slot_addr(pc);
                self.codegen.emit_slot_jump(&mut self.buf, slot);
            }
        }
    }

    /// Like [`append_fixed_dispatcher`](Self::append_fixed_dispatcher),
    /// but patched into a direct jump if `pc` is compiled before the
    /// sequence ends.
    pub fn append_tentative_fixed_dispatcher(&mut self, pc: u32) {
        if let Some(target) = self.lookup(pc) {
            self.codegen.emit_jump(&mut self.buf, target);
            return;
        }
        self.tentative.push((pc, self.buf.offset()));
        let slot = self.slot_addr(pc);
        self.codegen.emit_slot_jump(&mut self.buf, slot);
    }

    /// Recompile unless the guest word at `word_ptr` still equals `value`.
    pub fn append_verify_code(&mut self, word_ptr: *const u32, value: u32) {
        let fail = self.stubs.recompile;
        self.codegen
            .emit_verify(&mut self.buf, word_ptr as usize, value, fail);
    }

    /// Advance PC by `pcdelta`, charge `cycles`, and leave once the
    /// timeslice is exhausted.
    pub fn append_standard_epilogue(&mut self, cycles: u32, pcdelta: u32) {
        let out = self.stubs.out_of_cycles;
        self.codegen.emit_cycle_epilogue(
            &mut self.buf,
            self.pc_offset,
            self.icount_offset,
            cycles,
            pcdelta,
            out,
        );
    }

    /// Jump to the recompile stub.
    pub fn append_recompile_exit(&mut self) {
        let target = self.stubs.recompile;
        self.codegen.emit_jump(&mut self.buf, target);
    }
}
