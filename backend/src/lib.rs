//! Host code emission and the recompiler's code cache.
//!
//! `CodeBuffer` owns the executable mapping, the `x86_64` module encodes
//! instructions into it, and `drc` implements the cache protocol: lookup
//! table, framework stubs, block sequences and tentative links.

pub mod code_buffer;
pub mod drc;
pub mod x86_64;

pub use code_buffer::CodeBuffer;
pub use drc::{DrcCache, DrcHooks, ExitCode, LookupGeometry};
pub use x86_64::X86_64CodeGen;

/// Cache-level code shapes a host architecture provides.
///
/// Translators emit ordinary instructions with the architecture's encoder
/// functions directly; the cache itself only needs these shapes.
pub trait HostCodeGen {
    /// Entry trampoline: save callee-saved registers, load the env pointer
    /// from the first argument and jump to the second.
    fn emit_prologue(&mut self, buf: &mut CodeBuffer);

    /// Exit path back to the caller of the prologue. The exit code is
    /// already in the return register.
    fn emit_epilogue(&mut self, buf: &mut CodeBuffer);

    fn epilogue_offset(&self) -> usize;

    /// Return `code` to the host driver.
    fn emit_exit(&self, buf: &mut CodeBuffer, code: u32);

    /// Unconditional jump to an offset in the cache.
    fn emit_jump(&self, buf: &mut CodeBuffer, target_offset: usize);

    /// Look up the guest PC stored at `pc_offset` in env and jump to its
    /// translation.
    fn emit_dispatch(&self, buf: &mut CodeBuffer, pc_offset: i32, geom: &LookupGeometry, l1_addr: usize);

    /// Jump through the lookup slot at `slot_addr`. The sequence must be
    /// long enough for `patch_jump` to overwrite it.
    fn emit_slot_jump(&self, buf: &mut CodeBuffer, slot_addr: usize);

    /// Compare the guest word at `word_ptr` with `value`; on mismatch jump
    /// to `fail_offset`.
    fn emit_verify(&self, buf: &mut CodeBuffer, word_ptr: usize, value: u32, fail_offset: usize);

    /// `pc += pcdelta; icount -= cycles;` exit to `out_of_cycles` once
    /// icount is negative.
    fn emit_cycle_epilogue(
        &self,
        buf: &mut CodeBuffer,
        pc_offset: i32,
        icount_offset: i32,
        cycles: u32,
        pcdelta: u32,
        out_of_cycles: usize,
    );

    /// Overwrite the code at `jump_offset` with a direct jump to
    /// `target_offset`.
    fn patch_jump(&mut self, buf: &mut CodeBuffer, jump_offset: usize, target_offset: usize);
}
