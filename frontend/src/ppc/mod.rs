//! PowerPC 403/602/603 block compiler.
//!
//! A [`PpcCompiler`] holds what survives across compilations (model,
//! verify mode, the exception stub offsets). Each cache miss opens a
//! [`CompileSession`] that borrows the CPU to read guest words and plugs
//! into the cache through [`DrcHooks`].

pub mod alu;
pub mod branch;
pub mod exception;
pub mod flags;
pub mod helpers;
pub mod mem;
pub mod system;

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::{CodeBuffer, DrcHooks, X86_64CodeGen};
use ppcdrc_core::cpu::{gpr_offset, FAULT_OFFSET, SRR0_OFFSET};
use ppcdrc_core::{decode, CpuModel, DrcError, Insn, Opcode, PpcConfig, PpcCpu, Result};
use tracing::{debug, error};

use crate::{block_loop, BlockCompiler, BlockContext, BlockEnd, CompileFlags, Compiled, Drc};
use exception::ExceptionStubs;

/// Per-core compiler state.
#[derive(Debug, Clone)]
pub struct PpcCompiler {
    model: CpuModel,
    strict_verify: bool,
    uses_fp: bool,
    max_insns: u32,
    stubs: ExceptionStubs,
}

impl PpcCompiler {
    pub fn new(config: &PpcConfig) -> Self {
        Self {
            model: config.model,
            strict_verify: config.strict_verify,
            uses_fp: config.drc.uses_fp,
            max_insns: config.drc.max_instructions - 1,
            stubs: ExceptionStubs::default(),
        }
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    /// Offsets of the exception stubs emitted by the last cache reset.
    pub fn stubs(&self) -> &ExceptionStubs {
        &self.stubs
    }

    pub fn session<'a>(&'a mut self, cpu: &'a PpcCpu) -> CompileSession<'a> {
        CompileSession { compiler: self, cpu }
    }
}

/// A compiler bound to the CPU whose memory it reads instructions from.
pub struct CompileSession<'a> {
    compiler: &'a mut PpcCompiler,
    cpu: &'a PpcCpu,
}

/// What a translator needs to know about the instruction being compiled.
#[derive(Debug, Clone, Copy)]
pub struct TransCtx {
    pub model: CpuModel,
    pub uses_fp: bool,
    pub stubs: ExceptionStubs,
    pub pc: u32,
}

impl TransCtx {
    #[inline]
    pub fn next_pc(&self) -> u32 {
        self.pc.wrapping_add(4)
    }
}

impl DrcHooks<X86_64CodeGen> for CompileSession<'_> {
    fn reset(&mut self, drc: &mut Drc) -> Result<()> {
        self.compiler.stubs = exception::append_stubs(drc, self.compiler.model);
        Ok(())
    }

    fn entry_gen(&mut self, drc: &mut Drc) {
        let stubs = self.compiler.stubs;
        exception::emit_check_interrupts(drc.buf_mut(), self.compiler.model, &stubs);
    }

    fn recompile(&mut self, drc: &mut Drc, pc: u32) -> Result<()> {
        let mut ctx = BlockContext::new(pc, self.compiler.max_insns);
        block_loop(self, drc, &mut ctx)
    }
}

impl BlockCompiler for CompileSession<'_> {
    fn block_start(&mut self, drc: &mut Drc, ctx: &mut BlockContext) -> Result<()> {
        drc.begin_sequence(ctx.pc_first);
        if !self.compiler.strict_verify {
            if let Some(ptr) = self.cpu.opcode_ptr(ctx.pc_first) {
                // SAFETY: opcode pointers stay valid while the memory lives.
                let word = unsafe { ptr.as_ptr().read() };
                drc.append_verify_code(ptr.as_ptr(), word);
            }
        }
        Ok(())
    }

    fn compile_insn(&mut self, drc: &mut Drc, ctx: &mut BlockContext) -> Result<Compiled> {
        self.compile_one(drc, ctx.pc_next, ctx.num_insns == 0)
    }

    fn block_stop(&mut self, drc: &mut Drc, ctx: &mut BlockContext) -> Result<()> {
        if ctx.end != BlockEnd::NoReturn {
            let stubs = self.compiler.stubs;
            exception::emit_check_interrupts(drc.buf_mut(), self.compiler.model, &stubs);
            drc.append_tentative_fixed_dispatcher(ctx.pc_next);
        }
        let linked = drc.end_sequence();
        debug!(
            target: "ppcdrc::compile",
            pc = format_args!("{:#010x}", ctx.pc_first),
            insns = ctx.num_insns,
            end = ?ctx.end,
            linked,
            "compiled block"
        );
        Ok(())
    }
}

impl CompileSession<'_> {
    /// Compile the instruction at `pc` into the current sequence.
    fn compile_one(&mut self, drc: &mut Drc, pc: u32, first: bool) -> Result<Compiled> {
        let model = self.compiler.model;
        let stubs = self.compiler.stubs;
        if !first {
            drc.register_code_at_cache_top(pc);
        }

        let Some(ptr) = self.cpu.opcode_ptr(pc) else {
            emit_fetch_fault(drc, pc, &stubs);
            return Ok(Compiled::closed());
        };
        // SAFETY: see `block_start`.
        let word = unsafe { ptr.as_ptr().read() };
        if self.compiler.strict_verify {
            drc.append_verify_code(ptr.as_ptr(), word);
        }

        let ctx = TransCtx {
            model,
            uses_fp: self.compiler.uses_fp,
            stubs,
            pc,
        };
        let compiled = translate(drc, &ctx, word)?;

        if !compiled.flags.contains(CompileFlags::CLOSED) {
            exception::emit_update_counters(drc.buf_mut(), model);
            drc.append_standard_epilogue(compiled.cycles, compiled.pcdelta);
            if compiled.flags.contains(CompileFlags::ADD_DISPATCH) {
                exception::emit_check_interrupts(drc.buf_mut(), model, &stubs);
                drc.append_dispatcher();
            }
        }
        Ok(compiled)
    }
}

/// Emit host code for one instruction word.
pub fn translate(drc: &mut Drc, ctx: &TransCtx, word: u32) -> Result<Compiled> {
    use Opcode::*;

    if word == 0 {
        return Ok(Compiled::redirect());
    }
    let op = decode(word, ctx.model);
    if op.is_fp() && !ctx.uses_fp {
        return Err(unimplemented(ctx, word));
    }
    let insn = Insn(word);
    let buf = drc.buf_mut();

    match op {
        B => Ok(branch::b(drc, ctx, insn)),
        Bc => Ok(branch::bc(drc, ctx, insn)),
        Bclr | Bcctr => Ok(branch::bclr_bcctr(drc, ctx, op, insn)),

        Sc => Ok(system::sc(buf, ctx)),
        Tw | Twi => Ok(system::trap(buf, ctx, op, insn)),
        Rfi => Ok(system::rfi(buf)),
        Mfmsr | Mtmsr | Mfspr | Mtspr | Mcrf | Mfcr => Ok(system::special(buf, op, insn)),
        Fmr | Fneg | Fabs | Fnabs => Ok(system::fp_move(buf, op, insn)),

        Add | Addc | Subf | Subfc | Subfe | Neg | Mullw if insn.oe() => Ok(system::delegate(buf, ctx, op, word)),
        Add | Addc | Addi | Addis | Addic | AddicDot | Subf | Subfc | Subfe | Subfic | Neg
        | Mulli | Mullw | Mulhw | Mulhwu => Ok(alu::arith(buf, op, insn)),
        And | Andc | AndiDot | AndisDot | Or | Orc | Ori | Oris | Xor | Xori | Xoris | Nand
        | Nor | Eqv | Extsb | Extsh | Cntlzw => Ok(alu::logical(buf, op, insn)),
        Rlwimi | Rlwinm | Rlwnm => Ok(alu::rotate(buf, op, insn)),
        Cmp | Cmpi | Cmpl | Cmpli => Ok(alu::compare(buf, op, insn)),

        Lbz | Lbzu | Lbzx | Lbzux | Lhz | Lhzu | Lhzx | Lhzux | Lha | Lhau | Lhax | Lhaux
        | Lhbrx | Lwz | Lwzu | Lwzx | Lwzux | Lwbrx => Ok(mem::load(buf, ctx, op, insn)),
        Stb | Stbu | Stbx | Stbux | Sth | Sthu | Sthx | Sthux | Sthbrx | Stw | Stwu | Stwx
        | Stwux | Stwbrx => Ok(mem::store(buf, ctx, op, insn)),

        Dcbf | Dcbi | Dcbst | Dcbt | Dcbtst | Dcbz | Dcba | Eieio | Icbi | Isync | Sync
        | Tlbia | Tlbie | Tlbsync | Dccci | Dcread | Icbt | Iccci | Icread | Tlbld | Tlbli => {
            Ok(Compiled::next())
        }

        // MSR[EE] and EXIER changes must be seen by the interrupt check.
        Wrtee | Wrteei | Mtdcr => {
            system::delegate(buf, ctx, op, word);
            Ok(Compiled::next_and_dispatch())
        }

        Lswx | Stswx | Mcrxr | Rfci | Eciwx | Ecowx | Invalid => Err(unimplemented(ctx, word)),

        _ => Ok(system::delegate(buf, ctx, op, word)),
    }
}

fn unimplemented(ctx: &TransCtx, word: u32) -> DrcError {
    error!(
        target: "ppcdrc::compile",
        opcode = format_args!("{word:#010x}"),
        pc = format_args!("{:#010x}", ctx.pc),
        "unimplemented opcode"
    );
    DrcError::UnimplementedOpcode { opcode: word, pc: ctx.pc }
}

// ---------------------------------------------------------------
// Shared emission utilities
// ---------------------------------------------------------------

/// `dst = r[n]`.
#[inline]
pub(crate) fn ld_gpr(buf: &mut CodeBuffer, dst: Reg, n: usize) {
    emit_load(buf, false, dst, ENV_REG, gpr_offset(n));
}

/// `r[n] = src`.
#[inline]
pub(crate) fn st_gpr(buf: &mut CodeBuffer, src: Reg, n: usize) {
    emit_store(buf, false, src, ENV_REG, gpr_offset(n));
}

/// Call `helper(env, esi, edx)`. Arguments other than env must already be
/// in ESI/EDX. Clobbers every caller-saved register.
pub(crate) fn call_helper(buf: &mut CodeBuffer, helper: usize) {
    emit_mov_rr(buf, true, Reg::Rdi, ENV_REG);
    emit_call_abs(buf, helper);
}

/// Deliver DSI if the last data access faulted.
pub(crate) fn emit_fault_check(buf: &mut CodeBuffer, ctx: &TransCtx) {
    emit_arith_mi(buf, ArithOp::Cmp, false, ENV_REG, FAULT_OFFSET, 0);
    let ok = emit_jcc_fwd(buf, X86Cond::Je);
    emit_store_imm(buf, false, ENV_REG, FAULT_OFFSET, 0);
    emit_store_imm(buf, false, ENV_REG, SRR0_OFFSET, ctx.pc as i32);
    emit_jmp(buf, ctx.stubs.dsi);
    bind(buf, ok);
}

/// Fetch fault at `pc`: recompile if the page has become valid since,
/// otherwise take ISI.
fn emit_fetch_fault(drc: &mut Drc, pc: u32, stubs: &ExceptionStubs) {
    let recompile = drc.stubs().recompile;
    let buf = drc.buf_mut();
    emit_mov_imm32(buf, Reg::Rsi, pc);
    call_helper(buf, helpers::helper_opcode_valid as usize);
    emit_test_rr(buf, false, Reg::Rax, Reg::Rax);
    emit_jcc(buf, X86Cond::Jne, recompile);
    emit_store_imm(buf, false, ENV_REG, SRR0_OFFSET, pc as i32);
    emit_jmp(buf, stubs.isi);
}
