//! Branch translators.
//!
//! BO bits: 0x10 ignores the CR test, 0x08 is the CR value to branch on,
//! 0x04 skips the CTR decrement and 0x02 branches on CTR == 0 instead of
//! CTR != 0. A BO with both 0x10 and 0x04 set always branches.

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::CodeBuffer;
use ppcdrc_core::cpu::{cr_offset, CTR_OFFSET, LR_OFFSET, PC_OFFSET};
use ppcdrc_core::{Insn, Opcode};

use super::exception::{emit_check_interrupts, emit_update_counters};
use super::TransCtx;
use crate::{Compiled, Drc};

const BO_NO_CR: u32 = 0x10;
const BO_CR_TRUE: u32 = 0x08;
const BO_NO_CTR: u32 = 0x04;
const BO_CTR_ZERO: u32 = 0x02;

#[inline]
fn always(bo: u32) -> bool {
    bo & (BO_NO_CR | BO_NO_CTR) == BO_NO_CR | BO_NO_CTR
}

/// Set PC to `target`, charge the branch, check interrupts and continue
/// at the target's translation.
pub fn append_branch_or_dispatch(drc: &mut Drc, ctx: &TransCtx, target: u32) {
    let buf = drc.buf_mut();
    emit_store_imm(buf, false, ENV_REG, PC_OFFSET, target as i32);
    emit_update_counters(buf, ctx.model);
    drc.append_standard_epilogue(1, 0);
    emit_check_interrupts(drc.buf_mut(), ctx.model, &ctx.stubs);
    drc.append_tentative_fixed_dispatcher(target);
}

fn store_link(buf: &mut CodeBuffer, ctx: &TransCtx) {
    emit_store_imm(buf, false, ENV_REG, LR_OFFSET, ctx.next_pc() as i32);
}

/// Emit the CTR and CR tests of `bo`/`bi`. The returned fixups jump past
/// the taken path when the branch falls through.
fn emit_conditions(buf: &mut CodeBuffer, bo: u32, bi: u32) -> Vec<Fixup> {
    let mut not_taken = Vec::with_capacity(2);
    if bo & BO_NO_CTR == 0 {
        emit_arith_mi(buf, ArithOp::Sub, false, ENV_REG, CTR_OFFSET, 1);
        let cond = if bo & BO_CTR_ZERO == 0 { X86Cond::Je } else { X86Cond::Jne };
        not_taken.push(emit_jcc_fwd(buf, cond));
    }
    if bo & BO_NO_CR == 0 {
        let bit = 1u8 << (3 - (bi & 3));
        emit_test_mb(buf, ENV_REG, cr_offset((bi / 4) as usize), bit);
        let cond = if bo & BO_CR_TRUE != 0 { X86Cond::Je } else { X86Cond::Jne };
        not_taken.push(emit_jcc_fwd(buf, cond));
    }
    not_taken
}

/// b, ba, bl, bla.
pub fn b(drc: &mut Drc, ctx: &TransCtx, insn: Insn) -> Compiled {
    let base = if insn.aa() { 0 } else { ctx.pc };
    let target = base.wrapping_add(insn.li() as u32);
    if insn.lk() {
        store_link(drc.buf_mut(), ctx);
    }
    append_branch_or_dispatch(drc, ctx, target);
    Compiled::closed()
}

/// bc with an immediate displacement.
pub fn bc(drc: &mut Drc, ctx: &TransCtx, insn: Insn) -> Compiled {
    let base = if insn.aa() { 0 } else { ctx.pc };
    let target = base.wrapping_add(insn.bd() as u32);
    let bo = insn.bo();
    if insn.lk() {
        store_link(drc.buf_mut(), ctx);
    }
    if always(bo) {
        append_branch_or_dispatch(drc, ctx, target);
        return Compiled::closed();
    }

    let not_taken = emit_conditions(drc.buf_mut(), bo, insn.bi());
    append_branch_or_dispatch(drc, ctx, target);
    let buf = drc.buf_mut();
    for fixup in not_taken {
        bind(buf, fixup);
    }
    Compiled::next()
}

/// bclr and bcctr. The target is read before LR is overwritten.
pub fn bclr_bcctr(drc: &mut Drc, ctx: &TransCtx, op: Opcode, insn: Insn) -> Compiled {
    let bo = insn.bo();
    let buf = drc.buf_mut();
    let source = if op == Opcode::Bclr { LR_OFFSET } else { CTR_OFFSET };
    emit_load(buf, false, Reg::Rax, ENV_REG, source);
    emit_arith_ri(buf, ArithOp::And, false, Reg::Rax, !3);
    if insn.lk() {
        store_link(buf, ctx);
    }
    if always(bo) {
        emit_store(buf, false, Reg::Rax, ENV_REG, PC_OFFSET);
        return Compiled::redirect();
    }

    let not_taken = emit_conditions(buf, bo, insn.bi());
    emit_store(buf, false, Reg::Rax, ENV_REG, PC_OFFSET);
    emit_update_counters(buf, ctx.model);
    drc.append_standard_epilogue(1, 0);
    emit_check_interrupts(drc.buf_mut(), ctx.model, &ctx.stubs);
    drc.append_dispatcher();
    let buf = drc.buf_mut();
    for fixup in not_taken {
        bind(buf, fixup);
    }
    Compiled::next()
}
