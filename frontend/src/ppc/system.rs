//! System, special-register and trap translators, the FP sign moves and
//! interpreter delegation.

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::CodeBuffer;
use ppcdrc_core::cpu::{
    cr_offset, fpr_offset, gpr_offset, spr, CTR_OFFSET, LR_OFFSET, MSR_OFFSET, PC_OFFSET, SRR0_OFFSET, SRR1_OFFSET,
};
use ppcdrc_core::{Insn, Opcode};

use super::flags::emit_set_cr1;
use super::helpers::{helper_interpret, helper_mfspr, helper_mtspr, helper_set_msr};
use super::{call_helper, emit_fault_check, ld_gpr, st_gpr, TransCtx};
use crate::Compiled;

/// sc: SRR0 is the instruction after the call.
pub fn sc(buf: &mut CodeBuffer, ctx: &TransCtx) -> Compiled {
    emit_store_imm(buf, false, ENV_REG, SRR0_OFFSET, ctx.next_pc() as i32);
    emit_jmp(buf, ctx.stubs.syscall);
    Compiled::closed()
}

fn emit_take_trap(buf: &mut CodeBuffer, ctx: &TransCtx) {
    emit_store_imm(buf, false, ENV_REG, SRR0_OFFSET, ctx.next_pc() as i32);
    emit_jmp(buf, ctx.stubs.trap);
}

/// tw, twi.
pub fn trap(buf: &mut CodeBuffer, ctx: &TransCtx, op: Opcode, insn: Insn) -> Compiled {
    let to = insn.rt() as u32;
    match to {
        0 => return Compiled::next(),
        // one of lt, gt, eq always holds
        0x1F => {
            emit_take_trap(buf, ctx);
            return Compiled::closed();
        }
        _ => {}
    }

    ld_gpr(buf, Reg::Rax, insn.ra());
    if op == Opcode::Twi {
        emit_arith_ri(buf, ArithOp::Cmp, false, Reg::Rax, insn.simm());
    } else {
        emit_arith_rm(buf, ArithOp::Cmp, false, Reg::Rax, ENV_REG, gpr_offset(insn.rb()));
    }
    const CONDITIONS: [(u32, X86Cond); 5] = [
        (0x10, X86Cond::Jl),
        (0x08, X86Cond::Jg),
        (0x04, X86Cond::Je),
        (0x02, X86Cond::Jb),
        (0x01, X86Cond::Ja),
    ];
    let taken: Vec<Fixup> = CONDITIONS
        .iter()
        .filter(|(bit, _)| to & bit != 0)
        .map(|&(_, cond)| emit_jcc_fwd(buf, cond))
        .collect();
    let skip = emit_jmp_fwd(buf);
    for fixup in taken {
        bind(buf, fixup);
    }
    emit_take_trap(buf, ctx);
    bind(buf, skip);
    Compiled::next()
}

/// rfi: PC = SRR0 & ~3, MSR = SRR1.
pub fn rfi(buf: &mut CodeBuffer) -> Compiled {
    emit_load(buf, false, Reg::Rax, ENV_REG, SRR0_OFFSET);
    emit_arith_ri(buf, ArithOp::And, false, Reg::Rax, !3);
    emit_store(buf, false, Reg::Rax, ENV_REG, PC_OFFSET);
    emit_load(buf, false, Reg::Rsi, ENV_REG, SRR1_OFFSET);
    call_helper(buf, helper_set_msr as usize);
    Compiled::redirect()
}

/// mfmsr, mtmsr, mfspr, mtspr, mcrf, mfcr.
pub fn special(buf: &mut CodeBuffer, op: Opcode, insn: Insn) -> Compiled {
    use Opcode::*;
    let rt = insn.rt();

    match op {
        Mfmsr => {
            emit_load(buf, false, Reg::Rax, ENV_REG, MSR_OFFSET);
            st_gpr(buf, Reg::Rax, rt);
        }
        Mtmsr => {
            ld_gpr(buf, Reg::Rsi, rt);
            call_helper(buf, helper_set_msr as usize);
            // EE may have just been set
            return Compiled::next_and_dispatch();
        }
        Mfspr => {
            match insn.spr() {
                spr::LR => emit_load(buf, false, Reg::Rax, ENV_REG, LR_OFFSET),
                spr::CTR => emit_load(buf, false, Reg::Rax, ENV_REG, CTR_OFFSET),
                n => {
                    emit_mov_imm32(buf, Reg::Rsi, n);
                    call_helper(buf, helper_mfspr as usize);
                }
            }
            st_gpr(buf, Reg::Rax, rt);
        }
        Mtspr => match insn.spr() {
            spr::LR | spr::CTR => {
                let at = if insn.spr() == spr::LR { LR_OFFSET } else { CTR_OFFSET };
                ld_gpr(buf, Reg::Rax, rt);
                emit_store(buf, false, Reg::Rax, ENV_REG, at);
            }
            n => {
                emit_mov_imm32(buf, Reg::Rsi, n);
                ld_gpr(buf, Reg::Rdx, rt);
                call_helper(buf, helper_mtspr as usize);
            }
        },
        Mcrf => {
            emit_load_zx(buf, OPC_MOVZBL, Reg::Rcx, ENV_REG, cr_offset(insn.crfs()));
            emit_store_byte(buf, Reg::Rcx, ENV_REG, cr_offset(insn.crfd()));
        }
        Mfcr => {
            emit_load_zx(buf, OPC_MOVZBL, Reg::Rax, ENV_REG, cr_offset(0));
            for field in 1..8 {
                emit_shift_ri(buf, ShiftOp::Shl, false, Reg::Rax, 4);
                emit_load_zx(buf, OPC_MOVZBL, Reg::Rcx, ENV_REG, cr_offset(field));
                emit_arith_rr(buf, ArithOp::Or, false, Reg::Rax, Reg::Rcx);
            }
            st_gpr(buf, Reg::Rax, rt);
        }
        _ => unreachable!("{op:?} is not a special-register opcode"),
    }
    Compiled::next()
}

/// fmr, fneg, fabs, fnabs: sign-bit operations on the raw double.
pub fn fp_move(buf: &mut CodeBuffer, op: Opcode, insn: Insn) -> Compiled {
    emit_load(buf, true, Reg::Rax, ENV_REG, fpr_offset(insn.rb()));
    match op {
        Opcode::Fneg => emit_btc_ri(buf, true, Reg::Rax, 63),
        Opcode::Fabs => emit_btr_ri(buf, true, Reg::Rax, 63),
        Opcode::Fnabs => emit_bts_ri(buf, true, Reg::Rax, 63),
        _ => {}
    }
    emit_store(buf, true, Reg::Rax, ENV_REG, fpr_offset(insn.rt()));
    if insn.rc() {
        emit_set_cr1(buf);
    }
    Compiled::next()
}

/// Run the instruction in the interpreter. PC is advanced by the standard
/// epilogue as for any other instruction.
pub fn delegate(buf: &mut CodeBuffer, ctx: &TransCtx, op: Opcode, word: u32) -> Compiled {
    emit_mov_imm32(buf, Reg::Rsi, word);
    call_helper(buf, helper_interpret as usize);
    if op.accesses_memory() && ctx.model.has_mmu() {
        emit_fault_check(buf, ctx);
    }
    Compiled::next()
}
