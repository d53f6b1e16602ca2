//! Integer arithmetic, logical, rotate and compare translators.
//!
//! Each translator computes in EAX/ECX and writes the result back to the
//! register file. XER[CA] comes straight from the host carry flag.

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::CodeBuffer;
use ppcdrc_core::cpu::gpr_offset;
use ppcdrc_core::decode::rotate_mask;
use ppcdrc_core::{Insn, Opcode};

use super::flags::{emit_cr_from_flags, emit_load_ca_into_cf, emit_load_so, emit_set_ca_from_cf, emit_set_cr0};
use super::{ld_gpr, st_gpr};
use crate::Compiled;

/// `eax <op>= r[n]`.
fn arith_gpr(buf: &mut CodeBuffer, op: ArithOp, n: usize) {
    emit_arith_rm(buf, op, false, Reg::Rax, ENV_REG, gpr_offset(n));
}

/// Store EAX to `r[dst]`, then update CR0 if `rc`.
fn finish(buf: &mut CodeBuffer, dst: usize, rc: bool) -> Compiled {
    st_gpr(buf, Reg::Rax, dst);
    if rc {
        emit_set_cr0(buf, Reg::Rax);
    }
    Compiled::next()
}

/// add, addc, addi, addis, addic(.), subf, subfc, subfe, subfic, neg,
/// mulli, mullw, mulhw, mulhwu. Forms with OE set never reach here.
pub fn arith(buf: &mut CodeBuffer, op: Opcode, insn: Insn) -> Compiled {
    use Opcode::*;
    let (rt, ra, rb) = (insn.rt(), insn.ra(), insn.rb());

    match op {
        Add | Addc => {
            ld_gpr(buf, Reg::Rax, ra);
            arith_gpr(buf, ArithOp::Add, rb);
            if op == Addc {
                emit_set_ca_from_cf(buf, false);
            }
            finish(buf, rt, insn.rc())
        }
        Addi | Addis => {
            let imm = if op == Addis { insn.simm() << 16 } else { insn.simm() };
            if ra == 0 {
                emit_mov_ri(buf, false, Reg::Rax, imm as u32 as u64);
            } else {
                ld_gpr(buf, Reg::Rax, ra);
                if imm != 0 {
                    emit_arith_ri(buf, ArithOp::Add, false, Reg::Rax, imm);
                }
            }
            finish(buf, rt, false)
        }
        Addic | AddicDot => {
            ld_gpr(buf, Reg::Rax, ra);
            emit_arith_ri(buf, ArithOp::Add, false, Reg::Rax, insn.simm());
            emit_set_ca_from_cf(buf, false);
            finish(buf, rt, op == AddicDot)
        }
        Subf | Subfc => {
            ld_gpr(buf, Reg::Rax, rb);
            arith_gpr(buf, ArithOp::Sub, ra);
            if op == Subfc {
                emit_set_ca_from_cf(buf, true);
            }
            finish(buf, rt, insn.rc())
        }
        Subfe => {
            // ~ra + rb + CA
            emit_load_ca_into_cf(buf);
            ld_gpr(buf, Reg::Rax, ra);
            emit_not(buf, false, Reg::Rax);
            arith_gpr(buf, ArithOp::Adc, rb);
            emit_set_ca_from_cf(buf, false);
            finish(buf, rt, insn.rc())
        }
        Subfic => {
            emit_mov_imm32(buf, Reg::Rax, insn.simm() as u32);
            arith_gpr(buf, ArithOp::Sub, ra);
            emit_set_ca_from_cf(buf, true);
            finish(buf, rt, false)
        }
        Neg => {
            ld_gpr(buf, Reg::Rax, ra);
            emit_neg(buf, false, Reg::Rax);
            finish(buf, rt, insn.rc())
        }
        Mulli => {
            ld_gpr(buf, Reg::Rax, ra);
            emit_imul_ri(buf, false, Reg::Rax, Reg::Rax, insn.simm());
            finish(buf, rt, false)
        }
        Mullw => {
            ld_gpr(buf, Reg::Rax, ra);
            ld_gpr(buf, Reg::Rcx, rb);
            emit_imul_rr(buf, false, Reg::Rax, Reg::Rcx);
            finish(buf, rt, insn.rc())
        }
        Mulhw | Mulhwu => {
            ld_gpr(buf, Reg::Rax, ra);
            ld_gpr(buf, Reg::Rcx, rb);
            if op == Mulhw {
                emit_imul1(buf, false, Reg::Rcx);
            } else {
                emit_mul(buf, false, Reg::Rcx);
            }
            emit_mov_rr(buf, false, Reg::Rax, Reg::Rdx);
            finish(buf, rt, insn.rc())
        }
        _ => unreachable!("{op:?} is not an arithmetic opcode"),
    }
}

/// Logical ops, sign extension and cntlzw. The result goes to RA.
pub fn logical(buf: &mut CodeBuffer, op: Opcode, insn: Insn) -> Compiled {
    use Opcode::*;
    let (rs, ra, rb) = (insn.rt(), insn.ra(), insn.rb());

    match op {
        And | Or | Xor | Nand | Nor | Eqv => {
            let host = match op {
                And | Nand => ArithOp::And,
                Or | Nor => ArithOp::Or,
                _ => ArithOp::Xor,
            };
            ld_gpr(buf, Reg::Rax, rs);
            arith_gpr(buf, host, rb);
            if matches!(op, Nand | Nor | Eqv) {
                emit_not(buf, false, Reg::Rax);
            }
        }
        Andc | Orc => {
            ld_gpr(buf, Reg::Rcx, rb);
            emit_not(buf, false, Reg::Rcx);
            ld_gpr(buf, Reg::Rax, rs);
            let host = if op == Andc { ArithOp::And } else { ArithOp::Or };
            emit_arith_rr(buf, host, false, Reg::Rax, Reg::Rcx);
        }
        AndiDot | AndisDot | Ori | Oris | Xori | Xoris => {
            let (host, shift) = match op {
                AndiDot => (ArithOp::And, 0),
                AndisDot => (ArithOp::And, 16),
                Ori => (ArithOp::Or, 0),
                Oris => (ArithOp::Or, 16),
                Xori => (ArithOp::Xor, 0),
                _ => (ArithOp::Xor, 16),
            };
            ld_gpr(buf, Reg::Rax, rs);
            emit_arith_ri(buf, host, false, Reg::Rax, (insn.uimm() << shift) as i32);
            // andi. and andis. always record
            return finish(buf, ra, host == ArithOp::And);
        }
        Extsb => {
            ld_gpr(buf, Reg::Rax, rs);
            emit_movsx(buf, OPC_MOVSBL, Reg::Rax, Reg::Rax);
        }
        Extsh => {
            ld_gpr(buf, Reg::Rax, rs);
            emit_movsx(buf, OPC_MOVSWL, Reg::Rax, Reg::Rax);
        }
        Cntlzw => {
            // bsr leaves ZF set for a zero source; 63 ^ 31 == 32
            ld_gpr(buf, Reg::Rcx, rs);
            emit_bsr(buf, false, Reg::Rax, Reg::Rcx);
            let nonzero = emit_jcc_fwd(buf, X86Cond::Jne);
            emit_mov_imm32(buf, Reg::Rax, 63);
            bind(buf, nonzero);
            emit_arith_ri(buf, ArithOp::Xor, false, Reg::Rax, 31);
        }
        _ => unreachable!("{op:?} is not a logical opcode"),
    }
    finish(buf, ra, insn.rc())
}

/// rlwinm, rlwnm, rlwimi.
pub fn rotate(buf: &mut CodeBuffer, op: Opcode, insn: Insn) -> Compiled {
    let (rs, ra, rb) = (insn.rt(), insn.ra(), insn.rb());
    let mask = rotate_mask(insn.mb(), insn.me());

    ld_gpr(buf, Reg::Rax, rs);
    if op == Opcode::Rlwnm {
        ld_gpr(buf, Reg::Rcx, rb);
        emit_shift_cl(buf, ShiftOp::Rol, false, Reg::Rax);
    } else if insn.sh() != 0 {
        emit_shift_ri(buf, ShiftOp::Rol, false, Reg::Rax, insn.sh() as u8);
    }
    if mask != u32::MAX {
        emit_arith_ri(buf, ArithOp::And, false, Reg::Rax, mask as i32);
    }
    if op == Opcode::Rlwimi {
        ld_gpr(buf, Reg::Rcx, ra);
        emit_arith_ri(buf, ArithOp::And, false, Reg::Rcx, !mask as i32);
        emit_arith_rr(buf, ArithOp::Or, false, Reg::Rax, Reg::Rcx);
    }
    finish(buf, ra, insn.rc())
}

/// cmp, cmpi, cmpl, cmpli into CR field `crfD`.
pub fn compare(buf: &mut CodeBuffer, op: Opcode, insn: Insn) -> Compiled {
    use Opcode::*;
    let signed = matches!(op, Cmp | Cmpi);

    emit_load_so(buf);
    ld_gpr(buf, Reg::Rax, insn.ra());
    match op {
        Cmp | Cmpl => arith_gpr(buf, ArithOp::Cmp, insn.rb()),
        Cmpi => emit_arith_ri(buf, ArithOp::Cmp, false, Reg::Rax, insn.simm()),
        _ => emit_arith_ri(buf, ArithOp::Cmp, false, Reg::Rax, insn.uimm() as i32),
    }
    emit_cr_from_flags(buf, insn.crfd(), signed);
    Compiled::next()
}
