//! Condition register and XER updates in generated code.
//!
//! CR fields live in one byte each (`LT=8 GT=4 EQ=2 SO=1`), so every
//! update is a single byte store.

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::CodeBuffer;
use ppcdrc_core::cpu::{cr_offset, CR_EQ, CR_GT, CR_LT, FPSCR_OFFSET, XER_CA, XER_OFFSET};

/// Load XER[SO] as 0/1 into EDX. Must precede the compare that feeds
/// [`emit_cr_from_flags`], since the shift clobbers the flags.
pub fn emit_load_so(buf: &mut CodeBuffer) {
    emit_load(buf, false, Reg::Rdx, ENV_REG, XER_OFFSET);
    emit_shift_ri(buf, ShiftOp::Shr, false, Reg::Rdx, 31);
}

/// Store the outcome of the preceding compare into CR field `field`, with
/// SO from EDX. Clobbers ECX.
pub fn emit_cr_from_flags(buf: &mut CodeBuffer, field: usize, signed: bool) {
    let gt = if signed { X86Cond::Jg } else { X86Cond::Ja };
    // mov imm32 leaves the flags of the compare intact
    emit_mov_imm32(buf, Reg::Rcx, CR_EQ as u32);
    let eq = emit_jcc_fwd(buf, X86Cond::Je);
    emit_mov_imm32(buf, Reg::Rcx, CR_GT as u32);
    let greater = emit_jcc_fwd(buf, gt);
    emit_mov_imm32(buf, Reg::Rcx, CR_LT as u32);
    bind(buf, eq);
    bind(buf, greater);
    emit_arith_rr(buf, ArithOp::Or, false, Reg::Rcx, Reg::Rdx);
    emit_store_byte(buf, Reg::Rcx, ENV_REG, cr_offset(field));
}

/// CR0 from a signed compare of `result` with zero. `result` must not be
/// ECX or EDX.
pub fn emit_set_cr0(buf: &mut CodeBuffer, result: Reg) {
    debug_assert!(result != Reg::Rcx && result != Reg::Rdx);
    emit_load_so(buf);
    emit_test_rr(buf, false, result, result);
    emit_cr_from_flags(buf, 0, true);
}

/// CR1 = FPSCR[FX, FEX, VX, OX].
pub fn emit_set_cr1(buf: &mut CodeBuffer) {
    emit_load(buf, false, Reg::Rcx, ENV_REG, FPSCR_OFFSET);
    emit_shift_ri(buf, ShiftOp::Shr, false, Reg::Rcx, 28);
    emit_store_byte(buf, Reg::Rcx, ENV_REG, cr_offset(1));
}

/// XER[CA] from the host carry flag. `inverted` takes the complement, which
/// turns an x86 borrow into a PowerPC carry. Clobbers ECX.
pub fn emit_set_ca_from_cf(buf: &mut CodeBuffer, inverted: bool) {
    emit_arith_rr(buf, ArithOp::Sbb, false, Reg::Rcx, Reg::Rcx);
    if inverted {
        emit_not(buf, false, Reg::Rcx);
    }
    emit_arith_ri(buf, ArithOp::And, false, Reg::Rcx, XER_CA as i32);
    emit_arith_mi(buf, ArithOp::And, false, ENV_REG, XER_OFFSET, !XER_CA as i32);
    emit_arith_mr(buf, ArithOp::Or, false, ENV_REG, XER_OFFSET, Reg::Rcx);
}

/// Host CF = XER[CA]. Clobbers ECX.
pub fn emit_load_ca_into_cf(buf: &mut CodeBuffer) {
    emit_load(buf, false, Reg::Rcx, ENV_REG, XER_OFFSET);
    emit_bt_ri(buf, false, Reg::Rcx, XER_CA.trailing_zeros() as u8);
}
