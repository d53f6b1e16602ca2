//! Exception entry stubs, the interrupt check and the timer trigger test.
//!
//! The stubs are regenerated at every cache reset, right after the
//! framework stubs. Blocks reach them with a plain `jmp` once SRR0 holds
//! the return address.

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::CodeBuffer;
use ppcdrc_core::cpu::{
    CpuModel, Msr, DEC_TRIGGER_OFFSET, EVPR_OFFSET, EXIER_OFFSET, EXISR_OFFSET, FIT_BIT_OFFSET,
    FIT_ENABLE_OFFSET, FIT_TRIGGER_OFFSET, IBR_OFFSET, ICOUNT_OFFSET, MSR_OFFSET, PC_OFFSET,
    PENDING_DEC, PENDING_FIT, PENDING_IRQ, PENDING_OFFSET, SRR0_OFFSET, SRR1_OFFSET,
};
use ppcdrc_core::exception::MSR_CLEARED_ON_EXCEPTION;
use ppcdrc_core::ExceptionKind;
use tracing::debug;

use super::call_helper;
use super::helpers::helper_set_msr;
use crate::Drc;

/// Cache offsets of the exception stubs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionStubs {
    pub irq: usize,
    pub syscall: usize,
    pub trap: usize,
    pub dsi: usize,
    pub isi: usize,
    /// Decrementer on 602/603, FIT on the 403.
    pub timer: usize,
}

impl ExceptionStubs {
    pub fn get(&self, kind: ExceptionKind) -> usize {
        match kind {
            ExceptionKind::Irq => self.irq,
            ExceptionKind::Syscall => self.syscall,
            ExceptionKind::Trap => self.trap,
            ExceptionKind::Dsi => self.dsi,
            ExceptionKind::Isi => self.isi,
            ExceptionKind::Decrementer | ExceptionKind::Fit => self.timer,
        }
    }
}

/// Emit one stub per exception `model` can raise.
pub fn append_stubs(drc: &mut Drc, model: CpuModel) -> ExceptionStubs {
    let mut stubs = ExceptionStubs::default();
    for &kind in ExceptionKind::for_model(model) {
        let at = append_exception_stub(drc, model, kind);
        match kind {
            ExceptionKind::Irq => stubs.irq = at,
            ExceptionKind::Syscall => stubs.syscall = at,
            ExceptionKind::Trap => stubs.trap = at,
            ExceptionKind::Dsi => stubs.dsi = at,
            ExceptionKind::Isi => stubs.isi = at,
            ExceptionKind::Decrementer | ExceptionKind::Fit => stubs.timer = at,
        }
    }
    debug!(target: "ppcdrc::cache", ?model, ?stubs, "exception stubs generated");
    stubs
}

fn append_exception_stub(drc: &mut Drc, model: CpuModel, kind: ExceptionKind) -> usize {
    let dispatch = drc.stubs().dispatch;
    let buf = drc.buf_mut();
    let start = buf.offset();
    let cleared = MSR_CLEARED_ON_EXCEPTION.bits();

    // SRR1 = MSR & ~cleared
    emit_load(buf, false, Reg::Rax, ENV_REG, MSR_OFFSET);
    emit_mov_rr(buf, false, Reg::Rcx, Reg::Rax);
    emit_arith_ri(buf, ArithOp::And, false, Reg::Rcx, !cleared as i32);
    emit_store(buf, false, Reg::Rcx, ENV_REG, SRR1_OFFSET);

    // new MSR, with LE taken from ILE
    emit_mov_rr(buf, false, Reg::Rsi, Reg::Rax);
    emit_arith_ri(buf, ArithOp::And, false, Reg::Rsi, !(cleared | Msr::LE.bits()) as i32);
    emit_bt_ri(buf, false, Reg::Rax, Msr::ILE.bits().trailing_zeros() as u8);
    let no_ile = emit_jcc_fwd(buf, X86Cond::Jae);
    emit_arith_ri(buf, ArithOp::Or, false, Reg::Rsi, Msr::LE.bits() as i32);
    bind(buf, no_ile);
    call_helper(buf, helper_set_msr as usize);

    // vector base from the new MSR
    emit_load(buf, false, Reg::Rax, ENV_REG, MSR_OFFSET);
    emit_test_bi(buf, Reg::Rax, Msr::IP.bits() as u8);
    emit_mov_imm32(buf, Reg::Rcx, 0xFFF0_0000);
    let high = emit_jcc_fwd(buf, X86Cond::Jne);
    match model {
        CpuModel::Ppc603 => emit_mov_imm32(buf, Reg::Rcx, 0),
        CpuModel::Ppc602 => emit_load(buf, false, Reg::Rcx, ENV_REG, IBR_OFFSET),
        CpuModel::Ppc403 => emit_load(buf, false, Reg::Rcx, ENV_REG, EVPR_OFFSET),
    }
    bind(buf, high);
    emit_arith_ri(buf, ArithOp::Or, false, Reg::Rcx, kind.vector_offset() as i32);
    emit_store(buf, false, Reg::Rcx, ENV_REG, PC_OFFSET);

    let bit = kind.pending_bit();
    if bit != 0 {
        emit_arith_mi(buf, ArithOp::And, false, ENV_REG, PENDING_OFFSET, !bit as i32);
    }
    emit_jmp(buf, dispatch);
    start
}

/// SRR0 = PC, then jump to `stub`.
fn emit_take(buf: &mut CodeBuffer, stub: usize) {
    emit_load(buf, false, Reg::Rax, ENV_REG, PC_OFFSET);
    emit_store(buf, false, Reg::Rax, ENV_REG, SRR0_OFFSET);
    emit_jmp(buf, stub);
}

/// Deliver the highest-priority deliverable interrupt, or fall through.
///
/// Priority is IRQ, then the decrementer (602/603) or FIT (403). On the
/// 403 a pending IRQ that EXIER masks suppresses the whole check.
pub fn emit_check_interrupts(buf: &mut CodeBuffer, model: CpuModel, stubs: &ExceptionStubs) {
    let mut skip = Vec::with_capacity(6);

    emit_test_mi(buf, ENV_REG, MSR_OFFSET, Msr::EE.bits());
    skip.push(emit_jcc_fwd(buf, X86Cond::Je));
    emit_arith_mi(buf, ArithOp::Cmp, false, ENV_REG, PENDING_OFFSET, 0);
    skip.push(emit_jcc_fwd(buf, X86Cond::Je));

    emit_test_mb(buf, ENV_REG, PENDING_OFFSET, PENDING_IRQ as u8);
    let not_irq = emit_jcc_fwd(buf, X86Cond::Je);
    if model.is_403() {
        emit_load(buf, false, Reg::Rax, ENV_REG, EXISR_OFFSET);
        emit_arith_rm(buf, ArithOp::And, false, Reg::Rax, ENV_REG, EXIER_OFFSET);
        skip.push(emit_jcc_fwd(buf, X86Cond::Je));
    }
    emit_take(buf, stubs.irq);

    bind(buf, not_irq);
    if model.is_60x() {
        emit_test_mb(buf, ENV_REG, PENDING_OFFSET, PENDING_DEC as u8);
        skip.push(emit_jcc_fwd(buf, X86Cond::Je));
    } else {
        emit_test_mb(buf, ENV_REG, PENDING_OFFSET, PENDING_FIT as u8);
        skip.push(emit_jcc_fwd(buf, X86Cond::Je));
        emit_test_mb(buf, ENV_REG, FIT_ENABLE_OFFSET, 1);
        skip.push(emit_jcc_fwd(buf, X86Cond::Je));
        emit_load(buf, false, Reg::Rax, ENV_REG, FIT_BIT_OFFSET);
        emit_arith_mr(buf, ArithOp::Sub, false, ENV_REG, FIT_TRIGGER_OFFSET, Reg::Rax);
    }
    emit_take(buf, stubs.timer);

    for fixup in skip {
        bind(buf, fixup);
    }
}

/// Raise the timer request once icount reaches its trigger cycle.
pub fn emit_update_counters(buf: &mut CodeBuffer, model: CpuModel) {
    emit_load(buf, false, Reg::Rax, ENV_REG, ICOUNT_OFFSET);
    if model.is_60x() {
        emit_arith_rm(buf, ArithOp::Cmp, false, Reg::Rax, ENV_REG, DEC_TRIGGER_OFFSET);
        let no = emit_jcc_fwd(buf, X86Cond::Jne);
        emit_arith_mi(buf, ArithOp::Or, false, ENV_REG, PENDING_OFFSET, PENDING_DEC as i32);
        bind(buf, no);
    } else {
        emit_arith_rm(buf, ArithOp::Cmp, false, Reg::Rax, ENV_REG, FIT_TRIGGER_OFFSET);
        let no = emit_jcc_fwd(buf, X86Cond::Jne);
        emit_arith_mi(buf, ArithOp::Cmp, false, ENV_REG, FIT_ENABLE_OFFSET, 0);
        let disabled = emit_jcc_fwd(buf, X86Cond::Je);
        emit_arith_mi(buf, ArithOp::Or, false, ENV_REG, PENDING_OFFSET, PENDING_FIT as i32);
        bind(buf, no);
        bind(buf, disabled);
    }
}
