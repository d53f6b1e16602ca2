//! Exception kinds, vector layout and the MSR transformation on entry.
//!
//! The recompiler emits the same steps as host code; the functions here
//! are the interpreter's version and the single source for the constants.

use crate::cpu::{CpuModel, Msr, PpcCpu, PENDING_DEC, PENDING_FIT, PENDING_IRQ};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Irq,
    Decrementer,
    Fit,
    Trap,
    Syscall,
    Dsi,
    Isi,
}

impl ExceptionKind {
    /// Offset of the handler from the vector base.
    pub const fn vector_offset(self) -> u32 {
        match self {
            ExceptionKind::Irq => 0x0500,
            ExceptionKind::Decrementer => 0x0900,
            ExceptionKind::Fit => 0x1010,
            ExceptionKind::Trap => 0x0700,
            ExceptionKind::Syscall => 0x0C00,
            ExceptionKind::Dsi => 0x0300,
            ExceptionKind::Isi => 0x0400,
        }
    }

    /// `exception_pending` bit cleared when the exception is taken.
    pub const fn pending_bit(self) -> u32 {
        match self {
            ExceptionKind::Irq => PENDING_IRQ,
            ExceptionKind::Decrementer => PENDING_DEC,
            ExceptionKind::Fit => PENDING_FIT,
            _ => 0,
        }
    }

    /// Exceptions that have a handler stub on `model`.
    pub fn for_model(model: CpuModel) -> &'static [ExceptionKind] {
        use ExceptionKind::*;
        match model {
            CpuModel::Ppc403 => &[Irq, Syscall, Trap, Dsi, Isi, Fit],
            CpuModel::Ppc602 | CpuModel::Ppc603 => &[Irq, Syscall, Decrementer, Trap, Dsi, Isi],
        }
    }
}

/// MSR bits cleared on exception entry.
pub const MSR_CLEARED_ON_EXCEPTION: Msr = Msr::POW
    .union(Msr::EE)
    .union(Msr::PR)
    .union(Msr::FP)
    .union(Msr::FE0)
    .union(Msr::SE)
    .union(Msr::BE)
    .union(Msr::FE1)
    .union(Msr::IR)
    .union(Msr::DR)
    .union(Msr::RI);

/// Address prefix at which `model` locates its vectors while MSR[IP] is
/// clear.
pub fn vector_base(model: CpuModel, msr: u32, cpu: &PpcCpu) -> u32 {
    if msr & Msr::IP.bits() != 0 {
        return 0xFFF0_0000;
    }
    match model {
        CpuModel::Ppc603 => 0,
        CpuModel::Ppc602 => cpu.state.ibr,
        CpuModel::Ppc403 => cpu.state.evpr,
    }
}

/// MSR value after entering an exception from `msr`.
pub fn exception_msr(msr: u32) -> u32 {
    let mut new = msr & !(MSR_CLEARED_ON_EXCEPTION | Msr::LE).bits();
    if msr & Msr::ILE.bits() != 0 {
        new |= Msr::LE.bits();
    }
    new
}

/// Enter exception `kind`. The caller has already stored the return
/// address in SRR0.
pub fn generate_exception(cpu: &mut PpcCpu, kind: ExceptionKind) {
    let msr = cpu.state.msr;
    cpu.state.srr1 = msr & !MSR_CLEARED_ON_EXCEPTION.bits();
    cpu.set_msr(exception_msr(msr));
    let base = vector_base(cpu.model, cpu.state.msr, cpu);
    cpu.state.pc = base | kind.vector_offset();
    cpu.state.pending &= !kind.pending_bit();
}

/// Deliver the highest-priority pending interrupt, if any is deliverable.
///
/// Priority is IRQ, then decrementer (60x), then FIT (403). Returns
/// whether an interrupt was taken.
pub fn check_interrupts(cpu: &mut PpcCpu) -> bool {
    let s = &cpu.state;
    if s.msr & Msr::EE.bits() == 0 || s.pending == 0 {
        return false;
    }
    let kind = if s.pending & PENDING_IRQ != 0 {
        if cpu.model.is_403() && s.exisr & s.exier == 0 {
            return false;
        }
        ExceptionKind::Irq
    } else if cpu.model.is_60x() {
        if s.pending & PENDING_DEC == 0 {
            return false;
        }
        ExceptionKind::Decrementer
    } else {
        if s.pending & PENDING_FIT == 0 || s.fit_int_enable & 1 == 0 {
            return false;
        }
        cpu.state.fit_trigger_cycle = cpu.state.fit_trigger_cycle.wrapping_sub(cpu.state.fit_bit as i32);
        ExceptionKind::Fit
    };
    cpu.state.srr0 = cpu.state.pc;
    generate_exception(cpu, kind);
    true
}

/// Raise DEC/FIT requests whose trigger cycle has been reached.
pub fn update_counters(cpu: &mut PpcCpu) {
    let s = &mut cpu.state;
    if cpu.model.is_60x() {
        if s.icount == s.dec_trigger_cycle {
            s.pending |= PENDING_DEC;
        }
    } else if s.icount == s.fit_trigger_cycle && s.fit_int_enable != 0 {
        s.pending |= PENDING_FIT;
    }
}
