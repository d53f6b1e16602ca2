//! Integer load and store translators.
//!
//! Accesses go through the memory helpers with the effective address in
//! ESI and store data in EDX. On cores with an MMU the fault flag is
//! tested after every access, before the destination register is written.

use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::regs::ENV_REG;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::CodeBuffer;
use ppcdrc_core::cpu::gpr_offset;
use ppcdrc_core::{Insn, Opcode};

use super::helpers::{helper_read16, helper_read32, helper_read8, helper_write16, helper_write32, helper_write8};
use super::{call_helper, emit_fault_check, ld_gpr, st_gpr, TransCtx};
use crate::Compiled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// `(RA|0) + d`
    Disp,
    /// `RA + d`, EA written back to RA
    DispUpdate,
    /// `(RA|0) + RB`
    Indexed,
    /// `RA + RB`, EA written back to RA
    IndexedUpdate,
}

fn form(op: Opcode) -> Form {
    use Opcode::*;
    match op {
        Lbzu | Lhzu | Lhau | Lwzu | Stbu | Sthu | Stwu => Form::DispUpdate,
        Lbzx | Lhzx | Lhax | Lwzx | Lhbrx | Lwbrx | Stbx | Sthx | Stwx | Sthbrx | Stwbrx => Form::Indexed,
        Lbzux | Lhzux | Lhaux | Lwzux | Stbux | Sthux | Stwux => Form::IndexedUpdate,
        _ => Form::Disp,
    }
}

/// Effective address into ESI, updating RA for the update forms.
fn emit_ea(buf: &mut CodeBuffer, op: Opcode, insn: Insn) {
    let (ra, rb) = (insn.ra(), insn.rb());
    match form(op) {
        Form::Disp | Form::DispUpdate => {
            let update = form(op) == Form::DispUpdate;
            if ra == 0 && !update {
                emit_mov_ri(buf, false, Reg::Rsi, insn.simm() as u32 as u64);
            } else {
                ld_gpr(buf, Reg::Rsi, ra);
                if insn.simm() != 0 {
                    emit_arith_ri(buf, ArithOp::Add, false, Reg::Rsi, insn.simm());
                }
            }
            if update {
                st_gpr(buf, Reg::Rsi, ra);
            }
        }
        Form::Indexed | Form::IndexedUpdate => {
            ld_gpr(buf, Reg::Rsi, rb);
            let update = form(op) == Form::IndexedUpdate;
            if ra != 0 || update {
                emit_arith_rm(buf, ArithOp::Add, false, Reg::Rsi, ENV_REG, gpr_offset(ra));
            }
            if update {
                st_gpr(buf, Reg::Rsi, ra);
            }
        }
    }
}

/// lbz, lhz, lha, lwz in all four forms, plus lhbrx and lwbrx.
pub fn load(buf: &mut CodeBuffer, ctx: &TransCtx, op: Opcode, insn: Insn) -> Compiled {
    use Opcode::*;

    emit_ea(buf, op, insn);
    let helper = match op {
        Lbz | Lbzu | Lbzx | Lbzux => helper_read8 as usize,
        Lwz | Lwzu | Lwzx | Lwzux | Lwbrx => helper_read32 as usize,
        _ => helper_read16 as usize,
    };
    call_helper(buf, helper);
    if ctx.model.has_mmu() {
        emit_fault_check(buf, ctx);
    }

    match op {
        Lha | Lhau | Lhax | Lhaux => emit_movsx(buf, OPC_MOVSWL, Reg::Rax, Reg::Rax),
        Lhbrx => emit_bswap16(buf, Reg::Rax),
        Lwbrx => emit_bswap(buf, false, Reg::Rax),
        _ => {}
    }
    st_gpr(buf, Reg::Rax, insn.rt());
    Compiled::next()
}

/// stb, sth, stw in all four forms, plus sthbrx and stwbrx.
pub fn store(buf: &mut CodeBuffer, ctx: &TransCtx, op: Opcode, insn: Insn) -> Compiled {
    use Opcode::*;

    // RS is read before an update form can overwrite it through RA.
    ld_gpr(buf, Reg::Rdx, insn.rt());
    emit_ea(buf, op, insn);
    let helper = match op {
        Stb | Stbu | Stbx | Stbux => helper_write8 as usize,
        Sth | Sthu | Sthx | Sthux => helper_write16 as usize,
        Sthbrx => {
            emit_bswap16(buf, Reg::Rdx);
            helper_write16 as usize
        }
        Stwbrx => {
            emit_bswap(buf, false, Reg::Rdx);
            helper_write32 as usize
        }
        _ => helper_write32 as usize,
    };
    call_helper(buf, helper);
    if ctx.model.has_mmu() {
        emit_fault_check(buf, ctx);
    }
    Compiled::next()
}
