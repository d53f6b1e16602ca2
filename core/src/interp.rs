//! Reference interpreter.
//!
//! `execute` implements every decodable instruction on a [`PpcCpu`]. The
//! recompiler delegates the instructions it does not translate to it, and
//! the tests use `step` as the oracle for translated code.

use tracing::error;

use crate::cpu::{compare_field, Msr, PpcCpu, PpcState, CR_EQ, CR_SO};
use crate::decode::{decode, rotate_mask, Insn, Opcode};
use crate::error::{DrcError, Result};
use crate::exception::{self, ExceptionKind};
use crate::fpu;

/// Where control goes after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to `pc + 4`.
    Next,
    /// Continue at the given address.
    Jump(u32),
    /// Raise an exception with the given SRR0.
    Exception(ExceptionKind, u32),
}

/// Execute one instruction at the current PC, including fetch faults,
/// data faults and exception entry.
pub fn step(cpu: &mut PpcCpu) -> Result<()> {
    let pc = cpu.state.pc;
    let Some(word) = cpu.fetch(pc) else {
        cpu.state.srr0 = pc;
        exception::generate_exception(cpu, ExceptionKind::Isi);
        return Ok(());
    };
    let flow = execute(cpu, word)?;
    if cpu.take_fault() {
        cpu.state.srr0 = pc;
        exception::generate_exception(cpu, ExceptionKind::Dsi);
        return Ok(());
    }
    match flow {
        Flow::Next => cpu.state.pc = pc.wrapping_add(4),
        Flow::Jump(target) => cpu.state.pc = target,
        Flow::Exception(kind, srr0) => {
            cpu.state.srr0 = srr0;
            exception::generate_exception(cpu, kind);
        }
    }
    Ok(())
}

/// Interpret until at least `cycles` instructions have run. Returns the
/// number executed.
///
/// Interrupts are checked before every instruction and the DEC/FIT
/// counters advance one cycle per instruction.
pub fn run(cpu: &mut PpcCpu, cycles: i32) -> Result<i32> {
    cpu.begin_timeslice(cycles);
    while cpu.state.icount >= 0 {
        exception::check_interrupts(cpu);
        step(cpu)?;
        exception::update_counters(cpu);
        cpu.state.icount -= 1;
    }
    Ok(cpu.end_timeslice())
}

/// Carry-out and signed overflow of `a + b + carry_in`.
fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let wide = a as u64 + b as u64 + carry_in as u64;
    let r = wide as u32;
    let overflow = (!(a ^ b) & (a ^ r)) >> 31 != 0;
    (r, wide >> 32 != 0, overflow)
}

fn byte_lane(value: u32, i: u32) -> u8 {
    (value >> (24 - i)) as u8
}

/// Execute the instruction `word` located at the current PC without
/// advancing the PC.
pub fn execute(cpu: &mut PpcCpu, word: u32) -> Result<Flow> {
    use Opcode::*;

    let pc = cpu.state.pc;
    if word == 0 {
        // Padding word: stay put and let the caller burn cycles.
        return Ok(Flow::Jump(pc));
    }
    let insn = Insn(word);
    let op = decode(word, cpu.model);
    let (rt, ra, rb) = (insn.rt(), insn.ra(), insn.rb());

    if op.is_fp() {
        return execute_fp_insn(cpu, op, insn);
    }

    let s = &mut cpu.state;
    // Arithmetic with OE/Rc: (result, carry_out, overflow).
    let arith = |s: &mut PpcState, r: u32, ov: bool, oe: bool, rc: bool| {
        s.set_gpr(rt, r);
        if oe {
            s.set_xer_ov(ov);
        }
        if rc {
            s.set_cr0(r);
        }
    };

    match op {
        Add => {
            let (r, _, ov) = add_with_carry(s.gpr(ra), s.gpr(rb), false);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Addc => {
            let (r, ca, ov) = add_with_carry(s.gpr(ra), s.gpr(rb), false);
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Adde => {
            let (r, ca, ov) = add_with_carry(s.gpr(ra), s.gpr(rb), s.xer_ca());
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Addme => {
            let (r, ca, ov) = add_with_carry(s.gpr(ra), u32::MAX, s.xer_ca());
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Addze => {
            let (r, ca, ov) = add_with_carry(s.gpr(ra), 0, s.xer_ca());
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Subf => {
            let (r, _, ov) = add_with_carry(!s.gpr(ra), s.gpr(rb), true);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Subfc => {
            let (r, ca, ov) = add_with_carry(!s.gpr(ra), s.gpr(rb), true);
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Subfe => {
            let (r, ca, ov) = add_with_carry(!s.gpr(ra), s.gpr(rb), s.xer_ca());
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Subfme => {
            let (r, ca, ov) = add_with_carry(!s.gpr(ra), u32::MAX, s.xer_ca());
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Subfze => {
            let (r, ca, ov) = add_with_carry(!s.gpr(ra), 0, s.xer_ca());
            s.set_xer_ca(ca);
            arith(s, r, ov, insn.oe(), insn.rc());
        }
        Neg => {
            let a = s.gpr(ra);
            arith(s, a.wrapping_neg(), a == 0x8000_0000, insn.oe(), insn.rc());
        }
        Mullw => {
            let wide = s.gpr(ra) as i32 as i64 * s.gpr(rb) as i32 as i64;
            let ov = wide != wide as i32 as i64;
            arith(s, wide as u32, ov, insn.oe(), insn.rc());
        }
        Mulhw => {
            let wide = s.gpr(ra) as i32 as i64 * s.gpr(rb) as i32 as i64;
            arith(s, (wide >> 32) as u32, false, false, insn.rc());
        }
        Mulhwu => {
            let wide = s.gpr(ra) as u64 * s.gpr(rb) as u64;
            arith(s, (wide >> 32) as u32, false, false, insn.rc());
        }
        Divw => {
            let (a, b) = (s.gpr(ra) as i32, s.gpr(rb) as i32);
            if b == 0 || (a == i32::MIN && b == -1) {
                let r = if a < 0 { u32::MAX } else { 0 };
                arith(s, r, true, insn.oe(), insn.rc());
            } else {
                arith(s, (a / b) as u32, false, insn.oe(), insn.rc());
            }
        }
        Divwu => {
            let (a, b) = (s.gpr(ra), s.gpr(rb));
            if b == 0 {
                arith(s, 0, true, insn.oe(), insn.rc());
            } else {
                arith(s, a / b, false, insn.oe(), insn.rc());
            }
        }
        Addi => {
            let r = s.gpr_or_zero(ra).wrapping_add(insn.simm() as u32);
            s.set_gpr(rt, r);
        }
        Addis => {
            let r = s.gpr_or_zero(ra).wrapping_add((insn.simm() as u32) << 16);
            s.set_gpr(rt, r);
        }
        Addic | AddicDot => {
            let (r, ca, _) = add_with_carry(s.gpr(ra), insn.simm() as u32, false);
            s.set_xer_ca(ca);
            arith(s, r, false, false, op == AddicDot);
        }
        Subfic => {
            let (r, ca, _) = add_with_carry(!s.gpr(ra), insn.simm() as u32, true);
            s.set_xer_ca(ca);
            s.set_gpr(rt, r);
        }
        Mulli => {
            let r = (s.gpr(ra) as i32).wrapping_mul(insn.simm()) as u32;
            s.set_gpr(rt, r);
        }

        Cmp => s.cr[insn.crfd()] = compare_field(s.gpr(ra) as i32, s.gpr(rb) as i32, s.xer_so()),
        Cmpi => s.cr[insn.crfd()] = compare_field(s.gpr(ra) as i32, insn.simm(), s.xer_so()),
        Cmpl => s.cr[insn.crfd()] = compare_field(s.gpr(ra), s.gpr(rb), s.xer_so()),
        Cmpli => s.cr[insn.crfd()] = compare_field(s.gpr(ra), insn.uimm(), s.xer_so()),

        And | Andc | Eqv | Nand | Nor | Or | Orc | Xor => {
            let (a, b) = (s.gpr(rt), s.gpr(rb));
            let r = match op {
                And => a & b,
                Andc => a & !b,
                Eqv => !(a ^ b),
                Nand => !(a & b),
                Nor => !(a | b),
                Or => a | b,
                Orc => a | !b,
                _ => a ^ b,
            };
            logical(s, ra, r, insn.rc());
        }
        AndiDot => {
            let r = s.gpr(rt) & insn.uimm();
            logical(s, ra, r, true);
        }
        AndisDot => {
            let r = s.gpr(rt) & (insn.uimm() << 16);
            logical(s, ra, r, true);
        }
        Ori => logical(s, ra, s.gpr(rt) | insn.uimm(), false),
        Oris => logical(s, ra, s.gpr(rt) | (insn.uimm() << 16), false),
        Xori => logical(s, ra, s.gpr(rt) ^ insn.uimm(), false),
        Xoris => logical(s, ra, s.gpr(rt) ^ (insn.uimm() << 16), false),
        Extsb => logical(s, ra, s.gpr(rt) as i8 as i32 as u32, insn.rc()),
        Extsh => logical(s, ra, s.gpr(rt) as i16 as i32 as u32, insn.rc()),
        Cntlzw => logical(s, ra, s.gpr(rt).leading_zeros(), insn.rc()),

        Rlwimi => {
            let m = rotate_mask(insn.mb(), insn.me());
            let r = s.gpr(rt).rotate_left(insn.sh());
            logical(s, ra, (r & m) | (s.gpr(ra) & !m), insn.rc());
        }
        Rlwinm => {
            let m = rotate_mask(insn.mb(), insn.me());
            logical(s, ra, s.gpr(rt).rotate_left(insn.sh()) & m, insn.rc());
        }
        Rlwnm => {
            let m = rotate_mask(insn.mb(), insn.me());
            logical(s, ra, s.gpr(rt).rotate_left(s.gpr(rb) & 31) & m, insn.rc());
        }
        Slw => {
            let n = s.gpr(rb) & 0x3F;
            let r = if n >= 32 { 0 } else { s.gpr(rt) << n };
            logical(s, ra, r, insn.rc());
        }
        Srw => {
            let n = s.gpr(rb) & 0x3F;
            let r = if n >= 32 { 0 } else { s.gpr(rt) >> n };
            logical(s, ra, r, insn.rc());
        }
        Sraw | Srawi => {
            let n = if op == Srawi { insn.sh() } else { s.gpr(rb) & 0x3F };
            let v = s.gpr(rt) as i32;
            let (r, ca) = if n >= 32 {
                (if v < 0 { u32::MAX } else { 0 }, v < 0)
            } else {
                let lost = (v as u32) & ((1u64 << n) - 1) as u32;
                ((v >> n) as u32, v < 0 && lost != 0)
            };
            s.set_xer_ca(ca);
            logical(s, ra, r, insn.rc());
        }

        B => {
            let base = if insn.aa() { 0 } else { pc };
            let target = base.wrapping_add(insn.li() as u32);
            if insn.lk() {
                s.lr = pc.wrapping_add(4);
            }
            return Ok(Flow::Jump(target));
        }
        Bc | Bclr | Bcctr => {
            let target = match op {
                Bc => {
                    let base = if insn.aa() { 0 } else { pc };
                    base.wrapping_add(insn.bd() as u32)
                }
                Bclr => s.lr & !3,
                _ => s.ctr & !3,
            };
            let bo = insn.bo();
            if bo & 0x04 == 0 {
                s.ctr = s.ctr.wrapping_sub(1);
            }
            let ctr_ok = bo & 0x04 != 0 || ((s.ctr != 0) != (bo & 0x02 != 0));
            let cond_ok = bo & 0x10 != 0 || (s.cr_bit(insn.bi() as usize) == (bo & 0x08 != 0));
            if insn.lk() {
                s.lr = pc.wrapping_add(4);
            }
            if ctr_ok && cond_ok {
                return Ok(Flow::Jump(target));
            }
        }
        Sc => return Ok(Flow::Exception(ExceptionKind::Syscall, pc.wrapping_add(4))),
        Tw | Twi => {
            let a = s.gpr(ra);
            let b = if op == Twi { insn.simm() as u32 } else { s.gpr(rb) };
            if trap_condition(insn.rt() as u32, a, b) {
                return Ok(Flow::Exception(ExceptionKind::Trap, pc.wrapping_add(4)));
            }
        }
        Rfi => {
            let target = s.srr0 & !3;
            let msr = s.srr1;
            cpu.set_msr(msr);
            return Ok(Flow::Jump(target));
        }

        Crand | Crandc | Creqv | Crnand | Crnor | Cror | Crorc | Crxor => {
            let a = s.cr_bit(ra);
            let b = s.cr_bit(rb);
            let r = match op {
                Crand => a & b,
                Crandc => a & !b,
                Creqv => a == b,
                Crnand => !(a & b),
                Crnor => !(a | b),
                Cror => a | b,
                Crorc => a | !b,
                _ => a ^ b,
            };
            s.set_cr_bit(rt, r);
        }
        Mcrf => s.cr[insn.crfd()] = s.cr[insn.crfs()],
        Mfcr => s.set_gpr(rt, s.cr()),
        Mtcrf => {
            let crm = insn.crm();
            let v = s.gpr(rt);
            for i in 0..8 {
                if crm & (0x80 >> i) != 0 {
                    s.cr[i] = ((v >> ((7 - i) * 4)) & 0xF) as u8;
                }
            }
        }

        Mfmsr => s.set_gpr(rt, s.msr),
        Mtmsr => {
            let v = s.gpr(rt);
            cpu.set_msr(v);
        }
        Mfspr => {
            let v = cpu.get_spr(insn.spr());
            cpu.state.set_gpr(rt, v);
        }
        Mtspr => {
            let v = s.gpr(rt);
            cpu.set_spr(insn.spr(), v);
        }
        Mftb => {
            let tb = cpu.timebase();
            let v = if insn.spr() == 269 { (tb >> 32) as u32 } else { tb as u32 };
            cpu.state.set_gpr(rt, v);
        }
        Mfsr => s.set_gpr(rt, s.sr[insn.sr()]),
        Mfsrin => s.set_gpr(rt, s.sr[(s.gpr(rb) >> 28) as usize]),
        Mtsr => s.sr[insn.sr()] = s.gpr(rt),
        Mtsrin => s.sr[(s.gpr(rb) >> 28) as usize] = s.gpr(rt),
        Mfdcr => {
            let v = cpu.get_dcr(insn.spr());
            cpu.state.set_gpr(rt, v);
        }
        Mtdcr => {
            let v = s.gpr(rt);
            cpu.set_dcr(insn.spr(), v);
        }
        Wrtee => {
            let ee = s.gpr(rt) & Msr::EE.bits();
            s.msr = (s.msr & !Msr::EE.bits()) | ee;
        }
        Wrteei => {
            let ee = word & Msr::EE.bits();
            s.msr = (s.msr & !Msr::EE.bits()) | ee;
        }

        Lbz | Lbzu | Lbzx | Lbzux | Lhz | Lhzu | Lhzx | Lhzux | Lha | Lhau | Lhax | Lhaux
        | Lwz | Lwzu | Lwzx | Lwzux | Lhbrx | Lwbrx => {
            let ea = effective_address(cpu, op, insn);
            let value = match op {
                Lbz | Lbzu | Lbzx | Lbzux => cpu.read8(ea) as u32,
                Lhz | Lhzu | Lhzx | Lhzux => cpu.read16(ea) as u32,
                Lha | Lhau | Lhax | Lhaux => cpu.read16(ea) as i16 as i32 as u32,
                Lhbrx => cpu.read16(ea).swap_bytes() as u32,
                Lwbrx => cpu.read32(ea).swap_bytes(),
                _ => cpu.read32(ea),
            };
            if cpu.state.fault == 0 {
                cpu.state.set_gpr(rt, value);
            }
        }
        Stb | Stbu | Stbx | Stbux | Sth | Sthu | Sthx | Sthux | Stw | Stwu | Stwx | Stwux
        | Sthbrx | Stwbrx => {
            let value = s.gpr(rt);
            let ea = effective_address(cpu, op, insn);
            match op {
                Stb | Stbu | Stbx | Stbux => cpu.write8(ea, value as u8),
                Sth | Sthu | Sthx | Sthux => cpu.write16(ea, value as u16),
                Sthbrx => cpu.write16(ea, (value as u16).swap_bytes()),
                Stwbrx => cpu.write32(ea, value.swap_bytes()),
                _ => cpu.write32(ea, value),
            }
        }
        Lmw => {
            let mut ea = s.gpr_or_zero(ra).wrapping_add(insn.simm() as u32);
            for r in rt..32 {
                let v = cpu.read32(ea);
                if cpu.state.fault != 0 {
                    break;
                }
                cpu.state.set_gpr(r, v);
                ea = ea.wrapping_add(4);
            }
        }
        Stmw => {
            let mut ea = s.gpr_or_zero(ra).wrapping_add(insn.simm() as u32);
            for r in rt..32 {
                let v = cpu.state.gpr(r);
                cpu.write32(ea, v);
                if cpu.state.fault != 0 {
                    break;
                }
                ea = ea.wrapping_add(4);
            }
        }
        Lswi => {
            let mut ea = s.gpr_or_zero(ra);
            let mut n = if rb == 0 { 32 } else { rb as u32 };
            let mut r = rt;
            let mut i = 0u32;
            while n > 0 {
                if i == 0 {
                    cpu.state.set_gpr(r, 0);
                }
                let byte = cpu.read8(ea) as u32;
                if cpu.state.fault != 0 {
                    break;
                }
                cpu.state.gpr[r] |= byte << (24 - i);
                i = (i + 8) % 32;
                if i == 0 {
                    r = (r + 1) % 32;
                }
                ea = ea.wrapping_add(1);
                n -= 1;
            }
        }
        Stswi => {
            let mut ea = s.gpr_or_zero(ra);
            let mut n = if rb == 0 { 32 } else { rb as u32 };
            let mut r = rt;
            let mut i = 0u32;
            while n > 0 {
                let byte = byte_lane(cpu.state.gpr(r), i);
                cpu.write8(ea, byte);
                if cpu.state.fault != 0 {
                    break;
                }
                i = (i + 8) % 32;
                if i == 0 {
                    r = (r + 1) % 32;
                }
                ea = ea.wrapping_add(1);
                n -= 1;
            }
        }
        Lwarx => {
            let ea = s.gpr_or_zero(ra).wrapping_add(s.gpr(rb));
            let v = cpu.read32(ea);
            if cpu.state.fault == 0 {
                cpu.state.reserve = 1;
                cpu.state.reserve_addr = ea;
                cpu.state.set_gpr(rt, v);
            }
        }
        Stwcx => {
            let ea = s.gpr_or_zero(ra).wrapping_add(s.gpr(rb));
            let so = if s.xer_so() { CR_SO } else { 0 };
            if s.reserve != 0 {
                let v = s.gpr(rt);
                cpu.write32(ea, v);
                cpu.state.reserve = 0;
                cpu.state.cr[0] = CR_EQ | so;
            } else {
                cpu.state.cr[0] = so;
            }
        }

        Dcba | Dcbf | Dcbi | Dcbst | Dcbt | Dcbtst | Dcbz | Dccci | Dcread | Eieio | Icbi
        | Icbt | Iccci | Icread | Isync | Sync | Tlbia | Tlbie | Tlbld | Tlbli | Tlbsync => {}

        Lswx | Stswx | Mcrxr | Rfci | Eciwx | Ecowx | Invalid => {
            error!(target: "ppcdrc::cpu", opcode = word, pc, "unimplemented opcode {}", op.mnemonic());
            return Err(DrcError::UnimplementedOpcode { opcode: word, pc });
        }

        _ => unreachable!("{} handled by the floating-point path", op.mnemonic()),
    }
    Ok(Flow::Next)
}

fn logical(s: &mut PpcState, ra: usize, r: u32, rc: bool) {
    s.set_gpr(ra, r);
    if rc {
        s.set_cr0(r);
    }
}

/// TO-field test of tw/twi.
pub fn trap_condition(to: u32, a: u32, b: u32) -> bool {
    let (sa, sb) = (a as i32, b as i32);
    (to & 0x10 != 0 && sa < sb)
        || (to & 0x08 != 0 && sa > sb)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && a < b)
        || (to & 0x01 != 0 && a > b)
}

/// Effective address of an integer load/store. Update forms write RA
/// before the access.
fn effective_address(cpu: &mut PpcCpu, op: Opcode, insn: Insn) -> u32 {
    use Opcode::*;
    let s = &mut cpu.state;
    let (ra, rb) = (insn.ra(), insn.rb());
    match op {
        Lbzu | Lhzu | Lhau | Lwzu | Stbu | Sthu | Stwu => {
            let ea = s.gpr(ra).wrapping_add(insn.simm() as u32);
            s.set_gpr(ra, ea);
            ea
        }
        Lbzux | Lhzux | Lhaux | Lwzux | Stbux | Sthux | Stwux => {
            let ea = s.gpr(ra).wrapping_add(s.gpr(rb));
            s.set_gpr(ra, ea);
            ea
        }
        Lbzx | Lhzx | Lhax | Lwzx | Lhbrx | Lwbrx | Stbx | Sthx | Stwx | Sthbrx | Stwbrx => {
            s.gpr_or_zero(ra).wrapping_add(s.gpr(rb))
        }
        _ => s.gpr_or_zero(ra).wrapping_add(insn.simm() as u32),
    }
}

fn execute_fp_insn(cpu: &mut PpcCpu, op: Opcode, insn: Insn) -> Result<Flow> {
    use Opcode::*;
    let (frt, ra, rb) = (insn.rt(), insn.ra(), insn.rb());
    let s = &mut cpu.state;
    let ea = match op {
        Lfs | Lfd | Stfs | Stfd => s.gpr_or_zero(ra).wrapping_add(insn.simm() as u32),
        Lfsu | Lfdu | Stfsu | Stfdu => {
            let ea = s.gpr(ra).wrapping_add(insn.simm() as u32);
            s.set_gpr(ra, ea);
            ea
        }
        Lfsx | Lfdx | Stfsx | Stfdx | Stfiwx => s.gpr_or_zero(ra).wrapping_add(s.gpr(rb)),
        Lfsux | Lfdux | Stfsux | Stfdux => {
            let ea = s.gpr(ra).wrapping_add(s.gpr(rb));
            s.set_gpr(ra, ea);
            ea
        }
        _ => {
            fpu::execute_fp(cpu, op, insn);
            return Ok(Flow::Next);
        }
    };
    match op {
        Lfs | Lfsu | Lfsx | Lfsux => {
            let v = f32::from_bits(cpu.read32(ea)) as f64;
            if cpu.state.fault == 0 {
                cpu.state.set_fpr_f64(frt, v);
            }
        }
        Lfd | Lfdu | Lfdx | Lfdux => {
            let v = cpu.read64(ea);
            if cpu.state.fault == 0 {
                cpu.state.fpr[frt] = v;
            }
        }
        Stfs | Stfsu | Stfsx | Stfsux => {
            let v = (cpu.state.fpr_f64(frt) as f32).to_bits();
            cpu.write32(ea, v);
        }
        Stfiwx => {
            let v = cpu.state.fpr[frt] as u32;
            cpu.write32(ea, v);
        }
        _ => {
            let v = cpu.state.fpr[frt];
            cpu.write64(ea, v);
        }
    }
    Ok(Flow::Next)
}
