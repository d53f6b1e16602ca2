//! Floating-point instructions for the interpreter.
//!
//! Arithmetic runs on the host FPU with the rounding mode taken from
//! FPSCR[RN]; host exception flags are folded back into FPSCR.

use std::os::raw::c_int;

use crate::cpu::{PpcCpu, CR_EQ, CR_GT, CR_LT, CR_SO};
use crate::decode::{Insn, Opcode};

extern "C" {
    fn feclearexcept(excepts: c_int) -> c_int;
    fn fegetround() -> c_int;
    fn feraiseexcept(excepts: c_int) -> c_int;
    fn fesetround(round: c_int) -> c_int;
    fn fetestexcept(excepts: c_int) -> c_int;
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod fenv {
    use std::os::raw::c_int;

    pub const FE_INVALID: c_int = 0x01;
    pub const FE_DIVBYZERO: c_int = 0x04;
    pub const FE_OVERFLOW: c_int = 0x08;
    pub const FE_UNDERFLOW: c_int = 0x10;
    pub const FE_INEXACT: c_int = 0x20;
    pub const FE_ALL_EXCEPT: c_int = 0x3f;

    pub const FE_TONEAREST: c_int = 0x0000;
    pub const FE_DOWNWARD: c_int = 0x0400;
    pub const FE_UPWARD: c_int = 0x0800;
    pub const FE_TOWARDZERO: c_int = 0x0c00;
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("fenv constants need porting for this host architecture");

use fenv::*;

// FPSCR bits.
pub const FPSCR_FX: u32 = 0x8000_0000;
pub const FPSCR_FEX: u32 = 0x4000_0000;
pub const FPSCR_VX: u32 = 0x2000_0000;
pub const FPSCR_OX: u32 = 0x1000_0000;
pub const FPSCR_UX: u32 = 0x0800_0000;
pub const FPSCR_ZX: u32 = 0x0400_0000;
pub const FPSCR_XX: u32 = 0x0200_0000;
pub const FPSCR_VXSNAN: u32 = 0x0100_0000;
pub const FPSCR_VXISI: u32 = 0x0080_0000;
pub const FPSCR_VXIDI: u32 = 0x0040_0000;
pub const FPSCR_VXZDZ: u32 = 0x0020_0000;
pub const FPSCR_VXIMZ: u32 = 0x0010_0000;
pub const FPSCR_VXVC: u32 = 0x0008_0000;
pub const FPSCR_FR: u32 = 0x0004_0000;
pub const FPSCR_FI: u32 = 0x0002_0000;
pub const FPSCR_FPRF: u32 = 0x0001_F000;
pub const FPSCR_VXSOFT: u32 = 0x0000_0400;
pub const FPSCR_VXSQRT: u32 = 0x0000_0200;
pub const FPSCR_VXCVI: u32 = 0x0000_0100;
pub const FPSCR_RN: u32 = 0x0000_0003;

const FPSCR_VX_ALL: u32 = FPSCR_VXSNAN
    | FPSCR_VXISI
    | FPSCR_VXIDI
    | FPSCR_VXZDZ
    | FPSCR_VXIMZ
    | FPSCR_VXVC
    | FPSCR_VXSOFT
    | FPSCR_VXSQRT
    | FPSCR_VXCVI;

/// Exception bits that set FX when they go from 0 to 1.
const FPSCR_STICKY: u32 = FPSCR_OX | FPSCR_UX | FPSCR_ZX | FPSCR_XX | FPSCR_VX_ALL;

fn host_round(fpscr: u32) -> c_int {
    match fpscr & FPSCR_RN {
        0 => FE_TONEAREST,
        1 => FE_TOWARDZERO,
        2 => FE_UPWARD,
        _ => FE_DOWNWARD,
    }
}

/// Run `f` under FPSCR's rounding mode and return its result together with
/// the host exception flags it raised.
fn with_fenv<T, F>(fpscr: u32, f: F) -> (T, c_int)
where
    F: FnOnce() -> T,
{
    // SAFETY: fenv calls only touch the calling thread's FP environment,
    // which is restored before returning.
    unsafe {
        let old_rm = fegetround();
        let old_exc = fetestexcept(FE_ALL_EXCEPT);
        feclearexcept(FE_ALL_EXCEPT);
        fesetround(host_round(fpscr));
        let res = std::hint::black_box(f());
        let flags = fetestexcept(FE_ALL_EXCEPT);
        fesetround(old_rm);
        feclearexcept(FE_ALL_EXCEPT);
        if old_exc != 0 {
            feraiseexcept(old_exc);
        }
        (res, flags)
    }
}

fn is_snan(v: f64) -> bool {
    v.is_nan() && v.to_bits() & 0x0008_0000_0000_0000 == 0
}

/// FPRF class code of a result.
fn fprf(v: f64) -> u32 {
    let class = if v.is_nan() {
        0x11
    } else if v.is_infinite() {
        if v.is_sign_negative() {
            0x09
        } else {
            0x05
        }
    } else if v == 0.0 {
        if v.is_sign_negative() {
            0x12
        } else {
            0x02
        }
    } else if v.is_subnormal() {
        if v.is_sign_negative() {
            0x18
        } else {
            0x14
        }
    } else if v.is_sign_negative() {
        0x08
    } else {
        0x04
    };
    class << 12
}

impl PpcCpu {
    /// Merge newly raised exception bits into FPSCR and recompute the
    /// summary bits.
    fn fpscr_raise(&mut self, bits: u32) {
        let fpscr = &mut self.state.fpscr;
        let new = bits & !*fpscr & FPSCR_STICKY;
        *fpscr |= bits;
        if new != 0 {
            *fpscr |= FPSCR_FX;
        }
        self.fpscr_summarize();
    }

    fn fpscr_summarize(&mut self) {
        let fpscr = &mut self.state.fpscr;
        if *fpscr & FPSCR_VX_ALL != 0 {
            *fpscr |= FPSCR_VX;
        } else {
            *fpscr &= !FPSCR_VX;
        }
        // VX OX UX ZX XX (bits 29..25) against VE OE UE ZE XE (bits 7..3).
        if (*fpscr >> 25) & (*fpscr >> 3) & 0x1F != 0 {
            *fpscr |= FPSCR_FEX;
        } else {
            *fpscr &= !FPSCR_FEX;
        }
    }

    fn fp_flags(&mut self, flags: c_int, invalid: u32) {
        let mut bits = 0;
        if flags & FE_INVALID != 0 {
            bits |= invalid;
        }
        if flags & FE_OVERFLOW != 0 {
            bits |= FPSCR_OX;
        }
        if flags & FE_UNDERFLOW != 0 {
            bits |= FPSCR_UX;
        }
        if flags & FE_DIVBYZERO != 0 {
            bits |= FPSCR_ZX;
        }
        self.state.fpscr &= !(FPSCR_FI | FPSCR_FR);
        if flags & FE_INEXACT != 0 {
            bits |= FPSCR_XX | FPSCR_FI;
        }
        self.fpscr_raise(bits);
    }

    /// Store an arithmetic result, update FPRF and report the exceptions.
    fn fp_result(&mut self, frt: usize, value: f64, flags: c_int, invalid: u32, snan: bool) {
        let invalid = if snan { invalid | FPSCR_VXSNAN } else { invalid };
        self.fp_flags(flags, invalid);
        self.state.fpscr = (self.state.fpscr & !FPSCR_FPRF) | fprf(value);
        self.state.set_fpr_f64(frt, value);
    }

    fn fp_compare(&mut self, insn: Insn, ordered: bool) {
        let a = self.state.fpr_f64(insn.ra());
        let b = self.state.fpr_f64(insn.rb());
        let code = if a.is_nan() || b.is_nan() {
            let mut bits = 0;
            if is_snan(a) || is_snan(b) {
                bits |= FPSCR_VXSNAN;
            }
            if ordered {
                bits |= FPSCR_VXVC;
            }
            self.fpscr_raise(bits);
            CR_SO
        } else if a < b {
            CR_LT
        } else if a > b {
            CR_GT
        } else {
            CR_EQ
        };
        self.state.cr[insn.crfd()] = code;
        self.state.fpscr = (self.state.fpscr & !0xF000) | ((code as u32) << 12);
    }

    fn fp_convert_to_int(&mut self, insn: Insn, truncate: bool) {
        let b = self.state.fpr_f64(insn.rb());
        let (value, flags) = if b.is_nan() {
            let bits = FPSCR_VXCVI | if is_snan(b) { FPSCR_VXSNAN } else { 0 };
            self.fpscr_raise(bits);
            (i32::MIN, 0)
        } else {
            let (r, flags) = with_fenv(self.state.fpscr, || if truncate { b.trunc() } else { round_host(b) });
            if r > i32::MAX as f64 {
                self.fpscr_raise(FPSCR_VXCVI);
                (i32::MAX, 0)
            } else if r < i32::MIN as f64 {
                self.fpscr_raise(FPSCR_VXCVI);
                (i32::MIN, 0)
            } else {
                let inexact = if r != b { FE_INEXACT } else { 0 };
                (r as i32, flags | inexact)
            }
        };
        if flags != 0 {
            self.fp_flags(flags & FE_INEXACT, 0);
        }
        self.state.fpr[insn.rt()] = 0xFFF8_0000_0000_0000 | value as u32 as u64;
    }
}

/// Round to integer in the current host rounding mode.
fn round_host(v: f64) -> f64 {
    // Adding and subtracting 2^52 rounds in the active mode for |v| < 2^52.
    const TWO52: f64 = 4_503_599_627_370_496.0;
    if v.abs() >= TWO52 {
        return v;
    }
    let r = if v >= 0.0 {
        std::hint::black_box(v + TWO52) - TWO52
    } else {
        std::hint::black_box(v - TWO52) + TWO52
    };
    if r == 0.0 {
        0.0f64.copysign(v)
    } else {
        r
    }
}

fn to_single(v: f64) -> f64 {
    v as f32 as f64
}

/// Execute a floating-point instruction.
pub(crate) fn execute_fp(cpu: &mut PpcCpu, op: Opcode, insn: Insn) {
    use Opcode::*;
    let s = &cpu.state;
    let fpscr = s.fpscr;
    let (frt, fra, frb, frc) = (insn.rt(), insn.ra(), insn.rb(), insn.rc_field());
    let a = s.fpr_f64(fra);
    let b = s.fpr_f64(frb);
    let c = s.fpr_f64(frc);
    let single = matches!(
        op,
        Fadds | Fsubs | Fmuls | Fdivs | Fsqrts | Fres | Fmadds | Fmsubs | Fnmadds | Fnmsubs
    );
    let round = |v: f64| if single { to_single(v) } else { v };

    match op {
        Fadd | Fadds => {
            let (r, flags) = with_fenv(fpscr, || round(a + b));
            cpu.fp_result(frt, r, flags, FPSCR_VXISI, is_snan(a) || is_snan(b));
        }
        Fsub | Fsubs => {
            let (r, flags) = with_fenv(fpscr, || round(a - b));
            cpu.fp_result(frt, r, flags, FPSCR_VXISI, is_snan(a) || is_snan(b));
        }
        Fmul | Fmuls => {
            let (r, flags) = with_fenv(fpscr, || round(a * c));
            cpu.fp_result(frt, r, flags, FPSCR_VXIMZ, is_snan(a) || is_snan(c));
        }
        Fdiv | Fdivs => {
            let invalid = if a == 0.0 && b == 0.0 { FPSCR_VXZDZ } else { FPSCR_VXIDI };
            let (r, flags) = with_fenv(fpscr, || round(a / b));
            cpu.fp_result(frt, r, flags, invalid, is_snan(a) || is_snan(b));
        }
        Fsqrt | Fsqrts => {
            let (r, flags) = with_fenv(fpscr, || round(b.sqrt()));
            cpu.fp_result(frt, r, flags, FPSCR_VXSQRT, is_snan(b));
        }
        Fres => {
            let (r, flags) = with_fenv(fpscr, || to_single(1.0 / b));
            cpu.fp_result(frt, r, flags, FPSCR_VXIDI, is_snan(b));
        }
        Frsqrte => {
            let (r, flags) = with_fenv(fpscr, || 1.0 / b.sqrt());
            cpu.fp_result(frt, r, flags, FPSCR_VXSQRT, is_snan(b));
        }
        Fmadd | Fmadds => {
            let (r, flags) = with_fenv(fpscr, || round(a.mul_add(c, b)));
            cpu.fp_result(frt, r, flags, FPSCR_VXIMZ, is_snan(a) || is_snan(b) || is_snan(c));
        }
        Fmsub | Fmsubs => {
            let (r, flags) = with_fenv(fpscr, || round(a.mul_add(c, -b)));
            cpu.fp_result(frt, r, flags, FPSCR_VXIMZ, is_snan(a) || is_snan(b) || is_snan(c));
        }
        Fnmadd | Fnmadds => {
            let (r, flags) = with_fenv(fpscr, || -round(a.mul_add(c, b)));
            cpu.fp_result(frt, r, flags, FPSCR_VXIMZ, is_snan(a) || is_snan(b) || is_snan(c));
        }
        Fnmsub | Fnmsubs => {
            let (r, flags) = with_fenv(fpscr, || -round(a.mul_add(c, -b)));
            cpu.fp_result(frt, r, flags, FPSCR_VXIMZ, is_snan(a) || is_snan(b) || is_snan(c));
        }
        Frsp => {
            let (r, flags) = with_fenv(fpscr, || to_single(b));
            cpu.fp_result(frt, r, flags, 0, is_snan(b));
        }
        Fsel => {
            let r = if a >= 0.0 { c } else { b };
            cpu.state.set_fpr_f64(frt, r);
        }
        Fctiw => cpu.fp_convert_to_int(insn, false),
        Fctiwz => cpu.fp_convert_to_int(insn, true),
        Fcmpu => cpu.fp_compare(insn, false),
        Fcmpo => cpu.fp_compare(insn, true),
        Fmr => cpu.state.fpr[frt] = cpu.state.fpr[frb],
        Fneg => cpu.state.fpr[frt] = cpu.state.fpr[frb] ^ (1 << 63),
        Fabs => cpu.state.fpr[frt] = cpu.state.fpr[frb] & !(1 << 63),
        Fnabs => cpu.state.fpr[frt] = cpu.state.fpr[frb] | (1 << 63),
        Mffs => cpu.state.fpr[frt] = cpu.state.fpscr as u64,
        Mtfsf => {
            let fm = insn.fm();
            let mut mask = 0u32;
            for i in 0..8 {
                if fm & (0x80 >> i) != 0 {
                    mask |= 0xF000_0000 >> (4 * i);
                }
            }
            mask &= !(FPSCR_FEX | FPSCR_VX);
            let value = cpu.state.fpr[frb] as u32;
            cpu.state.fpscr = (cpu.state.fpscr & !mask) | (value & mask);
            cpu.fpscr_summarize();
        }
        Mtfsfi => {
            let field = insn.crfd();
            let imm = (insn.0 >> 12) & 0xF;
            let shift = 28 - 4 * field as u32;
            let mut mask = 0xF << shift;
            mask &= !(FPSCR_FEX | FPSCR_VX);
            cpu.state.fpscr = (cpu.state.fpscr & !mask) | ((imm << shift) & mask);
            cpu.fpscr_summarize();
        }
        Mtfsb0 => {
            let bit = 0x8000_0000 >> insn.rt();
            if bit & (FPSCR_FEX | FPSCR_VX) == 0 {
                cpu.state.fpscr &= !bit;
            }
            cpu.fpscr_summarize();
        }
        Mtfsb1 => {
            let bit = 0x8000_0000 >> insn.rt();
            if bit & (FPSCR_FEX | FPSCR_VX) == 0 {
                cpu.fpscr_raise(bit);
            }
        }
        Mcrfs => {
            let shift = 28 - 4 * insn.crfs() as u32;
            cpu.state.cr[insn.crfd()] = ((cpu.state.fpscr >> shift) & 0xF) as u8;
            let clear = (0xF << shift) & (FPSCR_FX | FPSCR_STICKY);
            cpu.state.fpscr &= !clear;
            cpu.fpscr_summarize();
        }
        _ => unreachable!("{} is not a floating-point arithmetic op", op.mnemonic()),
    }

    let record = insn.rc() && !matches!(op, Fcmpu | Fcmpo | Mcrfs);
    if record {
        cpu.state.set_cr1();
    }
}
