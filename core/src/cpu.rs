//! PowerPC register file and per-core state.

use std::mem::offset_of;
use std::ptr::NonNull;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::memory::{Access, GuestMemory};

/// Number of general-purpose registers.
pub const NUM_GPRS: usize = 32;
/// Number of floating-point registers.
pub const NUM_FPRS: usize = 32;
/// Number of device control registers addressable by mfdcr/mtdcr.
pub const NUM_DCRS: usize = 1024;

pub const XER_SO: u32 = 0x8000_0000;
pub const XER_OV: u32 = 0x4000_0000;
pub const XER_CA: u32 = 0x2000_0000;

/// Bits within one 4-bit CR field.
pub const CR_LT: u8 = 8;
pub const CR_GT: u8 = 4;
pub const CR_EQ: u8 = 2;
pub const CR_SO: u8 = 1;

/// `exception_pending` bits.
pub const PENDING_IRQ: u32 = 0x1;
pub const PENDING_DEC: u32 = 0x2;
pub const PENDING_FIT: u32 = 0x4;

bitflags! {
    /// Machine state register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Msr: u32 {
        const POW = 0x0004_0000;
        const ILE = 0x0001_0000;
        const EE = 0x0000_8000;
        const PR = 0x0000_4000;
        const FP = 0x0000_2000;
        const ME = 0x0000_1000;
        const FE0 = 0x0000_0800;
        const SE = 0x0000_0400;
        const BE = 0x0000_0200;
        const FE1 = 0x0000_0100;
        const IP = 0x0000_0040;
        const IR = 0x0000_0020;
        const DR = 0x0000_0010;
        const RI = 0x0000_0002;
        const LE = 0x0000_0001;
    }
}

/// Special-purpose register numbers.
pub mod spr {
    pub const XER: u32 = 1;
    pub const LR: u32 = 8;
    pub const CTR: u32 = 9;
    pub const DSISR: u32 = 18;
    pub const DAR: u32 = 19;
    pub const DEC: u32 = 22;
    pub const SDR1: u32 = 25;
    pub const SRR0: u32 = 26;
    pub const SRR1: u32 = 27;
    pub const TBL_R: u32 = 268;
    pub const TBU_R: u32 = 269;
    pub const SPRG0: u32 = 272;
    pub const SPRG3: u32 = 275;
    pub const EAR: u32 = 282;
    pub const TBL_W: u32 = 284;
    pub const TBU_W: u32 = 285;
    pub const PVR: u32 = 287;
    pub const IBAT0U: u32 = 528;
    pub const DBAT3L: u32 = 543;
    pub const HID0: u32 = 1008;
    pub const HID1: u32 = 1009;

    // 602
    pub const IBR: u32 = 986;

    // 403
    pub const ESR: u32 = 980;
    pub const DEAR: u32 = 981;
    pub const EVPR: u32 = 982;
    pub const TSR: u32 = 984;
    pub const TCR: u32 = 986;
    pub const PIT: u32 = 987;
    pub const TBHI: u32 = 988;
    pub const TBLO: u32 = 989;
    pub const SRR2: u32 = 990;
    pub const SRR3: u32 = 991;
}

/// Device control register numbers (403).
pub mod dcr {
    pub const EXISR: u32 = 0x40;
    pub const EXIER: u32 = 0x42;
}

/// Supported cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuModel {
    /// Embedded core: EVPR vector base, EXISR/EXIER gating, FIT.
    Ppc403,
    Ppc602,
    #[default]
    Ppc603,
}

impl CpuModel {
    pub fn is_403(self) -> bool {
        self == CpuModel::Ppc403
    }

    /// 602 and 603 translate addresses and have a decrementer.
    pub fn is_60x(self) -> bool {
        !self.is_403()
    }

    pub fn has_mmu(self) -> bool {
        self.is_60x()
    }

    pub fn reset_pc(self) -> u32 {
        match self {
            CpuModel::Ppc403 => 0xFFFF_FFFC,
            CpuModel::Ppc602 | CpuModel::Ppc603 => 0xFFF0_0100,
        }
    }

    pub fn reset_msr(self) -> Msr {
        match self {
            CpuModel::Ppc403 => Msr::empty(),
            CpuModel::Ppc602 | CpuModel::Ppc603 => Msr::IP,
        }
    }

    pub fn pvr(self) -> u32 {
        match self {
            CpuModel::Ppc403 => 0x0020_1400,
            CpuModel::Ppc602 => 0x0005_0200,
            CpuModel::Ppc603 => 0x0003_0100,
        }
    }
}

/// Architectural state of one core.
///
/// Layout must be `#[repr(C)]`: generated code addresses fields at fixed
/// offsets from the env pointer.
#[repr(C)]
#[derive(Debug, Clone, PartialEq)]
pub struct PpcState {
    pub gpr: [u32; NUM_GPRS],
    /// Floating-point registers (raw IEEE-754 double bits).
    pub fpr: [u64; NUM_FPRS],
    pub pc: u32,
    pub msr: u32,
    /// CR0..CR7, one 4-bit field per byte.
    pub cr: [u8; 8],
    pub xer: u32,
    pub lr: u32,
    pub ctr: u32,
    pub srr0: u32,
    pub srr1: u32,
    pub srr2: u32,
    pub srr3: u32,
    pub sprg: [u32; 4],
    pub dar: u32,
    pub dsisr: u32,
    pub sdr1: u32,
    pub hid0: u32,
    pub hid1: u32,
    pub ibr: u32,
    pub evpr: u32,
    pub esr: u32,
    pub dear: u32,
    pub tcr: u32,
    pub tsr: u32,
    pub pit: u32,
    pub exisr: u32,
    pub exier: u32,
    pub pvr: u32,
    pub fpscr: u32,
    pub bat: [u32; 16],
    pub sr: [u32; 16],
    /// IRQ (0x1), DEC (0x2) and FIT (0x4) requests awaiting delivery.
    pub pending: u32,
    /// Cycles left in the current timeslice. Goes negative to end it.
    pub icount: i32,
    /// `icount` at the start of the timeslice.
    pub icount_start: i32,
    pub dec_trigger_cycle: i32,
    pub fit_trigger_cycle: i32,
    pub fit_int_enable: u32,
    pub fit_bit: u32,
    /// Raised by a failed data translation; the next check delivers DSI.
    pub fault: u32,
    pub reserve: u32,
    pub reserve_addr: u32,
    /// Time base at the start of the timeslice.
    pub tb: u64,
    /// Decrementer at the start of the timeslice.
    pub dec: u32,
    pub dcr: [u32; NUM_DCRS],
}

impl Default for PpcState {
    fn default() -> Self {
        Self {
            gpr: [0; NUM_GPRS],
            fpr: [0; NUM_FPRS],
            pc: 0,
            msr: 0,
            cr: [0; 8],
            xer: 0,
            lr: 0,
            ctr: 0,
            srr0: 0,
            srr1: 0,
            srr2: 0,
            srr3: 0,
            sprg: [0; 4],
            dar: 0,
            dsisr: 0,
            sdr1: 0,
            hid0: 0,
            hid1: 0,
            ibr: 0,
            evpr: 0,
            esr: 0,
            dear: 0,
            tcr: 0,
            tsr: 0,
            pit: 0,
            exisr: 0,
            exier: 0,
            pvr: 0,
            fpscr: 0,
            bat: [0; 16],
            sr: [0; 16],
            pending: 0,
            icount: 0,
            icount_start: 0,
            dec_trigger_cycle: 0,
            fit_trigger_cycle: 0,
            fit_int_enable: 0,
            fit_bit: 0,
            fault: 0,
            reserve: 0,
            reserve_addr: 0,
            tb: 0,
            dec: u32::MAX,
            dcr: [0; NUM_DCRS],
        }
    }
}

// Field offsets (bytes) from the env pointer. `PpcState` is the first
// field of `PpcCpu`, so these hold for both.

pub const fn gpr_offset(i: usize) -> i32 {
    (offset_of!(PpcState, gpr) + i * 4) as i32
}

pub const fn fpr_offset(i: usize) -> i32 {
    (offset_of!(PpcState, fpr) + i * 8) as i32
}

pub const fn cr_offset(field: usize) -> i32 {
    (offset_of!(PpcState, cr) + field) as i32
}

pub const PC_OFFSET: i32 = offset_of!(PpcState, pc) as i32;
pub const MSR_OFFSET: i32 = offset_of!(PpcState, msr) as i32;
pub const XER_OFFSET: i32 = offset_of!(PpcState, xer) as i32;
pub const LR_OFFSET: i32 = offset_of!(PpcState, lr) as i32;
pub const CTR_OFFSET: i32 = offset_of!(PpcState, ctr) as i32;
pub const SRR0_OFFSET: i32 = offset_of!(PpcState, srr0) as i32;
pub const SRR1_OFFSET: i32 = offset_of!(PpcState, srr1) as i32;
pub const IBR_OFFSET: i32 = offset_of!(PpcState, ibr) as i32;
pub const EVPR_OFFSET: i32 = offset_of!(PpcState, evpr) as i32;
pub const EXISR_OFFSET: i32 = offset_of!(PpcState, exisr) as i32;
pub const EXIER_OFFSET: i32 = offset_of!(PpcState, exier) as i32;
pub const FPSCR_OFFSET: i32 = offset_of!(PpcState, fpscr) as i32;
pub const PENDING_OFFSET: i32 = offset_of!(PpcState, pending) as i32;
pub const ICOUNT_OFFSET: i32 = offset_of!(PpcState, icount) as i32;
pub const DEC_TRIGGER_OFFSET: i32 = offset_of!(PpcState, dec_trigger_cycle) as i32;
pub const FIT_TRIGGER_OFFSET: i32 = offset_of!(PpcState, fit_trigger_cycle) as i32;
pub const FIT_ENABLE_OFFSET: i32 = offset_of!(PpcState, fit_int_enable) as i32;
pub const FIT_BIT_OFFSET: i32 = offset_of!(PpcState, fit_bit) as i32;
pub const FAULT_OFFSET: i32 = offset_of!(PpcState, fault) as i32;

impl PpcState {
    #[inline]
    pub fn gpr(&self, n: usize) -> u32 {
        self.gpr[n]
    }

    #[inline]
    pub fn set_gpr(&mut self, n: usize, value: u32) {
        self.gpr[n] = value;
    }

    /// `(RA|0)`: register value, or zero when `n` is 0.
    #[inline]
    pub fn gpr_or_zero(&self, n: usize) -> u32 {
        if n == 0 {
            0
        } else {
            self.gpr[n]
        }
    }

    #[inline]
    pub fn cr_field(&self, n: usize) -> u8 {
        self.cr[n]
    }

    #[inline]
    pub fn set_cr_field(&mut self, n: usize, value: u8) {
        self.cr[n] = value & 0xF;
    }

    /// Single CR bit, numbered 0 (CR0[LT]) to 31.
    pub fn cr_bit(&self, bit: usize) -> bool {
        self.cr[bit / 4] & (1 << (3 - (bit & 3))) != 0
    }

    pub fn set_cr_bit(&mut self, bit: usize, value: bool) {
        let mask = 1u8 << (3 - (bit & 3));
        if value {
            self.cr[bit / 4] |= mask;
        } else {
            self.cr[bit / 4] &= !mask;
        }
    }

    /// CR as the 32-bit value mfcr returns.
    pub fn cr(&self) -> u32 {
        self.cr
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &f)| acc | ((f as u32 & 0xF) << ((7 - i) * 4)))
    }

    pub fn set_cr(&mut self, value: u32) {
        for i in 0..8 {
            self.cr[i] = ((value >> ((7 - i) * 4)) & 0xF) as u8;
        }
    }

    #[inline]
    pub fn xer_so(&self) -> bool {
        self.xer & XER_SO != 0
    }

    #[inline]
    pub fn xer_ca(&self) -> bool {
        self.xer & XER_CA != 0
    }

    #[inline]
    pub fn set_xer_ca(&mut self, carry: bool) {
        if carry {
            self.xer |= XER_CA;
        } else {
            self.xer &= !XER_CA;
        }
    }

    /// Record signed overflow: OV follows `ov`, SO is sticky.
    pub fn set_xer_ov(&mut self, ov: bool) {
        if ov {
            self.xer |= XER_OV | XER_SO;
        } else {
            self.xer &= !XER_OV;
        }
    }

    /// CR0 from a result: signed compare against zero, SO from XER.
    pub fn set_cr0(&mut self, result: u32) {
        self.cr[0] = compare_field(result as i32, 0, self.xer_so());
    }

    /// CR1 from FPSCR[FX, FEX, VX, OX].
    pub fn set_cr1(&mut self) {
        self.cr[1] = ((self.fpscr >> 28) & 0xF) as u8;
    }

    #[inline]
    pub fn msr(&self) -> Msr {
        Msr::from_bits_retain(self.msr)
    }

    #[inline]
    pub fn fpr_f64(&self, n: usize) -> f64 {
        f64::from_bits(self.fpr[n])
    }

    #[inline]
    pub fn set_fpr_f64(&mut self, n: usize, value: f64) {
        self.fpr[n] = value.to_bits();
    }

    /// Cycles consumed since the timeslice started.
    #[inline]
    pub fn elapsed(&self) -> u32 {
        self.icount_start.wrapping_sub(self.icount) as u32
    }
}

/// 4-bit compare result for a CR field.
pub fn compare_field<T: Ord>(a: T, b: T, so: bool) -> u8 {
    let c = match a.cmp(&b) {
        std::cmp::Ordering::Less => CR_LT,
        std::cmp::Ordering::Greater => CR_GT,
        std::cmp::Ordering::Equal => CR_EQ,
    };
    c | if so { CR_SO } else { 0 }
}

/// One PowerPC core: register file plus the memory it sees.
///
/// `state` must stay the first field; generated code receives a pointer to
/// the whole struct and addresses the register file through it.
#[repr(C)]
pub struct PpcCpu {
    pub state: PpcState,
    pub model: CpuModel,
    pub mem: Box<dyn GuestMemory>,
}

impl PpcCpu {
    pub fn new(model: CpuModel, mem: Box<dyn GuestMemory>) -> Self {
        let mut cpu = Self {
            state: PpcState::default(),
            model,
            mem,
        };
        cpu.reset();
        cpu
    }

    /// Return the register file to its power-on state.
    pub fn reset(&mut self) {
        self.state = PpcState {
            pc: self.model.reset_pc(),
            msr: self.model.reset_msr().bits(),
            pvr: self.model.pvr(),
            ..PpcState::default()
        };
    }

    /// Canonical MSR setter used by mtmsr, rfi and exception entry.
    pub fn set_msr(&mut self, value: u32) {
        if value & (Msr::ILE | Msr::LE).bits() != 0 {
            warn!(target: "ppcdrc::cpu", msr = value, "little-endian mode requested; ignored");
        }
        self.state.msr = value;
    }

    // -- Timers --

    pub fn timebase(&self) -> u64 {
        self.state.tb.wrapping_add(self.state.elapsed() as u64)
    }

    pub fn set_timebase(&mut self, value: u64) {
        self.state.tb = value.wrapping_sub(self.state.elapsed() as u64);
        self.update_fit_trigger();
    }

    pub fn decrementer(&self) -> u32 {
        self.state.dec.wrapping_sub(self.state.elapsed())
    }

    pub fn set_decrementer(&mut self, value: u32) {
        self.state.dec = value.wrapping_add(self.state.elapsed());
        self.state.dec_trigger_cycle = self.state.icount.wrapping_sub(value as i32);
    }

    fn update_fit_trigger(&mut self) {
        let bit = self.state.fit_bit;
        if bit == 0 {
            return;
        }
        let until = bit - (self.timebase() as u32 & (bit - 1));
        self.state.fit_trigger_cycle = self.state.icount.wrapping_sub(until as i32);
    }

    /// Arm the cycle counter for a timeslice of `cycles`.
    pub fn begin_timeslice(&mut self, cycles: i32) {
        let tb = self.timebase();
        let dec = self.decrementer();
        self.state.tb = tb;
        self.state.dec = dec;
        self.state.icount = cycles;
        self.state.icount_start = cycles;
        self.state.dec_trigger_cycle = cycles.wrapping_sub(dec as i32);
        self.update_fit_trigger();
    }

    /// Fold the cycles consumed by the timeslice into TB and DEC. Returns
    /// the number of cycles consumed.
    pub fn end_timeslice(&mut self) -> i32 {
        let elapsed = self.state.elapsed();
        self.state.tb = self.state.tb.wrapping_add(elapsed as u64);
        self.state.dec = self.state.dec.wrapping_sub(elapsed);
        self.state.icount_start = self.state.icount;
        elapsed as i32
    }

    // -- Special-purpose registers --

    pub fn get_spr(&self, n: u32) -> u32 {
        let s = &self.state;
        match n {
            spr::XER => s.xer,
            spr::LR => s.lr,
            spr::CTR => s.ctr,
            spr::SRR0 => s.srr0,
            spr::SRR1 => s.srr1,
            spr::SPRG0..=spr::SPRG3 => s.sprg[(n - spr::SPRG0) as usize],
            spr::PVR => s.pvr,
            spr::DEC if self.model.is_60x() => self.decrementer(),
            spr::DSISR if self.model.is_60x() => s.dsisr,
            spr::DAR if self.model.is_60x() => s.dar,
            spr::SDR1 if self.model.is_60x() => s.sdr1,
            spr::TBL_R if self.model.is_60x() => self.timebase() as u32,
            spr::TBU_R if self.model.is_60x() => (self.timebase() >> 32) as u32,
            spr::IBAT0U..=spr::DBAT3L if self.model.is_60x() => {
                s.bat[(n - spr::IBAT0U) as usize]
            }
            spr::HID0 if self.model.is_60x() => s.hid0,
            spr::HID1 if self.model.is_60x() => s.hid1,
            spr::IBR if self.model == CpuModel::Ppc602 => s.ibr,
            spr::EVPR if self.model.is_403() => s.evpr,
            spr::ESR if self.model.is_403() => s.esr,
            spr::DEAR if self.model.is_403() => s.dear,
            spr::TCR if self.model.is_403() => s.tcr,
            spr::TSR if self.model.is_403() => s.tsr,
            spr::PIT if self.model.is_403() => s.pit,
            spr::TBHI if self.model.is_403() => (self.timebase() >> 32) as u32,
            spr::TBLO if self.model.is_403() => self.timebase() as u32,
            spr::SRR2 if self.model.is_403() => s.srr2,
            spr::SRR3 if self.model.is_403() => s.srr3,
            _ => {
                warn!(target: "ppcdrc::cpu", spr = n, pc = s.pc, "read of unsupported SPR");
                0
            }
        }
    }

    pub fn set_spr(&mut self, n: u32, value: u32) {
        let is_60x = self.model.is_60x();
        let is_403 = self.model.is_403();
        match n {
            spr::XER => self.state.xer = value,
            spr::LR => self.state.lr = value,
            spr::CTR => self.state.ctr = value,
            spr::SRR0 => self.state.srr0 = value,
            spr::SRR1 => self.state.srr1 = value,
            spr::SPRG0..=spr::SPRG3 => self.state.sprg[(n - spr::SPRG0) as usize] = value,
            spr::PVR => {}
            spr::DEC if is_60x => self.set_decrementer(value),
            spr::DSISR if is_60x => self.state.dsisr = value,
            spr::DAR if is_60x => self.state.dar = value,
            spr::SDR1 if is_60x => self.state.sdr1 = value,
            spr::TBL_W if is_60x => {
                let tb = (self.timebase() & !0xFFFF_FFFF) | value as u64;
                self.set_timebase(tb);
            }
            spr::TBU_W if is_60x => {
                let tb = (self.timebase() & 0xFFFF_FFFF) | ((value as u64) << 32);
                self.set_timebase(tb);
            }
            spr::IBAT0U..=spr::DBAT3L if is_60x => {
                self.state.bat[(n - spr::IBAT0U) as usize] = value
            }
            spr::HID0 if is_60x => self.state.hid0 = value,
            spr::HID1 if is_60x => self.state.hid1 = value,
            spr::IBR if self.model == CpuModel::Ppc602 => self.state.ibr = value,
            spr::EVPR if is_403 => self.state.evpr = value & 0xFFFF_0000,
            spr::ESR if is_403 => self.state.esr = value,
            spr::DEAR if is_403 => self.state.dear = value,
            spr::TCR if is_403 => self.set_tcr(value),
            // Write-one-to-clear.
            spr::TSR if is_403 => self.state.tsr &= !value,
            spr::PIT if is_403 => self.state.pit = value,
            spr::TBHI if is_403 => {
                let tb = (self.timebase() & 0xFFFF_FFFF) | ((value as u64) << 32);
                self.set_timebase(tb);
            }
            spr::TBLO if is_403 => {
                let tb = (self.timebase() & !0xFFFF_FFFF) | value as u64;
                self.set_timebase(tb);
            }
            spr::SRR2 if is_403 => self.state.srr2 = value,
            spr::SRR3 if is_403 => self.state.srr3 = value,
            _ => {
                warn!(target: "ppcdrc::cpu", spr = n, value, pc = self.state.pc, "write to unsupported SPR");
            }
        }
    }

    fn set_tcr(&mut self, value: u32) {
        self.state.tcr = value;
        self.state.fit_int_enable = (value >> 23) & 1;
        self.state.fit_bit = 1 << (9 + 4 * ((value >> 24) & 3));
        self.update_fit_trigger();
    }

    // -- Device control registers (403) --

    pub fn get_dcr(&self, n: u32) -> u32 {
        match n {
            dcr::EXISR => self.state.exisr,
            dcr::EXIER => self.state.exier,
            _ => self.state.dcr[n as usize % NUM_DCRS],
        }
    }

    pub fn set_dcr(&mut self, n: u32, value: u32) {
        match n {
            dcr::EXISR => self.state.exisr &= !value,
            dcr::EXIER => self.state.exier = value,
            _ => self.state.dcr[n as usize % NUM_DCRS] = value,
        }
        if matches!(n, dcr::EXISR | dcr::EXIER) && self.state.exisr & self.state.exier == 0 {
            self.state.pending &= !PENDING_IRQ;
        }
    }

    /// Drive external interrupt line `line`.
    ///
    /// On 60x cores the line is level-sensitive. On the 403, lines 0..=4
    /// latch into EXISR and stay pending until software clears them.
    pub fn set_irq_line(&mut self, line: u32, asserted: bool) {
        if self.model.is_403() {
            if line <= 4 && asserted {
                self.state.exisr |= 0x10 >> line;
                self.state.pending |= PENDING_IRQ;
            }
        } else if asserted {
            self.state.pending |= PENDING_IRQ;
        } else {
            self.state.pending &= !PENDING_IRQ;
        }
    }

    // -- Memory --

    fn data_address(&mut self, ea: u32, access: Access) -> Option<u32> {
        if !self.model.has_mmu() || self.state.msr & Msr::DR.bits() == 0 {
            return Some(ea);
        }
        let addr = self.mem.translate(ea, access);
        if addr.is_none() {
            self.state.fault = 1;
            self.state.dar = ea;
            self.state.dsisr = 0x4000_0000 | if access == Access::Write { 0x0200_0000 } else { 0 };
        }
        addr
    }

    pub fn read8(&mut self, ea: u32) -> u8 {
        self.data_address(ea, Access::Read).map_or(0, |a| self.mem.read8(a))
    }

    pub fn read16(&mut self, ea: u32) -> u16 {
        self.data_address(ea, Access::Read).map_or(0, |a| self.mem.read16(a))
    }

    pub fn read32(&mut self, ea: u32) -> u32 {
        self.data_address(ea, Access::Read).map_or(0, |a| self.mem.read32(a))
    }

    pub fn read64(&mut self, ea: u32) -> u64 {
        self.data_address(ea, Access::Read).map_or(0, |a| self.mem.read64(a))
    }

    pub fn write8(&mut self, ea: u32, value: u8) {
        if let Some(a) = self.data_address(ea, Access::Write) {
            self.mem.write8(a, value);
        }
    }

    pub fn write16(&mut self, ea: u32, value: u16) {
        if let Some(a) = self.data_address(ea, Access::Write) {
            self.mem.write16(a, value);
        }
    }

    pub fn write32(&mut self, ea: u32, value: u32) {
        if let Some(a) = self.data_address(ea, Access::Write) {
            self.mem.write32(a, value);
        }
    }

    pub fn write64(&mut self, ea: u32, value: u64) {
        if let Some(a) = self.data_address(ea, Access::Write) {
            self.mem.write64(a, value);
        }
    }

    /// Take the pending data fault, if any.
    pub fn take_fault(&mut self) -> bool {
        std::mem::take(&mut self.state.fault) != 0
    }

    /// Host pointer to the instruction at `pc`, after instruction address
    /// translation. `None` means a fetch fault.
    pub fn opcode_ptr(&self, pc: u32) -> Option<NonNull<u32>> {
        let addr = if self.model.has_mmu() && self.state.msr & Msr::IR.bits() != 0 {
            self.mem.translate(pc, Access::Fetch)?
        } else {
            pc
        };
        self.mem.opcode_ptr(addr)
    }

    /// Fetch the instruction word at `pc`.
    pub fn fetch(&self, pc: u32) -> Option<u32> {
        // SAFETY: `GuestMemory::opcode_ptr` hands out pointers that stay
        // valid for the lifetime of the memory object.
        self.opcode_ptr(pc).map(|p| unsafe { p.as_ptr().read() })
    }
}
