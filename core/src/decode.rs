//! Instruction decoding.
//!
//! `decode` maps a 32-bit word to an [`Opcode`]. The primary opcode
//! (bits 0..5) selects the instruction or one of the extended groups 19,
//! 31, 59 and 63, which are resolved on their secondary opcode. The table
//! is a pure function of the word and the core model.

use crate::cpu::CpuModel;

/// Raw instruction word with field accessors.
///
/// Field names follow the instruction-form diagrams; bit 0 is the MSB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn(pub u32);

impl Insn {
    #[inline]
    pub const fn primary(self) -> u32 {
        self.0 >> 26
    }
    /// RT / RS / FRT / BO / TO (bits 6..10).
    #[inline]
    pub const fn rt(self) -> usize {
        ((self.0 >> 21) & 0x1F) as usize
    }
    /// RA / FRA / BI (bits 11..15).
    #[inline]
    pub const fn ra(self) -> usize {
        ((self.0 >> 16) & 0x1F) as usize
    }
    /// RB / FRB / SH (bits 16..20).
    #[inline]
    pub const fn rb(self) -> usize {
        ((self.0 >> 11) & 0x1F) as usize
    }
    /// FRC / MB (bits 21..25).
    #[inline]
    pub const fn rc_field(self) -> usize {
        ((self.0 >> 6) & 0x1F) as usize
    }
    #[inline]
    pub const fn simm(self) -> i32 {
        self.0 as u16 as i16 as i32
    }
    #[inline]
    pub const fn uimm(self) -> u32 {
        self.0 & 0xFFFF
    }
    /// Record bit.
    #[inline]
    pub const fn rc(self) -> bool {
        self.0 & 1 != 0
    }
    /// Overflow-enable bit of XO-form arithmetic.
    #[inline]
    pub const fn oe(self) -> bool {
        self.0 & 0x400 != 0
    }
    /// Link bit of branches.
    #[inline]
    pub const fn lk(self) -> bool {
        self.0 & 1 != 0
    }
    /// Absolute-address bit of branches.
    #[inline]
    pub const fn aa(self) -> bool {
        self.0 & 2 != 0
    }
    #[inline]
    pub const fn bo(self) -> u32 {
        (self.0 >> 21) & 0x1F
    }
    #[inline]
    pub const fn bi(self) -> u32 {
        (self.0 >> 16) & 0x1F
    }
    /// Destination CR field of compares and mcrf.
    #[inline]
    pub const fn crfd(self) -> usize {
        ((self.0 >> 23) & 7) as usize
    }
    /// Source CR field of mcrf/mcrfs.
    #[inline]
    pub const fn crfs(self) -> usize {
        ((self.0 >> 18) & 7) as usize
    }
    /// Rotate amount / shift count.
    #[inline]
    pub const fn sh(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }
    #[inline]
    pub const fn mb(self) -> u32 {
        (self.0 >> 6) & 0x1F
    }
    #[inline]
    pub const fn me(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }
    /// SPR/DCR/TBR number with its two halves swapped back.
    #[inline]
    pub const fn spr(self) -> u32 {
        ((self.0 >> 16) & 0x1F) | ((self.0 >> 6) & 0x3E0)
    }
    /// 24-bit branch displacement, sign-extended.
    #[inline]
    pub const fn li(self) -> i32 {
        ((self.0 & 0x03FF_FFFC) << 6) as i32 >> 6
    }
    /// 14-bit conditional branch displacement, sign-extended.
    #[inline]
    pub const fn bd(self) -> i32 {
        (self.0 & 0xFFFC) as u16 as i16 as i32
    }
    /// FXM field of mtcrf.
    #[inline]
    pub const fn crm(self) -> u32 {
        (self.0 >> 12) & 0xFF
    }
    /// FM field of mtfsf.
    #[inline]
    pub const fn fm(self) -> u32 {
        (self.0 >> 17) & 0xFF
    }
    /// Segment register number of mfsr/mtsr.
    #[inline]
    pub const fn sr(self) -> usize {
        ((self.0 >> 16) & 0xF) as usize
    }
    /// 10-bit extended opcode (X/XL/XFX forms).
    #[inline]
    pub const fn xo10(self) -> u32 {
        (self.0 >> 1) & 0x3FF
    }
    /// 9-bit extended opcode (XO form, OE excluded).
    #[inline]
    pub const fn xo9(self) -> u32 {
        (self.0 >> 1) & 0x1FF
    }
    /// 5-bit extended opcode (A form).
    #[inline]
    pub const fn xo5(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }
}

/// Mask selecting bits MB..=ME (big-endian numbering), wrapping when
/// MB > ME.
pub const fn rotate_mask(mb: u32, me: u32) -> u32 {
    let begin = u32::MAX >> mb;
    let end = u32::MAX << (31 - me);
    if mb <= me {
        begin & end
    } else {
        begin | end
    }
}

macro_rules! opcodes {
    ($($name:ident => $mnemonic:literal),* $(,)?) => {
        /// Every instruction the decoder recognises.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    // Integer arithmetic
    Add => "add", Addc => "addc", Adde => "adde", Addi => "addi", Addic => "addic",
    AddicDot => "addic.", Addis => "addis", Addme => "addme", Addze => "addze",
    Divw => "divw", Divwu => "divwu", Mulhw => "mulhw", Mulhwu => "mulhwu",
    Mulli => "mulli", Mullw => "mullw", Neg => "neg", Subf => "subf",
    Subfc => "subfc", Subfe => "subfe", Subfic => "subfic", Subfme => "subfme",
    Subfze => "subfze",
    // Compare
    Cmp => "cmp", Cmpi => "cmpi", Cmpl => "cmpl", Cmpli => "cmpli",
    // Logical
    And => "and", Andc => "andc", AndiDot => "andi.", AndisDot => "andis.",
    Cntlzw => "cntlzw", Eqv => "eqv", Extsb => "extsb", Extsh => "extsh",
    Nand => "nand", Nor => "nor", Or => "or", Orc => "orc", Ori => "ori",
    Oris => "oris", Xor => "xor", Xori => "xori", Xoris => "xoris",
    // Rotate and shift
    Rlwimi => "rlwimi", Rlwinm => "rlwinm", Rlwnm => "rlwnm", Slw => "slw",
    Sraw => "sraw", Srawi => "srawi", Srw => "srw",
    // Branch and system
    B => "b", Bc => "bc", Bcctr => "bcctr", Bclr => "bclr", Sc => "sc",
    Rfi => "rfi", Rfci => "rfci", Tw => "tw", Twi => "twi",
    // Condition register
    Crand => "crand", Crandc => "crandc", Creqv => "creqv", Crnand => "crnand",
    Crnor => "crnor", Cror => "cror", Crorc => "crorc", Crxor => "crxor",
    Mcrf => "mcrf", Mcrxr => "mcrxr", Mfcr => "mfcr", Mtcrf => "mtcrf",
    // Special registers
    Mfmsr => "mfmsr", Mtmsr => "mtmsr", Mfspr => "mfspr", Mtspr => "mtspr",
    Mftb => "mftb", Mfsr => "mfsr", Mfsrin => "mfsrin", Mtsr => "mtsr",
    Mtsrin => "mtsrin", Mfdcr => "mfdcr", Mtdcr => "mtdcr", Wrtee => "wrtee",
    Wrteei => "wrteei",
    // Integer loads
    Lbz => "lbz", Lbzu => "lbzu", Lbzux => "lbzux", Lbzx => "lbzx",
    Lha => "lha", Lhau => "lhau", Lhaux => "lhaux", Lhax => "lhax",
    Lhbrx => "lhbrx", Lhz => "lhz", Lhzu => "lhzu", Lhzux => "lhzux",
    Lhzx => "lhzx", Lmw => "lmw", Lswi => "lswi", Lswx => "lswx",
    Lwarx => "lwarx", Lwbrx => "lwbrx", Lwz => "lwz", Lwzu => "lwzu",
    Lwzux => "lwzux", Lwzx => "lwzx",
    // Integer stores
    Stb => "stb", Stbu => "stbu", Stbux => "stbux", Stbx => "stbx",
    Sth => "sth", Sthbrx => "sthbrx", Sthu => "sthu", Sthux => "sthux",
    Sthx => "sthx", Stmw => "stmw", Stswi => "stswi", Stswx => "stswx",
    Stw => "stw", Stwbrx => "stwbrx", Stwcx => "stwcx.", Stwu => "stwu",
    Stwux => "stwux", Stwx => "stwx",
    // External control
    Eciwx => "eciwx", Ecowx => "ecowx",
    // Cache, sync and TLB management
    Dcba => "dcba", Dcbf => "dcbf", Dcbi => "dcbi", Dcbst => "dcbst",
    Dcbt => "dcbt", Dcbtst => "dcbtst", Dcbz => "dcbz", Dccci => "dccci",
    Dcread => "dcread", Eieio => "eieio", Icbi => "icbi", Icbt => "icbt",
    Iccci => "iccci", Icread => "icread", Isync => "isync", Sync => "sync",
    Tlbia => "tlbia", Tlbie => "tlbie", Tlbld => "tlbld", Tlbli => "tlbli",
    Tlbsync => "tlbsync",
    // Floating-point loads and stores
    Lfd => "lfd", Lfdu => "lfdu", Lfdux => "lfdux", Lfdx => "lfdx",
    Lfs => "lfs", Lfsu => "lfsu", Lfsux => "lfsux", Lfsx => "lfsx",
    Stfd => "stfd", Stfdu => "stfdu", Stfdux => "stfdux", Stfdx => "stfdx",
    Stfiwx => "stfiwx", Stfs => "stfs", Stfsu => "stfsu", Stfsux => "stfsux",
    Stfsx => "stfsx",
    // Floating-point arithmetic
    Fabs => "fabs", Fadd => "fadd", Fadds => "fadds", Fcmpo => "fcmpo",
    Fcmpu => "fcmpu", Fctiw => "fctiw", Fctiwz => "fctiwz", Fdiv => "fdiv",
    Fdivs => "fdivs", Fmadd => "fmadd", Fmadds => "fmadds", Fmr => "fmr",
    Fmsub => "fmsub", Fmsubs => "fmsubs", Fmul => "fmul", Fmuls => "fmuls",
    Fnabs => "fnabs", Fneg => "fneg", Fnmadd => "fnmadd", Fnmadds => "fnmadds",
    Fnmsub => "fnmsub", Fnmsubs => "fnmsubs", Fres => "fres", Frsp => "frsp",
    Frsqrte => "frsqrte", Fsel => "fsel", Fsqrt => "fsqrt", Fsqrts => "fsqrts",
    Fsub => "fsub", Fsubs => "fsubs",
    // FPSCR
    Mcrfs => "mcrfs", Mffs => "mffs", Mtfsb0 => "mtfsb0", Mtfsb1 => "mtfsb1",
    Mtfsf => "mtfsf", Mtfsfi => "mtfsfi",
    Invalid => "invalid",
}

impl Opcode {
    /// Floating-point instructions, including FP loads, stores and FPSCR
    /// moves.
    pub fn is_fp(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Lfd | Lfdu | Lfdux | Lfdx | Lfs | Lfsu | Lfsux | Lfsx | Stfd | Stfdu | Stfdux
                | Stfdx | Stfiwx | Stfs | Stfsu | Stfsux | Stfsx | Fabs | Fadd | Fadds
                | Fcmpo | Fcmpu | Fctiw | Fctiwz | Fdiv | Fdivs | Fmadd | Fmadds | Fmr
                | Fmsub | Fmsubs | Fmul | Fmuls | Fnabs | Fneg | Fnmadd | Fnmadds | Fnmsub
                | Fnmsubs | Fres | Frsp | Frsqrte | Fsel | Fsqrt | Fsqrts | Fsub | Fsubs
                | Mcrfs | Mffs | Mtfsb0 | Mtfsb1 | Mtfsf | Mtfsfi
        )
    }

    /// Whether executing the instruction touches data memory.
    pub fn accesses_memory(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Lbz | Lbzu | Lbzux | Lbzx | Lha | Lhau | Lhaux | Lhax | Lhbrx | Lhz | Lhzu
                | Lhzux | Lhzx | Lmw | Lswi | Lswx | Lwarx | Lwbrx | Lwz | Lwzu | Lwzux
                | Lwzx | Stb | Stbu | Stbux | Stbx | Sth | Sthbrx | Sthu | Sthux | Sthx
                | Stmw | Stswi | Stswx | Stw | Stwbrx | Stwcx | Stwu | Stwux | Stwx
                | Lfd | Lfdu | Lfdux | Lfdx | Lfs | Lfsu | Lfsux | Lfsx | Stfd | Stfdu
                | Stfdux | Stfdx | Stfiwx | Stfs | Stfsu | Stfsux | Stfsx
        )
    }
}

/// Decode `word` for `model`.
pub fn decode(word: u32, model: CpuModel) -> Opcode {
    use Opcode::*;
    let insn = Insn(word);
    match insn.primary() {
        3 => Twi,
        7 => Mulli,
        8 => Subfic,
        10 => Cmpli,
        11 => Cmpi,
        12 => Addic,
        13 => AddicDot,
        14 => Addi,
        15 => Addis,
        16 => Bc,
        17 => Sc,
        18 => B,
        19 => decode_19(insn, model),
        20 => Rlwimi,
        21 => Rlwinm,
        23 => Rlwnm,
        24 => Ori,
        25 => Oris,
        26 => Xori,
        27 => Xoris,
        28 => AndiDot,
        29 => AndisDot,
        31 => decode_31(insn, model),
        32 => Lwz,
        33 => Lwzu,
        34 => Lbz,
        35 => Lbzu,
        36 => Stw,
        37 => Stwu,
        38 => Stb,
        39 => Stbu,
        40 => Lhz,
        41 => Lhzu,
        42 => Lha,
        43 => Lhau,
        44 => Sth,
        45 => Sthu,
        46 => Lmw,
        47 => Stmw,
        48 => Lfs,
        49 => Lfsu,
        50 => Lfd,
        51 => Lfdu,
        52 => Stfs,
        53 => Stfsu,
        54 => Stfd,
        55 => Stfdu,
        59 => decode_59(insn),
        63 => decode_63(insn),
        _ => Invalid,
    }
}

fn decode_19(insn: Insn, model: CpuModel) -> Opcode {
    use Opcode::*;
    match insn.xo10() {
        0 => Mcrf,
        16 => Bclr,
        33 => Crnor,
        50 => Rfi,
        51 if model.is_403() => Rfci,
        129 => Crandc,
        150 => Isync,
        193 => Crxor,
        225 => Crnand,
        257 => Crand,
        289 => Creqv,
        417 => Crorc,
        449 => Cror,
        528 => Bcctr,
        _ => Invalid,
    }
}

fn decode_31(insn: Insn, model: CpuModel) -> Opcode {
    use Opcode::*;
    let is_403 = model.is_403();
    // XO-form arithmetic ignores OE; no X-form opcode collides with these.
    match insn.xo9() {
        8 => return Subfc,
        10 => return Addc,
        11 => return Mulhwu,
        40 => return Subf,
        75 => return Mulhw,
        104 => return Neg,
        136 => return Subfe,
        138 => return Adde,
        200 => return Subfze,
        202 => return Addze,
        232 => return Subfme,
        234 => return Addme,
        235 => return Mullw,
        266 => return Add,
        459 => return Divwu,
        491 => return Divw,
        _ => {}
    }
    match insn.xo10() {
        0 => Cmp,
        4 => Tw,
        19 => Mfcr,
        20 => Lwarx,
        23 => Lwzx,
        24 => Slw,
        26 => Cntlzw,
        28 => And,
        32 => Cmpl,
        54 => Dcbst,
        55 => Lwzux,
        60 => Andc,
        83 => Mfmsr,
        86 => Dcbf,
        87 => Lbzx,
        119 => Lbzux,
        124 => Nor,
        131 if is_403 => Wrtee,
        144 => Mtcrf,
        146 => Mtmsr,
        150 => Stwcx,
        151 => Stwx,
        163 if is_403 => Wrteei,
        183 => Stwux,
        210 => Mtsr,
        215 => Stbx,
        242 => Mtsrin,
        246 => Dcbtst,
        247 => Stbux,
        262 if is_403 => Icbt,
        278 => Dcbt,
        279 => Lhzx,
        284 => Eqv,
        306 => Tlbie,
        310 => Eciwx,
        311 => Lhzux,
        316 => Xor,
        323 if is_403 => Mfdcr,
        339 => Mfspr,
        343 => Lhax,
        370 => Tlbia,
        371 => Mftb,
        375 => Lhaux,
        407 => Sthx,
        412 => Orc,
        438 => Ecowx,
        439 => Sthux,
        444 => Or,
        451 if is_403 => Mtdcr,
        454 if is_403 => Dccci,
        467 => Mtspr,
        470 => Dcbi,
        476 => Nand,
        486 if is_403 => Dcread,
        512 => Mcrxr,
        533 => Lswx,
        534 => Lwbrx,
        535 => Lfsx,
        536 => Srw,
        566 => Tlbsync,
        567 => Lfsux,
        595 => Mfsr,
        597 => Lswi,
        598 => Sync,
        599 => Lfdx,
        631 => Lfdux,
        659 => Mfsrin,
        661 => Stswx,
        662 => Stwbrx,
        663 => Stfsx,
        695 => Stfsux,
        725 => Stswi,
        727 => Stfdx,
        758 => Dcba,
        759 => Stfdux,
        790 => Lhbrx,
        792 => Sraw,
        824 => Srawi,
        854 => Eieio,
        918 => Sthbrx,
        922 => Extsh,
        954 => Extsb,
        966 if is_403 => Iccci,
        978 if !is_403 => Tlbld,
        982 => Icbi,
        983 => Stfiwx,
        998 if is_403 => Icread,
        1010 if !is_403 => Tlbli,
        1014 => Dcbz,
        _ => Invalid,
    }
}

fn decode_59(insn: Insn) -> Opcode {
    use Opcode::*;
    match insn.xo5() {
        18 => Fdivs,
        20 => Fsubs,
        21 => Fadds,
        22 => Fsqrts,
        24 => Fres,
        25 => Fmuls,
        28 => Fmsubs,
        29 => Fmadds,
        30 => Fnmsubs,
        31 => Fnmadds,
        _ => Invalid,
    }
}

fn decode_63(insn: Insn) -> Opcode {
    use Opcode::*;
    if insn.xo5() >= 18 {
        return match insn.xo5() {
            18 => Fdiv,
            20 => Fsub,
            21 => Fadd,
            22 => Fsqrt,
            23 => Fsel,
            25 => Fmul,
            26 => Frsqrte,
            28 => Fmsub,
            29 => Fmadd,
            30 => Fnmsub,
            31 => Fnmadd,
            _ => Invalid,
        };
    }
    match insn.xo10() {
        0 => Fcmpu,
        12 => Frsp,
        14 => Fctiw,
        15 => Fctiwz,
        32 => Fcmpo,
        38 => Mtfsb1,
        40 => Fneg,
        64 => Mcrfs,
        70 => Mtfsb0,
        72 => Fmr,
        134 => Mtfsfi,
        136 => Fnabs,
        264 => Fabs,
        583 => Mffs,
        711 => Mtfsf,
        _ => Invalid,
    }
}
