#![allow(non_upper_case_globals)]

use crate::code_buffer::CodeBuffer;
use crate::drc::LookupGeometry;
use crate::x86_64::regs::{Reg, CALLEE_SAVED, CALL_ARG_REGS, ENV_REG, STACK_ADDEND};
use crate::HostCodeGen;

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F escape
pub const P_DATA16: u32 = 0x400; // 0x66 operand size
pub const P_REXW: u32 = 0x1000; // REX.W = 1
pub const P_REXB_R: u32 = 0x2000; // REG field is a byte register
pub const P_REXB_RM: u32 = 0x4000; // R/M field is a byte register

// -- Opcodes --

pub const OPC_ARITH_EvIb: u32 = 0x83;
pub const OPC_ARITH_EvIz: u32 = 0x81;
pub const OPC_ARITH_GvEv: u32 = 0x03;
pub const OPC_ARITH_EvGv: u32 = 0x01;

pub const OPC_SHIFT_1: u32 = 0xD1;
pub const OPC_SHIFT_Ib: u32 = 0xC1;
pub const OPC_SHIFT_cl: u32 = 0xD3;

pub const OPC_MOVB_EvGv: u32 = 0x88;
pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVB_EvIb: u32 = 0xC6;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;

pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT;
pub const OPC_MOVZWL: u32 = 0xB7 | P_EXT;
pub const OPC_MOVSBL: u32 = 0xBE | P_EXT;
pub const OPC_MOVSWL: u32 = 0xBF | P_EXT;

pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_CALL_Jz: u32 = 0xE8;

pub const OPC_BSR: u32 = 0xBD | P_EXT;
pub const OPC_BSWAP: u32 = 0xC8 | P_EXT;

pub const OPC_SETCC: u32 = 0x90 | P_EXT | P_REXB_RM;
pub const OPC_TESTL: u32 = 0x85;

pub const OPC_GRP3_Ev: u32 = 0xF7;
pub const OPC_GRP3_Eb: u32 = 0xF6;
pub const OPC_GRP5: u32 = 0xFF;
pub const OPC_GRPBT: u32 = 0xBA | P_EXT;

pub const OPC_IMUL_GvEv: u32 = 0xAF | P_EXT;
pub const OPC_IMUL_GvEvIb: u32 = 0x6B;
pub const OPC_IMUL_GvEvIz: u32 = 0x69;

pub const OPC_LEA: u32 = 0x8D;
pub const OPC_PUSH_r32: u32 = 0x50;
pub const OPC_POP_r32: u32 = 0x58;
pub const OPC_RET: u32 = 0xC3;

// -- Sub-operations --

/// `/r` field of 0x81/0x83 and the row of the 0x01/0x03 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Test = 0,
    Not = 2,
    Neg = 3,
    Mul = 4,
    Imul = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    CallN = 2,
    JmpN = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GrpBtOp {
    Bt = 4,
    Bts = 5,
    Btr = 6,
    Btc = 7,
}

/// Condition codes for Jcc/SETcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    Jo = 0x0,
    Jno = 0x1,
    Jb = 0x2,
    Jae = 0x3,
    Je = 0x4,
    Jne = 0x5,
    Jbe = 0x6,
    Ja = 0x7,
    Js = 0x8,
    Jns = 0x9,
    Jp = 0xA,
    Jnp = 0xB,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

impl X86Cond {
    pub fn invert(self) -> Self {
        use X86Cond::*;
        match self {
            Jo => Jno,
            Jno => Jo,
            Jb => Jae,
            Jae => Jb,
            Je => Jne,
            Jne => Je,
            Jbe => Ja,
            Ja => Jbe,
            Js => Jns,
            Jns => Js,
            Jp => Jnp,
            Jnp => Jp,
            Jl => Jge,
            Jge => Jl,
            Jle => Jg,
            Jg => Jle,
        }
    }
}

// -- Core encoding --

#[inline]
fn rexw_flag(rexw: bool) -> u32 {
    if rexw {
        P_REXW
    } else {
        0
    }
}

/// Emit prefixes, REX and opcode bytes. `r` and `rm` are raw register
/// numbers; pass 0 for unused fields.
pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc_3(buf, opc, r, rm, 0);
}

/// Like `emit_opc`, with a SIB index register contributing REX.X.
fn emit_opc_3(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8, index: u8) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if r >= 8 {
        rex |= 0x04;
    }
    if index >= 8 {
        rex |= 0x02;
    }
    if rm >= 8 {
        rex |= 0x01;
    }
    // SPL/BPL/SIL/DIL are only reachable with a REX prefix present.
    if rex == 0
        && ((opc & P_REXB_R != 0 && r >= 4) || (opc & P_REXB_RM != 0 && rm >= 4))
    {
        rex = 0x40;
    }

    if opc & P_DATA16 != 0 {
        buf.emit_u8(0x66);
    }
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    if opc & P_EXT != 0 {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(opc as u8);
}

/// Register-register ModR/M.
pub fn emit_modrm(buf: &mut CodeBuffer, opc: u32, r: Reg, rm: Reg) {
    emit_opc(buf, opc, r as u8, rm as u8);
    buf.emit_u8(0xC0 | (r.low3() << 3) | rm.low3());
}

/// Register operand with a `/ext` opcode extension.
pub fn emit_modrm_ext(buf: &mut CodeBuffer, opc: u32, ext: u8, rm: Reg) {
    emit_opc(buf, opc, ext, rm as u8);
    buf.emit_u8(0xC0 | (ext << 3) | rm.low3());
}

/// ModR/M (+SIB) and displacement for `[base + offset]`, with `field` in
/// the reg slot. Prefixes must already be out.
fn emit_mem_operand(buf: &mut CodeBuffer, field: u8, base: Reg, offset: i32) {
    let b3 = base.low3();
    let f = (field & 7) << 3;
    // RBP/R13 have no disp-less form; RSP/R12 need a SIB byte.
    let (mode, disp8) = if offset == 0 && b3 != 5 {
        (0x00, None)
    } else if (-128..=127).contains(&offset) {
        (0x40, Some(offset as u8))
    } else {
        (0x80, None)
    };
    buf.emit_u8(mode | f | b3);
    if b3 == 4 {
        buf.emit_u8(0x24);
    }
    match (mode, disp8) {
        (0x40, Some(d)) => buf.emit_u8(d),
        (0x80, _) => buf.emit_u32(offset as u32),
        _ => {}
    }
}

/// `[base + offset]` memory operand with a register in the reg slot.
pub fn emit_modrm_offset(buf: &mut CodeBuffer, opc: u32, r: Reg, base: Reg, offset: i32) {
    emit_opc(buf, opc, r as u8, base as u8);
    emit_mem_operand(buf, r as u8, base, offset);
}

/// `[base + offset]` memory operand with an opcode extension.
pub fn emit_modrm_ext_offset(buf: &mut CodeBuffer, opc: u32, ext: u8, base: Reg, offset: i32) {
    emit_opc(buf, opc, ext, base as u8);
    emit_mem_operand(buf, ext, base, offset);
}

fn emit_sib_operand(buf: &mut CodeBuffer, field: u8, base: Reg, index: Reg, shift: u8, offset: i32) {
    let f = (field & 7) << 3;
    let sib = (shift << 6) | (index.low3() << 3) | base.low3();
    if offset == 0 && base.low3() != 5 {
        buf.emit_u8(f | 0x04);
        buf.emit_u8(sib);
    } else if (-128..=127).contains(&offset) {
        buf.emit_u8(0x44 | f);
        buf.emit_u8(sib);
        buf.emit_u8(offset as u8);
    } else {
        buf.emit_u8(0x84 | f);
        buf.emit_u8(sib);
        buf.emit_u32(offset as u32);
    }
}

/// `[base + index << shift + offset]` with a register in the reg slot.
pub fn emit_modrm_sib(
    buf: &mut CodeBuffer,
    opc: u32,
    r: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    emit_opc_3(buf, opc, r as u8, base as u8, index as u8);
    emit_sib_operand(buf, r as u8, base, index, shift, offset);
}

/// `[base + index << shift + offset]` with an opcode extension.
pub fn emit_modrm_ext_sib(
    buf: &mut CodeBuffer,
    opc: u32,
    ext: u8,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    emit_opc_3(buf, opc, ext, base as u8, index as u8);
    emit_sib_operand(buf, ext, base, index, shift, offset);
}

// -- Arithmetic --

/// `op dst, src` for ADD/OR/ADC/SBB/AND/SUB/XOR/CMP.
pub fn emit_arith_rr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, src: Reg) {
    let opc = (OPC_ARITH_GvEv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm(buf, opc, dst, src);
}

/// `op dst, imm`, choosing the imm8 form when it fits.
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm_ext(buf, OPC_ARITH_EvIb | w, op as u8, dst);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm_ext(buf, OPC_ARITH_EvIz | w, op as u8, dst);
        buf.emit_u32(imm as u32);
    }
}

/// `op [base + offset], src`.
pub fn emit_arith_mr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, base: Reg, offset: i32, src: Reg) {
    let opc = (OPC_ARITH_EvGv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm_offset(buf, opc, src, base, offset);
}

/// `op dst, [base + offset]`.
pub fn emit_arith_rm(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    let opc = (OPC_ARITH_GvEv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm_offset(buf, opc, dst, base, offset);
}

/// `op dword [base + offset], imm`.
pub fn emit_arith_mi(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, base: Reg, offset: i32, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm_ext_offset(buf, OPC_ARITH_EvIb | w, op as u8, base, offset);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm_ext_offset(buf, OPC_ARITH_EvIz | w, op as u8, base, offset);
        buf.emit_u32(imm as u32);
    }
}

pub fn emit_neg(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Neg as u8, reg);
}

pub fn emit_not(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Not as u8, reg);
}

// -- Shifts --

pub fn emit_shift_ri(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg, imm: u8) {
    let w = rexw_flag(rexw);
    if imm == 1 {
        emit_modrm_ext(buf, OPC_SHIFT_1 | w, op as u8, dst);
    } else {
        emit_modrm_ext(buf, OPC_SHIFT_Ib | w, op as u8, dst);
        buf.emit_u8(imm);
    }
}

/// Shift by CL.
pub fn emit_shift_cl(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg) {
    emit_modrm_ext(buf, OPC_SHIFT_cl | rexw_flag(rexw), op as u8, dst);
}

// -- Data movement --

pub fn emit_mov_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, dst);
}

/// Load an immediate. Zero becomes `xor reg, reg`, which clobbers the
/// flags; use [`emit_mov_imm32`] between a compare and its branch.
pub fn emit_mov_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, val: u64) {
    if val == 0 {
        emit_modrm(buf, 0x31, reg, reg);
    } else if !rexw || val <= u32::MAX as u64 {
        emit_mov_imm32(buf, reg, val as u32);
    } else if val as i64 >= i32::MIN as i64 && val as i64 <= i32::MAX as i64 {
        emit_modrm_ext(buf, OPC_MOVL_EvIz | P_REXW, 0, reg);
        buf.emit_u32(val as u32);
    } else {
        emit_mov_imm64(buf, reg, val);
    }
}

/// `mov r32, imm32`; leaves the flags alone.
pub fn emit_mov_imm32(buf: &mut CodeBuffer, reg: Reg, val: u32) {
    emit_opc(buf, OPC_MOVL_Iv + (reg.low3() as u32), 0, reg as u8);
    buf.emit_u32(val);
}

/// `movabs r64, imm64`, always 10 bytes.
pub fn emit_mov_imm64(buf: &mut CodeBuffer, reg: Reg, val: u64) {
    emit_opc(buf, (OPC_MOVL_Iv + (reg.low3() as u32)) | P_REXW, 0, reg as u8);
    buf.emit_u64(val);
}

pub fn emit_movzx(buf: &mut CodeBuffer, opc: u32, dst: Reg, src: Reg) {
    emit_modrm(buf, opc, dst, src);
}

pub fn emit_movsx(buf: &mut CodeBuffer, opc: u32, dst: Reg, src: Reg) {
    emit_modrm(buf, opc, dst, src);
}

pub fn emit_bswap(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_opc(buf, (OPC_BSWAP + reg.low3() as u32) | rexw_flag(rexw), 0, reg as u8);
}

/// 16-bit byte swap as `rol r16, 8`.
pub fn emit_bswap16(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_SHIFT_Ib | P_DATA16, ShiftOp::Rol as u8, reg);
    buf.emit_u8(8);
}

// -- Memory --

pub fn emit_load(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_GvEv | rexw_flag(rexw), dst, base, offset);
}

pub fn emit_store(buf: &mut CodeBuffer, rexw: bool, src: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, base, offset);
}

pub fn emit_store_byte(buf: &mut CodeBuffer, src: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVB_EvGv | P_REXB_R, src, base, offset);
}

/// `mov dword [base + offset], imm32`.
pub fn emit_store_imm(buf: &mut CodeBuffer, rexw: bool, base: Reg, offset: i32, imm: i32) {
    emit_modrm_ext_offset(buf, OPC_MOVL_EvIz | rexw_flag(rexw), 0, base, offset);
    buf.emit_u32(imm as u32);
}

/// `mov byte [base + offset], imm8`.
pub fn emit_store_imm8(buf: &mut CodeBuffer, base: Reg, offset: i32, imm: u8) {
    emit_modrm_ext_offset(buf, OPC_MOVB_EvIb, 0, base, offset);
    buf.emit_u8(imm);
}

pub fn emit_lea(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_LEA | rexw_flag(rexw), dst, base, offset);
}

pub fn emit_lea_sib(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, index: Reg, shift: u8, offset: i32) {
    emit_modrm_sib(buf, OPC_LEA | rexw_flag(rexw), dst, base, index, shift, offset);
}

pub fn emit_load_sib(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, index: Reg, shift: u8, offset: i32) {
    emit_modrm_sib(buf, OPC_MOVL_GvEv | rexw_flag(rexw), dst, base, index, shift, offset);
}

/// MOVZBL/MOVZWL from `[base + offset]`.
pub fn emit_load_zx(buf: &mut CodeBuffer, opc: u32, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, opc, dst, base, offset);
}

// -- Multiply --

/// Unsigned `edx:eax = eax * reg`.
pub fn emit_mul(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Mul as u8, reg);
}

/// Signed `edx:eax = eax * reg`.
pub fn emit_imul1(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3_Ev | rexw_flag(rexw), Ext3Op::Imul as u8, reg);
}

pub fn emit_imul_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_IMUL_GvEv | rexw_flag(rexw), dst, src);
}

/// `dst = src * imm`.
pub fn emit_imul_ri(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm(buf, OPC_IMUL_GvEvIb | w, dst, src);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm(buf, OPC_IMUL_GvEvIz | w, dst, src);
        buf.emit_u32(imm as u32);
    }
}

// -- Bit operations --

pub fn emit_bsr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_BSR | rexw_flag(rexw), dst, src);
}

fn emit_grpbt_ri(buf: &mut CodeBuffer, op: GrpBtOp, rexw: bool, reg: Reg, bit: u8) {
    emit_modrm_ext(buf, OPC_GRPBT | rexw_flag(rexw), op as u8, reg);
    buf.emit_u8(bit);
}

/// `bt reg, imm8`: CF = selected bit.
pub fn emit_bt_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, bit: u8) {
    emit_grpbt_ri(buf, GrpBtOp::Bt, rexw, reg, bit);
}

pub fn emit_bts_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, bit: u8) {
    emit_grpbt_ri(buf, GrpBtOp::Bts, rexw, reg, bit);
}

pub fn emit_btr_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, bit: u8) {
    emit_grpbt_ri(buf, GrpBtOp::Btr, rexw, reg, bit);
}

pub fn emit_btc_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, bit: u8) {
    emit_grpbt_ri(buf, GrpBtOp::Btc, rexw, reg, bit);
}

// -- Branches --

/// Unresolved rel32 field of a forward branch; resolve with [`bind`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup(usize);

impl Fixup {
    /// Offset of the displacement field.
    pub fn offset(self) -> usize {
        self.0
    }
}

fn emit_rel32(buf: &mut CodeBuffer, target_offset: usize) {
    let after = buf.offset() + 4;
    let disp = target_offset as i64 - after as i64;
    buf.emit_u32(disp as u32);
}

/// Jcc rel32 to a known offset.
pub fn emit_jcc(buf: &mut CodeBuffer, cond: X86Cond, target_offset: usize) {
    emit_opc(buf, OPC_JCC_long + (cond as u32), 0, 0);
    emit_rel32(buf, target_offset);
}

/// JMP rel32 to a known offset.
pub fn emit_jmp(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_JMP_long as u8);
    emit_rel32(buf, target_offset);
}

pub fn emit_call(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_CALL_Jz as u8);
    emit_rel32(buf, target_offset);
}

/// Jcc to a label that is not emitted yet.
pub fn emit_jcc_fwd(buf: &mut CodeBuffer, cond: X86Cond) -> Fixup {
    emit_opc(buf, OPC_JCC_long + (cond as u32), 0, 0);
    let at = buf.offset();
    buf.emit_u32(0);
    Fixup(at)
}

/// JMP to a label that is not emitted yet.
pub fn emit_jmp_fwd(buf: &mut CodeBuffer) -> Fixup {
    buf.emit_u8(OPC_JMP_long as u8);
    let at = buf.offset();
    buf.emit_u32(0);
    Fixup(at)
}

/// Point `fixup` at the cache top.
pub fn bind(buf: &mut CodeBuffer, fixup: Fixup) {
    let here = buf.offset();
    bind_to(buf, fixup, here);
}

pub fn bind_to(buf: &mut CodeBuffer, fixup: Fixup, target_offset: usize) {
    let disp = target_offset as i64 - (fixup.0 as i64 + 4);
    buf.patch_u32(fixup.0, disp as u32);
}

pub fn emit_jmp_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::JmpN as u8, reg);
}

pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::CallN as u8, reg);
}

/// `jmp qword [base + offset]`.
pub fn emit_jmp_mem(buf: &mut CodeBuffer, base: Reg, offset: i32) {
    emit_modrm_ext_offset(buf, OPC_GRP5, Ext5Op::JmpN as u8, base, offset);
}

pub fn emit_setcc(buf: &mut CodeBuffer, cond: X86Cond, dst: Reg) {
    emit_modrm_ext(buf, OPC_SETCC + (cond as u32), 0, dst);
}

pub fn emit_test_rr(buf: &mut CodeBuffer, rexw: bool, r1: Reg, r2: Reg) {
    emit_modrm(buf, OPC_TESTL | rexw_flag(rexw), r1, r2);
}

/// `test byte reg, imm8`.
pub fn emit_test_bi(buf: &mut CodeBuffer, reg: Reg, imm: u8) {
    emit_modrm_ext(buf, OPC_GRP3_Eb | P_REXB_RM, Ext3Op::Test as u8, reg);
    buf.emit_u8(imm);
}

/// `test byte [base + offset], imm8`.
pub fn emit_test_mb(buf: &mut CodeBuffer, base: Reg, offset: i32, imm: u8) {
    emit_modrm_ext_offset(buf, OPC_GRP3_Eb, Ext3Op::Test as u8, base, offset);
    buf.emit_u8(imm);
}

/// `test dword [base + offset], imm32`.
pub fn emit_test_mi(buf: &mut CodeBuffer, base: Reg, offset: i32, imm: u32) {
    emit_modrm_ext_offset(buf, OPC_GRP3_Ev, Ext3Op::Test as u8, base, offset);
    buf.emit_u32(imm);
}

// -- Miscellaneous --

pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_PUSH_r32 + (reg.low3() as u32), 0, reg as u8);
}

pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_POP_r32 + (reg.low3() as u32), 0, reg as u8);
}

pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_RET as u8);
}

/// Call an absolute host address through RAX.
pub fn emit_call_abs(buf: &mut CodeBuffer, addr: usize) {
    emit_mov_imm64(buf, Reg::Rax, addr as u64);
    emit_call_reg(buf, Reg::Rax);
}

// ==========================================================
// X86_64CodeGen: cache-level code shapes
// ==========================================================

/// Bytes written by `patch_jump`.
pub const JMP_REL32_SIZE: usize = 5;

/// x86-64 code generator for the cache framework.
#[derive(Debug, Default)]
pub struct X86_64CodeGen {
    pub prologue_offset: usize,
    pub exit_offset: usize,
}

impl X86_64CodeGen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostCodeGen for X86_64CodeGen {
    fn emit_prologue(&mut self, buf: &mut CodeBuffer) {
        self.prologue_offset = buf.offset();

        for &reg in CALLEE_SAVED {
            emit_push(buf, reg);
        }
        // env pointer stays in RBP for as long as generated code runs
        emit_mov_rr(buf, true, ENV_REG, CALL_ARG_REGS[0]);
        emit_arith_ri(buf, ArithOp::Sub, true, Reg::Rsp, STACK_ADDEND as i32);
        emit_jmp_reg(buf, CALL_ARG_REGS[1]);
    }

    fn emit_epilogue(&mut self, buf: &mut CodeBuffer) {
        // exit code already in EAX
        self.exit_offset = buf.offset();
        emit_arith_ri(buf, ArithOp::Add, true, Reg::Rsp, STACK_ADDEND as i32);
        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(buf, reg);
        }
        emit_ret(buf);
    }

    fn epilogue_offset(&self) -> usize {
        self.exit_offset
    }

    fn emit_exit(&self, buf: &mut CodeBuffer, code: u32) {
        emit_mov_imm32(buf, Reg::Rax, code);
        emit_jmp(buf, self.exit_offset);
    }

    fn emit_jump(&self, buf: &mut CodeBuffer, target_offset: usize) {
        emit_jmp(buf, target_offset);
    }

    fn emit_dispatch(&self, buf: &mut CodeBuffer, pc_offset: i32, geom: &LookupGeometry, l1_addr: usize) {
        emit_load(buf, false, Reg::Rax, ENV_REG, pc_offset);
        emit_mov_rr(buf, false, Reg::Rdx, Reg::Rax);
        if geom.l1shift > 0 {
            emit_shift_ri(buf, ShiftOp::Shr, false, Reg::Rdx, geom.l1shift as u8);
        }
        if geom.l1mask() != u32::MAX >> geom.l1shift {
            emit_arith_ri(buf, ArithOp::And, false, Reg::Rdx, geom.l1mask() as i32);
        }
        emit_arith_ri(buf, ArithOp::And, false, Reg::Rax, geom.l2mask as i32);
        emit_mov_imm64(buf, Reg::Rcx, l1_addr as u64);
        emit_load_sib(buf, true, Reg::Rcx, Reg::Rcx, Reg::Rdx, 3, 0);
        // l2 slots are 8 bytes; the masked PC keeps its ignored low bits
        emit_modrm_ext_sib(buf, OPC_GRP5, Ext5Op::JmpN as u8, Reg::Rcx, Reg::Rax, 3 - geom.lsbs as u8, 0);
    }

    fn emit_slot_jump(&self, buf: &mut CodeBuffer, slot_addr: usize) {
        emit_mov_imm64(buf, Reg::Rax, slot_addr as u64);
        emit_jmp_mem(buf, Reg::Rax, 0);
    }

    fn emit_verify(&self, buf: &mut CodeBuffer, word_ptr: usize, value: u32, fail_offset: usize) {
        emit_mov_imm64(buf, Reg::Rax, word_ptr as u64);
        emit_modrm_ext_offset(buf, OPC_ARITH_EvIz, ArithOp::Cmp as u8, Reg::Rax, 0);
        buf.emit_u32(value);
        emit_jcc(buf, X86Cond::Jne, fail_offset);
    }

    fn emit_cycle_epilogue(
        &self,
        buf: &mut CodeBuffer,
        pc_offset: i32,
        icount_offset: i32,
        cycles: u32,
        pcdelta: u32,
        out_of_cycles: usize,
    ) {
        if pcdelta != 0 {
            emit_arith_mi(buf, ArithOp::Add, false, ENV_REG, pc_offset, pcdelta as i32);
        }
        emit_arith_mi(buf, ArithOp::Sub, false, ENV_REG, icount_offset, cycles as i32);
        emit_jcc(buf, X86Cond::Js, out_of_cycles);
    }

    fn patch_jump(&mut self, buf: &mut CodeBuffer, jump_offset: usize, target_offset: usize) {
        let disp = target_offset as i64 - (jump_offset + JMP_REL32_SIZE) as i64;
        assert!(
            disp >= i32::MIN as i64 && disp <= i32::MAX as i64,
            "jump displacement out of i32 range"
        );
        buf.patch_u8(jump_offset, OPC_JMP_long as u8);
        buf.patch_u32(jump_offset + 1, disp as u32);
    }
}
