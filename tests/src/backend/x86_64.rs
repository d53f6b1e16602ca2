use ppcdrc_backend::x86_64::emitter::*;
use ppcdrc_backend::x86_64::Reg;
use ppcdrc_backend::{CodeBuffer, HostCodeGen, X86_64CodeGen};

fn emitted(f: impl FnOnce(&mut CodeBuffer)) -> Vec<u8> {
    let mut buf = CodeBuffer::new(4096).unwrap();
    f(&mut buf);
    buf.as_slice().to_vec()
}

#[test]
fn test_arith_imm_forms() {
    assert_eq!(emitted(|b| emit_arith_ri(b, ArithOp::Add, false, Reg::Rax, 1)), [0x83, 0xC0, 0x01]);
    assert_eq!(emitted(|b| emit_arith_ri(b, ArithOp::Sub, true, Reg::Rsp, 8)), [0x48, 0x83, 0xEC, 0x08]);
    assert_eq!(
        emitted(|b| emit_arith_ri(b, ArithOp::And, false, Reg::Rax, 0x12345)),
        [0x81, 0xE0, 0x45, 0x23, 0x01, 0x00]
    );
}

#[test]
fn test_rex_for_high_registers() {
    // add r8d, r9d
    assert_eq!(emitted(|b| emit_arith_rr(b, ArithOp::Add, false, Reg::R8, Reg::R9)), [0x45, 0x03, 0xC1]);
    // mov rbp, rdi
    assert_eq!(emitted(|b| emit_mov_rr(b, true, Reg::Rbp, Reg::Rdi)), [0x48, 0x89, 0xFD]);
}

#[test]
fn test_env_relative_operands() {
    // mov eax, [rbp] still needs a displacement byte
    assert_eq!(emitted(|b| emit_load(b, false, Reg::Rax, Reg::Rbp, 0)), [0x8B, 0x45, 0x00]);
    assert_eq!(emitted(|b| emit_load(b, false, Reg::Rax, Reg::Rbp, 8)), [0x8B, 0x45, 0x08]);
    assert_eq!(
        emitted(|b| emit_load(b, false, Reg::Rax, Reg::Rbp, 0x80)),
        [0x8B, 0x85, 0x80, 0x00, 0x00, 0x00]
    );
    // [rsp] needs a SIB byte
    assert_eq!(emitted(|b| emit_load(b, true, Reg::Rax, Reg::Rsp, 0)), [0x48, 0x8B, 0x04, 0x24]);
}

#[test]
fn test_immediate_moves() {
    assert_eq!(emitted(|b| emit_mov_imm32(b, Reg::Rax, 0xDEADBEEF)), [0xB8, 0xEF, 0xBE, 0xAD, 0xDE]);
    assert_eq!(emitted(|b| emit_mov_ri(b, false, Reg::Rcx, 0)), [0x31, 0xC9]);
    let movabs = emitted(|b| emit_mov_imm64(b, Reg::R10, 0x1122_3344_5566_7788));
    assert_eq!(movabs.len(), 10);
    assert_eq!(&movabs[..2], &[0x49, 0xBA]);
    assert_eq!(&movabs[2..], &0x1122_3344_5566_7788u64.to_le_bytes());
}

#[test]
fn test_byte_register_rex() {
    // setb sil needs a bare REX to avoid addressing DH
    assert_eq!(emitted(|b| emit_setcc(b, X86Cond::Jb, Reg::Rsi)), [0x40, 0x0F, 0x92, 0xC6]);
    assert_eq!(emitted(|b| emit_setcc(b, X86Cond::Je, Reg::Rax)), [0x0F, 0x94, 0xC0]);
}

#[test]
fn test_bit_ops() {
    assert_eq!(emitted(|b| emit_bt_ri(b, false, Reg::Rax, 16)), [0x0F, 0xBA, 0xE0, 0x10]);
    assert_eq!(emitted(|b| emit_btc_ri(b, true, Reg::Rax, 63)), [0x48, 0x0F, 0xBA, 0xF8, 0x3F]);
    assert_eq!(emitted(|b| emit_bswap(b, false, Reg::Rdx)), [0x0F, 0xCA]);
    assert_eq!(emitted(|b| emit_bswap16(b, Reg::Rax)), [0x66, 0xC1, 0xC0, 0x08]);
}

#[test]
fn test_forward_branch_binding() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let fixup = emit_jcc_fwd(&mut buf, X86Cond::Jne);
    assert_eq!(fixup.offset(), 2);
    buf.emit_u8(0x90);
    buf.emit_u8(0x90);
    bind(&mut buf, fixup);
    assert_eq!(&buf.as_slice()[..2], &[0x0F, 0x85]);
    assert_eq!(buf.read_u32(2), 2);
}

#[test]
fn test_backward_jump() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u8(0x90);
    emit_jmp(&mut buf, 0);
    assert_eq!(buf.as_slice()[1], 0xE9);
    assert_eq!(buf.read_u32(2) as i32, -6);
}

#[test]
fn test_patch_jump_overwrites_five_bytes() {
    let mut cg = X86_64CodeGen::new();
    let mut buf = CodeBuffer::new(4096).unwrap();
    emit_mov_imm64(&mut buf, Reg::Rax, 0);
    emit_jmp_mem(&mut buf, Reg::Rax, 0);
    let end = buf.offset();
    cg.patch_jump(&mut buf, 0, 0x100);
    assert_eq!(buf.as_slice()[0], 0xE9);
    assert_eq!(buf.read_u32(1), 0x100 - JMP_REL32_SIZE as u32);
    assert_eq!(buf.offset(), end);
}

#[test]
fn test_cycle_epilogue_shape() {
    let cg = X86_64CodeGen::new();
    let mut buf = CodeBuffer::new(4096).unwrap();
    cg.emit_cycle_epilogue(&mut buf, 0x10, 0x20, 1, 4, 0);
    let code = buf.as_slice();
    // add dword [rbp+0x10], 4 ; sub dword [rbp+0x20], 1 ; js rel32
    assert_eq!(&code[..8], &[0x83, 0x45, 0x10, 0x04, 0x83, 0x6D, 0x20, 0x01]);
    assert_eq!(&code[8..10], &[0x0F, 0x88]);
    assert_eq!(code.len(), 14);
}
