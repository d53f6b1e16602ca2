use ppcdrc_core::{decode, CpuModel, Insn, Opcode};

use crate::harness::*;

#[test]
fn test_common_forms() {
    let m = CpuModel::Ppc603;
    assert_eq!(decode(addi(3, 0, 5), m), Opcode::Addi);
    assert_eq!(decode(addis(3, 3, 1), m), Opcode::Addis);
    assert_eq!(decode(add(3, 4, 5), m), Opcode::Add);
    assert_eq!(decode(addc(3, 4, 5), m), Opcode::Addc);
    assert_eq!(decode(cmp(0, 3, 4), m), Opcode::Cmp);
    assert_eq!(decode(cmpi(7, 3, -1), m), Opcode::Cmpi);
    assert_eq!(decode(rlwinm(3, 4, 0, 0, 31), m), Opcode::Rlwinm);
    assert_eq!(decode(lwz(3, 1, 8), m), Opcode::Lwz);
    assert_eq!(decode(stw(3, 1, 8), m), Opcode::Stw);
}

#[test]
fn test_branch_and_system_forms() {
    let m = CpuModel::Ppc603;
    assert_eq!(decode(b(8), m), Opcode::B);
    assert_eq!(decode(bc(20, 0, 8), m), Opcode::Bc);
    assert_eq!(decode(blr(), m), Opcode::Bclr);
    assert_eq!(decode(bcctr(20, 0, false), m), Opcode::Bcctr);
    assert_eq!(decode(sc(), m), Opcode::Sc);
    assert_eq!(decode(rfi(), m), Opcode::Rfi);
    assert_eq!(decode(tw(31, 0, 0), m), Opcode::Tw);
    assert_eq!(decode(twi(4, 3, 0), m), Opcode::Twi);
    assert_eq!(decode(mfmsr(3), m), Opcode::Mfmsr);
    assert_eq!(decode(mtmsr(3), m), Opcode::Mtmsr);
}

#[test]
fn test_spr_number_roundtrip() {
    for spr in [1, 8, 9, 22, 26, 272, 287, 986, 1008] {
        assert_eq!(Insn(mfspr(3, spr)).spr(), spr);
        assert_eq!(Insn(mtspr(spr, 3)).spr(), spr);
    }
    assert_eq!(decode(mfspr(3, 8), CpuModel::Ppc603), Opcode::Mfspr);
    assert_eq!(decode(mtspr(9, 3), CpuModel::Ppc603), Opcode::Mtspr);
}

#[test]
fn test_field_extraction() {
    let insn = Insn(addi(3, 4, -2));
    assert_eq!(insn.rt(), 3);
    assert_eq!(insn.ra(), 4);
    assert_eq!(insn.simm(), -2);
    assert_eq!(insn.uimm(), 0xFFFE);

    let insn = Insn(bc(16, 2, -8));
    assert_eq!(insn.bo(), 16);
    assert_eq!(insn.bi(), 2);
    assert_eq!(insn.bd(), -8);
    assert!(!insn.lk());

    assert!(Insn(bl(0x100)).lk());
    assert_eq!(Insn(bl(0x100)).li(), 0x100);
    assert_eq!(Insn(cmp(3, 1, 2)).crfd(), 3);
}

#[test]
fn test_oe_is_a_modifier() {
    let addo = xo_form(3, 4, 5, true, 266, false);
    assert_eq!(decode(addo, CpuModel::Ppc603), Opcode::Add);
    assert!(Insn(addo).oe());
    assert!(!Insn(add(3, 4, 5)).oe());
}

#[test]
fn test_zero_word_is_invalid() {
    assert_eq!(decode(0, CpuModel::Ppc603), Opcode::Invalid);
}

#[test]
fn test_fp_classification() {
    let fmr = (63 << 26) | (1 << 21) | (2 << 11) | (72 << 1);
    let op = decode(fmr, CpuModel::Ppc603);
    assert_eq!(op, Opcode::Fmr);
    assert!(op.is_fp());
    assert!(!Opcode::Add.is_fp());
    assert!(Opcode::Lwz.accesses_memory());
    assert!(Opcode::Lfd.accesses_memory());
    assert!(!Opcode::Mtmsr.accesses_memory());
}

#[test]
fn test_mnemonics() {
    assert_eq!(Opcode::AddicDot.mnemonic(), "addic.");
    assert_eq!(Opcode::Stwcx.mnemonic(), "stwcx.");
    assert_eq!(Opcode::Rlwinm.mnemonic(), "rlwinm");
}
