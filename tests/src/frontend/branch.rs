//! Branches run through generated code, including block linking.

use ppcdrc_core::cpu::spr;
use ppcdrc_core::{CpuModel, PpcConfig};
use ppcdrc_runner::RamBus;

use crate::harness::*;

#[test]
fn test_unconditional_bc_leaves_ctr() {
    // bc 20,0,+8 skips the li r3,1
    let mut drc = drc_with(CpuModel::Ppc603, &[bc(20, 0, 8), li(3, 1), li(4, 2), b(0)]);
    drc.cpu_mut().state.ctr = 7;
    drc.execute(2).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.gpr[3], 0);
    assert_eq!(s.gpr[4], 2);
    assert_eq!(s.ctr, 7);
}

#[test]
fn test_bdnz_loop() {
    let mut drc = drc_with(
        CpuModel::Ppc603,
        &[
            li(3, 0),
            li(4, 5),
            mtspr(spr::CTR, 4),
            addi(3, 3, 1),
            bc(16, 0, -4),
            b(0),
        ],
    );
    let consumed = drc.execute(100).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(consumed, 101);
    assert_eq!(s.gpr[3], 5);
    assert_eq!(s.ctr, 0);
    assert_eq!(s.pc, CODE_BASE + 0x14);
}

#[test]
fn test_call_and_return() {
    // 0x1000: bl 0x100C
    // 0x1004: li r4, 2
    // 0x1008: b .
    // 0x100C: li r3, 1
    // 0x1010: blr
    let mut drc = drc_with(CpuModel::Ppc603, &[bl(12), li(4, 2), b(0), li(3, 1), blr()]);
    drc.execute(20).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.gpr[3], 1);
    assert_eq!(s.gpr[4], 2);
    assert_eq!(s.lr, CODE_BASE + 4);
    assert_eq!(s.pc, CODE_BASE + 8);
}

#[test]
fn test_bcctrl_links_and_jumps() {
    let mut drc = drc_with(CpuModel::Ppc603, &[bcctr(20, 0, true)]);
    drc.cpu_mut().state.ctr = 0x2001;
    drc.execute(0).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.lr, CODE_BASE + 4);
    assert_eq!(s.pc, 0x2000);
}

#[test]
fn test_blrl_uses_old_lr() {
    let mut drc = drc_with(CpuModel::Ppc603, &[bclr(20, 0, true)]);
    drc.cpu_mut().state.lr = 0x3000;
    drc.execute(0).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0x3000);
    assert_eq!(s.lr, CODE_BASE + 4);
}

#[test]
fn test_beq_taken_and_not_taken() {
    // cmpi cr0, r3, 5; beq +8; li r4, 1; li r5, 1; b .
    let prog = [cmpi(0, 3, 5), bc(12, 2, 8), li(4, 1), li(5, 1), b(0)];

    let mut drc = drc_with(CpuModel::Ppc603, &prog);
    drc.cpu_mut().state.gpr[3] = 5;
    drc.execute(10).unwrap();
    assert_eq!(drc.cpu().state.gpr[4], 0);
    assert_eq!(drc.cpu().state.gpr[5], 1);

    let mut drc = drc_with(CpuModel::Ppc603, &prog);
    drc.cpu_mut().state.gpr[3] = 6;
    drc.execute(10).unwrap();
    assert_eq!(drc.cpu().state.gpr[4], 1);
    assert_eq!(drc.cpu().state.gpr[5], 1);
}

#[test]
fn test_absolute_branch() {
    // ba 0x2000
    let mut bus = bus_with(&[(18 << 26) | 0x2000 | 2]);
    bus.load_words(0x2000, &[li(3, 9), b(0)]);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc603), bus);
    drc.execute(5).unwrap();
    assert_eq!(drc.cpu().state.gpr[3], 9);
    assert_eq!(drc.cpu().state.pc, 0x2004);
}

#[test]
fn test_block_stops_at_page_boundary() {
    let mut bus = RamBus::new(0, RAM_SIZE);
    bus.load_words(0x1FF8, &[li(3, 1), li(4, 2), li(5, 3)]);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc603), bus);
    drc.cpu_mut().state.pc = 0x1FF8;
    assert_eq!(drc.execute(0).unwrap(), 1);
    assert!(drc.cache().lookup(0x1FF8).is_some());
    assert!(drc.cache().lookup(0x1FFC).is_some());
    assert!(drc.cache().lookup(0x2000).is_none());
}
