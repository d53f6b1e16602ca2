//! Exception stubs, vector selection and interrupt delivery from
//! generated code.

use ppcdrc_core::cpu::spr;
use ppcdrc_core::{CpuModel, Msr, PpcConfig};
use ppcdrc_runner::RamBus;

use crate::harness::*;

#[test]
fn test_stubs_sit_between_framework_and_blocks() {
    for model in [CpuModel::Ppc403, CpuModel::Ppc602, CpuModel::Ppc603] {
        let drc = drc_with(model, &[]);
        let s = *drc.compiler().stubs();
        let all = [s.irq, s.syscall, s.trap, s.dsi, s.isi, s.timer];
        for (i, a) in all.iter().enumerate() {
            assert!(*a > drc.cache().stubs().dispatch, "{model:?}");
            assert!(*a < drc.cache().cache_base(), "{model:?}");
            for b in &all[i + 1..] {
                assert_ne!(a, b, "{model:?}");
            }
        }
    }
}

#[test]
fn test_sc_on_603() {
    let mut drc = drc_with(CpuModel::Ppc603, &[sc()]);
    drc.cpu_mut().state.msr = (Msr::EE | Msr::PR).bits();
    assert_eq!(drc.execute(0).unwrap(), 1);
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0xC00);
    assert_eq!(s.srr0, CODE_BASE + 4);
    assert_eq!(s.srr1 & (Msr::EE | Msr::PR).bits(), 0);
    assert_eq!(s.msr & (Msr::EE | Msr::PR).bits(), 0);
}

#[test]
fn test_sc_on_602_uses_ibr() {
    let mut drc = drc_with(CpuModel::Ppc602, &[sc()]);
    drc.cpu_mut().state.ibr = 0x8000;
    drc.execute(0).unwrap();
    assert_eq!(drc.cpu().state.pc, 0x8C00);
}

#[test]
fn test_sc_on_403_uses_evpr() {
    let mut bus = RamBus::new(0, 0x20000);
    bus.load_words(CODE_BASE, &[sc()]);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc403), bus);
    drc.cpu_mut().set_spr(spr::EVPR, 0x0001_0000);
    drc.execute(0).unwrap();
    assert_eq!(drc.cpu().state.pc, 0x0001_0C00);
    assert_eq!(drc.cpu().state.srr0, CODE_BASE + 4);
}

#[test]
fn test_sc_with_high_vectors() {
    let mut bus = RamBus::new(0xFFF0_0000, 0x10000);
    bus.load_words(0xFFF0_1000, &[sc()]);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc603), bus);
    drc.cpu_mut().state.pc = 0xFFF0_1000;
    drc.cpu_mut().state.msr = Msr::IP.bits();
    drc.execute(0).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0xFFF0_0C00);
    assert_eq!(s.srr0, 0xFFF0_1004);
    assert_eq!(s.msr & Msr::IP.bits(), Msr::IP.bits());
}

#[test]
fn test_trap_always() {
    let mut drc = drc_with(CpuModel::Ppc603, &[twi(0x1F, 0, 0)]);
    drc.execute(0).unwrap();
    assert_eq!(drc.cpu().state.pc, 0x700);
    assert_eq!(drc.cpu().state.srr0, CODE_BASE + 4);
}

#[test]
fn test_conditional_trap() {
    // tw eq, r3, r4; li r5, 1; b .
    let prog = [tw(0x04, 3, 4), li(5, 1), b(0)];

    let mut drc = drc_with(CpuModel::Ppc603, &prog);
    drc.cpu_mut().state.gpr[3] = 1;
    drc.cpu_mut().state.gpr[4] = 2;
    drc.execute(5).unwrap();
    assert_eq!(drc.cpu().state.gpr[5], 1);
    assert_eq!(drc.cpu().state.pc, CODE_BASE + 8);

    let mut drc = drc_with(CpuModel::Ppc603, &prog);
    drc.cpu_mut().state.gpr[3] = 2;
    drc.cpu_mut().state.gpr[4] = 2;
    drc.execute(5).unwrap();
    assert_eq!(drc.cpu().state.gpr[5], 0);
    assert_eq!(drc.cpu().state.pc, 0x700);
}

#[test]
fn test_mtmsr_enabling_ee_takes_pending_irq() {
    let mut drc = drc_with(CpuModel::Ppc603, &[mtmsr(3), li(4, 1), b(0)]);
    drc.cpu_mut().state.gpr[3] = Msr::EE.bits();
    drc.set_irq_line(0, true);
    drc.execute(5).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.srr0, CODE_BASE + 4);
    assert_eq!(s.pc, 0x500);
    assert_eq!(s.gpr[4], 0);
    assert_eq!(s.msr & Msr::EE.bits(), 0);
}

#[test]
fn test_irq_waits_for_ee() {
    let mut drc = drc_with(CpuModel::Ppc603, &[b(0)]);
    drc.set_irq_line(0, true);
    drc.execute(5).unwrap();
    assert_eq!(drc.cpu().state.pc, CODE_BASE);
}

#[test]
fn test_decrementer_interrupt() {
    for model in [CpuModel::Ppc602, CpuModel::Ppc603] {
        let mut drc = drc_with(model, &[b(0)]);
        drc.cpu_mut().state.msr = Msr::EE.bits();
        drc.cpu_mut().state.dec = 3;
        let consumed = drc.execute(10).unwrap();
        let s = &drc.cpu().state;
        assert_eq!(consumed, 11, "{model:?}");
        assert_eq!(s.pc, 0x900, "{model:?}");
        assert_eq!(s.srr0, CODE_BASE, "{model:?}");
    }
}

#[test]
fn test_fit_interrupt_on_403() {
    let mut bus = RamBus::new(0, 0x20000);
    bus.load_words(CODE_BASE, &[b(0)]);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc403), bus);
    drc.cpu_mut().set_spr(spr::EVPR, 0x0001_0000);
    // FIT enabled, period 2^9
    drc.cpu_mut().set_spr(spr::TCR, 1 << 23);
    drc.cpu_mut().state.msr = Msr::EE.bits();
    drc.execute(1000).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0x0001_1010);
    assert_eq!(s.srr0, CODE_BASE);
}

#[test]
fn test_403_irq_masked_by_exier() {
    let mut drc = drc_with(CpuModel::Ppc403, &[b(0)]);
    drc.cpu_mut().state.msr = Msr::EE.bits();
    drc.set_irq_line(0, true);
    drc.execute(5).unwrap();
    assert_eq!(drc.cpu().state.pc, CODE_BASE);

    drc.cpu_mut().state.exier = 0x10;
    drc.execute(5).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0x500);
    assert_eq!(s.srr0, CODE_BASE);
}
