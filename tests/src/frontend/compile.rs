//! Block compilation: verification, budgets, fetch and data faults, and
//! opcodes the compiler rejects.

use ppcdrc_core::{CpuModel, DrcError, Msr, PpcConfig};
use ppcdrc_runner::RamBus;

use crate::harness::*;

fn straight_line(config: PpcConfig) -> ppcdrc_exec::PpcDrc {
    drc_with_config(config, bus_with(&[li(3, 1), li(4, 2), b(0)]))
}

fn rerun(drc: &mut ppcdrc_exec::PpcDrc) {
    drc.cpu_mut().state.pc = CODE_BASE;
    drc.execute(5).unwrap();
}

#[test]
fn test_loose_verify_checks_first_word() {
    let mut drc = straight_line(PpcConfig::new(CpuModel::Ppc603));
    drc.execute(5).unwrap();
    assert_eq!(drc.last_stats().recompiles, 1);

    rerun(&mut drc);
    assert_eq!(drc.last_stats().recompiles, 0);
    assert_eq!(drc.last_stats().entries, 1);

    drc.cpu_mut().write32(CODE_BASE, li(3, 9));
    rerun(&mut drc);
    assert_eq!(drc.last_stats().recompiles, 1);
    assert_eq!(drc.cpu().state.gpr[3], 9);
}

#[test]
fn test_loose_verify_misses_later_words() {
    let mut drc = straight_line(PpcConfig::new(CpuModel::Ppc603));
    drc.execute(5).unwrap();
    drc.cpu_mut().write32(CODE_BASE + 4, li(4, 7));
    rerun(&mut drc);
    assert_eq!(drc.last_stats().recompiles, 0);
    assert_eq!(drc.cpu().state.gpr[4], 2);
}

#[test]
fn test_strict_verify_checks_every_word() {
    let mut config = PpcConfig::new(CpuModel::Ppc603);
    config.strict_verify = true;
    let mut drc = straight_line(config);
    drc.execute(5).unwrap();
    drc.cpu_mut().write32(CODE_BASE + 4, li(4, 7));
    rerun(&mut drc);
    assert_eq!(drc.last_stats().recompiles, 1);
    assert_eq!(drc.cpu().state.gpr[3], 1);
    assert_eq!(drc.cpu().state.gpr[4], 7);
}

#[test]
fn test_unimplemented_opcode_is_an_error() {
    // lswx r3, 0, r4
    let mut drc = drc_with(CpuModel::Ppc603, &[li(5, 1), x_form(3, 0, 4, 533, false)]);
    let err = drc.execute(5).unwrap_err();
    assert!(
        matches!(err, DrcError::UnimplementedOpcode { pc, .. } if pc == CODE_BASE + 4),
        "{err:?}"
    );
}

#[test]
fn test_fp_rejected_without_fp_support() {
    let fadd = (63 << 26) | (1 << 21) | (1 << 16) | (2 << 11) | (21 << 1);
    let mut config = PpcConfig::new(CpuModel::Ppc603);
    config.drc.uses_fp = false;
    let mut drc = drc_with_config(config, bus_with(&[fadd]));
    let err = drc.execute(0).unwrap_err();
    assert!(matches!(err, DrcError::UnimplementedOpcode { opcode, .. } if opcode == fadd));
}

#[test]
fn test_block_instruction_budget() {
    let mut config = PpcConfig::new(CpuModel::Ppc603);
    config.drc.max_instructions = 4;
    let prog = [li(3, 1), li(4, 2), li(5, 3), li(6, 4), li(7, 5), b(0)];
    let mut drc = drc_with_config(config, bus_with(&prog));

    drc.execute(0).unwrap();
    assert!(drc.cache().lookup(CODE_BASE + 8).is_some());
    assert!(drc.cache().lookup(CODE_BASE + 12).is_none());

    drc.execute(10).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(&s.gpr[3..8], &[1, 2, 3, 4, 5]);
    assert_eq!(s.pc, CODE_BASE + 20);
}

#[test]
fn test_fetch_fault_raises_isi_then_recompiles() {
    let mut bus = bus_with(&[li(3, 7), b(0)]);
    bus.unmap(CODE_BASE..CODE_BASE + 0x1000);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc603), bus);
    drc.cpu_mut().state.msr = Msr::IR.bits();
    drc.execute(3).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0x400);
    assert_eq!(s.srr0, CODE_BASE);
    assert_eq!(s.msr & Msr::IR.bits(), 0);
    assert_eq!(s.gpr[3], 0);

    // Translation off: the same block now finds the page valid.
    drc.cpu_mut().state.pc = CODE_BASE;
    drc.execute(3).unwrap();
    assert!(drc.last_stats().recompiles >= 1);
    assert_eq!(drc.cpu().state.gpr[3], 7);
    assert_eq!(drc.cpu().state.pc, CODE_BASE + 4);
}

#[test]
fn test_data_fault_raises_dsi() {
    let mut bus = bus_with(&[lwz(3, 1, 8), b(0)]);
    bus.unmap(DATA_BASE..DATA_BASE + 0x1000);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc603), bus);
    let s = &mut drc.cpu_mut().state;
    s.msr = Msr::DR.bits();
    s.gpr[1] = DATA_BASE;
    s.gpr[3] = 0x55;
    drc.execute(3).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0x300);
    assert_eq!(s.srr0, CODE_BASE);
    assert_eq!(s.dar, DATA_BASE + 8);
    assert_eq!(s.dsisr & 0x4000_0000, 0x4000_0000);
    assert_eq!(s.gpr[3], 0x55);
    assert_eq!(s.fault, 0);
}

#[test]
fn test_store_fault_marks_write() {
    let mut bus = bus_with(&[stw(3, 1, 0), b(0)]);
    bus.unmap(DATA_BASE..DATA_BASE + 0x1000);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc603), bus);
    let s = &mut drc.cpu_mut().state;
    s.msr = Msr::DR.bits();
    s.gpr[1] = DATA_BASE;
    s.gpr[3] = 0xAB;
    drc.execute(3).unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0x300);
    assert_eq!(s.dsisr & 0x0200_0000, 0x0200_0000);
    assert_eq!(drc.cpu_mut().read32(DATA_BASE), 0);
}

#[test]
fn test_403_ignores_translation() {
    let mut bus = RamBus::new(0, RAM_SIZE);
    bus.load_words(CODE_BASE, &[lwz(3, 1, 0), b(0)]);
    bus.load_words(DATA_BASE, &[0x1234_5678]);
    bus.unmap(0..0xFFFF_FFFF);
    let mut drc = drc_with_config(PpcConfig::new(CpuModel::Ppc403), bus);
    let s = &mut drc.cpu_mut().state;
    s.msr = (Msr::IR | Msr::DR).bits();
    s.gpr[1] = DATA_BASE;
    drc.execute(3).unwrap();
    assert_eq!(drc.cpu().state.gpr[3], 0x1234_5678);
    assert_eq!(drc.cpu().state.pc, CODE_BASE + 4);
}

#[test]
fn test_flush_cache_drops_translations() {
    let mut drc = straight_line(PpcConfig::new(CpuModel::Ppc603));
    drc.execute(5).unwrap();
    let resets = drc.cache().resets();
    assert!(drc.cache().lookup(CODE_BASE).is_some());

    drc.flush_cache().unwrap();
    assert_eq!(drc.cache().resets(), resets + 1);
    assert!(drc.cache().lookup(CODE_BASE).is_none());

    rerun(&mut drc);
    assert_eq!(drc.last_stats().recompiles, 1);
}

#[test]
fn test_reset_restores_power_on_state() {
    let mut drc = straight_line(PpcConfig::new(CpuModel::Ppc603));
    drc.execute(5).unwrap();
    drc.reset().unwrap();
    let s = &drc.cpu().state;
    assert_eq!(s.pc, 0xFFF0_0100);
    assert_eq!(s.msr, Msr::IP.bits());
    assert_eq!(s.gpr[3], 0);
    assert!(drc.cache().lookup(CODE_BASE).is_none());
}
