use ppcdrc_core::cpu::{CR_EQ, CR_GT, CR_LT, XER_CA};
use ppcdrc_core::interp::{self, Flow};
use ppcdrc_core::{CpuModel, Msr, PpcCpu};
use ppcdrc_runner::RamBus;

use crate::harness::*;

fn step_n(cpu: &mut PpcCpu, n: usize) {
    for _ in 0..n {
        interp::step(cpu).unwrap();
    }
}

#[test]
fn test_addc_carry_out() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[li(4, -1), li(5, 1), addc(3, 4, 5)]);
    step_n(&mut cpu, 3);
    assert_eq!(cpu.state.gpr[3], 0);
    assert_ne!(cpu.state.xer & XER_CA, 0);
    assert_eq!(cpu.state.pc, CODE_BASE + 12);
}

#[test]
fn test_signed_compare() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[li(3, -1), li(4, 1), cmp(0, 3, 4), cmp(1, 4, 3), cmp(2, 3, 3)]);
    step_n(&mut cpu, 5);
    assert_eq!(cpu.state.cr[0], CR_LT);
    assert_eq!(cpu.state.cr[1], CR_GT);
    assert_eq!(cpu.state.cr[2], CR_EQ);
}

#[test]
fn test_logical_compare_is_unsigned() {
    let cmpl = x_form(0, 3, 4, 32, false);
    let mut cpu = interp_with(CpuModel::Ppc603, &[li(3, -1), li(4, 1), cmpl]);
    step_n(&mut cpu, 3);
    assert_eq!(cpu.state.cr[0], CR_GT);
}

#[test]
fn test_bc_always() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[bc(20, 0, 0x40)]);
    cpu.state.ctr = 7;
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, CODE_BASE + 0x40);
    assert_eq!(cpu.state.ctr, 7);
}

#[test]
fn test_bdnz_loop() {
    // li r3,0 ; mtctr r4 ; loop: addi r3,r3,1 ; bdnz loop
    let mut cpu = interp_with(CpuModel::Ppc603, &[li(3, 0), li(4, 5), mtspr(9, 4), addi(3, 3, 1), bc(16, 0, -4)]);
    step_n(&mut cpu, 3 + 2 * 5);
    assert_eq!(cpu.state.gpr[3], 5);
    assert_eq!(cpu.state.ctr, 0);
    assert_eq!(cpu.state.pc, CODE_BASE + 20);
}

#[test]
fn test_branch_and_link_return() {
    // bl +8 ; (skipped) ; blr target
    let mut cpu = interp_with(CpuModel::Ppc603, &[bl(8), li(3, 1), blr()]);
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.lr, CODE_BASE + 4);
    assert_eq!(cpu.state.pc, CODE_BASE + 8);
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, CODE_BASE + 4);
}

#[test]
fn test_rlwinm_identity_and_extract() {
    let mut cpu = interp_with(
        CpuModel::Ppc603,
        &[addis(4, 0, 0x1234), ori(4, 4, 0x5678), rlwinm(3, 4, 0, 0, 31), rlwinm(5, 4, 8, 24, 31)],
    );
    step_n(&mut cpu, 4);
    assert_eq!(cpu.state.gpr[3], 0x1234_5678);
    assert_eq!(cpu.state.gpr[5], 0x12);
}

#[test]
fn test_load_store() {
    let mut cpu = interp_with(
        CpuModel::Ppc603,
        &[li(1, DATA_BASE as i32), addis(3, 0, 0x1122), ori(3, 3, 0x3344), stw(3, 1, 4), lwz(6, 1, 4)],
    );
    step_n(&mut cpu, 5);
    assert_eq!(cpu.state.gpr[6], 0x1122_3344);
    assert_eq!(cpu.read8(DATA_BASE + 4), 0x11);
}

#[test]
fn test_syscall_enters_vector() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[sc()]);
    cpu.state.msr = (Msr::EE | Msr::PR | Msr::ME).bits();
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, 0x0C00);
    assert_eq!(cpu.state.srr0, CODE_BASE + 4);
    assert_eq!(cpu.state.srr1, (Msr::ME).bits());
    assert_eq!(cpu.state.msr, Msr::ME.bits());
}

#[test]
fn test_trap_conditions() {
    // twi with TO=0x1F always traps; TO=0 never does
    let mut cpu = interp_with(CpuModel::Ppc603, &[twi(0, 3, 0), twi(0x1F, 3, 0)]);
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, CODE_BASE + 4);
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, 0x0700);
    assert_eq!(cpu.state.srr0, CODE_BASE + 8);
}

#[test]
fn test_rfi_masks_target() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[rfi()]);
    cpu.state.srr0 = 0x2003;
    cpu.state.srr1 = Msr::EE.bits();
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, 0x2000);
    assert_eq!(cpu.state.msr, Msr::EE.bits());
}

#[test]
fn test_zero_word_stays_put() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[0]);
    assert_eq!(interp::execute(&mut cpu, 0).unwrap(), Flow::Jump(CODE_BASE));
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, CODE_BASE);
}

#[test]
fn test_data_fault_raises_dsi() {
    let mut bus = bus_with(&[li(1, DATA_BASE as i32), lwz(3, 1, 0)]);
    bus.unmap(DATA_BASE..DATA_BASE + 0x1000);
    let mut cpu = PpcCpu::new(CpuModel::Ppc603, Box::new(bus));
    cpu.state = initial_state(CpuModel::Ppc603);
    cpu.state.msr = Msr::DR.bits();
    cpu.state.gpr[3] = 0xAAAA;
    step_n(&mut cpu, 2);
    assert_eq!(cpu.state.pc, 0x0300);
    assert_eq!(cpu.state.srr0, CODE_BASE + 4);
    assert_eq!(cpu.state.dar, DATA_BASE);
    // destination untouched
    assert_eq!(cpu.state.gpr[3], 0xAAAA);
}

#[test]
fn test_no_translation_on_403() {
    let mut bus = bus_with(&[li(1, DATA_BASE as i32), lwz(3, 1, 0)]);
    bus.unmap(DATA_BASE..DATA_BASE + 0x1000);
    let mut cpu = PpcCpu::new(CpuModel::Ppc403, Box::new(bus));
    cpu.state = initial_state(CpuModel::Ppc403);
    cpu.state.msr = Msr::DR.bits();
    step_n(&mut cpu, 2);
    assert_eq!(cpu.state.pc, CODE_BASE + 8);
}

#[test]
fn test_fetch_fault_raises_isi() {
    let mut bus = RamBus::new(0, RAM_SIZE);
    bus.unmap(CODE_BASE..CODE_BASE + 0x1000);
    let mut cpu = PpcCpu::new(CpuModel::Ppc603, Box::new(bus));
    cpu.state = initial_state(CpuModel::Ppc603);
    cpu.state.msr = Msr::IR.bits();
    interp::step(&mut cpu).unwrap();
    assert_eq!(cpu.state.pc, 0x0400);
    assert_eq!(cpu.state.srr0, CODE_BASE);
}

#[test]
fn test_run_takes_decrementer() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[addi(3, 3, 1); 16]);
    cpu.state.msr = Msr::EE.bits();
    cpu.state.dec = 3;
    let consumed = interp::run(&mut cpu, 10).unwrap();
    assert_eq!(consumed, 11);
    assert_eq!(cpu.state.gpr[3], 4);
    assert_eq!(cpu.state.srr0, CODE_BASE + 16);
    assert_eq!(cpu.state.msr & Msr::EE.bits(), 0);
}

#[test]
fn test_unknown_opcode_is_an_error() {
    let mut cpu = interp_with(CpuModel::Ppc603, &[1 << 26]);
    assert!(interp::step(&mut cpu).is_err());
}
