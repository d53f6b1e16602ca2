use ppcdrc_core::cpu::{dcr, spr, PENDING_IRQ};
use ppcdrc_core::exception::{self, ExceptionKind};
use ppcdrc_core::{CpuModel, Msr, PpcCpu};
use ppcdrc_runner::RamBus;

fn cpu(model: CpuModel) -> PpcCpu {
    PpcCpu::new(model, Box::new(RamBus::new(0, 0x1000)))
}

#[test]
fn test_reset_state_per_model() {
    let c = cpu(CpuModel::Ppc603);
    assert_eq!(c.state.pc, 0xFFF0_0100);
    assert_eq!(c.state.msr, Msr::IP.bits());
    assert_eq!(c.state.pvr, CpuModel::Ppc603.pvr());

    let c = cpu(CpuModel::Ppc403);
    assert_eq!(c.state.pc, 0xFFFF_FFFC);
    assert_eq!(c.state.msr, 0);
}

#[test]
fn test_spr_availability_follows_model() {
    let mut c602 = cpu(CpuModel::Ppc602);
    c602.set_spr(spr::IBR, 0x1234_0000);
    assert_eq!(c602.get_spr(spr::IBR), 0x1234_0000);

    // 986 is TCR on the 403 and unimplemented on the 603
    let mut c603 = cpu(CpuModel::Ppc603);
    c603.set_spr(986, 0x1234_0000);
    assert_eq!(c603.get_spr(986), 0);

    let mut c403 = cpu(CpuModel::Ppc403);
    c403.set_spr(spr::EVPR, 0x1234_5678);
    assert_eq!(c403.get_spr(spr::EVPR), 0x1234_0000);
}

#[test]
fn test_pvr_is_read_only() {
    let mut c = cpu(CpuModel::Ppc603);
    c.set_spr(spr::PVR, 0);
    assert_eq!(c.get_spr(spr::PVR), CpuModel::Ppc603.pvr());
}

#[test]
fn test_tsr_write_one_to_clear() {
    let mut c = cpu(CpuModel::Ppc403);
    c.state.tsr = 0xF000_0000;
    c.set_spr(spr::TSR, 0x3000_0000);
    assert_eq!(c.get_spr(spr::TSR), 0xC000_0000);
}

#[test]
fn test_timeslice_accounting() {
    let mut c = cpu(CpuModel::Ppc603);
    c.state.tb = 1000;
    c.state.dec = 500;
    c.begin_timeslice(100);
    c.state.icount -= 60;
    assert_eq!(c.timebase(), 1060);
    assert_eq!(c.decrementer(), 440);
    assert_eq!(c.end_timeslice(), 60);
    assert_eq!(c.state.tb, 1060);
    assert_eq!(c.state.dec, 440);
}

#[test]
fn test_decrementer_write_moves_trigger() {
    let mut c = cpu(CpuModel::Ppc603);
    c.begin_timeslice(100);
    c.state.icount -= 10;
    c.set_spr(spr::DEC, 25);
    assert_eq!(c.get_spr(spr::DEC), 25);
    assert_eq!(c.state.dec_trigger_cycle, 90 - 25);
}

#[test]
fn test_timebase_write() {
    let mut c = cpu(CpuModel::Ppc603);
    c.begin_timeslice(100);
    c.state.icount -= 10;
    c.set_spr(spr::TBU_W, 2);
    c.set_spr(spr::TBL_W, 7);
    assert_eq!(c.timebase(), (2 << 32) | 7);
    assert_eq!(c.get_spr(spr::TBU_R), 2);
    assert_eq!(c.get_spr(spr::TBL_R), 7);
}

#[test]
fn test_irq_line_60x_is_level() {
    let mut c = cpu(CpuModel::Ppc603);
    c.set_irq_line(0, true);
    assert_eq!(c.state.pending & PENDING_IRQ, PENDING_IRQ);
    c.set_irq_line(0, false);
    assert_eq!(c.state.pending & PENDING_IRQ, 0);
}

#[test]
fn test_irq_line_403_latches() {
    let mut c = cpu(CpuModel::Ppc403);
    c.set_irq_line(1, true);
    assert_eq!(c.get_dcr(dcr::EXISR), 0x08);
    c.set_irq_line(1, false);
    assert_eq!(c.state.pending & PENDING_IRQ, PENDING_IRQ);

    // masked in EXIER: clearing the mask drops the request
    c.set_dcr(dcr::EXIER, 0x08);
    assert_eq!(c.state.pending & PENDING_IRQ, PENDING_IRQ);
    c.set_dcr(dcr::EXISR, 0x08);
    assert_eq!(c.get_dcr(dcr::EXISR), 0);
    assert_eq!(c.state.pending & PENDING_IRQ, 0);
}

#[test]
fn test_403_irq_needs_exier() {
    let mut c = cpu(CpuModel::Ppc403);
    c.state.pc = 0x100;
    c.state.msr = Msr::EE.bits();
    c.state.evpr = 0x0001_0000;
    c.set_irq_line(0, true);
    assert!(!exception::check_interrupts(&mut c));

    c.set_dcr(dcr::EXIER, 0x10);
    assert!(exception::check_interrupts(&mut c));
    assert_eq!(c.state.pc, 0x0001_0500);
    assert_eq!(c.state.srr0, 0x100);
    assert_eq!(c.state.msr & Msr::EE.bits(), 0);
}

#[test]
fn test_interrupts_need_ee() {
    let mut c = cpu(CpuModel::Ppc603);
    c.state.msr = 0;
    c.set_irq_line(0, true);
    assert!(!exception::check_interrupts(&mut c));
    c.state.msr = Msr::EE.bits();
    assert!(exception::check_interrupts(&mut c));
    assert_eq!(c.state.pending & PENDING_IRQ, 0);
}

#[test]
fn test_vector_base_selection() {
    let mut c602 = cpu(CpuModel::Ppc602);
    c602.state.ibr = 0x0010_0000;
    c602.state.msr = 0;
    exception::generate_exception(&mut c602, ExceptionKind::Syscall);
    assert_eq!(c602.state.pc, 0x0010_0C00);

    let mut c603 = cpu(CpuModel::Ppc603);
    c603.state.msr = Msr::IP.bits();
    exception::generate_exception(&mut c603, ExceptionKind::Trap);
    assert_eq!(c603.state.pc, 0xFFF0_0700);
}

#[test]
fn test_fit_period_from_tcr() {
    let mut c = cpu(CpuModel::Ppc403);
    c.begin_timeslice(1 << 20);
    // FIE with the shortest period
    c.set_spr(spr::TCR, 1 << 23);
    assert_eq!(c.state.fit_int_enable, 1);
    assert_eq!(c.state.fit_bit, 1 << 9);
}
