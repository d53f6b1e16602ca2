//! Host functions called from generated code.
//!
//! Every helper receives the env pointer (the `PpcCpu` generated code
//! runs against) as its first argument. Values come back zero-extended
//! in EAX.

#![allow(improper_ctypes_definitions)]

use ppcdrc_core::interp::{self, Flow};
use ppcdrc_core::PpcCpu;
use tracing::error;

/// Run one instruction in the interpreter.
///
/// Only instructions that fall through are delegated here; generated code
/// advances PC itself.
///
/// # Safety
/// `env` must be the live, exclusively borrowed CPU of the running block.
pub unsafe extern "C" fn helper_interpret(env: *mut PpcCpu, word: u32) {
    let cpu = &mut *env;
    match interp::execute(cpu, word) {
        Ok(Flow::Next) => {}
        Ok(flow) => {
            error!(target: "ppcdrc::cpu", word, ?flow, "delegated instruction redirected control");
        }
        Err(e) => {
            error!(target: "ppcdrc::cpu", word, "delegated instruction failed: {e}");
        }
    }
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_set_msr(env: *mut PpcCpu, value: u32) {
    (*env).set_msr(value);
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_mfspr(env: *mut PpcCpu, spr: u32) -> u32 {
    (*env).get_spr(spr)
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_mtspr(env: *mut PpcCpu, spr: u32, value: u32) {
    (*env).set_spr(spr, value);
}

/// Non-zero once `pc` can be fetched again.
///
/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_opcode_valid(env: *mut PpcCpu, pc: u32) -> u32 {
    (*env).opcode_ptr(pc).is_some() as u32
}

// -- Data memory --
//
// A failed translation leaves `fault` set; generated code checks it after
// the call.

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_read8(env: *mut PpcCpu, ea: u32) -> u32 {
    (*env).read8(ea) as u32
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_read16(env: *mut PpcCpu, ea: u32) -> u32 {
    (*env).read16(ea) as u32
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_read32(env: *mut PpcCpu, ea: u32) -> u32 {
    (*env).read32(ea)
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_write8(env: *mut PpcCpu, ea: u32, value: u32) {
    (*env).write8(ea, value as u8);
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_write16(env: *mut PpcCpu, ea: u32, value: u32) {
    (*env).write16(ea, value as u16);
}

/// # Safety
/// See [`helper_interpret`].
pub unsafe extern "C" fn helper_write32(env: *mut PpcCpu, ea: u32, value: u32) {
    (*env).write32(ea, value);
}
