pub mod config;
pub mod cpu;
pub mod decode;
pub mod error;
pub mod exception;
mod fpu;
pub mod interp;
pub mod memory;

pub use config::{DrcConfig, PpcConfig};
pub use cpu::{CpuModel, Msr, PpcCpu, PpcState};
pub use decode::{decode, Insn, Opcode};
pub use error::{DrcError, Result};
pub use exception::ExceptionKind;
pub use memory::{Access, GuestMemory};
