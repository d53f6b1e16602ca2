use std::io;

use thiserror::Error;

/// Errors surfaced by the recompiler and its collaborators.
#[derive(Debug, Error)]
pub enum DrcError {
    /// The compiler met an opcode it has no translation or fallback for.
    #[error("unimplemented opcode {opcode:#010x} at pc {pc:#010x}")]
    UnimplementedOpcode { opcode: u32, pc: u32 },

    /// The executable code buffer could not be mapped or protected.
    #[error("code buffer: {0}")]
    CodeBuffer(#[from] io::Error),

    /// Inconsistent or unparsable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A single block did not fit in the code cache.
    #[error("block at pc {pc:#010x} does not fit in the code cache")]
    BlockTooLarge { pc: u32 },
}

pub type Result<T> = std::result::Result<T, DrcError>;
