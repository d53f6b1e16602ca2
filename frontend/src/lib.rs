//! Guest frontend: block compilation into host code.
//!
//! Provides the generic block loop (`BlockCompiler` trait and
//! `block_loop`) plus the PowerPC compiler.

pub mod ppc;

use bitflags::bitflags;
use ppcdrc_backend::{DrcCache, X86_64CodeGen};
use ppcdrc_core::Result;

pub use ppc::PpcCompiler;

/// Code cache specialised for the x86-64 host.
pub type Drc = DrcCache<X86_64CodeGen>;

/// Guest page size; blocks never cross a page boundary.
pub const GUEST_PAGE_SIZE: u32 = 0x1000;

// ---------------------------------------------------------------
// Per-instruction outcome
// ---------------------------------------------------------------

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompileFlags: u32 {
        /// No instruction after this one belongs to the block.
        const END_OF_BLOCK = 1 << 0;
        /// Append the interrupt check and a dispatcher after the
        /// epilogue.
        const ADD_DISPATCH = 1 << 1;
        /// The translator already transferred control away; nothing
        /// may be appended.
        const CLOSED = 1 << 2;
    }
}

/// What a translator emitted for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compiled {
    pub cycles: u32,
    /// Added to PC by the standard epilogue.
    pub pcdelta: u32,
    pub flags: CompileFlags,
}

impl Compiled {
    /// Ordinary instruction: one cycle, falls through.
    pub const fn next() -> Self {
        Self {
            cycles: 1,
            pcdelta: 4,
            flags: CompileFlags::empty(),
        }
    }

    /// PC already holds the next address; end the block and dispatch.
    pub const fn redirect() -> Self {
        Self {
            cycles: 1,
            pcdelta: 0,
            flags: CompileFlags::END_OF_BLOCK.union(CompileFlags::ADD_DISPATCH),
        }
    }

    /// Fall through, then end the block and dispatch.
    pub const fn next_and_dispatch() -> Self {
        Self {
            cycles: 1,
            pcdelta: 4,
            flags: CompileFlags::END_OF_BLOCK.union(CompileFlags::ADD_DISPATCH),
        }
    }

    /// Control already left through a jump emitted by the translator.
    pub const fn closed() -> Self {
        Self {
            cycles: 1,
            pcdelta: 0,
            flags: CompileFlags::END_OF_BLOCK.union(CompileFlags::CLOSED),
        }
    }

    #[inline]
    pub fn ends_block(&self) -> bool {
        self.flags.contains(CompileFlags::END_OF_BLOCK)
    }
}

// ---------------------------------------------------------------
// Generic block loop
// ---------------------------------------------------------------

/// Why `block_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    /// Still compiling.
    Open,
    /// An instruction ended the block.
    NoReturn,
    /// The instruction budget ran out.
    TooMany,
    /// The next instruction is on another guest page.
    PageBoundary,
}

/// State of the block being compiled.
#[derive(Debug, Clone)]
pub struct BlockContext {
    pub pc_first: u32,
    /// Address of the next instruction to compile.
    pub pc_next: u32,
    pub num_insns: u32,
    pub max_insns: u32,
    pub end: BlockEnd,
}

impl BlockContext {
    pub fn new(pc: u32, max_insns: u32) -> Self {
        Self {
            pc_first: pc,
            pc_next: pc,
            num_insns: 0,
            max_insns,
            end: BlockEnd::Open,
        }
    }
}

/// Per-architecture hooks driven by [`block_loop`].
pub trait BlockCompiler {
    /// Open the sequence for `ctx.pc_first`.
    fn block_start(&mut self, drc: &mut Drc, ctx: &mut BlockContext) -> Result<()>;

    /// Compile the instruction at `ctx.pc_next`.
    fn compile_insn(&mut self, drc: &mut Drc, ctx: &mut BlockContext) -> Result<Compiled>;

    /// Close the block; `ctx.end` says why it stopped.
    fn block_stop(&mut self, drc: &mut Drc, ctx: &mut BlockContext) -> Result<()>;
}

/// Compile one block: instructions until one ends the block, the budget
/// runs out or the next PC starts a new page.
pub fn block_loop<T: BlockCompiler>(t: &mut T, drc: &mut Drc, ctx: &mut BlockContext) -> Result<()> {
    t.block_start(drc, ctx)?;

    loop {
        let compiled = t.compile_insn(drc, ctx)?;
        ctx.num_insns += 1;
        ctx.pc_next = ctx.pc_next.wrapping_add(compiled.pcdelta);

        if compiled.ends_block() {
            ctx.end = BlockEnd::NoReturn;
            break;
        }
        if ctx.num_insns >= ctx.max_insns {
            ctx.end = BlockEnd::TooMany;
            break;
        }
        if ctx.pc_next % GUEST_PAGE_SIZE == 0 {
            ctx.end = BlockEnd::PageBoundary;
            break;
        }
    }

    t.block_stop(drc, ctx)
}
