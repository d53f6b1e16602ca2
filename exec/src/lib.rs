//! PowerPC execution engine.
//!
//! [`PpcDrc`] owns one core: its register file and memory, its code
//! cache and the block compiler. `execute` arms a timeslice, runs
//! generated code until the slice is used up and folds the consumed
//! cycles into the time base and decrementer.

pub mod exec_loop;

pub use exec_loop::{cpu_exec_loop, LoopStats};

use ppcdrc_backend::X86_64CodeGen;
use ppcdrc_core::cpu::{ICOUNT_OFFSET, PC_OFFSET};
use ppcdrc_core::{GuestMemory, PpcConfig, PpcCpu, Result};
use ppcdrc_frontend::{Drc, PpcCompiler};
use tracing::debug;

/// A recompiling PowerPC core.
pub struct PpcDrc {
    // Boxed: generated code holds the address for the cache's lifetime.
    cpu: Box<PpcCpu>,
    cache: Drc,
    compiler: PpcCompiler,
    last_stats: LoopStats,
}

impl PpcDrc {
    /// Build a core in its power-on state with a freshly reset cache.
    pub fn new(config: PpcConfig, mem: Box<dyn GuestMemory>) -> Result<Self> {
        let cpu = Box::new(PpcCpu::new(config.model, mem));
        let cache = Drc::new(X86_64CodeGen::default(), config.drc.clone(), PC_OFFSET, ICOUNT_OFFSET)?;
        let compiler = PpcCompiler::new(&config);
        let mut drc = Self {
            cpu,
            cache,
            compiler,
            last_stats: LoopStats::default(),
        };
        drc.flush_cache()?;
        debug!(target: "ppcdrc::exec", model = ?config.model, strict = config.strict_verify, "core created");
        Ok(drc)
    }

    /// Power-on reset: register file and code cache.
    pub fn reset(&mut self) -> Result<()> {
        self.cpu.reset();
        self.flush_cache()
    }

    /// Drop every translation.
    pub fn flush_cache(&mut self) -> Result<()> {
        let mut session = self.compiler.session(&self.cpu);
        self.cache.reset(&mut session)
    }

    /// Run for `cycles` cycles from the current PC. Returns the number of
    /// cycles consumed; `execute(0)` runs exactly one instruction.
    pub fn execute(&mut self, cycles: i32) -> Result<i32> {
        self.cpu.begin_timeslice(cycles);
        let result = cpu_exec_loop(&mut self.cache, &mut self.compiler, &mut self.cpu);
        let consumed = self.cpu.end_timeslice();
        self.last_stats = result?;
        Ok(consumed)
    }

    pub fn set_irq_line(&mut self, line: u32, asserted: bool) {
        self.cpu.set_irq_line(line, asserted);
    }

    pub fn cpu(&self) -> &PpcCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut PpcCpu {
        &mut self.cpu
    }

    pub fn cache(&self) -> &Drc {
        &self.cache
    }

    pub fn compiler(&self) -> &PpcCompiler {
        &self.compiler
    }

    /// Loop counters of the last `execute`.
    pub fn last_stats(&self) -> LoopStats {
        self.last_stats
    }
}
