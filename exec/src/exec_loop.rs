use ppcdrc_backend::ExitCode;
use ppcdrc_core::{PpcCpu, Result};
use ppcdrc_frontend::{Drc, PpcCompiler};
use tracing::{error, trace};

/// Counters for one run of [`cpu_exec_loop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Times generated code was entered.
    pub entries: u32,
    /// Blocks compiled on a lookup miss or a failed verify.
    pub recompiles: u32,
}

/// Run generated code until the timeslice armed in `cpu` is used up.
///
/// The first entry goes through the entry stub, which checks interrupts
/// before dispatching. Every recompile exit compiles the block at the
/// current PC and re-enters at the dispatcher.
pub fn cpu_exec_loop(cache: &mut Drc, compiler: &mut PpcCompiler, cpu: &mut PpcCpu) -> Result<LoopStats> {
    let mut stats = LoopStats::default();
    let mut target = cache.stubs().entry;

    loop {
        let env = cpu as *mut PpcCpu as *mut u8;
        // SAFETY: `cpu` is exclusively borrowed for the whole call and is
        // the layout every block was compiled against.
        let raw = unsafe { cache.enter(env, target)? };
        stats.entries += 1;

        match ExitCode::from_raw(raw) {
            Some(ExitCode::OutOfCycles) => break,
            Some(ExitCode::Recompile) => {
                let pc = cpu.state.pc;
                trace!(target: "ppcdrc::exec", pc = format_args!("{pc:#010x}"), "recompile");
                let mut session = compiler.session(cpu);
                cache.recompile(&mut session, pc)?;
                stats.recompiles += 1;
                target = cache.stubs().dispatch;
            }
            None => {
                error!(target: "ppcdrc::exec", raw, "unknown exit code from generated code");
                break;
            }
        }
    }
    Ok(stats)
}
