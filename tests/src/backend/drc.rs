use std::mem::offset_of;

use ppcdrc_backend::x86_64::emitter::JMP_REL32_SIZE;
use ppcdrc_backend::{DrcCache, DrcHooks, ExitCode, X86_64CodeGen};
use ppcdrc_core::{DrcConfig, Result};

type Cache = DrcCache<X86_64CodeGen>;

/// Minimal env block: just the PC and the cycle counter.
#[repr(C)]
#[derive(Debug, Default)]
struct Env {
    pc: u32,
    icount: i32,
}

/// Compiles every PC into "advance by 4, charge one cycle, dispatch".
#[derive(Default)]
struct StepHooks {
    resets: u32,
    compiled: Vec<u32>,
    padding: usize,
}

impl DrcHooks<X86_64CodeGen> for StepHooks {
    fn reset(&mut self, _drc: &mut Cache) -> Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn entry_gen(&mut self, _drc: &mut Cache) {}

    fn recompile(&mut self, drc: &mut Cache, pc: u32) -> Result<()> {
        drc.begin_sequence(pc);
        for _ in 0..self.padding {
            drc.buf_mut().emit_u8(0x90);
        }
        drc.append_standard_epilogue(1, 4);
        drc.append_dispatcher();
        drc.end_sequence();
        self.compiled.push(pc);
        Ok(())
    }
}

fn new_cache(config: DrcConfig) -> Cache {
    DrcCache::new(
        X86_64CodeGen::new(),
        config,
        offset_of!(Env, pc) as i32,
        offset_of!(Env, icount) as i32,
    )
    .unwrap()
}

fn reset_cache(hooks: &mut StepHooks) -> Cache {
    let mut cache = new_cache(DrcConfig::default());
    cache.reset(hooks).unwrap();
    cache
}

fn run(cache: &mut Cache, env: &mut Env, target: usize) -> ExitCode {
    let raw = unsafe { cache.enter(env as *mut Env as *mut u8, target).unwrap() };
    ExitCode::from_raw(raw).unwrap()
}

#[test]
fn test_stub_layout() {
    let mut hooks = StepHooks::default();
    let cache = reset_cache(&mut hooks);
    let s = *cache.stubs();
    assert!(s.exit < s.out_of_cycles);
    assert!(s.out_of_cycles < s.recompile);
    assert!(s.recompile < s.dispatch);
    assert!(s.dispatch < s.entry);
    assert!(s.entry < cache.cache_base());
    assert_eq!(cache.buf().offset(), cache.cache_base());
    assert_eq!(hooks.resets, 1);
    assert_eq!(cache.resets(), 1);
}

#[test]
fn test_lookup_miss_before_compile() {
    let mut hooks = StepHooks::default();
    let cache = reset_cache(&mut hooks);
    assert_eq!(cache.lookup(0x1000), None);
    assert_eq!(cache.lookup(0xFFF0_0100), None);
}

#[test]
fn test_sequence_registers_each_instruction() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);
    let base = cache.cache_base();

    cache.begin_sequence(0x1000);
    cache.buf_mut().emit_u32(0);
    cache.register_code_at_cache_top(0x1004);
    assert_eq!(cache.sequence_len(), 2);
    assert_eq!(cache.end_sequence(), 0);

    assert_eq!(cache.lookup(0x1000), Some(base));
    assert_eq!(cache.lookup(0x1004), Some(base + 4));
    assert_eq!(cache.lookup(0x1008), None);
}

#[test]
fn test_tentative_dispatch_is_linked() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);

    cache.begin_sequence(0x2000);
    let jump_at = cache.buf().offset();
    cache.append_tentative_fixed_dispatcher(0x2004);
    let target = cache.buf().offset();
    cache.register_code_at_cache_top(0x2004);
    assert_eq!(cache.end_sequence(), 1);

    assert_eq!(cache.buf().as_slice()[jump_at], 0xE9);
    let disp = cache.buf().read_u32(jump_at + 1) as i32;
    assert_eq!(jump_at as i64 + JMP_REL32_SIZE as i64 + disp as i64, target as i64);
}

#[test]
fn test_tentative_dispatch_outside_sequence_stays() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);

    cache.begin_sequence(0x2000);
    cache.append_tentative_fixed_dispatcher(0x3000);
    assert_eq!(cache.end_sequence(), 0);
}

#[test]
fn test_abort_sequence_rewinds() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);
    let top = cache.buf().offset();

    cache.begin_sequence(0x1000);
    cache.buf_mut().emit_u64(0);
    cache.register_code_at_cache_top(0x1004);
    cache.abort_sequence();

    assert_eq!(cache.buf().offset(), top);
    assert_eq!(cache.lookup(0x1000), None);
    assert_eq!(cache.lookup(0x1004), None);
}

#[test]
fn test_recompile_and_run() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);
    let mut env = Env { pc: 0x100, icount: 0 };

    let entry = cache.stubs().entry;
    assert_eq!(run(&mut cache, &mut env, entry), ExitCode::Recompile);
    assert_eq!(env.pc, 0x100);

    cache.recompile(&mut hooks, 0x100).unwrap();
    let dispatch = cache.stubs().dispatch;
    assert_eq!(run(&mut cache, &mut env, dispatch), ExitCode::OutOfCycles);
    assert_eq!(env.pc, 0x104);
    assert_eq!(env.icount, -1);

    // 0x104 has no translation yet
    env.icount = 5;
    assert_eq!(run(&mut cache, &mut env, dispatch), ExitCode::Recompile);
    assert_eq!(env.pc, 0x104);
    assert_eq!(env.icount, 5);
}

#[test]
fn test_runs_until_out_of_cycles() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);
    for pc in (0x100..0x120).step_by(4) {
        cache.recompile(&mut hooks, pc).unwrap();
    }
    let mut env = Env { pc: 0x100, icount: 3 };
    let entry = cache.stubs().entry;
    assert_eq!(run(&mut cache, &mut env, entry), ExitCode::OutOfCycles);
    assert_eq!(env.pc, 0x110);
    assert_eq!(env.icount, -1);
}

#[test]
fn test_recompiling_redirects_old_translation() {
    let mut hooks = StepHooks::default();
    let mut cache = reset_cache(&mut hooks);
    cache.recompile(&mut hooks, 0x100).unwrap();
    let old = cache.lookup(0x100).unwrap();
    cache.recompile(&mut hooks, 0x100).unwrap();
    let new = cache.lookup(0x100).unwrap();
    assert!(new > old);
    assert_eq!(cache.buf().as_slice()[old], 0xE9);

    let mut env = Env { pc: 0x100, icount: 0 };
    let entry = cache.stubs().entry;
    assert_eq!(run(&mut cache, &mut env, entry), ExitCode::OutOfCycles);
    assert_eq!(env.pc, 0x104);
}

#[test]
fn test_full_cache_resets() {
    let config = DrcConfig {
        cache_size: 128 * 1024,
        max_instructions: 2,
        ..DrcConfig::default()
    };
    let mut cache = new_cache(config);
    let mut hooks = StepHooks {
        padding: 40 * 1024,
        ..StepHooks::default()
    };
    cache.reset(&mut hooks).unwrap();

    cache.recompile(&mut hooks, 0x100).unwrap();
    cache.recompile(&mut hooks, 0x104).unwrap();
    assert_eq!(cache.resets(), 1);
    // the top is now past the danger line
    cache.recompile(&mut hooks, 0x108).unwrap();
    assert_eq!(cache.resets(), 2);
    assert_eq!(hooks.resets, 2);
    assert_eq!(cache.lookup(0x100), None);
    assert!(cache.lookup(0x108).is_some());
}

#[test]
fn test_invalid_config_rejected() {
    let config = DrcConfig {
        address_bits: 40,
        ..DrcConfig::default()
    };
    assert!(DrcCache::new(X86_64CodeGen::new(), config, 0, 4).is_err());
}
