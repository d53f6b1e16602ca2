//! Run a raw PowerPC image on the recompiler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ppcdrc_core::CpuModel;
use ppcdrc_exec::PpcDrc;
use ppcdrc_runner::{loader, logging, RamBus, RunnerConfig};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    Ppc403,
    Ppc602,
    Ppc603,
}

impl From<Model> for CpuModel {
    fn from(m: Model) -> Self {
        match m {
            Model::Ppc403 => CpuModel::Ppc403,
            Model::Ppc602 => CpuModel::Ppc602,
            Model::Ppc603 => CpuModel::Ppc603,
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "ppcdrc-run", about = "Run a raw PowerPC image on the dynamic recompiler")]
struct Args {
    /// TOML run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Image to load; overrides the configuration.
    image: Option<PathBuf>,
    #[arg(long, value_parser = parse_u32)]
    load_address: Option<u32>,
    #[arg(long, value_parser = parse_u32)]
    entry: Option<u32>,
    #[arg(long, value_enum)]
    model: Option<Model>,
    #[arg(long)]
    slices: Option<u32>,
    #[arg(long)]
    cycles: Option<i32>,
    /// Verify every instruction before it runs.
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(image) = args.image {
        config.image = Some(image);
    }
    if let Some(addr) = args.load_address {
        config.load_address = addr;
    }
    if args.entry.is_some() {
        config.entry_pc = args.entry;
    }
    if let Some(model) = args.model {
        config.cpu.model = model.into();
    }
    if let Some(slices) = args.slices {
        config.slices = slices;
    }
    if let Some(cycles) = args.cycles {
        config.cycles_per_slice = cycles;
    }
    config.cpu.strict_verify |= args.strict;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    logging::init(&config.log_level);

    let mut bus = RamBus::new(config.ram_base, config.ram_size);
    let image = config.image.as_deref().context("no image given")?;
    loader::load_image(&mut bus, image, config.load_address)?;

    let mut drc = PpcDrc::new(config.cpu.clone(), Box::new(bus))?;
    if let Some(pc) = config.entry_pc {
        drc.cpu_mut().state.pc = pc;
    }

    let mut total: i64 = 0;
    for _ in 0..config.slices {
        total += drc.execute(config.cycles_per_slice)? as i64;
    }

    let s = &drc.cpu().state;
    info!(target: "ppcdrc::exec", cycles = total, pc = format_args!("{:#010x}", s.pc), "run finished");
    println!("pc  {:08x}  msr {:08x}  cr  {:08x}", s.pc, s.msr, s.cr());
    println!("lr  {:08x}  ctr {:08x}  xer {:08x}", s.lr, s.ctr, s.xer);
    for row in 0..8 {
        let regs: Vec<String> = (0..4)
            .map(|i| {
                let n = row * 4 + i;
                format!("r{n:<2} {:08x}", s.gpr(n))
            })
            .collect();
        println!("{}", regs.join("  "));
    }
    println!("cycles {total}");
    Ok(())
}
