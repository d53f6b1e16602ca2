use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::bus::RamBus;

/// Copy a raw image into `bus` at `addr`. Returns its length.
pub fn load_image(bus: &mut RamBus, path: &Path, addr: u32) -> Result<usize> {
    let bytes = std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    let end = addr as u64 + bytes.len() as u64;
    let ram_end = bus.base() as u64 + bus.size() as u64;
    if (addr as u64) < bus.base() as u64 || end > ram_end {
        bail!(
            "image {} ({:#x} bytes at {addr:#010x}) does not fit in RAM {:#010x}..{ram_end:#x}",
            path.display(),
            bytes.len(),
            bus.base()
        );
    }
    bus.load_bytes(addr, &bytes);
    info!(target: "ppcdrc::exec", image = %path.display(), len = bytes.len(), addr = format_args!("{addr:#010x}"), "image loaded");
    Ok(bytes.len())
}
