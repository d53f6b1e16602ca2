//! Run configuration, loaded from TOML.
//!
//! ```toml
//! image = "boot.bin"
//! load_address = 0xFFF00000
//! cycles_per_slice = 10000
//! slices = 100
//! log_level = "debug"
//!
//! [cpu]
//! model = "ppc603"
//! strict_verify = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ppcdrc_core::PpcConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Raw binary copied into RAM at `load_address`.
    pub image: Option<PathBuf>,
    pub load_address: u32,
    /// Start PC; the model's reset vector when unset.
    pub entry_pc: Option<u32>,
    pub ram_base: u32,
    pub ram_size: usize,
    pub cycles_per_slice: i32,
    pub slices: u32,
    /// Default filter directive; `RUST_LOG` overrides it.
    pub log_level: String,
    pub cpu: PpcConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            image: None,
            load_address: 0,
            entry_pc: None,
            ram_base: 0,
            ram_size: 16 * 1024 * 1024,
            cycles_per_slice: 10_000,
            slices: 1,
            log_level: "info".to_string(),
            cpu: PpcConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("parsing runner configuration")?;
        config.cpu.drc.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }
}
