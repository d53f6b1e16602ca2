//! Recompiler configuration.
//!
//! Every struct deserializes with `#[serde(default)]`, so a TOML file only
//! needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::cpu::CpuModel;
use crate::error::{DrcError, Result};

/// Default code cache size: 16 MiB.
pub const DEFAULT_CACHE_SIZE: usize = 16 * 1024 * 1024;

/// Default per-block instruction budget.
pub const DEFAULT_MAX_INSTRUCTIONS: u32 = 512;

/// Descriptor for the code-cache framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrcConfig {
    /// Size of the executable code cache in bytes.
    pub cache_size: usize,
    /// Upper bound on instructions compiled into one block.
    pub max_instructions: u32,
    /// Significant bits of a guest PC.
    pub address_bits: u32,
    /// Low PC bits that are always zero and skipped by the lookup table.
    pub lsbs_to_ignore: u32,
    /// Whether floating-point opcodes are accepted.
    pub uses_fp: bool,
}

impl Default for DrcConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            address_bits: 32,
            lsbs_to_ignore: 2,
            uses_fp: true,
        }
    }
}

impl DrcConfig {
    /// Bytes kept free at the end of the cache. Compilation of a new block
    /// never starts past `cache_size - danger_margin()`.
    pub fn danger_margin(&self) -> usize {
        (64 * 1024).max(self.max_instructions as usize * 512)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address_bits == 0 || self.address_bits > 32 {
            return Err(DrcError::Config(format!(
                "address_bits must be in 1..=32, got {}",
                self.address_bits
            )));
        }
        if self.lsbs_to_ignore > 3 || self.lsbs_to_ignore >= self.address_bits {
            return Err(DrcError::Config(format!(
                "lsbs_to_ignore must be at most 3 and below address_bits, got {}",
                self.lsbs_to_ignore
            )));
        }
        if self.max_instructions < 2 {
            return Err(DrcError::Config("max_instructions must be at least 2".into()));
        }
        if self.cache_size < 2 * self.danger_margin() {
            return Err(DrcError::Config(format!(
                "cache_size {:#x} is too small for {} instructions per block",
                self.cache_size, self.max_instructions
            )));
        }
        Ok(())
    }
}

/// Per-core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PpcConfig {
    pub model: CpuModel,
    /// Verify every instruction against the live guest word before it
    /// runs. When clear only the first instruction of each block is
    /// verified.
    pub strict_verify: bool,
    pub drc: DrcConfig,
}

impl PpcConfig {
    pub fn new(model: CpuModel) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| DrcError::Config(e.to_string()))?;
        config.drc.validate()?;
        Ok(config)
    }
}
