//! Host side of a standalone PowerPC machine: flat RAM, image loading,
//! run configuration and logging setup.

pub mod bus;
pub mod config;
pub mod loader;
pub mod logging;

pub use bus::RamBus;
pub use config::RunnerConfig;
