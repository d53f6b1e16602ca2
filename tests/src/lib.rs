//! Workspace test suite.
//!
//! Tests that run generated code are gated on an x86-64 host.


#[cfg(test)]
mod backend;
#[cfg(all(test, target_arch = "x86_64"))]
mod frontend;
