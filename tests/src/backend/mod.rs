mod code_buffer;
#[cfg(target_arch = "x86_64")]
mod drc;
mod x86_64;
