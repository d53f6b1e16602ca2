mod branch;
mod compile;
mod exception;
