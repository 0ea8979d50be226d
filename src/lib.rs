pub mod config;
pub mod fs;
pub mod util;

// vim:ts=2 sw=2
