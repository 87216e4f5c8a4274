pub mod config;
pub mod constants;
pub mod core;
pub mod native;

#[cfg(test)]
mod stubs;
