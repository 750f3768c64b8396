pub mod cli;
pub mod config;
pub mod console;
pub mod demo;

pub use cli::*;
pub use config::*;
