//! 子命令实现

pub mod config;
pub mod simulate;

pub use config::ConfigCommand;
pub use simulate::SimulateCommand;
