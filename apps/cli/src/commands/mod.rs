//! 命令定义和实现

pub mod config;
pub mod monitor;
pub mod scan;

pub use config::ConfigCommand;
pub use monitor::MonitorCommand;
pub use scan::ScanCommand;
