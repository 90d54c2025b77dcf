//! 通道探测命令

use super::config::CliConfig;
use anyhow::{Context, Result};
use canspy_can::{InterfaceKind, backend_for};
use canspy_monitor::scan_backend;
use clap::Args;
use std::time::Duration;

/// 探测命令参数
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// 适配器类型（默认取配置文件）
    #[arg(long)]
    pub interface: Option<InterfaceKind>,

    /// 单次探测时限（毫秒）
    #[arg(long, default_value_t = 200)]
    pub bound_ms: u64,
}

impl ScanCommand {
    pub fn execute(&self) -> Result<()> {
        let config = CliConfig::load()?;
        let kind = self.interface.unwrap_or(config.bus.interface);

        let backend = backend_for(kind).with_context(|| format!("不支持的接口类型: {}", kind))?;
        let found = scan_backend(backend, Duration::from_millis(self.bound_ms));

        if found.is_empty() {
            println!("未发现可用的 {} 通道", kind);
            return Ok(());
        }

        println!("{:<10} {:<4} 名称", "通道", "FD");
        for info in &found {
            println!(
                "{:<10} {:<4} {}",
                info.channel,
                if info.fd_capable { "yes" } else { "no" },
                info.display_name
            );
        }
        Ok(())
    }
}
