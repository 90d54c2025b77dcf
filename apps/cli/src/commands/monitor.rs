//! 监视命令
//!
//! 启动接收，按固定间隔刷新终端表格，直到 Ctrl-C 或接收出错。

use super::config::CliConfig;
use crate::render::{RenderOptions, render_screen};
use anyhow::{Context, Result};
use canspy_can::{BusConfig, InterfaceKind, parse_bitrate};
use canspy_monitor::{MonitorBuilder, MonitorConfig, MonitorStatus, SortColumn, SortOrder};
use clap::Args;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// 监视命令参数（未给出的项取配置文件）
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 适配器类型（socketcan / pcan / simulated）
    #[arg(long)]
    pub interface: Option<InterfaceKind>,

    /// 通道（如 can0）
    #[arg(short, long)]
    pub channel: Option<String>,

    /// 仲裁段波特率（如 500000、"500 kBit/s"）
    #[arg(short, long, value_parser = parse_bitrate)]
    pub bitrate: Option<u32>,

    /// 启用 CAN FD
    #[arg(long)]
    pub fd: bool,

    /// 禁用 CAN FD（覆盖配置文件中的 `fd = true`）
    #[arg(long, conflicts_with_all = ["fd", "data_bitrate"])]
    pub no_fd: bool,

    /// 数据段波特率（FD 必需）
    #[arg(long, value_parser = parse_bitrate)]
    pub data_bitrate: Option<u32>,

    /// 追加模式（每帧一行）
    #[arg(long)]
    pub append: bool,

    /// 刷新间隔（毫秒）
    #[arg(long, default_value_t = 200)]
    pub refresh_ms: u64,

    /// 排序列（index / timestamp / id / type / length / data / cycle / count）
    #[arg(long)]
    pub sort: Option<SortColumn>,

    /// 降序
    #[arg(long)]
    pub desc: bool,

    /// 最多显示的行数（追加模式下显示最新的行）
    #[arg(long, default_value_t = 40)]
    pub max_rows: usize,
}

impl MonitorCommand {
    /// 合并配置文件与命令行参数
    fn resolve(&self, file: CliConfig) -> (BusConfig, MonitorConfig) {
        let mut bus = file.bus;
        let mut monitor = file.monitor;

        if let Some(interface) = self.interface {
            bus.interface = interface;
        }
        if let Some(channel) = &self.channel {
            bus.channel.clone_from(channel);
        }
        if let Some(bitrate) = self.bitrate {
            bus.bitrate = bitrate;
        }
        if self.fd {
            bus.fd = true;
        }
        if self.no_fd {
            bus.fd = false;
            bus.data_bitrate = None;
        }
        if let Some(data_bitrate) = self.data_bitrate {
            bus.data_bitrate = Some(data_bitrate);
        }
        if self.append {
            monitor.overwrite = false;
        }
        (bus, monitor)
    }

    pub fn execute(&self) -> Result<()> {
        let (bus, monitor_config) = self.resolve(CliConfig::load()?);

        let mut monitor = MonitorBuilder::new()
            .interface(bus.interface)
            .monitor_config(monitor_config)
            .build()?;

        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("注册 Ctrl-C 处理器失败")?;

        monitor
            .start(bus.clone())
            .with_context(|| format!("无法打开 {} 通道 '{}'", bus.interface, bus.channel))?;
        info!("Monitoring '{}', press Ctrl-C to stop", bus.channel);

        let options = RenderOptions {
            sort: self.sort.map(|column| {
                let order = if self.desc {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                };
                (column, order)
            }),
            max_rows: self.max_rows,
        };
        let refresh = Duration::from_millis(self.refresh_ms.max(10));
        let mut stdout = io::stdout();
        let mut last_draw: Option<Instant> = None;
        let mut new_records = 0usize;

        while running.load(Ordering::SeqCst) {
            monitor.poll();
            new_records += monitor.take_records().len();

            let due = last_draw.is_none_or(|t| t.elapsed() >= refresh);
            if due {
                let elapsed = last_draw.map_or(refresh, |t| t.elapsed());
                let rate = new_records as f64 / elapsed.as_secs_f64().max(1e-3);
                let screen = render_screen(
                    monitor.table(),
                    monitor.status(),
                    &monitor.metrics(),
                    rate,
                    &options,
                );
                write!(stdout, "\x1b[2J\x1b[H{}", screen)?;
                stdout.flush()?;
                last_draw = Some(Instant::now());
                new_records = 0;
            }

            if !monitor.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        let failure = match monitor.status() {
            MonitorStatus::Error(message) => Some(message.clone()),
            _ => None,
        };
        monitor.stop();

        let metrics = monitor.metrics();
        println!(
            "\n{} frames received, {} identifiers",
            metrics.frames_received,
            monitor.tracker().len()
        );

        match failure {
            Some(message) => Err(anyhow::anyhow!("接收中断: {}", message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> MonitorCommand {
        MonitorCommand {
            interface: None,
            channel: None,
            bitrate: None,
            fd: false,
            no_fd: false,
            data_bitrate: None,
            append: false,
            refresh_ms: 200,
            sort: None,
            desc: false,
            max_rows: 40,
        }
    }

    #[test]
    fn test_resolve_uses_file_defaults() {
        let mut file = CliConfig::default();
        file.bus.channel = "can3".into();
        file.monitor.overwrite = false;

        let (bus, monitor) = args().resolve(file);
        assert_eq!(bus.channel, "can3");
        assert!(!monitor.overwrite);
    }

    #[test]
    fn test_resolve_flags_override_file() {
        let mut cmd = args();
        cmd.interface = Some(InterfaceKind::Simulated);
        cmd.channel = Some("sim0".into());
        cmd.bitrate = Some(1_000_000);
        cmd.fd = true;
        cmd.data_bitrate = Some(5_000_000);
        cmd.append = true;

        let (bus, monitor) = cmd.resolve(CliConfig::default());
        assert_eq!(bus.interface, InterfaceKind::Simulated);
        assert_eq!(
            bus,
            BusConfig::fd("sim0", 1_000_000, 5_000_000).with_interface(InterfaceKind::Simulated)
        );
        assert!(!monitor.overwrite);
        assert!(bus.validate().is_ok());
    }

    #[test]
    fn test_no_fd_overrides_file() {
        let mut file = CliConfig::default();
        file.bus = BusConfig::fd("can0", 500_000, 2_000_000);

        let mut cmd = args();
        cmd.no_fd = true;
        let (bus, _) = cmd.resolve(file);
        assert!(!bus.fd);
        assert_eq!(bus.data_bitrate, None);
        assert!(bus.validate().is_ok());
    }
}
