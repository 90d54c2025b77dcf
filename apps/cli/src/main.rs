//! # CANspy CLI
//!
//! 终端版 CAN 总线实时监视器。
//!
//! ```bash
//! # 查找可用通道
//! canspy scan
//!
//! # 500 kbit/s 经典 CAN，覆盖模式
//! canspy monitor --channel can0 --bitrate "500 kBit/s"
//!
//! # CAN FD，追加模式，按 ID 排序
//! canspy monitor --channel can0 --fd --data-bitrate 2M --append --sort id
//!
//! # 无硬件演示
//! canspy monitor --interface simulated --channel sim0
//!
//! # 保存默认配置
//! canspy config set --channel can1 --bitrate 250000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod render;

use commands::{ConfigCommand, MonitorCommand, ScanCommand};

/// CANspy - CAN 总线实时监视器
#[derive(Parser, Debug)]
#[command(name = "canspy")]
#[command(about = "Live CAN bus monitor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 探测可用的 CAN 通道
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },

    /// 接收并实时显示 CAN 帧
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("canspy=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { args } => args.execute(),
        Commands::Monitor { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_monitor_flags() {
        let cli = Cli::try_parse_from([
            "canspy",
            "monitor",
            "--channel",
            "can1",
            "--bitrate",
            "250 kBit/s",
            "--fd",
            "--data-bitrate",
            "2 MBit/s",
            "--append",
            "--sort",
            "id",
        ])
        .unwrap();

        match cli.command {
            Commands::Monitor { args } => {
                assert_eq!(args.channel.as_deref(), Some("can1"));
                assert_eq!(args.bitrate, Some(250_000));
                assert!(args.fd);
                assert_eq!(args.data_bitrate, Some(2_000_000));
                assert!(args.append);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_no_fd_conflicts_with_fd() {
        let cli = Cli::try_parse_from(["canspy", "monitor", "--no-fd"]).unwrap();
        match cli.command {
            Commands::Monitor { args } => assert!(args.no_fd && !args.fd),
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["canspy", "monitor", "--fd", "--no-fd"]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_bitrate() {
        let result = Cli::try_parse_from(["canspy", "monitor", "--bitrate", "fast"]);
        assert!(result.is_err());
    }
}
