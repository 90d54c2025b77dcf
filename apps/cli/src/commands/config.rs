//! 配置管理命令
//!
//! 配置文件位于 `<config_dir>/canspy/config.toml`：
//!
//! ```toml
//! [bus]
//! interface = "socketcan"
//! channel = "can0"
//! bitrate = 500000
//! fd = false
//!
//! [monitor]
//! receive_timeout_ms = 1000
//! stop_grace_ms = 2000
//! overwrite = true
//! ```

use anyhow::{Context, Result};
use canspy_can::{BusConfig, InterfaceKind, parse_bitrate};
use canspy_monitor::MonitorConfig;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件路径
pub fn config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("canspy");
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 默认连接
    pub bus: BusConfig,
    /// 监视器参数
    pub monitor: MonitorConfig,
}

impl CliConfig {
    /// 加载默认位置的配置（文件不存在时返回默认值）
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).context("写入配置文件失败")?;
        Ok(())
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前配置
    Show,

    /// 显示配置文件路径
    Path,

    /// 设置配置项
    Set {
        /// 适配器类型（socketcan / pcan / simulated）
        #[arg(long)]
        interface: Option<InterfaceKind>,

        /// 通道（如 can0）
        #[arg(long)]
        channel: Option<String>,

        /// 仲裁段波特率（如 500000、"500 kBit/s"）
        #[arg(long, value_parser = parse_bitrate)]
        bitrate: Option<u32>,

        /// 是否启用 CAN FD
        #[arg(long)]
        fd: Option<bool>,

        /// 数据段波特率（如 "2 MBit/s"）
        #[arg(long, value_parser = parse_bitrate)]
        data_bitrate: Option<u32>,

        /// 默认展示模式：true 覆盖，false 追加
        #[arg(long)]
        overwrite: Option<bool>,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = CliConfig::load()?;
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", config_file()?.display());
                Ok(())
            },

            ConfigCommand::Set {
                interface,
                channel,
                bitrate,
                fd,
                data_bitrate,
                overwrite,
            } => {
                let path = config_file()?;
                let mut config = CliConfig::load_from(&path)?;
                apply_set(
                    &mut config,
                    interface,
                    channel,
                    bitrate,
                    fd,
                    data_bitrate,
                    overwrite,
                )?;
                config.save_to(&path)?;
                println!("✅ 配置已保存: {}", path.display());
                Ok(())
            },
        }
    }
}

/// 合并 `config set` 的参数并校验
fn apply_set(
    config: &mut CliConfig,
    interface: Option<InterfaceKind>,
    channel: Option<String>,
    bitrate: Option<u32>,
    fd: Option<bool>,
    data_bitrate: Option<u32>,
    overwrite: Option<bool>,
) -> Result<()> {
    if let Some(interface) = interface {
        config.bus.interface = interface;
    }
    if let Some(channel) = channel {
        config.bus.channel = channel;
    }
    if let Some(bitrate) = bitrate {
        config.bus.bitrate = bitrate;
    }
    if let Some(fd) = fd {
        config.bus.fd = fd;
        if !fd {
            config.bus.data_bitrate = None;
        }
    }
    if let Some(data_bitrate) = data_bitrate {
        config.bus.data_bitrate = Some(data_bitrate);
    }
    if let Some(overwrite) = overwrite {
        config.monitor.overwrite = overwrite;
    }

    config.bus.validate().context("配置无效，未保存")?;
    Ok(())
}
