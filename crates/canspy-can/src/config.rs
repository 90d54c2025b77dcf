//! 连接配置
//!
//! 由连接对话框（或 CLI / 配置文件）构造，在 `open` 时被消费一次。
//! 重连时用新配置替换旧配置，不做原地修改。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 125 kbit/s
pub const BITRATE_125K: u32 = 125_000;
/// 250 kbit/s
pub const BITRATE_250K: u32 = 250_000;
/// 500 kbit/s（默认）
pub const BITRATE_500K: u32 = 500_000;
/// 1 Mbit/s
pub const BITRATE_1M: u32 = 1_000_000;

/// 仲裁段最大波特率
pub const MAX_NOMINAL_BITRATE: u32 = BITRATE_1M;

/// 连接对话框提供的数据段波特率预设
pub const DATA_BITRATE_PRESETS: [u32; 5] = [1_000_000, 2_000_000, 4_000_000, 5_000_000, 8_000_000];

/// 配置校验错误
///
/// 在任何硬件 IO 之前返回。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("channel must not be empty")]
    EmptyChannel,

    #[error("invalid bitrate {0} bit/s (expected 1..={max})", max = MAX_NOMINAL_BITRATE)]
    InvalidBitrate(u32),

    #[error("CAN FD requires a data bitrate")]
    MissingDataBitrate,

    #[error("data bitrate {data} bit/s must exceed nominal bitrate {nominal} bit/s")]
    DataBitrateTooLow { nominal: u32, data: u32 },

    #[error("data bitrate {0} bit/s given but CAN FD is disabled")]
    DataBitrateWithoutFd(u32),

    #[error("cannot parse bitrate '{0}'")]
    UnparsableBitrate(String),

    #[error("unknown interface kind '{0}'")]
    UnknownInterface(String),
}

/// 总线适配器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// Linux SocketCAN（PEAK 等 USB 适配器在 Linux 上也以 SocketCAN 接口出现）
    #[default]
    #[serde(alias = "pcan")]
    SocketCan,
    /// 模拟流量（无硬件演示）
    Simulated,
    /// 脚本化 Mock（测试）
    Mock,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterfaceKind::SocketCan => "socketcan",
            InterfaceKind::Simulated => "simulated",
            InterfaceKind::Mock => "mock",
        };
        f.write_str(name)
    }
}

impl FromStr for InterfaceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socketcan" | "pcan" => Ok(InterfaceKind::SocketCan),
            "simulated" | "sim" => Ok(InterfaceKind::Simulated),
            "mock" => Ok(InterfaceKind::Mock),
            other => Err(ConfigError::UnknownInterface(other.to_string())),
        }
    }
}

/// 连接配置
///
/// # Example
///
/// ```
/// use canspy_can::BusConfig;
///
/// let config = BusConfig::fd("can0", 500_000, 2_000_000);
/// assert!(config.validate().is_ok());
///
/// let bad = BusConfig::fd("can0", 500_000, 500_000);
/// assert!(bad.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 适配器类型
    pub interface: InterfaceKind,
    /// 通道标识（如 "can0"）
    pub channel: String,
    /// 仲裁段波特率（bit/s）
    pub bitrate: u32,
    /// 是否启用 CAN FD
    pub fd: bool,
    /// 数据段波特率（bit/s），仅 FD
    pub data_bitrate: Option<u32>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: InterfaceKind::SocketCan,
            channel: "can0".to_string(),
            bitrate: BITRATE_500K,
            fd: false,
            data_bitrate: None,
        }
    }
}

impl BusConfig {
    /// 经典 CAN 配置
    pub fn classic(channel: impl Into<String>, bitrate: u32) -> Self {
        Self {
            channel: channel.into(),
            bitrate,
            ..Self::default()
        }
    }

    /// CAN FD 配置
    pub fn fd(channel: impl Into<String>, bitrate: u32, data_bitrate: u32) -> Self {
        Self {
            channel: channel.into(),
            bitrate,
            fd: true,
            data_bitrate: Some(data_bitrate),
            ..Self::default()
        }
    }

    /// 设置适配器类型
    pub fn with_interface(mut self, interface: InterfaceKind) -> Self {
        self.interface = interface;
        self
    }

    /// 校验配置
    ///
    /// # 错误
    /// - `EmptyChannel`: 通道为空
    /// - `InvalidBitrate`: 波特率为 0 或超过 1 Mbit/s
    /// - `MissingDataBitrate`: 启用 FD 但未给出数据段波特率
    /// - `DataBitrateTooLow`: 数据段波特率不大于仲裁段波特率
    /// - `DataBitrateWithoutFd`: 未启用 FD 却给出数据段波特率
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        if self.bitrate == 0 || self.bitrate > MAX_NOMINAL_BITRATE {
            return Err(ConfigError::InvalidBitrate(self.bitrate));
        }
        match (self.fd, self.data_bitrate) {
            (true, None) => Err(ConfigError::MissingDataBitrate),
            (true, Some(data)) if data <= self.bitrate => Err(ConfigError::DataBitrateTooLow {
                nominal: self.bitrate,
                data,
            }),
            (false, Some(data)) => Err(ConfigError::DataBitrateWithoutFd(data)),
            _ => Ok(()),
        }
    }
}

/// 解析对话框风格的波特率文本
///
/// 支持 "500 kBit/s"、"1 MBit/s"、"500 kbps"、"500000"。
///
/// ```
/// use canspy_can::parse_bitrate;
///
/// assert_eq!(parse_bitrate("500 kBit/s").unwrap(), 500_000);
/// assert_eq!(parse_bitrate("2 MBit/s").unwrap(), 2_000_000);
/// assert_eq!(parse_bitrate("250000").unwrap(), 250_000);
/// ```
pub fn parse_bitrate(text: &str) -> Result<u32, ConfigError> {
    let unparsable = || ConfigError::UnparsableBitrate(text.to_string());

    let lower = text.trim().to_ascii_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);
    let value: f64 = number.parse().map_err(|_| unparsable())?;

    let scale = match unit.trim() {
        "" | "bit/s" | "bps" => 1.0,
        u if u.starts_with('k') => 1_000.0,
        u if u.starts_with('m') => 1_000_000.0,
        _ => return Err(unparsable()),
    };

    let bits = (value * scale).round();
    if !(1.0..=f64::from(u32::MAX)).contains(&bits) {
        return Err(unparsable());
    }
    Ok(bits as u32)
}
