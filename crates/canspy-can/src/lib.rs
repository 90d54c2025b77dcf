//! # CANspy CAN Adapter Layer
//!
//! CAN 硬件抽象层：监视器核心只通过这里定义的 trait 与总线交互。
//!
//! - [`RawFrame`]: 硬件层交付的原始帧（经典 CAN / CAN FD）
//! - [`BusConfig`]: 连接配置（接口类型、通道、波特率、FD）
//! - [`CanAdapter`]: 已打开通道的阻塞接收 + 关闭
//! - [`BusBackend`]: 打开 / 探测通道的工厂
//! - [`BusConnection`]: 独占持有一个通道，保证只关闭一次

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod connection;
pub mod frame;
pub mod mock;
pub mod simulated;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use config::{BusConfig, ConfigError, InterfaceKind, parse_bitrate};
pub use connection::BusConnection;
pub use frame::RawFrame;
pub use mock::{MockBackend, MockCanAdapter, MockEvent};
pub use simulated::{SimulatedAdapter, SimulatedBackend};

#[cfg(target_os = "linux")]
pub use socketcan::{SocketCanAdapter, SocketCanBackend};

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Device not started")]
    NotStarted,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 已打开的 CAN 通道
///
/// 接收是阻塞的，但 `receive_timeout` 不得阻塞超过给定的超时时间；
/// 超时返回 `CanError::Timeout`。
pub trait CanAdapter {
    fn receive(&mut self) -> Result<RawFrame, CanError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
    fn receive_timeout(&mut self, timeout: Duration) -> Result<RawFrame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }
    fn try_receive(&mut self) -> Result<Option<RawFrame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
    /// 释放底层传输。之后的 `receive` 返回 `CanError::NotStarted`。
    fn shutdown(&mut self) -> Result<(), CanError> {
        Ok(())
    }
}

impl<A: CanAdapter + ?Sized> CanAdapter for Box<A> {
    fn receive(&mut self) -> Result<RawFrame, CanError> {
        (**self).receive()
    }
    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }
    fn receive_timeout(&mut self, timeout: Duration) -> Result<RawFrame, CanError> {
        (**self).receive_timeout(timeout)
    }
    fn try_receive(&mut self) -> Result<Option<RawFrame>, CanError> {
        (**self).try_receive()
    }
    fn shutdown(&mut self) -> Result<(), CanError> {
        (**self).shutdown()
    }
}

/// 探测到的可用通道
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// 通道标识（如 "can0"）
    pub channel: String,
    /// 人类可读的名称（用于连接对话框）
    pub display_name: String,
    /// 是否支持 CAN FD
    pub fd_capable: bool,
}

/// 总线后端：按配置打开通道，并支持探测候选通道
///
/// 探测是尽力而为、非独占的：探测成功不代表随后 `open` 一定成功。
pub trait BusBackend: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &'static str;

    /// 打开通道；失败时不得保留任何部分打开的资源
    fn open(&self, config: &BusConfig) -> Result<Box<dyn CanAdapter + Send>, CanError>;

    /// 候选通道列表（固定集合）
    fn candidates(&self) -> Vec<String>;

    /// 打开并立即释放通道，返回通道信息
    fn probe(&self, channel: &str) -> Result<ChannelInfo, CanError>;
}

/// 按接口类型选择后端
///
/// # 错误
/// - `CanError::Device(UnsupportedConfig)`: 当前平台不支持该接口类型
pub fn backend_for(kind: InterfaceKind) -> Result<Arc<dyn BusBackend>, CanError> {
    match kind {
        #[cfg(target_os = "linux")]
        InterfaceKind::SocketCan => Ok(Arc::new(SocketCanBackend::new())),
        #[cfg(not(target_os = "linux"))]
        InterfaceKind::SocketCan => Err(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::UnsupportedConfig,
            "SocketCAN is only available on Linux",
        ))),
        InterfaceKind::Simulated => Ok(Arc::new(SimulatedBackend::default())),
        InterfaceKind::Mock => Ok(Arc::new(MockBackend::new())),
    }
}
