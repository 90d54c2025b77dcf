//! 监视器错误类型定义

use canspy_can::{CanError, ConfigError};
use thiserror::Error;

/// 监视器错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 连接配置非法（在任何硬件 IO 之前返回）
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// 打开通道失败
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(CanError),

    /// 接收过程中的传输错误
    #[error("Transport error: {0}")]
    Transport(String),

    /// 运行中不允许重新配置
    #[error("Monitor is running; stop it before reconfiguring")]
    Busy,

    /// 尚未调用 `configure`
    #[error("No bus configuration set")]
    NotConfigured,

    /// 无法创建接收线程
    #[error("Failed to spawn receive thread: {0}")]
    ThreadSpawn(String),
}

impl From<CanError> for MonitorError {
    /// 配置错误保持原分类，其余都视为硬件不可用
    fn from(error: CanError) -> Self {
        match error {
            CanError::Config(e) => MonitorError::Config(e),
            other => MonitorError::HardwareUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canspy_can::{CanDeviceError, CanDeviceErrorKind};

    #[test]
    fn test_monitor_error_display() {
        let err = MonitorError::Config(ConfigError::EmptyChannel);
        assert!(err.to_string().starts_with("Invalid configuration"));

        let err = MonitorError::Transport("Bus off".to_string());
        assert_eq!(err.to_string(), "Transport error: Bus off");

        assert!(MonitorError::Busy.to_string().contains("running"));
    }

    #[test]
    fn test_from_can_error_keeps_config_category() {
        let err: MonitorError = CanError::Config(ConfigError::MissingDataBitrate).into();
        assert!(matches!(
            err,
            MonitorError::Config(ConfigError::MissingDataBitrate)
        ));

        let err: MonitorError =
            CanError::Device(CanDeviceError::new(CanDeviceErrorKind::NotFound, "can3")).into();
        assert!(matches!(err, MonitorError::HardwareUnavailable(_)));
    }
}
