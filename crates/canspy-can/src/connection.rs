//! 总线连接
//!
//! `BusConnection` 独占持有一个已打开的通道。无论退出路径是正常停止、接收出错
//! 还是打开失败，底层传输都只释放一次：适配器放在 `Option` 里，`shutdown`
//! 通过 `take()` 取走它，`Drop` 再兜底调用一次 `shutdown`。

use crate::{BusBackend, BusConfig, CanAdapter, CanError, RawFrame};
use std::time::Duration;
use tracing::{trace, warn};

/// 单通道总线连接
pub struct BusConnection {
    adapter: Option<Box<dyn CanAdapter + Send>>,
    channel: String,
}

impl BusConnection {
    /// 校验配置并通过后端打开通道
    ///
    /// # 错误
    /// - `CanError::Config`: 配置非法（未进行任何硬件 IO）
    /// - 其他 `CanError`: 后端打开失败（不保留任何部分状态）
    pub fn open(backend: &dyn BusBackend, config: &BusConfig) -> Result<Self, CanError> {
        config.validate()?;

        let adapter = backend.open(config)?;
        trace!(
            "{} channel '{}' opened ({} bit/s, fd={})",
            backend.name(),
            config.channel,
            config.bitrate,
            config.fd
        );

        Ok(Self::from_adapter(config.channel.clone(), adapter))
    }

    /// 包装一个已经打开的适配器
    pub fn from_adapter(channel: impl Into<String>, adapter: Box<dyn CanAdapter + Send>) -> Self {
        Self {
            adapter: Some(adapter),
            channel: channel.into(),
        }
    }

    /// 通道名称
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 是否仍持有通道
    pub fn is_open(&self) -> bool {
        self.adapter.is_some()
    }

    /// 带超时接收
    ///
    /// # 返回值
    /// - `Ok(Some(frame))`: 收到帧
    /// - `Ok(None)`: 超时（不阻塞超过 `timeout`）
    /// - `Err(CanError::NotStarted)`: 连接已关闭
    /// - `Err(e)`: 传输错误
    pub fn recv(&mut self, timeout: Duration) -> Result<Option<RawFrame>, CanError> {
        let adapter = self.adapter.as_mut().ok_or(CanError::NotStarted)?;
        match adapter.receive_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 释放底层传输（幂等）
    pub fn shutdown(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            if let Err(e) = adapter.shutdown() {
                warn!("Error while shutting down channel '{}': {}", self.channel, e);
            }
            trace!("Channel '{}' released", self.channel);
        }
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanDeviceError, CanDeviceErrorKind, MockBackend, MockEvent};

    #[test]
    fn test_open_rejects_invalid_config_before_io() {
        let backend = MockBackend::new();
        let config = BusConfig::classic("", 500_000);
        let result = BusConnection::open(&backend, &config);
        assert!(matches!(result, Err(CanError::Config(_))));
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_recv_maps_timeout_to_none() {
        let backend = MockBackend::new();
        backend.push(MockEvent::Timeout);
        backend.push(MockEvent::Frame(RawFrame::new_standard(0x10, &[1, 2])));

        let mut conn = BusConnection::open(&backend, &BusConfig::classic("mock0", 500_000)).unwrap();
        assert!(conn.recv(Duration::from_millis(5)).unwrap().is_none());
        let frame = conn.recv(Duration::from_millis(5)).unwrap().unwrap();
        assert_eq!(frame.id, 0x10);
    }

    #[test]
    fn test_recv_propagates_transport_error() {
        let backend = MockBackend::new();
        backend.push(MockEvent::Fail(CanDeviceError::new(
            CanDeviceErrorKind::NoDevice,
            "unplugged",
        )));

        let mut conn = BusConnection::open(&backend, &BusConfig::classic("mock0", 500_000)).unwrap();
        assert!(matches!(
            conn.recv(Duration::from_millis(5)),
            Err(CanError::Device(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_runs_once() {
        let backend = MockBackend::new();
        let mut conn = BusConnection::open(&backend, &BusConfig::classic("mock0", 500_000)).unwrap();
        assert!(conn.is_open());

        conn.shutdown();
        conn.shutdown();
        drop(conn);

        assert_eq!(backend.shutdown_count(), 1);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_drop_releases_channel() {
        let backend = MockBackend::new();
        {
            let _conn =
                BusConnection::open(&backend, &BusConfig::classic("mock0", 500_000)).unwrap();
            assert_eq!(backend.open_handles(), 1);
        }
        assert_eq!(backend.shutdown_count(), 1);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_recv_after_shutdown_is_not_started() {
        let backend = MockBackend::new();
        let mut conn = BusConnection::open(&backend, &BusConfig::classic("mock0", 500_000)).unwrap();
        conn.shutdown();
        assert!(matches!(
            conn.recv(Duration::from_millis(1)),
            Err(CanError::NotStarted)
        ));
    }
}
