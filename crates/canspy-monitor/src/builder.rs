//! Builder 模式实现
//!
//! 提供链式构造 `Monitor` 实例的便捷方式。

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::monitor::Monitor;
use canspy_can::{BusBackend, BusConfig, InterfaceKind, backend_for};
use std::sync::Arc;

/// Monitor Builder（链式构造）
///
/// 后端来源的优先级：显式 `backend()` > `interface()` > 连接配置里的 `interface`
/// > 默认（SocketCAN）。
///
/// # Example
///
/// ```
/// use canspy_can::{BusConfig, InterfaceKind};
/// use canspy_monitor::MonitorBuilder;
///
/// let monitor = MonitorBuilder::new()
///     .interface(InterfaceKind::Simulated)
///     .bus_config(BusConfig::classic("sim0", 500_000))
///     .receive_timeout_ms(100)
///     .overwrite(false)
///     .build()
///     .unwrap();
/// assert!(!monitor.overwrite());
/// assert!(!monitor.is_running());
/// ```
#[derive(Default)]
pub struct MonitorBuilder {
    interface: Option<InterfaceKind>,
    backend: Option<Arc<dyn BusBackend>>,
    config: MonitorConfig,
    bus: Option<BusConfig>,
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按接口类型选择后端
    pub fn interface(mut self, interface: InterfaceKind) -> Self {
        self.interface = Some(interface);
        self
    }

    /// 直接注入后端（测试中用于共享 `MockBackend`）
    pub fn backend(mut self, backend: Arc<dyn BusBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 整体替换监视器配置
    pub fn monitor_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// 接收超时（毫秒，默认 1000）
    pub fn receive_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.receive_timeout_ms = timeout_ms;
        self
    }

    /// 停止宽限（毫秒，默认 2000）
    pub fn stop_grace_ms(mut self, grace_ms: u64) -> Self {
        self.config.stop_grace_ms = grace_ms;
        self
    }

    /// 初始展示模式（默认覆盖）
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    /// 预先保存连接配置（之后可用 `start_configured` 启动）
    pub fn bus_config(mut self, bus: BusConfig) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 构建 `Monitor`（不打开任何通道）
    ///
    /// # 错误
    /// - `MonitorError::Config`: 连接配置非法
    /// - `MonitorError::HardwareUnavailable`: 当前平台不支持所选接口
    pub fn build(self) -> Result<Monitor, MonitorError> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => {
                let kind = self
                    .interface
                    .or(self.bus.as_ref().map(|b| b.interface))
                    .unwrap_or_default();
                backend_for(kind).map_err(MonitorError::HardwareUnavailable)?
            },
        };

        let mut monitor = Monitor::new(backend, self.config);
        if let Some(bus) = self.bus {
            monitor.configure(bus)?;
        }
        Ok(monitor)
    }
}
