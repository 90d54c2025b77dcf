//! 监视器运行参数

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 监视器配置
///
/// # Example
///
/// ```
/// use canspy_monitor::MonitorConfig;
///
/// // 默认：1s 接收超时，2s 停止宽限，覆盖模式
/// let config = MonitorConfig::default();
/// assert_eq!(config.receive_timeout_ms, 1000);
///
/// let config = MonitorConfig {
///     receive_timeout_ms: 100,
///     ..MonitorConfig::default()
/// };
/// assert_eq!(config.receive_timeout().as_millis(), 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 单次阻塞接收的超时（毫秒），也是停止响应延迟的上限
    pub receive_timeout_ms: u64,
    /// `stop()` 等待接收线程退出的最长时间（毫秒）
    pub stop_grace_ms: u64,
    /// 初始展示模式
    pub overwrite: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 1000,
            stop_grace_ms: 2000,
            overwrite: true,
        }
    }
}

impl MonitorConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
