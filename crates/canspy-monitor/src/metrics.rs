//! 监视器运行指标
//!
//! 接收线程与控制端共享的原子计数器，读取不加锁。

use std::sync::atomic::{AtomicU64, Ordering};

/// 监视器实时指标
///
/// ```rust
/// use canspy_monitor::MonitorMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = MonitorMetrics::new();
/// metrics.frames_received.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().frames_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct MonitorMetrics {
    /// 接收线程收到的帧数
    pub frames_received: AtomicU64,

    /// 接收超时次数（总线空闲时的正常现象）
    pub receive_timeouts: AtomicU64,

    /// 导致接收循环退出的传输错误次数
    pub transport_errors: AtomicU64,

    /// 控制端写入聚合表的记录数
    pub records_applied: AtomicU64,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器的快照
    ///
    /// 各计数器分别读取，彼此之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            records_applied: self.records_applied.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.receive_timeouts.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
        self.records_applied.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub receive_timeouts: u64,
    pub transport_errors: u64,
    pub records_applied: u64,
}

impl MetricsSnapshot {
    /// 已收到但尚未被控制端处理的帧数
    pub fn pending(&self) -> u64 {
        self.frames_received.saturating_sub(self.records_applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_default() {
        let snapshot = MonitorMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_concurrent_increment() {
        let metrics = Arc::new(MonitorMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.frames_received.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        metrics.records_applied.fetch_add(3000, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 4000);
        assert_eq!(snapshot.pending(), 1000);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = MonitorMetrics::new();
        metrics.receive_timeouts.fetch_add(5, Ordering::Relaxed);
        metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
