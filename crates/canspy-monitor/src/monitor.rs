//! Monitor 控制对象
//!
//! 对外提供 `Monitor`：管理接收线程的生命周期（STOPPED ⇄ RUNNING），
//! 并在控制端持有 `CycleTracker` 与 `AggregationTable`。

use crate::config::MonitorConfig;
use crate::cycle::CycleTracker;
use crate::discovery;
use crate::error::MonitorError;
use crate::metrics::{MetricsSnapshot, MonitorMetrics};
use crate::normalizer::FrameRecord;
use crate::pipeline::{MonitorEvent, ingest, rx_loop};
use crate::table::{AggregationTable, DisplayMode};
use canspy_can::{BusBackend, BusConfig, BusConnection, ChannelInfo};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded, unbounded};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> Result<(), JoinFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinFailure {
    TimedOut,
    Panicked,
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<(), JoinFailure> {
        let (tx, rx) = bounded(1);

        // 看门狗线程代为 join；超时后它继续等待，目标线程退出时一起结束
        thread::spawn(move || {
            let _ = tx.send(self.join().is_ok());
        });

        match rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) | Err(RecvTimeoutError::Disconnected) => Err(JoinFailure::Panicked),
            Err(RecvTimeoutError::Timeout) => Err(JoinFailure::TimedOut),
        }
    }
}

/// 接收循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// 状态栏文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorStatus {
    Disconnected,
    Receiving { bitrate: u32, fd: bool },
    Error(String),
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Disconnected => f.write_str("Disconnected."),
            MonitorStatus::Receiving { bitrate, fd } => write!(
                f,
                "Receiving messages at {} kbps {}",
                bitrate / 1000,
                if *fd { "with FD" } else { "without FD" }
            ),
            MonitorStatus::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

/// CAN 总线监视器
///
/// 控制端（调用方线程）负责 `start` / `stop` / `clear` / `set_overwrite`，
/// 并周期性调用 [`poll`](Monitor::poll) 把接收线程送来的帧写入聚合表。
///
/// # Example
///
/// ```
/// use canspy_can::{BusConfig, MockBackend, RawFrame};
/// use canspy_monitor::{Monitor, MonitorConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let backend = MockBackend::new();
/// backend.push_frames([
///     RawFrame::new_standard(0x100, &[1]).with_timestamp(1.000),
///     RawFrame::new_standard(0x100, &[2]).with_timestamp(1.250),
/// ]);
///
/// let mut monitor = Monitor::new(Arc::new(backend), MonitorConfig::default());
/// monitor.start(BusConfig::classic("mock0", 500_000)).unwrap();
/// std::thread::sleep(Duration::from_millis(50));
/// monitor.stop();
///
/// let row = monitor.table().row_for("0x100").unwrap();
/// assert_eq!(row.count, 2);
/// assert_eq!(row.cycle_time_text(), "250.00 ms");
/// ```
pub struct Monitor {
    backend: Arc<dyn BusBackend>,
    config: MonitorConfig,
    bus_config: Option<BusConfig>,
    tracker: CycleTracker,
    table: AggregationTable,
    records: VecDeque<FrameRecord>,
    events: Option<Receiver<MonitorEvent>>,
    rx_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<MonitorMetrics>,
    status: MonitorStatus,
    state: LoopState,
}

impl Monitor {
    pub fn new(backend: Arc<dyn BusBackend>, config: MonitorConfig) -> Self {
        let table = AggregationTable::with_mode(DisplayMode::from_overwrite(config.overwrite));
        Self {
            backend,
            config,
            bus_config: None,
            tracker: CycleTracker::new(),
            table,
            records: VecDeque::new(),
            events: None,
            rx_thread: None,
            is_running: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(MonitorMetrics::new()),
            status: MonitorStatus::Disconnected,
            state: LoopState::Stopped,
        }
    }

    /// 保存连接配置（仅空闲时允许）
    ///
    /// # 错误
    /// - `MonitorError::Busy`: 正在接收
    /// - `MonitorError::Config`: 配置非法，原配置保持不变
    pub fn configure(&mut self, bus: BusConfig) -> Result<(), MonitorError> {
        self.poll();
        if self.is_running() {
            return Err(MonitorError::Busy);
        }
        bus.validate()?;
        self.bus_config = Some(bus);
        Ok(())
    }

    /// 当前保存的连接配置
    pub fn bus_config(&self) -> Option<&BusConfig> {
        self.bus_config.as_ref()
    }

    /// 使用 `configure` 保存的配置启动
    pub fn start_configured(&mut self) -> Result<(), MonitorError> {
        let bus = self.bus_config.clone().ok_or(MonitorError::NotConfigured)?;
        self.start(bus)
    }

    /// 打开通道并启动接收线程
    ///
    /// 已在运行时为空操作（返回 `Ok`）。
    ///
    /// # 错误
    /// - `MonitorError::Config`: 配置非法，未进行任何硬件 IO，状态不变
    /// - `MonitorError::HardwareUnavailable`: 打开失败，状态变为 `Error`
    /// - `MonitorError::ThreadSpawn`: 无法创建接收线程，通道已释放
    pub fn start(&mut self, bus: BusConfig) -> Result<(), MonitorError> {
        self.poll();
        if self.is_running() {
            warn!("Monitor already running on '{}', start ignored", self.channel());
            return Ok(());
        }
        bus.validate()?;

        let conn = match BusConnection::open(self.backend.as_ref(), &bus) {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to open '{}': {}", bus.channel, e);
                self.status = MonitorStatus::Error(e.to_string());
                return Err(e.into());
            },
        };

        let (tx, rx) = unbounded();
        // 每次启动使用新的标志，停止超时后残留的旧线程不会被重新唤醒
        let is_running = Arc::new(AtomicBool::new(true));
        let flag = is_running.clone();
        let metrics = self.metrics.clone();
        let timeout = self.config.receive_timeout();

        let handle = thread::Builder::new()
            .name("canspy-rx".into())
            .spawn(move || rx_loop(conn, tx, flag, metrics, timeout))
            .map_err(|e| {
                self.status = MonitorStatus::Error(e.to_string());
                MonitorError::ThreadSpawn(e.to_string())
            })?;

        info!(
            "Monitor started on '{}' ({} bit/s, fd={})",
            bus.channel, bus.bitrate, bus.fd
        );
        self.status = MonitorStatus::Receiving {
            bitrate: bus.bitrate,
            fd: bus.fd,
        };
        self.state = LoopState::Running;
        self.is_running = is_running;
        self.events = Some(rx);
        self.rx_thread = Some(handle);
        self.bus_config = Some(bus);
        Ok(())
    }

    /// 停止接收
    ///
    /// 置位取消标志后最多等待 `stop_grace_ms`；超时只记录错误，不阻塞。
    /// 之后处理完已收到的帧。未启动或重复调用都是安全的。
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);

        self.join_rx_thread();

        self.poll();
        self.events = None;
        if self.state == LoopState::Running {
            info!("Monitor stopped");
        }
        self.state = LoopState::Stopped;
        self.status = MonitorStatus::Disconnected;
    }

    /// 处理接收线程送来的事件，返回写入聚合表的记录数
    ///
    /// 接收线程因传输错误退出时，状态变为 STOPPED / `Error`，已有行保持不变。
    pub fn poll(&mut self) -> usize {
        let Some(events) = self.events.as_ref() else {
            return 0;
        };

        let mut applied = 0;
        let mut stopped = None;
        for event in events.try_iter() {
            match event {
                MonitorEvent::Frame(raw) => {
                    let record = ingest(&raw, &mut self.tracker, &mut self.table);
                    self.records.push_back(record);
                    applied += 1;
                },
                MonitorEvent::Stopped { error } => {
                    stopped = Some(error);
                    break;
                },
            }
        }
        self.metrics
            .records_applied
            .fetch_add(applied as u64, Ordering::Relaxed);

        if let Some(failure) = stopped {
            self.events = None;
            self.state = LoopState::Stopped;
            self.join_rx_thread();
            self.status = match failure {
                Some(message) => {
                    warn!("Receive loop ended: {}", message);
                    MonitorStatus::Error(message)
                },
                None => MonitorStatus::Disconnected,
            };
        }
        applied
    }

    /// 等待接收线程退出（最多 `stop_grace_ms`），返回是否已干净退出
    fn join_rx_thread(&mut self) -> bool {
        let Some(handle) = self.rx_thread.take() else {
            return true;
        };
        let grace = self.config.stop_grace();
        match handle.join_timeout(grace) {
            Ok(()) => true,
            Err(JoinFailure::TimedOut) => {
                error!("RX thread failed to shut down within {:?}", grace);
                false
            },
            Err(JoinFailure::Panicked) => {
                error!("RX thread panicked");
                false
            },
        }
    }

    /// 切换展示模式，返回去重删除的行数
    pub fn set_overwrite(&mut self, overwrite: bool) -> usize {
        self.config.overwrite = overwrite;
        self.table.set_overwrite(overwrite)
    }

    /// 清空表格、周期统计和未取走的记录
    pub fn clear(&mut self) {
        self.poll();
        self.table.clear();
        self.tracker.clear();
        self.records.clear();
    }

    /// 取走自上次调用以来的记录（按接收顺序）
    pub fn take_records(&mut self) -> Vec<FrameRecord> {
        self.records.drain(..).collect()
    }

    pub fn table(&self) -> &AggregationTable {
        &self.table
    }

    pub fn tracker(&self) -> &CycleTracker {
        &self.tracker
    }

    pub fn status(&self) -> &MonitorStatus {
        &self.status
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn overwrite(&self) -> bool {
        self.table.mode().is_overwrite()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn channel(&self) -> &str {
        self.bus_config
            .as_ref()
            .map(|c| c.channel.as_str())
            .unwrap_or("")
    }

    /// 探测当前后端的候选通道
    pub fn scan_hardware(&self, bound: Duration) -> Vec<ChannelInfo> {
        discovery::scan_backend(self.backend.clone(), bound)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canspy_can::{MockBackend, MockEvent, RawFrame};
    use std::time::Instant;

    fn quick_config() -> MonitorConfig {
        MonitorConfig {
            receive_timeout_ms: 10,
            stop_grace_ms: 500,
            overwrite: true,
        }
    }

    #[test]
    fn test_join_timeout_ok_and_timeout() {
        let handle = thread::spawn(|| {});
        assert_eq!(handle.join_timeout(Duration::from_secs(1)), Ok(()));

        let handle = thread::spawn(|| thread::sleep(Duration::from_millis(300)));
        assert_eq!(
            handle.join_timeout(Duration::from_millis(10)),
            Err(JoinFailure::TimedOut)
        );
    }

    #[test]
    fn test_join_rx_thread_reports_stuck_and_panicked_threads() {
        let config = MonitorConfig {
            stop_grace_ms: 20,
            ..quick_config()
        };
        let mut monitor = Monitor::new(Arc::new(MockBackend::new()), config);
        assert!(monitor.join_rx_thread());

        monitor.rx_thread = Some(thread::spawn(|| {}));
        assert!(monitor.join_rx_thread());

        monitor.rx_thread = Some(thread::spawn(|| thread::sleep(Duration::from_millis(300))));
        assert!(!monitor.join_rx_thread());
        assert!(monitor.rx_thread.is_none());

        monitor.rx_thread = Some(thread::spawn(|| panic!("rx failure")));
        assert!(!monitor.join_rx_thread());
    }

    #[test]
    fn test_status_text() {
        assert_eq!(MonitorStatus::Disconnected.to_string(), "Disconnected.");
        assert_eq!(
            MonitorStatus::Receiving {
                bitrate: 500_000,
                fd: false
            }
            .to_string(),
            "Receiving messages at 500 kbps without FD"
        );
        assert_eq!(
            MonitorStatus::Receiving {
                bitrate: 1_000_000,
                fd: true
            }
            .to_string(),
            "Receiving messages at 1000 kbps with FD"
        );
        assert_eq!(
            MonitorStatus::Error("Bus off".into()).to_string(),
            "Error: Bus off"
        );
    }

    #[test]
    fn test_stop_without_start() {
        let mut monitor = Monitor::new(Arc::new(MockBackend::new()), quick_config());
        monitor.stop();
        monitor.stop();
        assert_eq!(monitor.state(), LoopState::Stopped);
        assert_eq!(monitor.status(), &MonitorStatus::Disconnected);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let backend = MockBackend::new();
        let mut monitor = Monitor::new(Arc::new(backend.clone()), quick_config());
        monitor.start(BusConfig::classic("mock0", 500_000)).unwrap();
        monitor.start(BusConfig::classic("mock1", 250_000)).unwrap();

        assert_eq!(backend.open_count(), 1);
        assert_eq!(monitor.bus_config().unwrap().channel, "mock0");
        monitor.stop();
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_configure_rules() {
        let backend = MockBackend::new();
        let mut monitor = Monitor::new(Arc::new(backend.clone()), quick_config());

        assert!(matches!(
            monitor.start_configured(),
            Err(MonitorError::NotConfigured)
        ));
        assert!(matches!(
            monitor.configure(BusConfig::classic("", 500_000)),
            Err(MonitorError::Config(_))
        ));
        assert!(monitor.bus_config().is_none());

        monitor.configure(BusConfig::classic("mock0", 500_000)).unwrap();
        monitor.start_configured().unwrap();
        assert!(matches!(
            monitor.configure(BusConfig::classic("mock1", 500_000)),
            Err(MonitorError::Busy)
        ));
        monitor.stop();
        monitor.configure(BusConfig::classic("mock1", 500_000)).unwrap();
        assert_eq!(monitor.bus_config().unwrap().channel, "mock1");
    }

    #[test]
    fn test_poll_applies_in_order() {
        let backend = MockBackend::new();
        backend.push_frames((0..5u16).map(|i| {
            RawFrame::new_standard(0x10 + i, &[i as u8]).with_timestamp(f64::from(i))
        }));
        let mut monitor = Monitor::new(Arc::new(backend), quick_config());
        monitor.start(BusConfig::classic("mock0", 500_000)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while monitor.table().len() < 5 && Instant::now() < deadline {
            monitor.poll();
            thread::sleep(Duration::from_millis(5));
        }

        let records = monitor.take_records();
        let ids: Vec<&str> = records.iter().map(|r| r.can_id.as_str()).collect();
        assert_eq!(ids, vec!["0x10", "0x11", "0x12", "0x13", "0x14"]);
        assert!(monitor.take_records().is_empty());
        assert!(monitor.is_running());
        monitor.stop();
        assert_eq!(monitor.metrics().records_applied, 5);
    }

    #[test]
    fn test_transport_error_sets_error_status() {
        let backend = MockBackend::new();
        backend.push(MockEvent::Frame(RawFrame::new_standard(0x1, &[])));
        backend.push(MockEvent::BusOff);
        let mut monitor = Monitor::new(Arc::new(backend.clone()), quick_config());
        monitor.start(BusConfig::classic("mock0", 500_000)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while monitor.is_running() && Instant::now() < deadline {
            monitor.poll();
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(monitor.state(), LoopState::Stopped);
        assert_eq!(monitor.status(), &MonitorStatus::Error("Bus off".into()));
        assert_eq!(monitor.table().len(), 1);
        assert_eq!(backend.shutdown_count(), 1);
    }

    #[test]
    fn test_drop_stops_and_releases() {
        let backend = MockBackend::new();
        {
            let mut monitor = Monitor::new(Arc::new(backend.clone()), quick_config());
            monitor.start(BusConfig::classic("mock0", 500_000)).unwrap();
        }
        assert_eq!(backend.shutdown_count(), 1);
        assert_eq!(backend.open_handles(), 0);
    }
}
