//! 脚本化 Mock 后端（无硬件依赖）
//!
//! 用于测试：按脚本依次返回帧、超时或传输错误，并记录打开/关闭次数，
//! 以便验证“通道只释放一次”“探测后不残留句柄”等约束。

use crate::{
    BusBackend, BusConfig, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, ChannelInfo,
    RawFrame,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Mock 接收脚本中的一步
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// 返回一帧
    Frame(RawFrame),
    /// 等满超时后返回超时
    Timeout,
    /// 返回设备错误
    Fail(CanDeviceError),
    /// 返回 Bus Off
    BusOff,
    /// 无视超时阻塞给定时长后返回超时（模拟卡住的驱动）
    Stall(Duration),
}

#[derive(Default)]
struct MockShared {
    script: Mutex<VecDeque<MockEvent>>,
    channels: Mutex<Vec<ChannelInfo>>,
    candidates: Mutex<Vec<String>>,
    open_error: Mutex<Option<CanDeviceError>>,
    probe_delay: Mutex<Duration>,
    last_config: Mutex<Option<BusConfig>>,
    opens: AtomicUsize,
    shutdowns: AtomicUsize,
    handles: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock 适配器
pub struct MockCanAdapter {
    events: VecDeque<MockEvent>,
    shared: Option<Arc<MockShared>>,
    timeout: Duration,
    open: bool,
}

impl MockCanAdapter {
    /// 创建独立的 Mock 适配器（不关联后端计数）
    pub fn new(events: Vec<MockEvent>) -> Self {
        Self {
            events: VecDeque::from(events),
            shared: None,
            timeout: Duration::from_millis(10),
            open: true,
        }
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            if let Some(shared) = &self.shared {
                shared.handles.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

impl CanAdapter for MockCanAdapter {
    fn receive(&mut self) -> Result<RawFrame, CanError> {
        if !self.open {
            return Err(CanError::NotStarted);
        }

        match self.events.pop_front() {
            Some(MockEvent::Frame(frame)) => Ok(frame),
            Some(MockEvent::Fail(e)) => Err(CanError::Device(e)),
            Some(MockEvent::BusOff) => Err(CanError::BusOff),
            Some(MockEvent::Stall(duration)) => {
                thread::sleep(duration);
                Err(CanError::Timeout)
            },
            Some(MockEvent::Timeout) | None => {
                thread::sleep(self.timeout);
                Err(CanError::Timeout)
            },
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn shutdown(&mut self) -> Result<(), CanError> {
        if self.open {
            if let Some(shared) = &self.shared {
                shared.shutdowns.fetch_add(1, Ordering::SeqCst);
            }
            self.release();
        }
        Ok(())
    }
}

impl Drop for MockCanAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mock 后端
///
/// 克隆后共享同一份脚本和计数器，便于在测试中把一份交给监视器、一份留作断言。
///
/// ```
/// use canspy_can::{BusConfig, BusConnection, MockBackend, MockEvent, RawFrame};
/// use std::time::Duration;
///
/// let backend = MockBackend::new();
/// backend.push(MockEvent::Frame(RawFrame::new_standard(0x100, &[1, 2])));
///
/// let mut conn = BusConnection::open(&backend, &BusConfig::classic("mock0", 500_000)).unwrap();
/// let frame = conn.recv(Duration::from_millis(10)).unwrap().unwrap();
/// assert_eq!(frame.id, 0x100);
/// drop(conn);
/// assert_eq!(backend.shutdown_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    shared: Arc<MockShared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个可探测到的通道
    pub fn with_channel(self, channel: impl Into<String>, fd_capable: bool) -> Self {
        let channel = channel.into();
        lock(&self.shared.candidates).push(channel.clone());
        lock(&self.shared.channels).push(ChannelInfo {
            display_name: format!("Mock {}", channel),
            channel,
            fd_capable,
        });
        self
    }

    /// 追加一个探测会失败的候选通道
    pub fn with_candidate(self, channel: impl Into<String>) -> Self {
        lock(&self.shared.candidates).push(channel.into());
        self
    }

    /// 每次探测占用通道的时长
    pub fn with_probe_delay(self, delay: Duration) -> Self {
        *lock(&self.shared.probe_delay) = delay;
        self
    }

    /// 让后续的 `open` 失败
    pub fn fail_open(&self, error: CanDeviceError) {
        *lock(&self.shared.open_error) = Some(error);
    }

    /// 追加脚本事件（由下一次 `open` 得到的适配器消费）
    pub fn push(&self, event: MockEvent) {
        lock(&self.shared.script).push_back(event);
    }

    /// 追加一组帧
    pub fn push_frames(&self, frames: impl IntoIterator<Item = RawFrame>) {
        let mut script = lock(&self.shared.script);
        script.extend(frames.into_iter().map(MockEvent::Frame));
    }

    /// 成功打开次数
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// 显式关闭次数
    pub fn shutdown_count(&self) -> usize {
        self.shared.shutdowns.load(Ordering::SeqCst)
    }

    /// 当前仍被持有的通道数
    pub fn open_handles(&self) -> usize {
        self.shared.handles.load(Ordering::SeqCst)
    }

    /// 最近一次 `open` 使用的配置
    pub fn last_config(&self) -> Option<BusConfig> {
        lock(&self.shared.last_config).clone()
    }
}

impl BusBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, config: &BusConfig) -> Result<Box<dyn CanAdapter + Send>, CanError> {
        if let Some(error) = lock(&self.shared.open_error).clone() {
            return Err(CanError::Device(error));
        }

        *lock(&self.shared.last_config) = Some(config.clone());
        let events = std::mem::take(&mut *lock(&self.shared.script));

        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockCanAdapter {
            events,
            shared: Some(self.shared.clone()),
            timeout: Duration::from_millis(10),
            open: true,
        }))
    }

    fn candidates(&self) -> Vec<String> {
        lock(&self.shared.candidates).clone()
    }

    fn probe(&self, channel: &str) -> Result<ChannelInfo, CanError> {
        let info = lock(&self.shared.channels)
            .iter()
            .find(|info| info.channel == channel)
            .cloned()
            .ok_or_else(|| {
                CanDeviceError::new(
                    CanDeviceErrorKind::NotFound,
                    format!("mock channel '{}' not present", channel),
                )
            })?;

        // 探测 = 打开后立即释放；慢探测在延迟期间一直占用通道
        self.shared.handles.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.shared.probe_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.shared.handles.fetch_sub(1, Ordering::SeqCst);
        Ok(info)
    }
}
