//! SocketCAN 适配器实现
//!
//! Linux 平台下基于内核 SocketCAN 子系统的只读接收适配器。
//!
//! ## 特性
//!
//! - 支持标准帧 / 扩展帧 / 远程帧
//! - FD 模式下使用 `CanFdSocket` 同时接收经典帧和 FD 帧
//! - 自动过滤错误帧（Bus Off / 缓冲区溢出除外）
//! - 软件时间戳（接收时刻的 Unix 时间，秒）
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **接口配置**：波特率由系统工具（`ip link set can0 type can bitrate 500000 dbitrate 2000000 fd on`）
//!   完成，不在应用层设置
//! - **权限要求**：打开 socket 通常不需要特殊权限

use crate::{
    BusBackend, BusConfig, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, ChannelInfo,
    RawFrame,
};
use socketcan::{
    CanAnyFrame, CanError as SocketCanError, CanErrorFrame, CanFdSocket, CanFrame, CanSocket,
    EmbeddedFrame, Id, Socket,
};
use std::io;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, trace, warn};

mod interface_check;

pub use interface_check::{CAN_MTU, CANFD_MTU, InterfaceInfo, query_interface};

/// 默认读超时
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// SO_RCVTIMEO 为 0 表示无限阻塞，因此超时至少为 1ms
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// 底层 socket：经典模式只收 CAN 2.0 帧，FD 模式两种都收
enum RawSocket {
    Classic(CanSocket),
    Fd(CanFdSocket),
}

/// socket 读出的一帧
enum Received {
    Data(RawFrame),
    Error(CanErrorFrame),
}

fn to_raw_frame<F: EmbeddedFrame>(frame: &F, is_fd: bool, timestamp: f64) -> RawFrame {
    let data = EmbeddedFrame::data(frame);
    let raw = match EmbeddedFrame::id(frame) {
        Id::Standard(id) if is_fd => RawFrame::new_fd(u32::from(id.as_raw()), data, false),
        Id::Extended(id) if is_fd => RawFrame::new_fd(id.as_raw(), data, true),
        Id::Standard(id) => RawFrame::new_standard(id.as_raw(), data),
        Id::Extended(id) => RawFrame::new_extended(id.as_raw(), data),
    };
    raw.with_timestamp(timestamp)
}

fn decode_classic(frame: CanFrame, timestamp: f64) -> Received {
    match frame {
        CanFrame::Data(f) => Received::Data(to_raw_frame(&f, false, timestamp)),
        CanFrame::Remote(f) => Received::Data(
            to_raw_frame(&f, false, timestamp).with_dlc(EmbeddedFrame::dlc(&f) as u8),
        ),
        CanFrame::Error(f) => Received::Error(f),
    }
}

fn decode_any(frame: CanAnyFrame, timestamp: f64) -> Received {
    match frame {
        CanAnyFrame::Normal(f) => Received::Data(to_raw_frame(&f, false, timestamp)),
        CanAnyFrame::Remote(f) => Received::Data(
            to_raw_frame(&f, false, timestamp).with_dlc(EmbeddedFrame::dlc(&f) as u8),
        ),
        CanAnyFrame::Error(f) => Received::Error(f),
        CanAnyFrame::Fd(f) => Received::Data(to_raw_frame(&f, true, timestamp)),
    }
}

fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn open_error(interface: &str, e: io::Error) -> CanError {
    let kind = match e.kind() {
        io::ErrorKind::PermissionDenied => CanDeviceErrorKind::AccessDenied,
        io::ErrorKind::NotFound => CanDeviceErrorKind::NotFound,
        io::ErrorKind::AddrInUse | io::ErrorKind::ResourceBusy => CanDeviceErrorKind::Busy,
        _ => CanDeviceErrorKind::Backend,
    };
    CanError::Device(CanDeviceError::new(
        kind,
        format!("Failed to open CAN interface '{}': {}", interface, e),
    ))
}

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use canspy_can::{CanAdapter, SocketCanAdapter};
/// use std::time::Duration;
///
/// let mut adapter = SocketCanAdapter::new("can0", false).unwrap();
/// if let Ok(frame) = adapter.receive_timeout(Duration::from_secs(1)) {
///     println!("0x{:X}", frame.id);
/// }
/// ```
pub struct SocketCanAdapter {
    socket: Option<RawSocket>,
    interface: String,
    read_timeout: Duration,
    fd: bool,
}

impl SocketCanAdapter {
    /// 打开 SocketCAN 接口
    ///
    /// 打开前检查接口存在且处于 UP 状态；FD 模式还要求接口 MTU 为 72。
    ///
    /// # 错误
    /// - `CanError::Device(NotFound)`: 接口不存在或未启动
    /// - `CanError::Device(UnsupportedConfig)`: 请求 FD 但接口不支持
    /// - `CanError::Device(AccessDenied | Busy | Backend)`: 无法打开 socket
    pub fn new(interface: impl Into<String>, fd: bool) -> Result<Self, CanError> {
        let interface = interface.into();

        let info = query_interface(&interface)?;
        if !info.up {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotFound,
                format!(
                    "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                    interface, interface
                ),
            )));
        }
        if fd && !info.is_fd_capable() {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::UnsupportedConfig,
                format!(
                    "CAN interface '{}' is not CAN FD capable (mtu {}). Reconfigure it with:\n  sudo ip link set {} type can bitrate <N> dbitrate <M> fd on",
                    interface, info.mtu, interface
                ),
            )));
        }

        let socket = if fd {
            RawSocket::Fd(CanFdSocket::open(&interface).map_err(|e| open_error(&interface, e))?)
        } else {
            RawSocket::Classic(CanSocket::open(&interface).map_err(|e| open_error(&interface, e))?)
        };

        let mut adapter = Self {
            socket: Some(socket),
            interface,
            read_timeout: DEFAULT_READ_TIMEOUT,
            fd,
        };
        adapter.set_read_timeout(DEFAULT_READ_TIMEOUT)?;

        trace!(
            "SocketCAN interface '{}' opened ({} mode)",
            adapter.interface,
            if fd { "FD" } else { "classic" }
        );
        Ok(adapter)
    }

    /// 按连接配置打开
    pub fn open(config: &BusConfig) -> Result<Self, CanError> {
        config.validate()?;
        let mut adapter = Self::new(config.channel.clone(), config.fd)?;
        adapter.configure(config.bitrate, config.data_bitrate);
        Ok(adapter)
    }

    /// 记录期望的波特率
    ///
    /// SocketCAN 的波特率由 `ip link` 配置，应用层不修改。
    pub fn configure(&mut self, bitrate: u32, data_bitrate: Option<u32>) {
        trace!(
            "SocketCAN interface '{}' bitrate {} / data bitrate {:?} (set externally)",
            self.interface, bitrate, data_bitrate
        );
    }

    /// 接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 是否 FD 模式
    pub fn is_fd(&self) -> bool {
        self.fd
    }

    /// 当前读超时
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 设置读超时
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        match &self.socket {
            Some(RawSocket::Classic(s)) => s.set_read_timeout(timeout)?,
            Some(RawSocket::Fd(s)) => s.set_read_timeout(timeout)?,
            None => return Err(CanError::NotStarted),
        }
        self.read_timeout = timeout;
        Ok(())
    }

    fn read_once(&self) -> Result<Received, CanError> {
        let result = match &self.socket {
            Some(RawSocket::Classic(s)) => s
                .read_frame()
                .map(|f| decode_classic(f, wall_clock_seconds())),
            Some(RawSocket::Fd(s)) => s.read_frame().map(|f| decode_any(f, wall_clock_seconds())),
            None => return Err(CanError::NotStarted),
        };
        result.map_err(|e| {
            if is_timeout(&e) {
                CanError::Timeout
            } else {
                CanError::Io(e)
            }
        })
    }

    /// 处理错误帧：致命错误返回 `Err`，其余记录后忽略
    fn handle_error_frame(&self, frame: CanErrorFrame) -> Result<(), CanError> {
        let socketcan_error = SocketCanError::from(frame);
        match &socketcan_error {
            SocketCanError::BusOff => {
                error!("CAN Bus Off error detected on '{}'", self.interface);
                Err(CanError::BusOff)
            },
            SocketCanError::ControllerProblem(problem) => {
                let text = problem.to_string();
                if text.to_ascii_lowercase().contains("overflow") {
                    error!("CAN Buffer Overflow detected: {}", problem);
                    Err(CanError::BufferOverflow)
                } else {
                    warn!("CAN Controller Problem: {}, ignoring", problem);
                    Ok(())
                }
            },
            _ => {
                warn!("CAN Error Frame received: {}, ignoring", socketcan_error);
                Ok(())
            },
        }
    }
}

impl CanAdapter for SocketCanAdapter {
    /// 接收一帧有效数据帧
    ///
    /// 被忽略的错误帧不会延长总等待时间：截止时间由进入时的读超时决定。
    fn receive(&mut self) -> Result<RawFrame, CanError> {
        let budget = self.read_timeout;
        let deadline = Instant::now() + budget;

        let result = loop {
            match self.read_once() {
                Ok(Received::Data(frame)) => break Ok(frame),
                Ok(Received::Error(error_frame)) => {
                    if let Err(e) = self.handle_error_frame(error_frame) {
                        break Err(e);
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break Err(CanError::Timeout);
                    }
                    self.set_read_timeout(remaining)?;
                },
                Err(e) => break Err(e),
            }
        };

        if self.read_timeout != budget {
            let _ = self.set_read_timeout(budget);
        }

        if let Ok(frame) = &result {
            trace!(
                "Received CAN frame: ID=0x{:X}, len={}, fd={}",
                frame.id, frame.len, frame.is_fd
            );
        }
        result
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.set_read_timeout(timeout) {
            warn!("Failed to set receive timeout: {}", e);
        }
    }

    fn shutdown(&mut self) -> Result<(), CanError> {
        if self.socket.take().is_some() {
            trace!("SocketCAN interface '{}' closed", self.interface);
        }
        Ok(())
    }
}

/// SocketCAN 后端
#[derive(Debug, Clone)]
pub struct SocketCanBackend {
    candidates: Vec<String>,
}

impl SocketCanBackend {
    /// 默认候选：`can0..can7`、`vcan0..vcan3`
    pub fn new() -> Self {
        let candidates = (0..8)
            .map(|i| format!("can{}", i))
            .chain((0..4).map(|i| format!("vcan{}", i)))
            .collect();
        Self { candidates }
    }

    /// 自定义候选列表
    pub fn with_candidates(candidates: Vec<String>) -> Self {
        Self { candidates }
    }
}

impl Default for SocketCanBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BusBackend for SocketCanBackend {
    fn name(&self) -> &'static str {
        "socketcan"
    }

    fn open(&self, config: &BusConfig) -> Result<Box<dyn CanAdapter + Send>, CanError> {
        Ok(Box::new(SocketCanAdapter::open(config)?))
    }

    fn candidates(&self) -> Vec<String> {
        self.candidates.clone()
    }

    fn probe(&self, channel: &str) -> Result<ChannelInfo, CanError> {
        let info = query_interface(channel)?;
        if !info.up {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotFound,
                format!("CAN interface '{}' is DOWN", channel),
            )));
        }

        // 打开后立即关闭（离开作用域即释放）
        drop(CanSocket::open(channel).map_err(|e| open_error(channel, e))?);

        let fd_capable = info.is_fd_capable();
        Ok(ChannelInfo {
            channel: channel.to_string(),
            display_name: format!(
                "SocketCAN {} ({})",
                channel,
                if fd_capable { "CAN FD" } else { "CAN" }
            ),
            fd_capable,
        })
    }
}
