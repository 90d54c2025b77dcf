//! 原始 CAN 帧
//!
//! `RawFrame` 是硬件层和监视器核心之间的中间抽象：
//!
//! ```text
//! SocketCAN / Simulated / Mock 适配器
//!     ↓ RawFrame（所有权移交）
//! FrameNormalizer（canspy-monitor）
//!     ↓ FrameRecord
//! AggregationTable
//! ```
//!
//! 帧接收后不可变；归一化之后即被丢弃。

/// CAN 2.0 单帧最大数据长度
pub const MAX_CLASSIC_PAYLOAD: usize = 8;

/// CAN FD 单帧最大数据长度
pub const MAX_FD_PAYLOAD: usize = 64;

/// 标准帧 ID 掩码（11-bit）
pub const STANDARD_ID_MASK: u32 = 0x7FF;

/// 扩展帧 ID 掩码（29-bit）
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// 硬件层交付的原始帧
///
/// # 设计特性
///
/// - **Copy trait**：固定 64 字节数据区，无堆分配
/// - **时间戳**：浮点秒，来源可能是墙钟或单调时钟，核心只把它当作不透明的递增值
///
/// ```rust
/// use canspy_can::RawFrame;
///
/// let frame = RawFrame::new_standard(0x7FF, &[0xDE, 0xAD]).with_timestamp(1.25);
/// assert_eq!(frame.data_slice(), &[0xDE, 0xAD]);
/// assert_eq!(frame.dlc, 2);
/// assert!(!frame.is_fd);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFrame {
    /// CAN ID（标准帧或扩展帧，不含标志位）
    pub id: u32,

    /// 帧数据（固定 64 字节，未使用部分为 0）
    pub data: [u8; MAX_FD_PAYLOAD],

    /// 有效数据长度 (0-64)
    pub len: u8,

    /// 数据长度码（字节数；远程帧可能大于 `len`）
    pub dlc: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 是否为 CAN FD 帧
    pub is_fd: bool,

    /// 接收时间戳（秒）
    pub timestamp: f64,
}

impl RawFrame {
    /// 创建经典标准帧（数据超过 8 字节时截断）
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(u32::from(id) & STANDARD_ID_MASK, data, false, false)
    }

    /// 创建经典扩展帧（数据超过 8 字节时截断）
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id & EXTENDED_ID_MASK, data, true, false)
    }

    /// 创建 CAN FD 帧（数据超过 64 字节时截断）
    pub fn new_fd(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mask = if is_extended {
            EXTENDED_ID_MASK
        } else {
            STANDARD_ID_MASK
        };
        Self::new(id & mask, data, is_extended, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool, is_fd: bool) -> Self {
        let max = if is_fd {
            MAX_FD_PAYLOAD
        } else {
            MAX_CLASSIC_PAYLOAD
        };
        let len = data.len().min(max);
        let mut fixed = [0u8; MAX_FD_PAYLOAD];
        fixed[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed,
            len: len as u8,
            dlc: len as u8,
            is_extended,
            is_fd,
            timestamp: 0.0,
        }
    }

    /// 设置时间戳（秒）
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 设置数据长度码（用于远程帧）
    pub fn with_dlc(mut self, dlc: u8) -> Self {
        self.dlc = dlc;
        self
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}
