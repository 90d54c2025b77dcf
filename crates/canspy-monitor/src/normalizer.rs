//! 帧归一化
//!
//! 把硬件层的 [`RawFrame`] 转换为展示层使用的 [`FrameRecord`]。
//! 周期与计数字段由 [`CycleTracker`](crate::CycleTracker) 填写。

use canspy_can::RawFrame;
use canspy_can::frame::MAX_FD_PAYLOAD;
use chrono::{Local, TimeZone};
use std::fmt::{self, Write};
use tracing::debug;

/// 标识符前缀
pub const IDENTIFIER_PREFIX: &str = "0x";

/// 帧类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameType {
    /// 经典 CAN 帧
    Std,
    /// CAN FD 帧
    Fd,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Std => "STD",
            FrameType::Fd => "FD",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 归一化后的帧记录
///
/// 每收到一帧产生一条，由 `AggregationTable::apply` 消费一次。
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// 本地时间 `HH:MM:SS.mmm`
    pub timestamp: String,
    /// 原始数值 ID（用于周期统计）
    pub id: u32,
    /// 大写十六进制标识符，带 `0x` 前缀
    pub can_id: String,
    /// 帧类型
    pub msg_type: FrameType,
    /// 数据长度码 (0-64)，远程帧为请求的长度
    pub length: u8,
    /// 空格分隔的大写十六进制字节
    pub data: String,
    /// 周期（毫秒），首次出现时为 `None`
    pub cycle_time: Option<f64>,
    /// 自上次清空以来的出现次数
    pub count: u64,
    /// 产生记录时的覆盖模式标志
    pub overwrite: bool,
}

impl FrameRecord {
    /// 周期文本：`"250.00 ms"`，首次出现时为空串
    pub fn cycle_time_text(&self) -> String {
        format_cycle_time(self.cycle_time)
    }
}

/// 格式化周期
pub fn format_cycle_time(cycle_ms: Option<f64>) -> String {
    match cycle_ms {
        Some(ms) => format!("{:.2} ms", ms),
        None => String::new(),
    }
}

/// 格式化时间戳为本地时间 `HH:MM:SS.mmm`
///
/// 无法解释为时间的值（NaN、无穷、超出范围）回退为数字本身的字符串形式。
///
/// ```
/// use canspy_monitor::normalizer::format_timestamp;
///
/// assert!(format_timestamp(1.25).ends_with(".250"));
/// assert_eq!(format_timestamp(f64::NAN), "NaN");
/// ```
pub fn format_timestamp(timestamp: f64) -> String {
    if !timestamp.is_finite() || timestamp.abs() >= i64::MAX as f64 {
        debug!("Timestamp {} is not representable, using literal form", timestamp);
        return timestamp.to_string();
    }

    let secs = timestamp.floor();
    let millis = (((timestamp - secs) * 1000.0) as u32).min(999);

    match Local.timestamp_opt(secs as i64, 0).earliest() {
        Some(time) => format!("{}.{:03}", time.format("%H:%M:%S"), millis),
        None => {
            debug!("Timestamp {} is out of range, using literal form", timestamp);
            timestamp.to_string()
        },
    }
}

/// 格式化标识符：`0x7FF`、`0x18DAF110`
pub fn format_identifier(id: u32) -> String {
    format!("{}{:X}", IDENTIFIER_PREFIX, id)
}

/// 格式化数据：`[0xDE, 0xAD]` → `"DE AD"`
pub fn format_payload(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// 标识符的规范形式（用于表内查找，大小写不敏感）
///
/// `"0x7ff"`、`"0X7FF"`、`"7ff"` 都得到 `"0x7FF"`；非十六进制文本只做大写。
pub fn identifier_key(can_id: &str) -> String {
    let trimmed = can_id.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    match u32::from_str_radix(digits, 16) {
        Ok(id) => format_identifier(id),
        Err(_) => trimmed.to_ascii_uppercase(),
    }
}

/// 归一化一帧
///
/// 返回的记录 `cycle_time` 为 `None`、`count` 为 0，由调用方通过
/// `CycleTracker::observe` 补全。
pub fn normalize(raw: &RawFrame, overwrite: bool) -> FrameRecord {
    FrameRecord {
        timestamp: format_timestamp(raw.timestamp),
        id: raw.id,
        can_id: format_identifier(raw.id),
        msg_type: if raw.is_fd { FrameType::Fd } else { FrameType::Std },
        length: raw.dlc.min(MAX_FD_PAYLOAD as u8),
        data: format_payload(raw.data_slice()),
        cycle_time: None,
        count: 0,
        overwrite,
    }
}
