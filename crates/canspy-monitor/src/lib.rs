//! # CANspy Monitor
//!
//! 帧接收与实时聚合引擎：
//!
//! - [`normalizer`]: `RawFrame` → `FrameRecord`（时间、十六进制 ID、类型、数据）
//! - [`CycleTracker`]: 每个 ID 的周期（毫秒）与出现次数
//! - [`AggregationTable`]: 覆盖 / 追加两种模式的展示表
//! - [`pipeline`]: 接收线程与控制端之间的有序事件通道
//! - [`Monitor`]: STOPPED ⇄ RUNNING 生命周期控制
//! - [`discovery`]: 候选通道探测
//!
//! ## 线程模型
//!
//! 接收线程只负责阻塞接收并按顺序转发原始帧；周期统计和表格更新都在
//! 调用 [`Monitor::poll`] 的控制端线程上完成，两张表都不需要加锁。

pub mod builder;
pub mod config;
pub mod cycle;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod normalizer;
pub mod pipeline;
pub mod table;

pub use builder::MonitorBuilder;
pub use config::MonitorConfig;
pub use cycle::{CycleEntry, CycleTracker};
pub use discovery::{DEFAULT_PROBE_BOUND, PROBE_RELEASE_GRACE, scan, scan_backend};
pub use error::MonitorError;
pub use metrics::{MetricsSnapshot, MonitorMetrics};
pub use monitor::{LoopState, Monitor, MonitorStatus};
pub use normalizer::{FrameRecord, FrameType, normalize};
pub use pipeline::{MonitorEvent, ingest, rx_loop};
pub use table::{AggregationTable, DisplayMode, Row, SortColumn, SortOrder};
