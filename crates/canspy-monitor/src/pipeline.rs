//! 接收流水线
//!
//! 接收线程只做一件事：带超时阻塞接收，把原始帧按到达顺序送进无界通道。
//! 归一化、周期统计和聚合表更新都在控制端（`Monitor::poll`）完成，
//! 因此 `CycleTracker` 和 `AggregationTable` 不需要任何锁。
//!
//! ```text
//! rx 线程: BusConnection::recv ──MonitorEvent──▶ 控制端: ingest()
//!                                                 normalize → observe → apply
//! ```

use crate::cycle::CycleTracker;
use crate::metrics::MonitorMetrics;
use crate::normalizer::{FrameRecord, normalize};
use crate::table::AggregationTable;
use canspy_can::{BusConnection, RawFrame};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, trace};

/// 接收线程发往控制端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// 收到一帧
    Frame(RawFrame),
    /// 接收线程已退出，通道已释放；`error` 为导致退出的传输错误
    Stopped { error: Option<String> },
}

/// 接收循环
///
/// 每次接收最多阻塞 `timeout`，之后检查 `is_running`。退出路径：
///
/// 1. `is_running` 被置为 `false`（`stop()`）
/// 2. 任何非超时的传输错误
/// 3. 控制端已丢弃接收端
///
/// 所有路径都在返回前关闭连接并发送 `Stopped`。
pub fn rx_loop(
    mut conn: BusConnection,
    tx: Sender<MonitorEvent>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<MonitorMetrics>,
    timeout: Duration,
) {
    info!("Receive loop started on '{}'", conn.channel());
    let mut failure = None;

    loop {
        // Acquire: 看到 false 时也能看到 stop() 之前的写入
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        match conn.recv(timeout) {
            Ok(Some(frame)) => {
                metrics.frames_received.fetch_add(1, Ordering::Relaxed);
                if tx.send(MonitorEvent::Frame(frame)).is_err() {
                    trace!("RX thread: event receiver dropped, exiting");
                    break;
                }
            },
            Ok(None) => {
                metrics.receive_timeouts.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                error!("Receive error on '{}': {}", conn.channel(), e);
                failure = Some(e.to_string());
                break;
            },
        }
    }

    conn.shutdown();
    is_running.store(false, Ordering::Release);
    info!("Receive loop on '{}' exited", conn.channel());
    let _ = tx.send(MonitorEvent::Stopped { error: failure });
}

/// 控制端处理一帧：归一化 → 周期统计 → 写入聚合表
///
/// 返回写入的记录，供展示层的记录流使用。
pub fn ingest(
    raw: &RawFrame,
    tracker: &mut CycleTracker,
    table: &mut AggregationTable,
) -> FrameRecord {
    let mut record = normalize(raw, table.mode().is_overwrite());
    let (cycle_time, count) = tracker.observe(raw.id, raw.timestamp);
    record.cycle_time = cycle_time;
    record.count = count;
    table.apply(&record);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use canspy_can::{BusConfig, CanDeviceError, CanDeviceErrorKind, MockBackend, MockEvent};
    use crossbeam_channel::unbounded;
    use std::thread;

    fn open(backend: &MockBackend) -> BusConnection {
        BusConnection::open(backend, &BusConfig::classic("mock0", 500_000)).unwrap()
    }

    #[test]
    fn test_rx_loop_forwards_frames_in_order() {
        let backend = MockBackend::new();
        backend.push_frames((0..10u16).map(|i| RawFrame::new_standard(0x100 + i, &[])));
        backend.push(MockEvent::BusOff);

        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(MonitorMetrics::new());
        rx_loop(
            open(&backend),
            tx,
            is_running.clone(),
            metrics.clone(),
            Duration::from_millis(5),
        );

        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 11);
        for (i, event) in events[..10].iter().enumerate() {
            match event {
                MonitorEvent::Frame(frame) => assert_eq!(frame.id, 0x100 + i as u32),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(
            events[10],
            MonitorEvent::Stopped {
                error: Some("Bus off".to_string())
            }
        );
        assert!(!is_running.load(Ordering::Acquire));
        assert_eq!(metrics.snapshot().transport_errors, 1);
        assert_eq!(backend.shutdown_count(), 1);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_rx_loop_stops_on_flag() {
        let backend = MockBackend::new();
        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(MonitorMetrics::new());

        let conn = open(&backend);
        let flag = is_running.clone();
        let loop_metrics = metrics.clone();
        let handle = thread::spawn(move || {
            rx_loop(conn, tx, flag, loop_metrics, Duration::from_millis(5))
        });

        thread::sleep(Duration::from_millis(30));
        is_running.store(false, Ordering::Release);
        handle.join().unwrap();

        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert_eq!(events, vec![MonitorEvent::Stopped { error: None }]);
        assert!(metrics.snapshot().receive_timeouts > 0);
        assert_eq!(backend.shutdown_count(), 1);
    }

    #[test]
    fn test_rx_loop_device_error_is_terminal() {
        let backend = MockBackend::new();
        backend.push(MockEvent::Fail(CanDeviceError::new(
            CanDeviceErrorKind::NoDevice,
            "unplugged",
        )));
        backend.push(MockEvent::Frame(RawFrame::new_standard(0x1, &[])));

        let (tx, rx) = unbounded();
        rx_loop(
            open(&backend),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(MonitorMetrics::new()),
            Duration::from_millis(5),
        );

        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            MonitorEvent::Stopped { error: Some(msg) } if msg.contains("unplugged")
        ));
    }

    #[test]
    fn test_rx_loop_exits_when_receiver_dropped() {
        let backend = MockBackend::new();
        backend.push_frames([RawFrame::new_standard(0x1, &[])]);
        let (tx, rx) = unbounded();
        drop(rx);

        rx_loop(
            open(&backend),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(MonitorMetrics::new()),
            Duration::from_millis(5),
        );
        assert_eq!(backend.shutdown_count(), 1);
    }

    #[test]
    fn test_ingest_fills_cycle_and_count() {
        let mut tracker = CycleTracker::new();
        let mut table = AggregationTable::new();

        let first = ingest(
            &RawFrame::new_standard(0x100, &[1]).with_timestamp(1.000),
            &mut tracker,
            &mut table,
        );
        assert_eq!(first.count, 1);
        assert_eq!(first.cycle_time_text(), "");

        let second = ingest(
            &RawFrame::new_standard(0x100, &[2]).with_timestamp(1.250),
            &mut tracker,
            &mut table,
        );
        assert_eq!(second.cycle_time_text(), "250.00 ms");
        assert_eq!(second.count, 2);
        assert!(second.overwrite);

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].count, 2);
        assert_eq!(table.rows()[0].data, "02");
    }
}
