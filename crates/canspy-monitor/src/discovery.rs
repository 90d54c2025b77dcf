//! 硬件发现
//!
//! 对固定的候选通道逐个探测（打开后立即释放）。探测是尽力而为、非独占的：
//! 失败或超时的候选直接略过，不视为错误；探测成功也不代表之后一定能打开。
//!
//! `scan` 返回前会等待超时的探测线程释放通道，最多 [`PROBE_RELEASE_GRACE`]。
//! 驱动卡死超过该时限时只记录警告，此后通道可能仍被占用。

use canspy_can::{BusBackend, ChannelInfo};
use crossbeam_channel::{RecvTimeoutError, bounded};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 默认探测时限
pub const DEFAULT_PROBE_BOUND: Duration = Duration::from_millis(200);

/// 超时的探测线程释放通道的最长等待
pub const PROBE_RELEASE_GRACE: Duration = Duration::from_secs(1);

/// 探测候选通道，按候选顺序返回可用的通道
///
/// 每个候选在独立线程上探测，最多等待 `bound`；超时的候选不计入结果，
/// 但返回前仍等它们释放通道（最多 [`PROBE_RELEASE_GRACE`]）。
///
/// ```
/// use canspy_can::MockBackend;
/// use canspy_monitor::discovery::{scan, DEFAULT_PROBE_BOUND};
/// use std::sync::Arc;
///
/// let backend = Arc::new(MockBackend::new().with_channel("mock0", true).with_candidate("mock1"));
/// let found = scan(backend, &["mock0".into(), "mock1".into()], DEFAULT_PROBE_BOUND);
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].channel, "mock0");
/// ```
pub fn scan(
    backend: Arc<dyn BusBackend>,
    candidates: &[String],
    bound: Duration,
) -> Vec<ChannelInfo> {
    let deadline = Instant::now() + bound;

    let pending: Vec<_> = candidates
        .iter()
        .map(|channel| {
            let (tx, rx) = bounded(1);
            let backend = backend.clone();
            let probe_channel = channel.clone();
            let spawned = thread::Builder::new()
                .name(format!("canspy-probe-{}", channel))
                .spawn(move || {
                    let _ = tx.send(backend.probe(&probe_channel));
                });
            if let Err(e) = spawned {
                debug!("Probe of '{}' not started: {}", channel, e);
            }
            (channel, rx)
        })
        .collect();

    let mut found = Vec::new();
    let mut stragglers = Vec::new();
    for (channel, rx) in pending {
        match rx.recv_deadline(deadline) {
            Ok(Ok(info)) => {
                debug!("Probe of '{}' succeeded: {}", channel, info.display_name);
                found.push(info);
            },
            Ok(Err(e)) => debug!("Probe of '{}' failed: {}", channel, e),
            Err(RecvTimeoutError::Timeout) => {
                debug!("Probe of '{}' did not finish within {:?}", channel, bound);
                stragglers.push((channel, rx));
            },
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Probe of '{}' ended without a result", channel)
            },
        }
    }

    // 探测线程发送结果时已释放通道
    let release_deadline = Instant::now() + PROBE_RELEASE_GRACE;
    for (channel, rx) in stragglers {
        if let Err(RecvTimeoutError::Timeout) = rx.recv_deadline(release_deadline) {
            warn!(
                "Probe of '{}' still running after {:?}, channel may stay open",
                channel, PROBE_RELEASE_GRACE
            );
        }
    }

    debug!(
        "{} scan: {}/{} channels available",
        backend.name(),
        found.len(),
        candidates.len()
    );
    found
}

/// 探测后端自带的候选列表
pub fn scan_backend(backend: Arc<dyn BusBackend>, bound: Duration) -> Vec<ChannelInfo> {
    let candidates = backend.candidates();
    scan(backend, &candidates, bound)
}
