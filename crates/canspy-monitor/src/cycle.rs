//! 周期统计
//!
//! 每个标识符记录上一次时间戳和出现次数，计算相邻两帧的间隔（毫秒）。
//! 总线时钟不可信：负的或为零的间隔照常记录，只输出 debug 日志。

use std::collections::HashMap;
use tracing::debug;

/// 单个标识符的统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleEntry {
    /// 上一次可用的时间戳（秒）
    pub last: Option<f64>,
    /// 自上次清空以来的帧数（≥1）
    pub count: u64,
}

/// 按标识符统计周期与次数
#[derive(Debug, Default, Clone)]
pub struct CycleTracker {
    entries: HashMap<u32, CycleEntry>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次观测，返回 `(周期毫秒, 次数)`
    ///
    /// - 首次出现：`(None, 1)`
    /// - 之后：`(Some((ts - last) * 1000), count + 1)`
    /// - 非有限时间戳：次数照常递增，本次无周期，不更新 `last`
    ///
    /// ```
    /// use canspy_monitor::CycleTracker;
    ///
    /// let mut tracker = CycleTracker::new();
    /// assert_eq!(tracker.observe(0x100, 1.000), (None, 1));
    /// let (cycle, count) = tracker.observe(0x100, 1.250);
    /// assert_eq!(count, 2);
    /// assert!((cycle.unwrap() - 250.0).abs() < 1e-9);
    /// ```
    pub fn observe(&mut self, id: u32, timestamp: f64) -> (Option<f64>, u64) {
        let valid = timestamp.is_finite().then_some(timestamp);
        if valid.is_none() {
            debug!("ID 0x{:X}: non-numeric timestamp {}, no cycle time", id, timestamp);
        }

        let entry = self
            .entries
            .entry(id)
            .or_insert(CycleEntry { last: None, count: 0 });
        entry.count += 1;

        let cycle = match (entry.last, valid) {
            (Some(last), Some(now)) => {
                let cycle = (now - last) * 1000.0;
                if cycle <= 0.0 {
                    debug!("ID 0x{:X}: non-positive cycle time {:.3} ms", id, cycle);
                }
                Some(cycle)
            },
            _ => None,
        };

        if valid.is_some() {
            entry.last = valid;
        }
        (cycle, entry.count)
    }

    /// 某标识符的统计
    pub fn get(&self, id: u32) -> Option<&CycleEntry> {
        self.entries.get(&id)
    }

    /// 已出现的标识符数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 清空全部统计
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation() {
        let mut tracker = CycleTracker::new();
        assert_eq!(tracker.observe(0x100, 10.0), (None, 1));
        assert_eq!(tracker.get(0x100).unwrap().last, Some(10.0));
    }

    #[test]
    fn test_cycle_in_milliseconds() {
        let mut tracker = CycleTracker::new();
        tracker.observe(0x100, 1.000);
        let (cycle, count) = tracker.observe(0x100, 1.250);
        assert_eq!(count, 2);
        assert_eq!(format!("{:.2} ms", cycle.unwrap()), "250.00 ms");
    }

    #[test]
    fn test_identifiers_are_independent() {
        let mut tracker = CycleTracker::new();
        tracker.observe(0x100, 1.0);
        assert_eq!(tracker.observe(0x200, 1.5), (None, 1));
        let (cycle, count) = tracker.observe(0x100, 1.5);
        assert_eq!(count, 2);
        assert!((cycle.unwrap() - 500.0).abs() < 1e-9);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_negative_and_zero_cycles_are_recorded() {
        let mut tracker = CycleTracker::new();
        tracker.observe(0x1, 2.0);
        let (cycle, _) = tracker.observe(0x1, 1.5);
        assert!((cycle.unwrap() + 500.0).abs() < 1e-9);
        assert_eq!(tracker.get(0x1).unwrap().last, Some(1.5));

        let (cycle, count) = tracker.observe(0x1, 1.5);
        assert_eq!(cycle, Some(0.0));
        assert_eq!(count, 3);
    }

    #[test]
    fn test_non_finite_timestamp_degrades() {
        let mut tracker = CycleTracker::new();
        tracker.observe(0x1, 1.0);
        assert_eq!(tracker.observe(0x1, f64::NAN), (None, 2));
        assert_eq!(tracker.get(0x1).unwrap().last, Some(1.0));

        let (cycle, count) = tracker.observe(0x1, 1.1);
        assert_eq!(count, 3);
        assert!((cycle.unwrap() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_clear_restarts_counts() {
        let mut tracker = CycleTracker::new();
        tracker.observe(0x1, 1.0);
        tracker.observe(0x1, 2.0);
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.observe(0x1, 3.0), (None, 1));
    }
}
