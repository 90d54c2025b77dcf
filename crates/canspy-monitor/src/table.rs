//! 聚合表
//!
//! 展示层看到的行集合，两种模式：
//!
//! - **Overwrite**：每个标识符至多一行，新帧原地更新该行（位置不变）
//! - **Append**：每帧追加一行，不设上限
//!
//! 行号列始终是当前行序下连续的 1..N。覆盖模式下的查找只依赖
//! 标识符索引（规范化后的 `0x` + 大写十六进制），与展示排序无关。

use crate::normalizer::{FrameRecord, FrameType, format_cycle_time, identifier_key};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// 展示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// 每个标识符一行
    #[default]
    Overwrite,
    /// 每帧一行
    Append,
}

impl DisplayMode {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            DisplayMode::Overwrite
        } else {
            DisplayMode::Append
        }
    }

    pub fn is_overwrite(&self) -> bool {
        matches!(self, DisplayMode::Overwrite)
    }
}

/// 表中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based 行号
    pub index: usize,
    pub timestamp: String,
    pub can_id: String,
    pub msg_type: FrameType,
    pub length: u8,
    pub data: String,
    /// 周期（毫秒）
    pub cycle_time: Option<f64>,
    pub count: u64,
}

impl Row {
    fn from_record(index: usize, record: &FrameRecord) -> Self {
        Self {
            index,
            timestamp: record.timestamp.clone(),
            can_id: identifier_key(&record.can_id),
            msg_type: record.msg_type,
            length: record.length,
            data: record.data.clone(),
            cycle_time: record.cycle_time,
            count: record.count,
        }
    }

    /// 原地更新可变字段，行号和标识符不变
    fn update(&mut self, record: &FrameRecord) {
        self.timestamp.clone_from(&record.timestamp);
        self.msg_type = record.msg_type;
        self.length = record.length;
        self.data.clone_from(&record.data);
        self.cycle_time = record.cycle_time;
        self.count = record.count;
    }

    /// 周期文本，首次出现时为空串
    pub fn cycle_time_text(&self) -> String {
        format_cycle_time(self.cycle_time)
    }
}

/// 可排序的列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Index,
    Timestamp,
    Identifier,
    Type,
    Length,
    Data,
    CycleTime,
    Count,
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "index" | "#" => Ok(SortColumn::Index),
            "timestamp" | "time" => Ok(SortColumn::Timestamp),
            "identifier" | "id" | "can_id" => Ok(SortColumn::Identifier),
            "type" => Ok(SortColumn::Type),
            "length" | "len" | "dlc" => Ok(SortColumn::Length),
            "data" => Ok(SortColumn::Data),
            "cycle" | "cycle_time" => Ok(SortColumn::CycleTime),
            "count" => Ok(SortColumn::Count),
            other => Err(format!("unknown sort column '{}'", other)),
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortColumn::Index => "index",
            SortColumn::Timestamp => "timestamp",
            SortColumn::Identifier => "identifier",
            SortColumn::Type => "type",
            SortColumn::Length => "length",
            SortColumn::Data => "data",
            SortColumn::CycleTime => "cycle_time",
            SortColumn::Count => "count",
        };
        f.write_str(name)
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

fn parse_hex_identifier(can_id: &str) -> Option<u32> {
    let digits = can_id
        .strip_prefix("0x")
        .or_else(|| can_id.strip_prefix("0X"))
        .unwrap_or(can_id);
    u32::from_str_radix(digits, 16).ok()
}

/// 十六进制按数值比较，无法解析时退回字符串比较
fn compare_identifiers(a: &str, b: &str) -> Ordering {
    match (parse_hex_identifier(a), parse_hex_identifier(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn compare_rows(a: &Row, b: &Row, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Index => a.index.cmp(&b.index),
        SortColumn::Timestamp => a.timestamp.cmp(&b.timestamp),
        SortColumn::Identifier => compare_identifiers(&a.can_id, &b.can_id),
        SortColumn::Type => a.msg_type.cmp(&b.msg_type),
        SortColumn::Length => a.length.cmp(&b.length),
        SortColumn::Data => a.data.cmp(&b.data),
        SortColumn::CycleTime => match (a.cycle_time, b.cycle_time) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortColumn::Count => a.count.cmp(&b.count),
    }
}

/// 聚合表
///
/// ```
/// use canspy_can::RawFrame;
/// use canspy_monitor::{AggregationTable, normalizer::normalize};
///
/// let mut table = AggregationTable::new();
/// let mut record = normalize(&RawFrame::new_standard(0x7FF, &[0xDE, 0xAD]), true);
/// record.count = 1;
/// table.apply(&record);
/// table.apply(&record);
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.rows()[0].data, "DE AD");
/// ```
#[derive(Debug, Default, Clone)]
pub struct AggregationTable {
    rows: Vec<Row>,
    /// 覆盖模式下：规范标识符 → 行位置
    index: HashMap<String, usize>,
    mode: DisplayMode,
}

impl AggregationTable {
    /// 创建覆盖模式的空表
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: DisplayMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// 当前行序下的全部行
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 查找某标识符最新的一行（大小写不敏感）
    pub fn row_for(&self, can_id: &str) -> Option<&Row> {
        let key = identifier_key(can_id);
        match self.mode {
            DisplayMode::Overwrite => self.index.get(&key).and_then(|&pos| self.rows.get(pos)),
            DisplayMode::Append => self
                .rows
                .iter()
                .rev()
                .find(|row| identifier_key(&row.can_id) == key),
        }
    }

    /// 应用一条记录
    ///
    /// 覆盖模式下已有该标识符时原地更新，否则在末尾追加。
    pub fn apply(&mut self, record: &FrameRecord) {
        if self.mode.is_overwrite() {
            let key = identifier_key(&record.can_id);
            if let Some(&pos) = self.index.get(&key) {
                self.rows[pos].update(record);
                return;
            }
            self.index.insert(key, self.rows.len());
        }

        let position = self.rows.len() + 1;
        self.rows.push(Row::from_record(position, record));
    }

    /// 切换模式
    ///
    /// Append → Overwrite 时去重：每个标识符只保留当前行序中最后一行，
    /// 返回删除的行数。Overwrite → Append 不改动任何行。
    pub fn set_mode(&mut self, mode: DisplayMode) -> usize {
        if mode == self.mode {
            return 0;
        }
        self.mode = mode;

        match mode {
            DisplayMode::Append => {
                self.index.clear();
                0
            },
            DisplayMode::Overwrite => {
                let removed = self.dedup_keep_last();
                debug!("Switched to overwrite mode, {} duplicate rows removed", removed);
                removed
            },
        }
    }

    pub fn set_overwrite(&mut self, overwrite: bool) -> usize {
        self.set_mode(DisplayMode::from_overwrite(overwrite))
    }

    fn dedup_keep_last(&mut self) -> usize {
        let before = self.rows.len();

        let mut seen = HashSet::new();
        let mut keep = vec![false; before];
        for (pos, row) in self.rows.iter().enumerate().rev() {
            keep[pos] = seen.insert(identifier_key(&row.can_id));
        }
        let mut flags = keep.into_iter();
        self.rows.retain(|_| flags.next().unwrap_or(false));

        self.rebuild_index();
        self.renumber();
        before - self.rows.len()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(pos, row)| (identifier_key(&row.can_id), pos))
            .collect();
    }

    fn renumber(&mut self) {
        for (pos, row) in self.rows.iter_mut().enumerate() {
            row.index = pos + 1;
        }
    }

    /// 删除全部行
    ///
    /// 调用方需同时清空 `CycleTracker`，否则计数不会从 1 重新开始。
    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    /// 展示用排序视图，不改变存储顺序和索引
    pub fn sorted(&self, column: SortColumn, order: SortOrder) -> Vec<&Row> {
        let mut view: Vec<&Row> = self.rows.iter().collect();
        view.sort_by(|a, b| {
            let ordering = compare_rows(a, b, column);
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(can_id: &str, data: &str, count: u64) -> FrameRecord {
        FrameRecord {
            timestamp: "12:00:00.000".to_string(),
            id: parse_hex_identifier(can_id).unwrap_or(0),
            can_id: can_id.to_string(),
            msg_type: FrameType::Std,
            length: 1,
            data: data.to_string(),
            cycle_time: None,
            count,
            overwrite: true,
        }
    }

    fn indices(table: &AggregationTable) -> Vec<usize> {
        table.rows().iter().map(|r| r.index).collect()
    }

    #[test]
    fn test_overwrite_updates_in_place() {
        let mut table = AggregationTable::new();
        table.apply(&record("0x100", "01", 1));
        table.apply(&record("0x200", "02", 1));
        table.apply(&record("0x100", "03", 2));

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].can_id, "0x100");
        assert_eq!(table.rows()[0].data, "03");
        assert_eq!(table.rows()[0].count, 2);
        assert_eq!(indices(&table), vec![1, 2]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut table = AggregationTable::new();
        table.apply(&record("0x7ff", "AA", 1));
        table.apply(&record("0x7FF", "BB", 2));
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].can_id, "0x7FF");
        assert_eq!(table.row_for("0X7fF").unwrap().data, "BB");

        let mut table = AggregationTable::with_mode(DisplayMode::Append);
        table.apply(&record("0x1a0", "CC", 1));
        assert_eq!(table.rows()[0].can_id, "0x1A0");
    }

    #[test]
    fn test_append_accumulates() {
        let mut table = AggregationTable::with_mode(DisplayMode::Append);
        for i in 0..5 {
            table.apply(&record("0x100", &format!("{:02X}", i), i + 1));
        }
        assert_eq!(table.len(), 5);
        assert_eq!(indices(&table), vec![1, 2, 3, 4, 5]);
        assert_eq!(table.row_for("0x100").unwrap().data, "04");
    }

    #[test]
    fn test_overwrite_to_append_is_noop() {
        let mut table = AggregationTable::new();
        table.apply(&record("0x1", "01", 1));
        table.apply(&record("0x2", "02", 1));
        let before = table.rows().to_vec();

        assert_eq!(table.set_mode(DisplayMode::Append), 0);
        assert_eq!(table.rows(), before.as_slice());

        table.apply(&record("0x1", "03", 2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_append_to_overwrite_keeps_last() {
        let mut table = AggregationTable::with_mode(DisplayMode::Append);
        table.apply(&record("0x1", "A1", 1));
        table.apply(&record("0x2", "B1", 1));
        table.apply(&record("0x1", "A2", 2));
        table.apply(&record("0x3", "C1", 1));
        table.apply(&record("0x2", "B2", 2));

        assert_eq!(table.set_overwrite(true), 2);
        let ids: Vec<&str> = table.rows().iter().map(|r| r.can_id.as_str()).collect();
        assert_eq!(ids, vec!["0x1", "0x3", "0x2"]);
        assert_eq!(table.rows()[0].data, "A2");
        assert_eq!(table.rows()[2].data, "B2");
        assert_eq!(indices(&table), vec![1, 2, 3]);

        // 去重后索引可用
        table.apply(&record("0x2", "B3", 3));
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[2].data, "B3");
    }

    #[test]
    fn test_clear() {
        let mut table = AggregationTable::new();
        table.apply(&record("0x1", "01", 1));
        table.clear();
        assert!(table.is_empty());
        assert!(table.row_for("0x1").is_none());
        table.apply(&record("0x1", "02", 1));
        assert_eq!(indices(&table), vec![1]);
    }

    #[test]
    fn test_sorted_identifier_is_numeric() {
        let mut table = AggregationTable::new();
        table.apply(&record("0x100", "", 1));
        table.apply(&record("0x20", "", 1));
        table.apply(&record("0x18DAF110", "", 1));

        let view = table.sorted(SortColumn::Identifier, SortOrder::Ascending);
        let ids: Vec<&str> = view.iter().map(|r| r.can_id.as_str()).collect();
        assert_eq!(ids, vec!["0x20", "0x100", "0x18DAF110"]);

        let view = table.sorted(SortColumn::Identifier, SortOrder::Descending);
        assert_eq!(view[0].can_id, "0x18DAF110");

        // 存储顺序不变
        assert_eq!(table.rows()[0].can_id, "0x100");
        assert_eq!(indices(&table), vec![1, 2, 3]);
    }

    #[test]
    fn test_sorted_identifier_falls_back_to_string() {
        assert_eq!(compare_identifiers("0x10", "0x9"), Ordering::Greater);
        assert_eq!(compare_identifiers("zz", "0x9"), "zz".cmp("0x9"));
    }

    #[test]
    fn test_sorted_cycle_time_puts_empty_first() {
        let mut table = AggregationTable::new();
        let mut a = record("0x1", "", 2);
        a.cycle_time = Some(100.0);
        let b = record("0x2", "", 1);
        let mut c = record("0x3", "", 2);
        c.cycle_time = Some(20.0);
        table.apply(&a);
        table.apply(&b);
        table.apply(&c);

        let view = table.sorted(SortColumn::CycleTime, SortOrder::Ascending);
        let ids: Vec<&str> = view.iter().map(|r| r.can_id.as_str()).collect();
        assert_eq!(ids, vec!["0x2", "0x3", "0x1"]);
    }

    #[test]
    fn test_sort_column_parse() {
        assert_eq!("id".parse::<SortColumn>().unwrap(), SortColumn::Identifier);
        assert_eq!("Cycle".parse::<SortColumn>().unwrap(), SortColumn::CycleTime);
        assert!("colour".parse::<SortColumn>().is_err());
    }
}
