//! 终端表格渲染

use canspy_monitor::{AggregationTable, MetricsSnapshot, MonitorStatus, Row, SortColumn, SortOrder};
use std::fmt::Write;

/// 渲染选项
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// 展示排序；`None` 时按存储顺序
    pub sort: Option<(SortColumn, SortOrder)>,
    /// 最多显示的行数，0 表示不限
    pub max_rows: usize,
}

const HEADER: [&str; 8] = [
    "#",
    "Timestamp",
    "CAN ID",
    "Type",
    "Len",
    "Data",
    "Cycle Time",
    "Count",
];

fn row_cells(row: &Row) -> [String; 8] {
    [
        row.index.to_string(),
        row.timestamp.clone(),
        row.can_id.clone(),
        row.msg_type.to_string(),
        row.length.to_string(),
        row.data.clone(),
        row.cycle_time_text(),
        row.count.to_string(),
    ]
}

/// 渲染一屏：状态行 + 表格
///
/// 行数超过 `max_rows` 时保留视图末尾的行（追加模式下即最新的帧），
/// 被省略的行数显示在表头上方。
pub fn render_screen(
    table: &AggregationTable,
    status: &MonitorStatus,
    metrics: &MetricsSnapshot,
    rate: f64,
    options: &RenderOptions,
) -> String {
    let view: Vec<&Row> = match options.sort {
        Some((column, order)) => table.sorted(column, order),
        None => table.rows().iter().collect(),
    };
    let skip = if options.max_rows > 0 {
        view.len().saturating_sub(options.max_rows)
    } else {
        0
    };
    let cells: Vec<[String; 8]> = view[skip..].iter().map(|row| row_cells(row)).collect();

    let mut widths = HEADER.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  |  {} rows, {} frames, {:.0} fps",
        status,
        table.len(),
        metrics.frames_received,
        rate
    );
    if skip > 0 {
        let _ = writeln!(out, "... {} earlier rows", skip);
    }
    push_line(&mut out, &HEADER.map(String::from), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String; 8], widths: &[usize; 8]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}
