//! Text and JSON output
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs

use crate::dashboard::{Dashboard, DefectView, ProgressView, Tab, ViewState};
use serde::Serialize;

/// Longest plan name shown in the record table before truncation
const PLAN_NAME_WIDTH: usize = 28;

/// Render the active tab of the dashboard as text
pub fn render_text(dashboard: &Dashboard, state: &ViewState) -> String {
    let mut output = match state.active_tab {
        Tab::Progress => render_progress_text(&dashboard.progress),
        Tab::Defects => render_defects_text(&dashboard.defects),
    };

    if !dashboard.skipped_entries.is_empty() {
        output.push_str(&format!(
            "\nSkipped {} malformed record(s)\n",
            dashboard.skipped_entries.len()
        ));
    }

    output
}

/// Render progress charts (as summary lines) and the record table
pub fn render_progress_text(view: &ProgressView) -> String {
    if view.is_empty() {
        return "No test progress data\n".to_string();
    }

    let mut output = String::from("Test Progress\n");
    let summary: Vec<Vec<String>> = view
        .types
        .iter()
        .map(|t| {
            vec![
                t.rollup.test_type.clone(),
                format!("{}%", t.rollup.progress),
                format!("{}/{}", t.rollup.measured_case, t.rollup.total_case),
                t.status_label.to_string(),
            ]
        })
        .collect();
    output.push_str(&render_table(
        &["TYPE", "PROGRESS", "EXECUTED", "STATUS"],
        &[false, true, true, false],
        &summary,
    ));

    output.push_str(&format!("\nTest Records ({} records)\n", view.record_count));
    let rows: Vec<Vec<String>> = view
        .rows
        .iter()
        .map(|row| {
            vec![
                truncate_to_width(&row.record.plan_name, PLAN_NAME_WIDTH),
                row.record.test_type.clone(),
                row.record.project.clone(),
                row.record.executors.clone(),
                row.record.total_case.to_string(),
                row.record.measured_case.to_string(),
                format!("{}%", row.progress),
            ]
        })
        .collect();
    output.push_str(&render_table(
        &[
            "PLAN", "TYPE", "PROJECT", "EXECUTORS", "TOTAL", "MEASURED", "PROGRESS",
        ],
        &[false, false, false, false, true, true, true],
        &rows,
    ));

    output
}

/// Render the defect matrix and owner breakdown
pub fn render_defects_text(view: &DefectView) -> String {
    let (matrix, owners, chart) = match view {
        DefectView::NoData => return "No defect data\n".to_string(),
        DefectView::Report {
            matrix,
            owners,
            chart,
        } => (matrix, owners, chart),
    };

    let mut output = String::from("Defects by Priority\n");
    if matrix.is_empty() {
        output.push_str("(none)\n");
    } else {
        let mut headers: Vec<&str> = vec!["PRIORITY"];
        headers.extend(matrix.status_labels.iter().map(String::as_str));
        headers.push("TOTAL");

        let mut rows: Vec<Vec<String>> = matrix
            .priority_rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.priority.clone()];
                cells.extend(row.counts.iter().map(|c| c.to_string()));
                cells.push(row.total.to_string());
                cells
            })
            .collect();

        let mut totals = vec!["TOTAL".to_string()];
        totals.extend(matrix.status_totals.iter().map(|c| c.to_string()));
        totals.push(matrix.grand_total.to_string());
        rows.push(totals);

        let align: Vec<bool> = (0..headers.len()).map(|i| i > 0).collect();
        output.push_str(&render_table(&headers, &align, &rows));
    }

    output.push_str("\nDefects by Owner\n");
    if owners.is_empty() {
        output.push_str("(none)\n");
    } else {
        let mut headers: Vec<&str> = vec!["OWNER"];
        headers.extend(chart.series.iter().map(|s| s.name.as_str()));
        headers.push("TOTAL");

        let rows: Vec<Vec<String>> = owners
            .iter()
            .enumerate()
            .map(|(i, owner)| {
                let mut cells = vec![owner.owner.clone()];
                cells.extend(chart.series.iter().map(|s| s.data[i].to_string()));
                cells.push(owner.total.to_string());
                cells
            })
            .collect();

        let align: Vec<bool> = (0..headers.len()).map(|i| i > 0).collect();
        output.push_str(&render_table(&headers, &align, &rows));
    }

    output
}

/// Render any view model as pretty JSON
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Fixed-width table; `right_align[i]` right-aligns column `i`
fn render_table<H: AsRef<str>>(headers: &[H], right_align: &[bool], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h.as_ref())).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(columns) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    let format_line = |cells: Vec<&str>| -> String {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let right = right_align.get(i).copied().unwrap_or(false);
                pad_to_width(cell, widths[i], right)
            })
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut output = format_line(headers.iter().map(|h| h.as_ref()).collect());
    for row in rows {
        output.push_str(&format_line(
            row.iter().take(columns).map(String::as_str).collect(),
        ));
    }
    output
}

/// Terminal column width; CJK and fullwidth characters take two columns
fn display_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

fn char_width(c: char) -> usize {
    match c as u32 {
        0x1100..=0x115F
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x3FFFD => 2,
        _ => 1,
    }
}

fn pad_to_width(s: &str, width: usize, right: bool) -> String {
    let padding = " ".repeat(width.saturating_sub(display_width(s)));
    if right {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }
}

/// Truncate to a display width, marking the cut with "..."
fn truncate_to_width(s: &str, width: usize) -> String {
    if display_width(s) <= width {
        return s.to_string();
    }
    let budget = width.saturating_sub(3);
    let mut used = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = char_width(c);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::build_dashboard;

    const PROGRESS: &str = r#"[
        {"planName": "冒烟", "testType": "冒烟测试", "project": "项目A", "executors": "张三", "totalCase": 4, "measuredCase": 1},
        {"planName": "回归", "testType": "回归测试", "project": "项目A", "executors": "李四", "totalCase": 10, "measuredCase": 10}
    ]"#;

    const DEFECTS: &str = r#"{
        "priority": {"P1": {"已关闭": 2}, "P0": {"处理中": 3}},
        "devLeader": {"张三": {"代码问题": 1}, "李四": {"代码问题": 2, "环境问题": 3}}
    }"#;

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("测试"), 4);
        assert_eq!(display_width("P0 处理中"), 9);
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate_to_width("功能测试计划功能测试计划", 10), "功能测...");
    }

    #[test]
    fn test_render_table_alignment() {
        let rows = vec![
            vec!["冒烟测试".to_string(), "5".to_string()],
            vec!["a".to_string(), "100".to_string()],
        ];
        let table = render_table(&["TYPE", "N"], &[false, true], &rows);
        assert_eq!(table, "TYPE        N\n冒烟测试    5\na         100\n");
    }

    #[test]
    fn test_render_progress_tab() {
        let dashboard = build_dashboard(PROGRESS, Some(DEFECTS));
        let text = render_text(&dashboard, &ViewState::new(Tab::Progress));
        assert!(text.starts_with("Test Progress\n"));
        let smoke = text.lines().nth(2).unwrap();
        assert!(smoke.starts_with("冒烟测试"));
        assert!(smoke.contains(" 25%"));
        assert!(smoke.ends_with("进行中"));
        assert!(text.lines().nth(3).unwrap().ends_with("已完成"));
        assert!(text.contains("Test Records (2 records)"));
        assert!(!text.contains("Defects by Priority"));
    }

    #[test]
    fn test_render_defects_tab() {
        let dashboard = build_dashboard(PROGRESS, Some(DEFECTS));
        let text = render_text(&dashboard, &ViewState::new(Tab::Defects));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Defects by Priority");
        assert!(lines[1].starts_with("PRIORITY"));
        assert!(lines[2].starts_with("P0"));
        assert!(lines[3].starts_with("P1"));
        assert!(lines[4].starts_with("TOTAL"));
        assert!(lines[4].ends_with(" 5"));
        assert!(text.contains("Defects by Owner"));
        assert!(!text.contains("Test Records"));
    }

    #[test]
    fn test_render_no_data() {
        let dashboard = build_dashboard("[]", None);
        assert_eq!(
            render_text(&dashboard, &ViewState::new(Tab::Progress)),
            "No test progress data\n"
        );
        assert_eq!(
            render_text(&dashboard, &ViewState::new(Tab::Defects)),
            "No defect data\n"
        );
    }

    #[test]
    fn test_render_reports_skipped() {
        let dashboard = build_dashboard(r#"[{"testType": "A", "totalCase": 1}, 7]"#, None);
        let text = render_text(&dashboard, &ViewState::default());
        assert!(text.ends_with("Skipped 1 malformed record(s)\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = build_dashboard(PROGRESS, Some(DEFECTS));
        let b = build_dashboard(PROGRESS, Some(DEFECTS));
        for tab in [Tab::Progress, Tab::Defects] {
            let state = ViewState::new(tab);
            assert_eq!(render_text(&a, &state), render_text(&b, &state));
        }
        assert_eq!(render_json(&a), render_json(&b));
    }
}
