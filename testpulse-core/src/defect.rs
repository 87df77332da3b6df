//! Defect report decoding and derived views
//!
//! The defect payload is a JSON object with two sections:
//! - `priority`: priority label -> status label -> count
//! - `devLeader`: owner name -> defect type -> count
//!
//! Global invariants enforced:
//! - Payload key order is preserved; "first seen" means payload order
//! - Missing (row, column) combinations count as 0
//! - Non-object rows are dropped, never reported as errors
//! - All sorts are stable

use crate::error::{json_type_name, PayloadError};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Preferred status column order
pub const DEFAULT_STATUS_ORDER: &[&str] = &["处理中", "已处理", "已关闭"];

/// Preferred defect type order for the owner chart
pub const DEFAULT_DEFECT_TYPE_ORDER: &[&str] = &[
    "代码问题",
    "环境问题",
    "数据问题",
    "稳定性问题",
    "安全问题",
    "其他问题",
    "需求问题",
    "优化建议",
    "非缺陷",
];

/// Rank for priority labels without a leading `P<digits>`
pub const UNNUMBERED_PRIORITY_RANK: u32 = 999;

/// Ordered label -> count table, in payload order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    entries: Vec<(String, i64)>,
}

impl CountTable {
    fn from_json(map: &Map<String, Value>) -> Self {
        CountTable {
            entries: map
                .iter()
                .map(|(label, value)| (label.clone(), coerce_count(value)))
                .collect(),
        }
    }

    /// Count for a label, 0 when absent
    pub fn get(&self, label: &str) -> i64 {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(label, count)| (label.as_str(), *count))
    }

    pub fn total(&self) -> i64 {
        self.entries
            .iter()
            .fold(0i64, |acc, (_, count)| acc.saturating_add(*count))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for CountTable {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        CountTable {
            entries: iter
                .into_iter()
                .map(|(label, count)| (label.into(), count))
                .collect(),
        }
    }
}

impl Serialize for CountTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

/// Decoded defect payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectReport {
    #[serde(serialize_with = "serialize_section")]
    pub priority: Vec<(String, CountTable)>,
    #[serde(serialize_with = "serialize_section")]
    pub dev_leader: Vec<(String, CountTable)>,
}

fn serialize_section<S: Serializer>(
    section: &[(String, CountTable)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(section.len()))?;
    for (label, table) in section {
        map.serialize_entry(label, table)?;
    }
    map.end()
}

/// Strictly decode a defect payload; the top level must be an object
pub fn decode_defect_report(text: &str) -> Result<DefectReport, PayloadError> {
    let value: Value = serde_json::from_str(text)?;
    decode_defect_report_value(&value)
}

/// Same as [`decode_defect_report`] for an already-parsed value
pub fn decode_defect_report_value(value: &Value) -> Result<DefectReport, PayloadError> {
    let obj = value.as_object().ok_or(PayloadError::Shape {
        expected: "an object",
        found: json_type_name(value),
    })?;

    Ok(DefectReport {
        priority: decode_section(obj.get("priority"), "priority"),
        dev_leader: decode_section(obj.get("devLeader"), "devLeader"),
    })
}

/// Leniently decode a defect payload. Returns `None` ("no data") for
/// invalid JSON, `null`, or any non-object value.
pub fn parse_defect_report(text: &str) -> Option<DefectReport> {
    match decode_defect_report(text) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!(error = %e, "defect payload unusable, showing no data");
            None
        }
    }
}

fn decode_section(value: Option<&Value>, section: &'static str) -> Vec<(String, CountTable)> {
    let map = match value {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => return Vec::new(),
        Some(other) => {
            tracing::debug!(section, found = json_type_name(other), "ignoring non-object section");
            return Vec::new();
        }
    };

    map.iter()
        .filter_map(|(label, row)| match row {
            Value::Object(counts) => Some((label.clone(), CountTable::from_json(counts))),
            other => {
                tracing::debug!(
                    section,
                    label = label.as_str(),
                    found = json_type_name(other),
                    "dropping non-object row"
                );
                None
            }
        })
        .collect()
}

/// Coerce a JSON count to an integer: integers as-is, floats truncated,
/// numeric strings parsed, anything else 0
pub fn coerce_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Ordering tables for the defect views
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectOrdering {
    pub status_order: Vec<String>,
    pub defect_type_order: Vec<String>,
    pub unnumbered_priority_rank: u32,
}

impl Default for DefectOrdering {
    fn default() -> Self {
        DefectOrdering {
            status_order: DEFAULT_STATUS_ORDER.iter().map(|s| s.to_string()).collect(),
            defect_type_order: DEFAULT_DEFECT_TYPE_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            unnumbered_priority_rank: UNNUMBERED_PRIORITY_RANK,
        }
    }
}

impl DefectOrdering {
    /// Numeric rank of a priority label (`P2` -> 2). Numbers too large
    /// for `u32` saturate so they still sort as numbered.
    pub fn priority_rank(&self, label: &str) -> u32 {
        static PRIORITY_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
        let re = PRIORITY_RE.get_or_init(|| Regex::new(r"^P(\d+)").unwrap());

        match re.captures(label) {
            // \d+ only fails to parse on overflow
            Some(caps) => caps[1].parse::<u32>().unwrap_or(u32::MAX),
            None => self.unnumbered_priority_rank,
        }
    }
}

/// Preferred labels that are present, then the rest in first-seen order
pub fn preferred_then_seen(preferred: &[String], seen: &[String]) -> Vec<String> {
    let present: HashSet<&str> = seen.iter().map(String::as_str).collect();
    let known: HashSet<&str> = preferred.iter().map(String::as_str).collect();

    let mut ordered: Vec<String> = preferred
        .iter()
        .filter(|label| present.contains(label.as_str()))
        .cloned()
        .collect();
    ordered.extend(
        seen.iter()
            .filter(|label| !known.contains(label.as_str()))
            .cloned(),
    );
    ordered
}

/// Unique labels across tables, in first-seen order
fn collect_labels<'a>(tables: impl Iterator<Item = &'a CountTable>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for table in tables {
        for label in table.labels() {
            if seen.insert(label) {
                labels.push(label.to_string());
            }
        }
    }
    labels
}

/// One row of the priority x status matrix
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PriorityRow {
    pub priority: String,
    /// Aligned with [`DefectMatrix::status_labels`]
    pub counts: Vec<i64>,
    pub total: i64,
}

/// Priority x status count table with row, column, and grand totals
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefectMatrix {
    pub status_labels: Vec<String>,
    pub priority_rows: Vec<PriorityRow>,
    /// Aligned with `status_labels`
    pub status_totals: Vec<i64>,
    pub grand_total: i64,
}

impl DefectMatrix {
    pub fn priority_total(&self, priority: &str) -> Option<i64> {
        self.priority_rows
            .iter()
            .find(|row| row.priority == priority)
            .map(|row| row.total)
    }

    pub fn status_total(&self, status: &str) -> Option<i64> {
        self.status_labels
            .iter()
            .position(|label| label == status)
            .map(|i| self.status_totals[i])
    }

    pub fn priorities(&self) -> Vec<&str> {
        self.priority_rows
            .iter()
            .map(|row| row.priority.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.priority_rows.is_empty()
    }
}

/// Build the defect matrix with default ordering. `None` in, `None` out.
pub fn build_defect_matrix(report: Option<&DefectReport>) -> Option<DefectMatrix> {
    build_defect_matrix_with_ordering(report, &DefectOrdering::default())
}

/// Build the defect matrix with custom ordering tables
pub fn build_defect_matrix_with_ordering(
    report: Option<&DefectReport>,
    ordering: &DefectOrdering,
) -> Option<DefectMatrix> {
    let report = report?;

    let seen = collect_labels(report.priority.iter().map(|(_, table)| table));
    let status_labels = preferred_then_seen(&ordering.status_order, &seen);

    let mut rows: Vec<&(String, CountTable)> = report.priority.iter().collect();
    rows.sort_by_key(|(priority, _)| ordering.priority_rank(priority));

    let mut status_totals = vec![0i64; status_labels.len()];
    let priority_rows: Vec<PriorityRow> = rows
        .into_iter()
        .map(|(priority, table)| {
            let counts: Vec<i64> = status_labels.iter().map(|s| table.get(s)).collect();
            for (sum, count) in status_totals.iter_mut().zip(&counts) {
                *sum = sum.saturating_add(*count);
            }
            PriorityRow {
                priority: priority.clone(),
                total: counts.iter().fold(0i64, |acc, c| acc.saturating_add(*c)),
                counts,
            }
        })
        .collect();

    let grand_total = status_totals
        .iter()
        .fold(0i64, |acc, c| acc.saturating_add(*c));

    Some(DefectMatrix {
        status_labels,
        priority_rows,
        status_totals,
        grand_total,
    })
}

/// Defect counts for one owner
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDefects {
    pub owner: String,
    pub counts: CountTable,
    pub total: i64,
}

/// Owners by descending total; ties keep payload order
pub fn build_owner_series(report: &DefectReport) -> Vec<OwnerDefects> {
    let mut owners: Vec<OwnerDefects> = report
        .dev_leader
        .iter()
        .map(|(owner, counts)| OwnerDefects {
            owner: owner.clone(),
            total: counts.total(),
            counts: counts.clone(),
        })
        .collect();

    owners.sort_by_key(|o| Reverse(o.total));
    owners
}

/// Order defect types with the default preferred sequence
pub fn order_defect_types(all_types_seen: &[String]) -> Vec<String> {
    order_defect_types_with_ordering(all_types_seen, &DefectOrdering::default())
}

pub fn order_defect_types_with_ordering(
    all_types_seen: &[String],
    ordering: &DefectOrdering,
) -> Vec<String> {
    preferred_then_seen(&ordering.defect_type_order, all_types_seen)
}

/// One stacked layer of the owner chart
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub name: String,
    /// One value per chart category
    pub data: Vec<i64>,
}

/// Stacked bar chart: owners on the category axis, one series per defect type
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerChart {
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
}

pub fn build_owner_chart(report: &DefectReport) -> OwnerChart {
    build_owner_chart_with_ordering(report, &DefectOrdering::default())
}

pub fn build_owner_chart_with_ordering(
    report: &DefectReport,
    ordering: &DefectOrdering,
) -> OwnerChart {
    let owners = build_owner_series(report);
    let seen = collect_labels(owners.iter().map(|o| &o.counts));
    let types = order_defect_types_with_ordering(&seen, ordering);

    let series = types
        .into_iter()
        .map(|name| ChartSeries {
            data: owners.iter().map(|o| o.counts.get(&name)).collect(),
            name,
        })
        .collect();

    OwnerChart {
        categories: owners.into_iter().map(|o| o.owner).collect(),
        series,
    }
}
