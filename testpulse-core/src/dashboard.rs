//! Dashboard view model
//!
//! Combines the progress and defect payloads into one render-ready value.
//! Which tab is shown is explicit [`ViewState`] passed to the renderer,
//! never process-wide state.

use crate::config::ResolvedConfig;
use crate::defect::{
    build_defect_matrix_with_ordering, build_owner_chart_with_ordering, build_owner_series,
    parse_defect_report, DefectMatrix, DefectOrdering, DefectReport, OwnerChart, OwnerDefects,
};
use crate::record::{decode_test_records, RecordEntry, TestRecord};
use crate::rollup::{
    compute_test_type_rollups, sort_records_with_order, sort_test_types_with_order,
    ProgressTier, TestTypeOrder, TestTypeRollup,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Dashboard tab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    #[default]
    Progress,
    Defects,
}

impl FromStr for Tab {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "progress" => Ok(Tab::Progress),
            "defects" => Ok(Tab::Defects),
            other => anyhow::bail!("unknown tab {:?} (expected progress or defects)", other),
        }
    }
}

/// Render-time state threaded through render calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    pub active_tab: Tab,
}

impl ViewState {
    pub fn new(active_tab: Tab) -> Self {
        ViewState { active_tab }
    }

    pub fn switch_to(self, tab: Tab) -> Self {
        ViewState { active_tab: tab }
    }
}

/// Pie chart entry for one test type
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeProgress {
    #[serde(flatten)]
    pub rollup: TestTypeRollup,
    pub tier: ProgressTier,
    pub status_label: &'static str,
}

/// Table row for one test plan
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow {
    #[serde(flatten)]
    pub record: TestRecord,
    pub progress: i64,
    pub tier: ProgressTier,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub types: Vec<TypeProgress>,
    pub rows: Vec<RecordRow>,
    pub record_count: usize,
}

impl ProgressView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DefectView {
    NoData,
    Report {
        matrix: DefectMatrix,
        owners: Vec<OwnerDefects>,
        chart: OwnerChart,
    },
}

/// Array element that was skipped while decoding the progress payload
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedEntry {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub progress: ProgressView,
    pub defects: DefectView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_entries: Vec<SkippedEntry>,
}

pub fn build_progress_view(records: &[TestRecord], order: &TestTypeOrder) -> ProgressView {
    let rollups = compute_test_type_rollups(records);

    let types = sort_test_types_with_order(&rollups, order)
        .into_iter()
        .map(|rollup| {
            let tier = rollup.tier();
            TypeProgress {
                rollup,
                tier,
                status_label: tier.status_label(),
            }
        })
        .collect();

    let rows = sort_records_with_order(records, order)
        .into_iter()
        .map(|record| RecordRow {
            progress: record.progress(),
            tier: record.tier(),
            record,
        })
        .collect();

    ProgressView {
        types,
        rows,
        record_count: records.len(),
    }
}

/// Defect view; a report with no usable rows in either section has no data
pub fn build_defect_view(report: Option<&DefectReport>, ordering: &DefectOrdering) -> DefectView {
    let report = match report {
        Some(r) if !(r.priority.is_empty() && r.dev_leader.is_empty()) => r,
        _ => return DefectView::NoData,
    };

    match build_defect_matrix_with_ordering(Some(report), ordering) {
        Some(matrix) => DefectView::Report {
            matrix,
            owners: build_owner_series(report),
            chart: build_owner_chart_with_ordering(report, ordering),
        },
        None => DefectView::NoData,
    }
}

/// Build the dashboard with the default ordering tables
pub fn build_dashboard(progress_text: &str, defect_text: Option<&str>) -> Dashboard {
    build_dashboard_with_config(progress_text, defect_text, &ResolvedConfig::defaults())
}

/// Build the dashboard; never fails, unusable payloads become empty views
pub fn build_dashboard_with_config(
    progress_text: &str,
    defect_text: Option<&str>,
    config: &ResolvedConfig,
) -> Dashboard {
    let mut records = Vec::new();
    let mut skipped_entries = Vec::new();

    match decode_test_records(progress_text) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    RecordEntry::Valid(record) => records.push(record),
                    RecordEntry::Invalid { index, reason } => {
                        tracing::warn!(index, %reason, "skipping malformed test record");
                        skipped_entries.push(SkippedEntry {
                            index,
                            reason: reason.to_string(),
                        });
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "progress payload unusable, treating as empty");
        }
    }

    let report = defect_text.and_then(parse_defect_report);

    tracing::debug!(
        records = records.len(),
        skipped = skipped_entries.len(),
        has_defects = report.is_some(),
        "building dashboard"
    );

    Dashboard {
        progress: build_progress_view(&records, &config.test_type_order),
        defects: build_defect_view(report.as_ref(), &config.defect_ordering),
        skipped_entries,
    }
}
