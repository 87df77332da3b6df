//! Per-test-type progress rollups
//!
//! Global invariants enforced:
//! - Rollups are strictly derived from the record list, never stored
//! - Exactly one rollup per distinct test type
//! - Sorting is stable; equal keys keep input order

use crate::record::TestRecord;
use icu_collator::{Collator, CollatorOptions};
use icu_locid::{locale, Locale};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Rank given to test types missing from the rank table
pub const UNLISTED_TEST_TYPE_RANK: u32 = 999;

/// Default display ranks for the common test types
pub const DEFAULT_TEST_TYPE_RANKS: &[(&str, u32)] = &[
    ("冒烟测试", 1),
    ("开发自测", 2),
    ("常规测试", 3),
    ("回归测试", 4),
];

/// Locale whose collation orders unranked test types
pub const DEFAULT_COLLATION_LOCALE: Locale = locale!("zh");

/// Rollups keyed by test type
pub type RollupMap = BTreeMap<String, TestTypeRollup>;

/// Aggregate over all records sharing a test type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestTypeRollup {
    pub test_type: String,
    pub total_case: i64,
    pub measured_case: i64,
    pub progress: i64,
}

impl TestTypeRollup {
    fn empty(test_type: &str) -> Self {
        TestTypeRollup {
            test_type: test_type.to_string(),
            total_case: 0,
            measured_case: 0,
            progress: 0,
        }
    }

    fn accumulate(&mut self, record: &TestRecord) {
        self.total_case = self.total_case.saturating_add(record.total_case);
        self.measured_case = self.measured_case.saturating_add(record.measured_case);
        self.progress = progress_percent(self.measured_case, self.total_case);
    }

    /// Tier of the rounded progress value
    pub fn tier(&self) -> ProgressTier {
        if self.total_case <= 0 {
            ProgressTier::NotStarted
        } else {
            ProgressTier::from_percent(self.progress as f64)
        }
    }
}

/// Completion band used to label progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTier {
    Complete,   // >= 100
    Good,       // 70-100
    Fair,       // 30-70
    Low,        // < 30
    NotStarted, // no cases
}

impl ProgressTier {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 100.0 {
            ProgressTier::Complete
        } else if percent >= 70.0 {
            ProgressTier::Good
        } else if percent >= 30.0 {
            ProgressTier::Fair
        } else {
            ProgressTier::Low
        }
    }

    /// Tier from raw counts, using the exact ratio
    pub fn from_counts(measured: i64, total: i64) -> Self {
        if total <= 0 {
            return ProgressTier::NotStarted;
        }
        ProgressTier::from_percent(measured as f64 / total as f64 * 100.0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressTier::Complete => "complete",
            ProgressTier::Good => "good",
            ProgressTier::Fair => "fair",
            ProgressTier::Low => "low",
            ProgressTier::NotStarted => "not_started",
        }
    }

    /// Status badge text shown next to a progress chart
    pub fn status_label(&self) -> &'static str {
        match self {
            ProgressTier::Complete => "已完成",
            ProgressTier::Good => "进度良好",
            _ => "进行中",
        }
    }
}

/// Rounded percentage of measured over total, 0 when total is not positive.
///
/// Rounds half away from zero.
pub fn progress_percent(measured: i64, total: i64) -> i64 {
    if total > 0 {
        (measured as f64 / total as f64 * 100.0).round() as i64
    } else {
        0
    }
}

/// Display order for test types: rank ascending, then name in the
/// collation order of `locale` (pinyin for the default `zh`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestTypeOrder {
    ranks: HashMap<String, u32>,
    locale: Locale,
}

impl Default for TestTypeOrder {
    fn default() -> Self {
        TestTypeOrder::from_ranks(
            DEFAULT_TEST_TYPE_RANKS
                .iter()
                .map(|(name, rank)| (name.to_string(), *rank)),
        )
    }
}

impl TestTypeOrder {
    pub fn from_ranks(ranks: impl IntoIterator<Item = (String, u32)>) -> Self {
        TestTypeOrder {
            ranks: ranks.into_iter().collect(),
            locale: DEFAULT_COLLATION_LOCALE,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn rank(&self, test_type: &str) -> u32 {
        self.ranks
            .get(test_type)
            .copied()
            .unwrap_or(UNLISTED_TEST_TYPE_RANK)
    }

    /// Comparator holding a collator; build once per sort
    pub fn comparator(&self) -> TestTypeComparator<'_> {
        TestTypeComparator {
            order: self,
            collator: new_collator(&self.locale),
        }
    }

    /// One-off comparison. Builds a collator per call, use
    /// [`TestTypeOrder::comparator`] when sorting.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.comparator().compare(a, b)
    }

    /// Ranks sorted for display
    pub fn entries(&self) -> Vec<(&str, u32)> {
        let mut entries: Vec<(&str, u32)> = self
            .ranks
            .iter()
            .map(|(name, rank)| (name.as_str(), *rank))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Rank-then-collation comparison for one sort pass
pub struct TestTypeComparator<'a> {
    order: &'a TestTypeOrder,
    collator: Option<Collator>,
}

impl TestTypeComparator<'_> {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.order
            .rank(a)
            .cmp(&self.order.rank(b))
            .then_with(|| match &self.collator {
                Some(collator) => collator.compare(a, b),
                None => codepoint_collate(a, b),
            })
    }
}

fn new_collator(locale: &Locale) -> Option<Collator> {
    match Collator::try_new(&locale.into(), CollatorOptions::new()) {
        Ok(collator) => Some(collator),
        Err(e) => {
            tracing::warn!(locale = %locale, error = %e, "no collation data, comparing by code point");
            None
        }
    }
}

/// Fallback when no collator is available: case-insensitive code point
/// order, lowercase first on a case-only tie
fn codepoint_collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Group records by test type and sum their case counts
pub fn compute_test_type_rollups(records: &[TestRecord]) -> RollupMap {
    let mut rollups = RollupMap::new();

    for record in records {
        rollups
            .entry(record.test_type.clone())
            .or_insert_with(|| TestTypeRollup::empty(&record.test_type))
            .accumulate(record);
    }

    rollups
}

/// Sort rollups with the default rank table
pub fn sort_test_types(rollups: &RollupMap) -> Vec<TestTypeRollup> {
    sort_test_types_with_order(rollups, &TestTypeOrder::default())
}

/// Sort rollups with a custom rank table
pub fn sort_test_types_with_order(
    rollups: &RollupMap,
    order: &TestTypeOrder,
) -> Vec<TestTypeRollup> {
    let comparator = order.comparator();
    let mut sorted: Vec<TestTypeRollup> = rollups.values().cloned().collect();
    sorted.sort_by(|a, b| comparator.compare(&a.test_type, &b.test_type));
    sorted
}

/// Sort records for table display with the default rank table
pub fn sort_records(records: &[TestRecord]) -> Vec<TestRecord> {
    sort_records_with_order(records, &TestTypeOrder::default())
}

/// Sort records for table display; records of the same type keep input order
pub fn sort_records_with_order(records: &[TestRecord], order: &TestTypeOrder) -> Vec<TestRecord> {
    let comparator = order.comparator();
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| comparator.compare(&a.test_type, &b.test_type));
    sorted
}
