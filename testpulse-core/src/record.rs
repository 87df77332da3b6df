//! Test-progress records and their payload decoder
//!
//! The progress payload is a JSON array with one object per test plan.
//! Each element is validated on its own: a well-formed element becomes a
//! [`TestRecord`], anything else becomes a tagged [`RecordEntry::Invalid`]
//! so that one bad row never discards its neighbours.

use crate::error::{json_type_name, MalformedEntry, PayloadError};
use crate::rollup::{progress_percent, ProgressTier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One planned or executed test plan
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub plan_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plan_url: Option<String>,
    pub test_type: String,
    pub project: String,
    pub executors: String,
    pub total_case: i64,
    pub measured_case: i64,
}

impl TestRecord {
    /// Rounded completion percentage, 0 when there are no cases
    pub fn progress(&self) -> i64 {
        progress_percent(self.measured_case, self.total_case)
    }

    /// Progress tier computed from the exact (unrounded) ratio
    pub fn tier(&self) -> ProgressTier {
        ProgressTier::from_counts(self.measured_case, self.total_case)
    }

    /// Advisory findings. These never change how the record is aggregated.
    pub fn issues(&self) -> Vec<RecordIssue> {
        let mut issues = Vec::new();
        if self.test_type.trim().is_empty() {
            issues.push(RecordIssue::MissingTestType);
        }
        for (field, value) in [
            ("totalCase", self.total_case),
            ("measuredCase", self.measured_case),
        ] {
            if value < 0 {
                issues.push(RecordIssue::NegativeCount { field, value });
            }
        }
        if self.measured_case > self.total_case {
            issues.push(RecordIssue::MeasuredExceedsTotal {
                measured: self.measured_case,
                total: self.total_case,
            });
        }
        issues
    }
}

/// Result of validating one element of the progress array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEntry {
    Valid(TestRecord),
    Invalid {
        index: usize,
        reason: MalformedEntry,
    },
}

/// Out-of-range values that are accepted but worth surfacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    MissingTestType,
    NegativeCount { field: &'static str, value: i64 },
    MeasuredExceedsTotal { measured: i64, total: i64 },
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIssue::MissingTestType => write!(f, "testType is empty"),
            RecordIssue::NegativeCount { field, value } => {
                write!(f, "{} is negative ({})", field, value)
            }
            RecordIssue::MeasuredExceedsTotal { measured, total } => {
                write!(f, "measuredCase {} exceeds totalCase {}", measured, total)
            }
        }
    }
}

/// Strictly decode a progress payload.
///
/// Errors only when the text is not JSON or not an array. Per-element
/// problems are reported as [`RecordEntry::Invalid`].
pub fn decode_test_records(text: &str) -> Result<Vec<RecordEntry>, PayloadError> {
    let value: Value = serde_json::from_str(text)?;
    decode_test_records_value(&value)
}

/// Same as [`decode_test_records`] for an already-parsed value
pub fn decode_test_records_value(value: &Value) -> Result<Vec<RecordEntry>, PayloadError> {
    let items = value.as_array().ok_or(PayloadError::Shape {
        expected: "an array",
        found: json_type_name(value),
    })?;

    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| match decode_record(item) {
            Ok(record) => RecordEntry::Valid(record),
            Err(reason) => RecordEntry::Invalid { index, reason },
        })
        .collect())
}

/// Leniently decode a progress payload.
///
/// Unparsable or non-array payloads yield an empty list. Malformed elements
/// are skipped. Both cases are logged at warn level.
pub fn parse_test_records(text: &str) -> Vec<TestRecord> {
    match decode_test_records(text) {
        Ok(entries) => valid_records(entries),
        Err(e) => {
            tracing::warn!(error = %e, "progress payload unusable, treating as empty");
            Vec::new()
        }
    }
}

/// Keep the valid records, logging each skipped entry
pub fn valid_records(entries: Vec<RecordEntry>) -> Vec<TestRecord> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            RecordEntry::Valid(record) => Some(record),
            RecordEntry::Invalid { index, reason } => {
                tracing::warn!(index, %reason, "skipping malformed test record");
                None
            }
        })
        .collect()
}

fn decode_record(item: &Value) -> Result<TestRecord, MalformedEntry> {
    let obj = item
        .as_object()
        .ok_or_else(|| MalformedEntry::NotAnObject(json_type_name(item)))?;

    Ok(TestRecord {
        plan_name: text_field(obj, "planName")?.unwrap_or_default(),
        plan_url: text_field(obj, "planUrl")?.filter(|url| !url.is_empty()),
        test_type: text_field(obj, "testType")?.unwrap_or_default(),
        project: text_field(obj, "project")?.unwrap_or_default(),
        executors: text_field(obj, "executors")?.unwrap_or_default(),
        total_case: count_field(obj, "totalCase")?,
        measured_case: count_field(obj, "measuredCase")?,
    })
}

/// Missing and null map to `None`; numbers are accepted in their display form
fn text_field(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, MalformedEntry> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(MalformedEntry::InvalidField {
            field,
            reason: format!("expected a string, found {}", json_type_name(other)),
        }),
    }
}

/// Missing and null count as 0. Integral floats and integer strings
/// (including `"12.0"`) are accepted.
fn count_field(obj: &Map<String, Value>, field: &'static str) -> Result<i64, MalformedEntry> {
    let invalid = |reason: String| MalformedEntry::InvalidField { field, reason };

    match obj.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral))
            .ok_or_else(|| invalid(format!("{} is not an integer", n))),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| invalid(format!("{:?} is not an integer", s)))
        }
        Some(other) => Err(invalid(format!(
            "expected an integer, found {}",
            json_type_name(other)
        ))),
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(test_type: &str, total: i64, measured: i64) -> TestRecord {
        TestRecord {
            test_type: test_type.to_string(),
            total_case: total,
            measured_case: measured,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_full_record() {
        let text = r#"[{
            "planName": "功能测试计划A",
            "planUrl": "https://example.com/plan/1",
            "testType": "功能测试",
            "project": "项目A",
            "executors": "张三",
            "totalCase": 100,
            "measuredCase": 40
        }]"#;
        let entries = decode_test_records(text).unwrap();
        assert_eq!(entries.len(), 1);
        let RecordEntry::Valid(r) = &entries[0] else {
            panic!("expected a valid record, got {:?}", entries[0]);
        };
        assert_eq!(r.plan_name, "功能测试计划A");
        assert_eq!(r.plan_url.as_deref(), Some("https://example.com/plan/1"));
        assert_eq!(r.test_type, "功能测试");
        assert_eq!(r.total_case, 100);
        assert_eq!(r.measured_case, 40);
        assert_eq!(r.progress(), 40);
    }

    #[test]
    fn test_missing_fields_default() {
        let entries = decode_test_records(r#"[{"testType": "冒烟测试"}]"#).unwrap();
        let RecordEntry::Valid(r) = &entries[0] else {
            panic!("expected a valid record");
        };
        assert_eq!(r.plan_name, "");
        assert_eq!(r.plan_url, None);
        assert_eq!(r.total_case, 0);
        assert_eq!(r.measured_case, 0);
    }

    #[test]
    fn test_lenient_counts() {
        let text = r#"[{"testType": "A", "totalCase": "12", "measuredCase": 6.0}]"#;
        let records = parse_test_records(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_case, 12);
        assert_eq!(records[0].measured_case, 6);
    }

    #[test]
    fn test_integral_float_strings() {
        let text = r#"[
            {"testType": "A", "totalCase": "12.0", "measuredCase": " 3 "},
            {"testType": "B", "totalCase": "12.5"},
            {"testType": "C", "totalCase": "NaN"}
        ]"#;
        let entries = decode_test_records(text).unwrap();
        let RecordEntry::Valid(r) = &entries[0] else {
            panic!("expected a valid record, got {:?}", entries[0]);
        };
        assert_eq!(r.total_case, 12);
        assert_eq!(r.measured_case, 3);
        assert!(matches!(&entries[1], RecordEntry::Invalid { index: 1, .. }));
        assert!(matches!(&entries[2], RecordEntry::Invalid { index: 2, .. }));
    }

    #[test]
    fn test_invalid_entries_are_tagged() {
        let text = r#"[
            {"testType": "A", "totalCase": 10, "measuredCase": 5},
            42,
            {"testType": "B", "totalCase": true},
            {"testType": "C", "totalCase": 1.5}
        ]"#;
        let entries = decode_test_records(text).unwrap();
        assert!(matches!(entries[0], RecordEntry::Valid(_)));
        assert_eq!(
            entries[1],
            RecordEntry::Invalid {
                index: 1,
                reason: MalformedEntry::NotAnObject("a number"),
            }
        );
        assert!(matches!(
            &entries[2],
            RecordEntry::Invalid {
                index: 2,
                reason: MalformedEntry::InvalidField { field: "totalCase", .. }
            }
        ));
        assert!(matches!(&entries[3], RecordEntry::Invalid { index: 3, .. }));

        let records = parse_test_records(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_type, "A");
    }

    #[test]
    fn test_non_array_is_shape_error() {
        let err = decode_test_records(r#"{"testType": "A"}"#).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Shape {
                expected: "an array",
                found: "an object"
            }
        ));
        assert!(parse_test_records(r#"{"testType": "A"}"#).is_empty());
    }

    #[test]
    fn test_invalid_json_is_empty() {
        assert!(matches!(
            decode_test_records("not json"),
            Err(PayloadError::Parse(_))
        ));
        assert!(parse_test_records("not json").is_empty());
        assert!(parse_test_records("").is_empty());
        assert!(parse_test_records("null").is_empty());
    }

    #[test]
    fn test_empty_plan_url_is_none() {
        let records = parse_test_records(r#"[{"testType": "A", "planUrl": ""}]"#);
        assert_eq!(records[0].plan_url, None);
    }

    #[test]
    fn test_issues() {
        assert!(record("A", 10, 5).issues().is_empty());
        assert_eq!(
            record("A", 10, 12).issues(),
            vec![RecordIssue::MeasuredExceedsTotal {
                measured: 12,
                total: 10
            }]
        );
        assert_eq!(
            record(" ", -1, -2).issues(),
            vec![
                RecordIssue::MissingTestType,
                RecordIssue::NegativeCount {
                    field: "totalCase",
                    value: -1
                },
                RecordIssue::NegativeCount {
                    field: "measuredCase",
                    value: -2
                },
            ]
        );
    }

    #[test]
    fn test_record_progress_zero_total() {
        assert_eq!(record("A", 0, 5).progress(), 0);
        assert_eq!(record("A", 0, 5).tier(), ProgressTier::NotStarted);
    }

    #[test]
    fn test_serialize_camel_case() {
        let json = serde_json::to_value(record("A", 3, 1)).unwrap();
        assert_eq!(json["testType"], "A");
        assert_eq!(json["totalCase"], 3);
        assert_eq!(json["measuredCase"], 1);
        assert!(json.get("planUrl").is_none());
    }
}
