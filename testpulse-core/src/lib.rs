//! Testpulse core library - test progress rollups and defect matrices from Bitable payloads

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Every operation is pure over its input
// - No global mutable state
// - No randomness, clocks, threads, or async
// - Deterministic ordering must be explicit (payload key order is preserved)
// - Lenient entry points never fail; they fall back to empty or no-data
// - Identical input yields byte-for-byte identical output

pub mod cell;
pub mod config;
pub mod dashboard;
pub mod defect;
pub mod error;
pub mod record;
pub mod report;
pub mod rollup;
pub mod schema;

pub use cell::{decode_cell_input, flatten_cell_text};
pub use config::ResolvedConfig;
pub use dashboard::{
    build_dashboard, build_dashboard_with_config, Dashboard, DefectView, ProgressView, Tab,
    ViewState,
};
pub use defect::{
    build_defect_matrix, build_owner_chart, build_owner_series, decode_defect_report,
    order_defect_types, parse_defect_report, DefectMatrix, DefectOrdering, DefectReport,
};
pub use error::{MalformedEntry, PayloadError};
pub use record::{decode_test_records, parse_test_records, RecordEntry, RecordIssue, TestRecord};
pub use report::{render_json, render_text};
pub use rollup::{
    compute_test_type_rollups, sort_test_types, ProgressTier, TestTypeOrder, TestTypeRollup,
};
