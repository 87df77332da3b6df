//! Configuration file support for testpulse
//!
//! Loads dashboard ordering overrides from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.testpulserc.json` in the working directory
//! 3. `testpulse.config.json` in the working directory
//! 4. `"testpulse"` key in `package.json`
//!
//! All fields are optional. Missing fields fall back to the built-in tables.

use crate::defect::DefectOrdering;
use crate::rollup::TestTypeOrder;
use crate::schema::DEFAULT_PROGRESS_FIELD;
use anyhow::{Context, Result};
use icu_locid::Locale;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// testpulse configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestpulseConfig {
    /// Display rank per test type, lower first (replaces the default table)
    #[serde(default)]
    pub test_type_order: Option<BTreeMap<String, u32>>,

    /// Preferred status column order for the defect matrix
    #[serde(default)]
    pub status_order: Option<Vec<String>>,

    /// Preferred defect type order for the owner chart
    #[serde(default)]
    pub defect_type_order: Option<Vec<String>>,

    /// Rank for priority labels without a `P<digits>` prefix (default: 999)
    #[serde(default)]
    pub unnumbered_priority_rank: Option<u32>,

    /// Name fragment of the field holding the progress payload
    #[serde(default)]
    pub progress_field: Option<String>,

    /// BCP 47 locale used to collate unranked test type names (default: zh)
    #[serde(default)]
    pub collation_locale: Option<String>,
}

/// Resolved configuration with ordering tables ready for use
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub test_type_order: TestTypeOrder,
    pub defect_ordering: DefectOrdering,
    pub progress_field: String,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn validate_label_list(key: &str, labels: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if label.trim().is_empty() {
            anyhow::bail!("{} must not contain empty labels", key);
        }
        if !seen.insert(label.as_str()) {
            anyhow::bail!("{} lists {:?} more than once", key, label);
        }
    }
    Ok(())
}

impl TestpulseConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref order) = self.test_type_order {
            for (label, rank) in order {
                if label.trim().is_empty() {
                    anyhow::bail!("test_type_order must not contain empty labels");
                }
                if *rank == 0 {
                    anyhow::bail!("test_type_order.{} must be at least 1 (got 0)", label);
                }
            }
        }

        if let Some(ref order) = self.status_order {
            validate_label_list("status_order", order)?;
        }
        if let Some(ref order) = self.defect_type_order {
            validate_label_list("defect_type_order", order)?;
        }

        if let Some(ref field) = self.progress_field {
            if field.trim().is_empty() {
                anyhow::bail!("progress_field must not be empty");
            }
        }

        if let Some(ref locale) = self.collation_locale {
            if locale.parse::<Locale>().is_err() {
                anyhow::bail!("collation_locale {:?} is not a valid locale", locale);
            }
        }

        Ok(())
    }

    /// Resolve config into the ordering tables used by the aggregator
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let mut test_type_order = match &self.test_type_order {
            Some(ranks) => TestTypeOrder::from_ranks(ranks.clone()),
            None => TestTypeOrder::default(),
        };
        if let Some(ref locale) = self.collation_locale {
            let locale: Locale = locale
                .parse()
                .map_err(|e| anyhow::anyhow!("collation_locale {:?}: {}", locale, e))?;
            test_type_order = test_type_order.with_locale(locale);
        }

        let defaults = DefectOrdering::default();
        let defect_ordering = DefectOrdering {
            status_order: self
                .status_order
                .clone()
                .unwrap_or(defaults.status_order),
            defect_type_order: self
                .defect_type_order
                .clone()
                .unwrap_or(defaults.defect_type_order),
            unnumbered_priority_rank: self
                .unnumbered_priority_rank
                .unwrap_or(defaults.unnumbered_priority_rank),
        };

        Ok(ResolvedConfig {
            test_type_order,
            defect_ordering,
            progress_field: self
                .progress_field
                .clone()
                .unwrap_or_else(|| DEFAULT_PROGRESS_FIELD.to_string()),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Self {
        ResolvedConfig {
            test_type_order: TestTypeOrder::default(),
            defect_ordering: DefectOrdering::default(),
            progress_field: DEFAULT_PROGRESS_FIELD.to_string(),
            config_path: None,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ResolvedConfig::defaults()
    }
}

/// Discover and load a config file from the project root
///
/// Search order:
/// 1. `.testpulserc.json`
/// 2. `testpulse.config.json`
/// 3. `"testpulse"` key in `package.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(TestpulseConfig, PathBuf)>> {
    for name in [".testpulserc.json", "testpulse.config.json"] {
        let path = project_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }

    let pkg_path = project_root.join("package.json");
    if pkg_path.exists() {
        if let Some(config) = load_from_package_json(&pkg_path)? {
            return Ok(Some((config, pkg_path)));
        }
    }

    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<TestpulseConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: TestpulseConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load testpulse config from the "testpulse" key in package.json
fn load_from_package_json(path: &Path) -> Result<Option<TestpulseConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let pkg: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    match pkg.get("testpulse") {
        Some(value) => {
            let config: TestpulseConfig = serde_json::from_value(value.clone())
                .with_context(|| format!("invalid testpulse config in {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid testpulse config in {}", path.display()))?;
            Ok(Some(config))
        }
        None => Ok(None),
    }
}

/// Load and resolve config for a project
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the project root.
/// Returns default config if nothing is found.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(project_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (TestpulseConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    if let Some(ref path) = resolved.config_path {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::UNLISTED_TEST_TYPE_RANK;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = TestpulseConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert_eq!(resolved.test_type_order.rank("冒烟测试"), 1);
        assert_eq!(resolved.test_type_order.rank("回归测试"), 4);
        assert_eq!(resolved.defect_ordering, DefectOrdering::default());
        assert_eq!(resolved.progress_field, "测试进度str");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "test_type_order": {"性能测试": 1, "冒烟测试": 2},
            "status_order": ["已关闭", "处理中"],
            "defect_type_order": ["代码问题"],
            "unnumbered_priority_rank": 0,
            "progress_field": "进度数据"
        }"#;
        let config: TestpulseConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.test_type_order.rank("性能测试"), 1);
        assert_eq!(
            resolved.test_type_order.rank("回归测试"),
            UNLISTED_TEST_TYPE_RANK
        );
        assert_eq!(resolved.defect_ordering.status_order, vec!["已关闭", "处理中"]);
        assert_eq!(resolved.defect_ordering.unnumbered_priority_rank, 0);
        assert_eq!(resolved.progress_field, "进度数据");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_rest() {
        let json = r#"{"status_order": ["已处理"]}"#;
        let config: TestpulseConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.defect_ordering.status_order, vec!["已处理"]);
        assert_eq!(
            resolved.defect_ordering.defect_type_order,
            DefectOrdering::default().defect_type_order
        );
        assert_eq!(resolved.test_type_order, TestTypeOrder::default());
    }

    #[test]
    fn test_reject_unknown_fields() {
        let json = r#"{"unknown_field": true}"#;
        let result: Result<TestpulseConfig, _> = serde_json::from_str(json);
        assert!(result.is_err(), "unknown fields should be rejected");
    }

    #[test]
    fn test_reject_duplicate_labels() {
        let json = r#"{"status_order": ["处理中", "处理中"]}"#;
        let config: TestpulseConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{"defect_type_order": ["代码问题", " "]}"#;
        let config: TestpulseConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_rank() {
        let json = r#"{"test_type_order": {"冒烟测试": 0}}"#;
        let config: TestpulseConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_empty_progress_field() {
        let json = r#"{"progress_field": "  "}"#;
        let config: TestpulseConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_discover_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".testpulserc.json");
        fs::write(&config_path, r#"{"unnumbered_priority_rank": 5}"#).unwrap();

        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.unnumbered_priority_rank, Some(5));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_config_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("testpulse.config.json"),
            r#"{"progress_field": "进度"}"#,
        )
        .unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.progress_field.as_deref(), Some("进度"));
    }

    #[test]
    fn test_discover_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{
            "name": "bitable-plugin",
            "version": "1.0.0",
            "testpulse": {
                "status_order": ["已关闭"]
            }
        }"#,
        )
        .unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.status_order, Some(vec!["已关闭".to_string()]));
    }

    #[test]
    fn test_discover_package_json_without_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name": "bitable-plugin", "version": "1.0.0"}"#,
        )
        .unwrap();

        assert!(discover_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".testpulserc.json"),
            r#"{"unnumbered_priority_rank": 1}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("testpulse.config.json"),
            r#"{"unnumbered_priority_rank": 2}"#,
        )
        .unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(
            config.unnumbered_priority_rank,
            Some(1),
            ".testpulserc.json should take priority"
        );
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"status_order": ["", "x"]}"#).unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.json"));
    }

    #[test]
    fn test_load_and_resolve_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.progress_field, DEFAULT_PROGRESS_FIELD);
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.json");
        fs::write(&config_path, r#"{"test_type_order": {"回归测试": 1}}"#).unwrap();

        let resolved = load_and_resolve(dir.path(), Some(&config_path)).unwrap();
        assert_eq!(resolved.test_type_order.rank("回归测试"), 1);
        assert_eq!(resolved.config_path, Some(config_path));
    }

    #[test]
    fn test_collation_locale() {
        let config: TestpulseConfig =
            serde_json::from_str(r#"{"collation_locale": "en"}"#).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.test_type_order.locale().to_string(), "en");

        let defaults = ResolvedConfig::defaults();
        assert_eq!(defaults.test_type_order.locale().to_string(), "zh");

        let bad: TestpulseConfig =
            serde_json::from_str(r#"{"collation_locale": "not a locale!"}"#).unwrap();
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("collation_locale"));
    }
}
