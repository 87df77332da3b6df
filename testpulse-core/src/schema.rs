//! Table schema helpers
//!
//! Host-independent logic over the field list of a Bitable table: locating
//! the progress payload field and building select options for flow fields
//! and their nodes. Showing the picker is the host's job.

use crate::error::PayloadError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name fragment identifying the progress payload field
pub const DEFAULT_PROGRESS_FIELD: &str = "测试进度str";

/// Field type names treated as flow (workflow stage) fields
const FLOW_FIELD_TYPES: &[&str] = &["flow", "workflow", "stage"];

/// One column of the host table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<FlowNode>,
}

/// A configured stage of a flow field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowNode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FlowNode {
    /// Display label: name, else value, else `节点<id>`
    pub fn label(&self) -> String {
        [&self.name, &self.value]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("节点{}", self.id))
    }
}

impl FieldDescriptor {
    pub fn is_flow(&self) -> bool {
        FLOW_FIELD_TYPES
            .iter()
            .any(|t| self.field_type.eq_ignore_ascii_case(t))
    }
}

/// Label/value pair for a picker
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, found {}",
            crate::error::json_type_name(&other)
        ))),
    }
}

/// Parse the field list exported by the host
pub fn parse_field_schema(text: &str) -> Result<Vec<FieldDescriptor>, PayloadError> {
    Ok(serde_json::from_str(text)?)
}

/// First field whose name contains `fragment`
pub fn find_progress_field<'a>(
    fields: &'a [FieldDescriptor],
    fragment: &str,
) -> Option<&'a FieldDescriptor> {
    let found = fields.iter().find(|f| f.name.contains(fragment));
    if found.is_none() {
        tracing::debug!(
            fragment,
            available = ?fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "progress field not found"
        );
    }
    found
}

/// Flow fields in schema order
pub fn flow_fields(fields: &[FieldDescriptor]) -> Vec<&FieldDescriptor> {
    fields.iter().filter(|f| f.is_flow()).collect()
}

/// Picker options for choosing a flow field
pub fn flow_field_options(fields: &[FieldDescriptor]) -> Vec<SelectOption> {
    flow_fields(fields)
        .into_iter()
        .map(|f| SelectOption {
            label: f.name.clone(),
            value: f.id.clone(),
        })
        .collect()
}

/// Picker options for choosing a node of one flow field
pub fn flow_node_options(field: &FieldDescriptor) -> Vec<SelectOption> {
    field
        .nodes
        .iter()
        .map(|node| SelectOption {
            label: node.label(),
            value: node.id.clone(),
        })
        .collect()
}

/// Look up a flow field by id
pub fn find_flow_field<'a>(
    fields: &'a [FieldDescriptor],
    field_id: &str,
) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.id == field_id && f.is_flow())
}
