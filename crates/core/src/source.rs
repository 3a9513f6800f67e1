//! Typed records read from the source system.
//!
//! Each struct is validated once at the API boundary by serde; optional
//! attributes are `Option` or defaulted so partially populated payloads
//! still decode. Custom case columns are kept as raw JSON in
//! [`SourceCase::custom`] and interpreted by the mapping layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{SourceId, UnixTime};

/// Source suite mode in which every project carries several suites.
pub const SUITE_MODE_MULTIPLE: i64 = 3;

/// Source field type of a dropdown column.
pub const FIELD_TYPE_DROPDOWN: i64 = 6;

/// Source field type of a separated-steps column.
pub const FIELD_TYPE_STEPS: i64 = 10;

/// Source field type of a multiselect column.
pub const FIELD_TYPE_MULTISELECT: i64 = 12;

// ---------------------------------------------------------------------------
// Projects and hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProject {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub announcement: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default = "default_suite_mode")]
    pub suite_mode: i64,
}

fn default_suite_mode() -> i64 {
    1
}

impl SourceProject {
    /// Whether this project stores its cases in several top-level suites.
    pub fn is_multi_suite(&self) -> bool {
        self.suite_mode == SUITE_MODE_MULTIPLE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSuite {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A section as returned by the flat section listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSection {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` for sections at the root of their suite.
    #[serde(default)]
    pub parent_id: Option<SourceId>,
}

// ---------------------------------------------------------------------------
// Users and enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUser {
    pub id: SourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_active: bool,
    /// Role name, carried over when the user is provisioned in the target.
    #[serde(default)]
    pub role: Option<String>,
}

/// A named enumeration value (case type or priority).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEnumValue {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
}

// ---------------------------------------------------------------------------
// Custom fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCaseField {
    pub id: SourceId,
    /// Name without the `custom_` prefix, e.g. `"automation_type"`.
    pub name: String,
    /// Column name on case payloads, e.g. `"custom_automation_type"`.
    pub system_name: String,
    pub label: String,
    pub type_id: i64,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub configs: Vec<FieldConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default)]
    pub context: FieldContext,
    #[serde(default)]
    pub options: FieldOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldContext {
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub project_ids: Option<Vec<SourceId>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Newline-delimited `"id, label"` records for select fields.
    #[serde(default)]
    pub items: Option<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
}

impl SourceCaseField {
    /// Option records of the first config, if the field declares any.
    pub fn option_items(&self) -> Option<&str> {
        self.configs.first()?.options.items.as_deref()
    }

    /// Default value of the first config rendered as a string.
    pub fn default_value(&self) -> Option<String> {
        match self.configs.first()?.options.default_value.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Source projects this field is limited to, or `None` when global.
    pub fn project_scope(&self) -> Option<Vec<SourceId>> {
        let first = self.configs.first()?;
        if first.context.is_global {
            return None;
        }
        let ids: Vec<SourceId> = self
            .configs
            .iter()
            .filter_map(|c| c.context.project_ids.as_ref())
            .flatten()
            .copied()
            .collect();
        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCase {
    pub id: SourceId,
    pub title: String,
    #[serde(default)]
    pub section_id: Option<SourceId>,
    #[serde(default)]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub priority_id: Option<i64>,
    #[serde(default)]
    pub created_by: Option<SourceId>,
    #[serde(default)]
    pub created_on: UnixTime,
    #[serde(default)]
    pub updated_on: Option<UnixTime>,
    #[serde(default)]
    pub refs: Option<String>,
    /// Every remaining column, including the `custom_*` ones.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl SourceCase {
    /// Raw value of a custom column, skipping nulls and empty strings.
    pub fn custom_value(&self, system_name: &str) -> Option<&Value> {
        match self.custom.get(system_name)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::Array(a) if a.is_empty() => None,
            v => Some(v),
        }
    }
}

/// One entry of a separated-steps column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStep {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub expected: Option<String>,
}

// ---------------------------------------------------------------------------
// Runs, plans, tests, results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRun {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_on: UnixTime,
    #[serde(default)]
    pub completed_on: Option<UnixTime>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub milestone_id: Option<SourceId>,
    #[serde(default)]
    pub config_ids: Vec<SourceId>,
    #[serde(default)]
    pub created_by: Option<SourceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePlanSummary {
    pub id: SourceId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePlan {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<SourcePlanEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePlanEntry {
    #[serde(default)]
    pub runs: Vec<SourceRun>,
}

/// A test: one case instantiated inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTest {
    pub id: SourceId,
    #[serde(default)]
    pub case_id: Option<SourceId>,
}

/// Elapsed time as reported by the source: either seconds or a
/// human-readable span such as `"1h 5m 3s"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Elapsed {
    Seconds(i64),
    Text(String),
}

/// Attachment reference carried by a result: numeric on older servers,
/// a string key (optionally `E_`-prefixed) on newer ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentRef {
    Id(i64),
    Key(String),
}

impl AttachmentRef {
    /// Lookup key used by the attachment map.
    pub fn key(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Key(key) => crate::attachments::normalize_attachment_id(key).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStepResult {
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub id: SourceId,
    pub test_id: SourceId,
    /// `None` for comment-only entries.
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub created_on: UnixTime,
    #[serde(default)]
    pub created_by: Option<SourceId>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub elapsed: Option<Elapsed>,
    #[serde(default)]
    pub attachment_ids: Vec<AttachmentRef>,
    #[serde(default)]
    pub custom_step_results: Option<Vec<SourceStepResult>>,
}

// ---------------------------------------------------------------------------
// Milestones, configurations, shared steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMilestone {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_on: Option<UnixTime>,
    #[serde(default)]
    pub is_completed: bool,
    /// Child milestones, present on nested listings.
    #[serde(default)]
    pub milestones: Vec<SourceMilestone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfigGroup {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub configs: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSharedStep {
    pub id: SourceId,
    pub title: String,
    #[serde(default)]
    pub custom_steps_separated: Vec<SourceStep>,
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// Entry of the bulk attachment listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttachmentRef {
    pub id: String,
    #[serde(default)]
    pub project_ids: Vec<SourceId>,
}

/// Downloaded attachment content.
#[derive(Debug, Clone)]
pub struct AttachmentFile {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}
