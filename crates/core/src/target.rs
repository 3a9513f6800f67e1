//! Payloads written to, and records read from, the target system.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ProjectCode, SourceId, TargetId, UnixTime};

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAuthor {
    pub id: TargetId,
    #[serde(default)]
    pub email: Option<String>,
}

/// A system field (type, priority, result status, ...) with its options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSystemField {
    pub slug: String,
    #[serde(default)]
    pub options: Vec<TargetSystemOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSystemOption {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// An existing custom field. `value` holds the JSON-encoded option list
/// for select-like fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetCustomField {
    pub id: TargetId,
    pub title: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Uploaded attachment as referenced from target payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentHandle {
    pub hash: String,
    pub filename: String,
    pub url: String,
}

/// Result of a project creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    Created,
    /// The target already holds a project with this code; it is reused.
    AlreadyExists,
}

// ---------------------------------------------------------------------------
// Write side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomFieldCreate {
    pub title: String,
    /// 0 = case, 1 = run, 2 = defect.
    pub entity: i64,
    #[serde(rename = "type")]
    pub type_id: i64,
    pub value: Vec<FieldOption>,
    pub is_filterable: bool,
    pub is_visible: bool,
    pub is_required: bool,
    pub is_enabled_for_all_projects: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub projects_codes: Vec<ProjectCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectCreate {
    pub title: String,
    pub code: ProjectCode,
    pub description: String,
    /// Directory group granted access to the project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// A directory user to create in the target workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProvision {
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteCreate {
    pub title: String,
    pub description: String,
    pub preconditions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepCreate {
    pub action: String,
    pub expected_result: String,
    pub position: u32,
}

/// One item of a bulk case creation. The source case id is reused as the
/// target case id so runs can reference cases without a lookup table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseCreate {
    pub id: SourceId,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub author_id: TargetId,
    pub steps: Vec<StepCreate>,
    pub is_flaky: u8,
    pub custom_field: BTreeMap<String, String>,
    pub priority: i64,
    #[serde(rename = "type")]
    pub type_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub author_id: TargetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<TargetId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<TargetId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<SourceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResultCreate {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCreate {
    pub case_id: SourceId,
    pub status: String,
    pub time_ms: i64,
    pub comment: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<UnixTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<TargetId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResultCreate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<UnixTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedStepContent {
    pub action: String,
    pub expected_result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedStepCreate {
    pub title: String,
    pub steps: Vec<SharedStepContent>,
}
