//! Enumeration, custom field and user mapping between the two systems.
//!
//! Mapping problems never fail the run: unknown values fall back to a
//! default and are reported with `tracing::warn!`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use url::Url;

use crate::source::{
    SourceCaseField, SourceEnumValue, SourceStatus, SourceUser, FIELD_TYPE_DROPDOWN,
    FIELD_TYPE_MULTISELECT,
};
use crate::target::{FieldOption, TargetAuthor, TargetCustomField, TargetSystemOption, UserProvision};
use crate::types::{SourceId, TargetId};

/// Target id used when a case type or priority has no counterpart.
pub const FALLBACK_ENUM_ID: i64 = 1;

/// Target status slug used when a result status has no counterpart.
pub const FALLBACK_STATUS: &str = "skipped";

/// Step statuses the target accepts on result steps.
pub const STEP_STATUSES: [&str; 4] = ["passed", "failed", "blocked", "skipped"];

/// Title of the target field holding case references.
pub const REFS_FIELD_TITLE: &str = "Refs";

/// Target field type of the references field (url).
pub const REFS_FIELD_TYPE: i64 = 7;

/// Offset added to source option ids, which may start at zero.
pub const OPTION_ID_OFFSET: i64 = 1;

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Target field type for a source field type, `None` when unsupported.
pub fn target_field_type(source_type: i64) -> Option<i64> {
    match source_type {
        1 => Some(1),  // string
        2 => Some(0),  // integer -> number
        3 => Some(2),  // text
        4 => Some(7),  // url
        5 => Some(4),  // checkbox
        6 => Some(3),  // dropdown -> selectbox
        7 => Some(8),  // user
        8 => Some(9),  // date -> datetime
        12 => Some(6), // multiselect
        _ => None,
    }
}

/// Target field type id for a target type name.
pub fn target_type_from_name(name: &str) -> Option<i64> {
    match name.to_ascii_lowercase().as_str() {
        "number" => Some(0),
        "string" => Some(1),
        "text" => Some(2),
        "selectbox" => Some(3),
        "checkbox" => Some(4),
        "radio" => Some(5),
        "multiselect" => Some(6),
        "url" => Some(7),
        "user" => Some(8),
        "datetime" => Some(9),
        _ => None,
    }
}

/// Whether values of this target type are option ids.
pub fn is_select_type(target_type: i64) -> bool {
    matches!(target_type, 3 | 5 | 6)
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Case type, priority and result status maps built once per run.
#[derive(Debug, Clone, Default)]
pub struct EnumMaps {
    pub types: HashMap<i64, i64>,
    pub priorities: HashMap<i64, i64>,
    pub statuses: HashMap<i64, String>,
}

impl EnumMaps {
    pub fn case_type(&self, source: Option<i64>) -> i64 {
        source
            .and_then(|id| self.types.get(&id).copied())
            .unwrap_or(FALLBACK_ENUM_ID)
    }

    pub fn priority(&self, source: Option<i64>) -> i64 {
        source
            .and_then(|id| self.priorities.get(&id).copied())
            .unwrap_or(FALLBACK_ENUM_ID)
    }

    pub fn status(&self, source: Option<i64>) -> String {
        source
            .and_then(|id| self.statuses.get(&id).cloned())
            .unwrap_or_else(|| FALLBACK_STATUS.to_string())
    }

    /// Status for a result step, restricted to the statuses steps accept.
    pub fn step_status(&self, source: Option<i64>) -> String {
        let status = self.status(source);
        if STEP_STATUSES.contains(&status.as_str()) {
            status
        } else {
            FALLBACK_STATUS.to_string()
        }
    }
}

/// Map source enumeration values to target option ids by
/// case-insensitive name. Unmatched values map to [`FALLBACK_ENUM_ID`].
pub fn map_enum_ids(
    source: &[SourceEnumValue],
    target: &[TargetSystemOption],
) -> HashMap<i64, i64> {
    source
        .iter()
        .map(|value| {
            let id = target
                .iter()
                .find(|option| option.title.eq_ignore_ascii_case(&value.name))
                .map(|option| option.id)
                .unwrap_or(FALLBACK_ENUM_ID);
            (value.id, id)
        })
        .collect()
}

/// Map source result statuses to target status slugs by case-insensitive
/// label (or name). Unmatched statuses map to [`FALLBACK_STATUS`].
pub fn map_statuses(
    source: &[SourceStatus],
    target: &[TargetSystemOption],
) -> HashMap<i64, String> {
    source
        .iter()
        .map(|status| {
            let slug = target
                .iter()
                .find(|option| {
                    option.title.eq_ignore_ascii_case(&status.label)
                        || option.title.eq_ignore_ascii_case(&status.name)
                })
                .and_then(|option| option.slug.clone())
                .unwrap_or_else(|| FALLBACK_STATUS.to_string());
            (status.id, slug)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Custom fields
// ---------------------------------------------------------------------------

/// Parse newline-delimited `"id, label"` option records.
///
/// Blank and malformed lines are skipped.
pub fn parse_options(items: &str) -> BTreeMap<i64, String> {
    items
        .lines()
        .filter_map(|line| {
            let (id, label) = line.split_once(',')?;
            let id = id.trim().parse::<i64>().ok()?;
            Some((id, label.trim().to_string()))
        })
        .collect()
}

/// Target options for a source option set, with ids shifted by
/// [`OPTION_ID_OFFSET`].
pub fn target_options(options: &BTreeMap<i64, String>) -> Vec<FieldOption> {
    options
        .iter()
        .map(|(id, title)| FieldOption {
            id: id + OPTION_ID_OFFSET,
            title: title.clone(),
        })
        .collect()
}

/// A source custom field resolved to its target counterpart.
#[derive(Debug, Clone)]
pub struct MappedField {
    /// Source name without the `custom_` prefix.
    pub name: String,
    pub system_name: String,
    pub source_type: i64,
    pub target_id: TargetId,
    /// Option ids accepted by the source field.
    pub source_options: BTreeSet<i64>,
}

impl MappedField {
    pub fn new(field: &SourceCaseField, target_id: TargetId) -> Self {
        let source_options = field
            .option_items()
            .map(parse_options)
            .unwrap_or_default()
            .into_keys()
            .collect();
        Self {
            name: field.name.clone(),
            system_name: field.system_name.clone(),
            source_type: field.type_id,
            target_id,
            source_options,
        }
    }

    /// Bind a source field to an existing target field, taking the
    /// accepted options from the target's option list when it has one.
    pub fn bind_existing(field: &SourceCaseField, existing: &TargetCustomField) -> Self {
        let mut mapped = Self::new(field, existing.id);
        let target_options = existing
            .value
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<FieldOption>>(raw).ok());
        if let Some(options) = target_options {
            mapped.source_options = options
                .iter()
                .map(|option| option.id - OPTION_ID_OFFSET)
                .collect();
        }
        mapped
    }

    pub fn is_select(&self) -> bool {
        self.source_type == FIELD_TYPE_DROPDOWN || self.source_type == FIELD_TYPE_MULTISELECT
    }

    /// Validate a dropdown or multiselect value and translate it to target
    /// option ids. Unknown options are dropped; `None` when nothing is left.
    pub fn select_value(&self, value: &Value) -> Option<String> {
        let raw: Vec<i64> = match value {
            Value::Array(items) => items.iter().filter_map(option_id).collect(),
            other => option_id(other).into_iter().collect(),
        };

        let mut kept = Vec::with_capacity(raw.len());
        for id in raw {
            if self.source_options.contains(&id) {
                kept.push((id + OPTION_ID_OFFSET).to_string());
            } else {
                tracing::warn!(field = %self.name, value = id, "Dropping unknown option value");
            }
        }

        if kept.is_empty() {
            None
        } else {
            Some(kept.join(","))
        }
    }
}

fn option_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a non-select custom value as the string the target expects.
pub fn plain_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(plain_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        other => Some(other.to_string()),
    }
}

/// Whether a source field should be imported given the configured
/// allow-list. An empty list selects every `custom_` field.
pub fn is_field_selected(field: &SourceCaseField, allow_list: &[String]) -> bool {
    if allow_list.is_empty() {
        field.system_name.starts_with("custom_")
    } else {
        allow_list.iter().any(|name| name == &field.name)
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Build the URL stored in the references field.
///
/// Absolute references are kept; relative ones are joined onto `base`.
/// Both are normalised (percent-encoded) by [`Url`].
pub fn refs_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return match Url::parse(raw) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::warn!(refs = raw, error = %e, "Skipping invalid reference URL");
                None
            }
        };
    }

    let base = base?;
    let base = if base.path().ends_with('/') {
        base.clone()
    } else {
        let mut with_slash = base.clone();
        with_slash.set_path(&format!("{}/", base.path()));
        with_slash
    };

    match base.join(raw) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::warn!(refs = raw, error = %e, "Skipping invalid reference URL");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Active source users with no target author of the same email.
///
/// A two-word name is split into given and family name; any other name is
/// kept whole as the given name.
pub fn users_to_provision(source: &[SourceUser], target: &[TargetAuthor]) -> Vec<UserProvision> {
    source
        .iter()
        .filter(|user| user.is_active && !user.email.is_empty())
        .filter(|user| {
            !target.iter().any(|author| {
                author
                    .email
                    .as_deref()
                    .is_some_and(|email| email.eq_ignore_ascii_case(&user.email))
            })
        })
        .map(|user| {
            let parts: Vec<&str> = user.name.split_whitespace().collect();
            let (given_name, family_name) = match parts.as_slice() {
                [given, family] => (given.to_string(), family.to_string()),
                _ => (user.name.clone(), String::new()),
            };
            UserProvision {
                email: user.email.clone(),
                given_name,
                family_name,
                role: user.role.clone(),
            }
        })
        .collect()
}

/// Match active source users to target authors by email.
///
/// Unmatched and inactive users map to `default_user`.
pub fn match_users(
    source: &[SourceUser],
    target: &[TargetAuthor],
    default_user: TargetId,
) -> HashMap<SourceId, TargetId> {
    source
        .iter()
        .map(|user| {
            let matched = if user.is_active && !user.email.is_empty() {
                target
                    .iter()
                    .find(|author| {
                        author
                            .email
                            .as_deref()
                            .is_some_and(|email| email.eq_ignore_ascii_case(&user.email))
                    })
                    .map(|author| author.id)
            } else {
                None
            };

            if matched.is_none() {
                tracing::debug!(email = %user.email, "User not found in target, using default user");
            }
            (user.id, matched.unwrap_or(default_user))
        })
        .collect()
}
