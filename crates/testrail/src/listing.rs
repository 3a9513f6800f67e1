//! Decoding of list endpoints.
//!
//! Older servers answer list calls with a bare JSON array. Newer ones wrap
//! the page in an object: `{"offset": 0, "limit": 250, "size": 12,
//! "_links": {...}, "cases": [...]}`. Both shapes decode to a
//! [`ListingPage`].

use casebridge_core::error::ApiError;
use casebridge_core::source::SourceAttachmentRef;
use casebridge_core::types::SourceId;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage<T> {
    pub items: Vec<T>,
    /// Item count reported by the wrapped shape; `None` for bare arrays.
    pub size: Option<u64>,
}

impl<T: DeserializeOwned> ListingPage<T> {
    /// Decode either listing shape. `key` names the entity array inside
    /// the wrapped shape, e.g. `"cases"`.
    pub fn from_value(value: Value, key: &str) -> Result<Self, ApiError> {
        match value {
            Value::Array(_) => Ok(Self {
                items: decode_items(value)?,
                size: None,
            }),
            Value::Object(mut map) => {
                let items = map
                    .remove(key)
                    .ok_or_else(|| ApiError::Decode(format!("listing has no '{key}' array")))?;
                Ok(Self {
                    items: decode_items(items)?,
                    size: map.get("size").and_then(Value::as_u64),
                })
            }
            other => Err(ApiError::Decode(format!(
                "expected a listing, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn decode_items<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Append `&name=value` query pairs to an API path.
///
/// API paths already carry the `?` of `index.php?/api/v2/...`, so every
/// parameter is joined with `&`.
pub fn with_query(path: impl Into<String>, params: &[(&str, Option<i64>)]) -> String {
    let mut path = path.into();
    for (name, value) in params {
        if let Some(value) = value {
            path.push('&');
            path.push_str(name);
            path.push('=');
            path.push_str(&value.to_string());
        }
    }
    path
}

// ---------------------------------------------------------------------------
// Attachment overview
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(default)]
    data: Vec<OverviewItem>,
}

#[derive(Debug, Deserialize)]
struct OverviewItem {
    id: Value,
    #[serde(default)]
    project_id: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(SourceId),
    Many(Vec<SourceId>),
}

/// Decode the body of the web attachment overview.
pub fn parse_overview(body: &[u8]) -> Result<Vec<SourceAttachmentRef>, ApiError> {
    let response: OverviewResponse = casebridge_runtime::http::decode(body)?;
    Ok(response
        .data
        .into_iter()
        .filter_map(|item| {
            let id = match item.id {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let project_ids = match item.project_id {
                Some(OneOrMany::One(id)) => vec![id],
                Some(OneOrMany::Many(ids)) => ids,
                None => Vec::new(),
            };
            Some(SourceAttachmentRef { id, project_ids })
        })
        .collect())
}
