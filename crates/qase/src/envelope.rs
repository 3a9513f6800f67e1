//! Response envelope shared by every target endpoint.
//!
//! Success: `{"status": true, "result": {...}}`. Failure:
//! `{"status": false, "errorMessage": "...", "errorFields": [{"field": "code", "error": "..."}]}`.

use casebridge_core::error::ApiError;
use serde::Deserialize;

/// Error message the target returns when a project code is taken.
pub const PROJECT_EXISTS_MESSAGE: &str = "already exists";

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    #[serde(default = "none")]
    pub result: Option<T>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

fn none<T>() -> Option<T> {
    None
}

impl<T> Envelope<T> {
    /// The `result` payload of a successful response.
    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.status {
            return Err(self.failure());
        }
        self.result
            .ok_or_else(|| ApiError::Decode("response carries no result".into()))
    }

    /// Succeed on `status: true`, ignoring any payload.
    pub fn check(self) -> Result<(), ApiError> {
        if self.status {
            Ok(())
        } else {
            Err(self.failure())
        }
    }

    fn failure(&self) -> ApiError {
        ApiError::Decode(format!(
            "target reported failure: {}",
            self.error_message.as_deref().unwrap_or("no message")
        ))
    }
}

/// `{"entities": [...]}` page of a list endpoint.
#[derive(Debug, Deserialize)]
pub struct EntityPage<T> {
    #[serde(default = "Vec::new")]
    pub entities: Vec<T>,
}

/// `{"id": 1}` result of create endpoints.
#[derive(Debug, Deserialize)]
pub struct Created {
    pub id: i64,
}

/// `{"hash": "..."}` result of the shared step endpoint.
#[derive(Debug, Deserialize)]
pub struct CreatedHash {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
    #[serde(default, rename = "errorFields")]
    error_fields: Vec<ErrorField>,
}

#[derive(Debug, Deserialize)]
struct ErrorField {
    #[serde(default)]
    error: String,
}

/// Whether a failed project creation means the code is already in use.
pub fn is_duplicate_project(error: &ApiError) -> bool {
    let ApiError::Status { status, body } = error else {
        return false;
    };
    if !(400..500).contains(status) {
        return false;
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            parsed
                .error_fields
                .iter()
                .any(|field| field.error.contains(PROJECT_EXISTS_MESSAGE))
                || parsed
                    .error_message
                    .is_some_and(|m| m.contains(PROJECT_EXISTS_MESSAGE))
        }
        Err(_) => body.contains(PROJECT_EXISTS_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use casebridge_core::target::AttachmentHandle;

    use super::*;

    #[test]
    fn successful_envelope_yields_result() {
        let envelope: Envelope<Created> =
            serde_json::from_str(r#"{"status": true, "result": {"id": 12}}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap().id, 12);
    }

    #[test]
    fn status_only_envelope_checks() {
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(r#"{"status": true}"#).unwrap();
        assert!(envelope.check().is_ok());

        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"status": false, "errorMessage": "Run is closed"}"#).unwrap();
        assert_matches!(envelope.check(), Err(ApiError::Decode(msg)) if msg.contains("Run is closed"));
    }

    #[test]
    fn missing_result_is_a_decode_error() {
        let envelope: Envelope<Created> = serde_json::from_str(r#"{"status": true}"#).unwrap();
        assert_matches!(envelope.into_result(), Err(ApiError::Decode(_)));
    }

    #[test]
    fn upload_result_is_a_list() {
        let body = r#"{"status": true, "result": [
            {"hash": "6f2a", "filename": "shot.png", "mime": "image/png", "extension": "png",
             "url": "https://cdn.example/6f2a/shot.png"}
        ]}"#;
        let envelope: Envelope<Vec<AttachmentHandle>> = serde_json::from_str(body).unwrap();
        let handles = envelope.into_result().unwrap();
        assert_eq!(handles[0].hash, "6f2a");
        assert_eq!(handles[0].filename, "shot.png");
    }

    #[test]
    fn duplicate_project_detection() {
        let duplicate = ApiError::Status {
            status: 422,
            body: r#"{"status": false, "errorMessage": "Data is invalid.",
                      "errorFields": [{"field": "code", "error": "Project with the same code already exists."}]}"#
                .into(),
        };
        assert!(is_duplicate_project(&duplicate));

        let other = ApiError::Status {
            status: 422,
            body: r#"{"status": false, "errorFields": [{"field": "title", "error": "Title is required."}]}"#.into(),
        };
        assert!(!is_duplicate_project(&other));

        let server = ApiError::Status {
            status: 500,
            body: "already exists".into(),
        };
        assert!(!is_duplicate_project(&server));
    }
}
