//! Shared `reqwest` response handling for the remote clients.

use std::time::Duration;

use casebridge_core::error::ApiError;
use serde::de::DeserializeOwned;

/// HTTP request timeout for a single attempt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a client with the standard timeout and an optional cookie store.
pub fn build_client(cookie_store: bool) -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .cookie_store(cookie_store)
        .build()
        .map_err(from_reqwest)
}

/// Classify a transport-level `reqwest` failure.
pub fn from_reqwest(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else if e.is_decode() || e.is_body() {
        ApiError::Decode(e.to_string())
    } else if let Some(status) = e.status() {
        ApiError::Status {
            status: status.as_u16(),
            body: e.to_string(),
        }
    } else {
        ApiError::Network(e.to_string())
    }
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or an [`ApiError::Status`] carrying the status
/// and body text on failure.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Check the status, then decode the JSON body into `T`.
pub async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await.map_err(from_reqwest)?;
    decode(&bytes)
}

/// Decode a JSON body, mapping failures to [`ApiError::Decode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
    }

    #[test]
    fn decode_maps_errors() {
        assert_eq!(decode::<Item>(br#"{"id": 4}"#).unwrap(), Item { id: 4 });
        assert_matches!(decode::<Item>(b"not json"), Err(ApiError::Decode(_)));
    }

    #[test]
    fn client_builds() {
        assert!(build_client(true).is_ok());
    }
}
