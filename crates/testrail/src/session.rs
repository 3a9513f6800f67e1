//! Cookie-authenticated web session.
//!
//! Some data (the instance-wide attachment overview, raw attachment
//! downloads) is only reachable through the web UI. The session logs in
//! with the API credentials and keeps the CSRF token the login page hands
//! out for later form posts.

use std::sync::LazyLock;

use casebridge_core::error::ApiError;
use casebridge_runtime::http::{build_client, ensure_success, from_reqwest};
use regex::Regex;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input[^>]*name=["']_token["'][^>]*value=["']([^"']*)["']|<input[^>]*value=["']([^"']*)["'][^>]*name=["']_token["']"#)
        .expect("valid regex")
});

/// A logged-in web session.
#[derive(Debug, Clone)]
pub struct WebSession {
    http: reqwest::Client,
    csrf_token: String,
}

impl WebSession {
    /// Log in through the web form and capture the CSRF token.
    ///
    /// * `base_url` - Instance root ending with `/`.
    pub async fn login(base_url: &str, user: &str, password: &str) -> Result<Self, ApiError> {
        let http = build_client(true)?;
        let response = http
            .post(format!("{base_url}index.php?/auth/login/"))
            .form(&[("name", user), ("password", password), ("rememberme", "1")])
            .send()
            .await
            .map_err(from_reqwest)?;
        let page = ensure_success(response)
            .await?
            .text()
            .await
            .map_err(from_reqwest)?;

        let csrf_token = extract_csrf_token(&page)
            .ok_or_else(|| ApiError::Decode("login page carries no _token field".into()))?;

        Ok(Self { http, csrf_token })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }
}

/// Value of the hidden `_token` input of an HTML page.
pub fn extract_csrf_token(page: &str) -> Option<String> {
    let caps = TOKEN_RE.captures(page)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
}
