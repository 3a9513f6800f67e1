//! [`DirectoryApi`] over the SCIM 2.0 provisioning API.

use async_trait::async_trait;
use casebridge_core::error::ApiError;
use casebridge_core::remote::{ApiResult, DirectoryApi};
use casebridge_core::target::UserProvision;
use casebridge_runtime::http::{build_client, ensure_success, from_reqwest, parse_json};
use casebridge_runtime::retry::{RetryPolicy, RetryingCaller};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

const SCIM_CONTENT_TYPE: &str = "application/scim+json";
const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
const PATCH_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// Connection settings for the workspace directory.
#[derive(Debug, Clone)]
pub struct ScimConfig {
    /// SCIM root, e.g. `https://app.qase.io/scim/v2`.
    pub base_url: Url,
    pub token: String,
}

#[derive(Debug)]
pub struct ScimClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryingCaller,
}

#[derive(Deserialize)]
struct Resource {
    id: Value,
}

impl Resource {
    /// SCIM ids are strings, but some servers send numbers.
    fn into_id(self) -> ApiResult<String> {
        match self.id {
            Value::String(id) => Ok(id),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(ApiError::Decode(format!("unexpected resource id: {other}"))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest<'a> {
    schemas: [&'static str; 1],
    user_name: &'a str,
    name: UserName<'a>,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_title: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserName<'a> {
    given_name: &'a str,
    family_name: &'a str,
}

impl<'a> From<&'a UserProvision> for UserRequest<'a> {
    fn from(user: &'a UserProvision) -> Self {
        Self {
            schemas: [USER_SCHEMA],
            user_name: &user.email,
            name: UserName {
                given_name: &user.given_name,
                family_name: &user.family_name,
            },
            active: true,
            role_title: user.role.as_deref(),
        }
    }
}

fn membership_patch(user_id: &str) -> Value {
    json!({
        "schemas": [PATCH_SCHEMA],
        "Operations": [{"op": "Add", "path": "members", "value": [{"value": user_id}]}],
    })
}

impl ScimClient {
    pub fn new(config: ScimConfig, policy: RetryPolicy) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_client(false)?,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            token: config.token,
            retry: RetryingCaller::new("directory", policy),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<B: Serialize + Sync + ?Sized>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<reqwest::Response> {
        let body = serde_json::to_vec(body).map_err(|e| ApiError::Request(e.to_string()))?;
        let url = &self.url(path);
        let (this, body, method) = (self, &body, &method);
        self.retry
            .call(operation, move || async move {
                let response = this
                    .http
                    .request(method.clone(), url)
                    .bearer_auth(&this.token)
                    .header(CONTENT_TYPE, SCIM_CONTENT_TYPE)
                    .body(body.clone())
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                ensure_success(response).await
            })
            .await
    }
}

#[async_trait]
impl DirectoryApi for ScimClient {
    async fn create_group(&self, name: &str) -> ApiResult<String> {
        let body = json!({"schemas": [GROUP_SCHEMA], "displayName": name});
        let response = self.send("create_group", Method::POST, "Groups", &body).await?;
        parse_json::<Resource>(response).await?.into_id()
    }

    async fn create_user(&self, user: &UserProvision) -> ApiResult<String> {
        let response = self
            .send("create_user", Method::POST, "Users", &UserRequest::from(user))
            .await?;
        parse_json::<Resource>(response).await?.into_id()
    }

    async fn add_user_to_group(&self, group_id: &str, user_id: &str) -> ApiResult<()> {
        self.send(
            "add_user_to_group",
            Method::PATCH,
            &format!("Groups/{group_id}"),
            &membership_patch(user_id),
        )
        .await?;
        Ok(())
    }
}
