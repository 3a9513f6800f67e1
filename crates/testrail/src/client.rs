//! [`SourceApi`] over the v2 REST API.
//!
//! Every call runs under the client's [`RetryingCaller`]. API paths look like
//! `index.php?/api/v2/get_cases/4&suite_id=2&limit=250&offset=0` and use
//! HTTP basic auth with the user and API key.

use async_trait::async_trait;
use casebridge_core::attachments::{filename_from_disposition, DEFAULT_ATTACHMENT_NAME};
use casebridge_core::error::ApiError;
use casebridge_core::remote::{ApiResult, SourceApi, ATTACHMENT_PAGE_SIZE};
use casebridge_core::source::{
    AttachmentFile, SourceAttachmentRef, SourceCase, SourceCaseField, SourceConfigGroup,
    SourceEnumValue, SourceMilestone, SourcePlan, SourcePlanSummary, SourceProject, SourceResult,
    SourceRun, SourceSection, SourceSharedStep, SourceStatus, SourceSuite, SourceTest, SourceUser,
};
use casebridge_core::types::{SourceId, UnixTime};
use casebridge_runtime::http::{build_client, ensure_success, from_reqwest, parse_json};
use casebridge_runtime::retry::{RetryPolicy, RetryingCaller};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::listing::{parse_overview, with_query, ListingPage};
use crate::session::WebSession;

/// Connection settings for the source instance.
#[derive(Debug, Clone)]
pub struct TestrailConfig {
    /// Instance root, e.g. `https://example.testrail.io/`.
    pub base_url: Url,
    pub user: String,
    /// API key or password.
    pub password: String,
}

/// HTTP client for one source instance.
#[derive(Debug)]
pub struct TestrailClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    session: Option<WebSession>,
    retry: RetryingCaller,
}

impl TestrailClient {
    /// Build the client and try to open a web session.
    ///
    /// A failed login is not fatal: the client falls back to the REST API
    /// for attachment downloads and the bulk listing comes back empty.
    pub async fn connect(config: TestrailConfig, policy: RetryPolicy) -> Result<Self, ApiError> {
        let mut client = Self::without_session(config, policy)?;
        match WebSession::login(&client.base_url, &client.user, &client.password).await {
            Ok(session) => {
                tracing::info!(url = %client.base_url, "Web session established");
                client.session = Some(session);
            }
            Err(e) => {
                tracing::warn!(
                    url = %client.base_url,
                    error = %e,
                    "Failed to log in to the web UI, attachments will be fetched through the API",
                );
            }
        }
        Ok(client)
    }

    /// Build a REST-only client.
    pub fn without_session(config: TestrailConfig, policy: RetryPolicy) -> Result<Self, ApiError> {
        let mut base_url = config.base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            http: build_client(false)?,
            base_url,
            user: config.user,
            password: config.password,
            session: None,
            retry: RetryingCaller::new("source", policy),
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}index.php?/api/v2/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, operation: &'static str, path: String) -> ApiResult<T> {
        let url = &self.api_url(&path);
        let this = self;
        self.retry
            .call(operation, move || async move {
                let response = this
                    .http
                    .get(url)
                    .basic_auth(&this.user, Some(&this.password))
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                parse_json(response).await
            })
            .await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: String,
        key: &str,
    ) -> ApiResult<Vec<T>> {
        let value: Value = self.get(operation, path).await?;
        Ok(ListingPage::from_value(value, key)?.items)
    }

    async fn download(&self, request: reqwest::RequestBuilder) -> ApiResult<AttachmentFile> {
        let response = request.send().await.map_err(from_reqwest)?;
        let response = ensure_success(response).await?;

        let headers = response.headers();
        let mime = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string());

        let bytes = response.bytes().await.map_err(from_reqwest)?.to_vec();
        Ok(AttachmentFile {
            filename,
            mime,
            bytes,
        })
    }
}

fn page(limit: u32, offset: u32) -> [(&'static str, Option<i64>); 2] {
    [
        ("limit", Some(i64::from(limit))),
        ("offset", Some(i64::from(offset))),
    ]
}

fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

#[async_trait]
impl SourceApi for TestrailClient {
    async fn get_projects(&self, limit: u32, offset: u32) -> ApiResult<Vec<SourceProject>> {
        let path = with_query("get_projects", &page(limit, offset));
        self.list("get_projects", path, "projects").await
    }

    async fn get_suites(&self, project_id: SourceId) -> ApiResult<Vec<SourceSuite>> {
        self.list("get_suites", format!("get_suites/{project_id}"), "suites")
            .await
    }

    async fn get_sections(
        &self,
        project_id: SourceId,
        suite_id: Option<SourceId>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceSection>> {
        let mut path = with_query(format!("get_sections/{project_id}"), &[("suite_id", positive(suite_id))]);
        path = with_query(path, &page(limit, offset));
        self.list("get_sections", path, "sections").await
    }

    async fn get_users(&self) -> ApiResult<Vec<SourceUser>> {
        self.list("get_users", "get_users".into(), "users").await
    }

    async fn get_case_types(&self) -> ApiResult<Vec<SourceEnumValue>> {
        self.get("get_case_types", "get_case_types".into()).await
    }

    async fn get_priorities(&self) -> ApiResult<Vec<SourceEnumValue>> {
        self.get("get_priorities", "get_priorities".into()).await
    }

    async fn get_result_statuses(&self) -> ApiResult<Vec<SourceStatus>> {
        self.get("get_statuses", "get_statuses".into()).await
    }

    async fn get_case_fields(&self) -> ApiResult<Vec<SourceCaseField>> {
        self.get("get_case_fields", "get_case_fields".into()).await
    }

    async fn get_cases(
        &self,
        project_id: SourceId,
        suite_id: Option<SourceId>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceCase>> {
        let mut path = with_query(format!("get_cases/{project_id}"), &[("suite_id", positive(suite_id))]);
        path = with_query(path, &page(limit, offset));
        self.list("get_cases", path, "cases").await
    }

    async fn get_runs(
        &self,
        project_id: SourceId,
        created_after: Option<UnixTime>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceRun>> {
        let mut path = with_query(
            format!("get_runs/{project_id}"),
            &[("created_after", positive(created_after))],
        );
        path = with_query(path, &page(limit, offset));
        self.list("get_runs", path, "runs").await
    }

    async fn get_plans(
        &self,
        project_id: SourceId,
        created_after: Option<UnixTime>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourcePlanSummary>> {
        let mut path = with_query(
            format!("get_plans/{project_id}"),
            &[("created_after", positive(created_after))],
        );
        path = with_query(path, &page(limit, offset));
        self.list("get_plans", path, "plans").await
    }

    async fn get_plan(&self, plan_id: SourceId) -> ApiResult<SourcePlan> {
        self.get("get_plan", format!("get_plan/{plan_id}")).await
    }

    async fn get_tests(&self, run_id: SourceId, limit: u32, offset: u32) -> ApiResult<Vec<SourceTest>> {
        let path = with_query(format!("get_tests/{run_id}"), &page(limit, offset));
        self.list("get_tests", path, "tests").await
    }

    async fn get_results_for_run(
        &self,
        run_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceResult>> {
        let path = with_query(format!("get_results_for_run/{run_id}"), &page(limit, offset));
        self.list("get_results_for_run", path, "results").await
    }

    async fn get_milestones(
        &self,
        project_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceMilestone>> {
        let path = with_query(format!("get_milestones/{project_id}"), &page(limit, offset));
        self.list("get_milestones", path, "milestones").await
    }

    async fn get_configs(&self, project_id: SourceId) -> ApiResult<Vec<SourceConfigGroup>> {
        self.get("get_configs", format!("get_configs/{project_id}")).await
    }

    async fn get_shared_steps(
        &self,
        project_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceSharedStep>> {
        let path = with_query(format!("get_shared_steps/{project_id}"), &page(limit, offset));
        self.list("get_shared_steps", path, "shared_steps").await
    }

    /// The overview endpoint has no page size parameter and always answers
    /// with [`ATTACHMENT_PAGE_SIZE`] entries, so any other limit would end
    /// or stretch the walk at the wrong page.
    async fn list_attachments(&self, limit: u32, offset: u32) -> ApiResult<Vec<SourceAttachmentRef>> {
        if limit != ATTACHMENT_PAGE_SIZE {
            return Err(ApiError::Request(format!(
                "attachment overview pages hold {ATTACHMENT_PAGE_SIZE} entries, got limit {limit}"
            )));
        }
        let Some(session) = &self.session else {
            return Ok(Vec::new());
        };
        let url = &format!("{}index.php?/attachments/overview/0", self.base_url);
        let offset = offset.to_string();
        let form = &[
            ("offset", offset.as_str()),
            ("order_by", "created_on"),
            ("order_dir", "desc"),
            ("_token", session.csrf_token()),
        ];

        tracing::debug!(offset = %offset, "Fetching attachment overview page");
        self.retry
            .call("attachments_overview", move || async move {
                let response = session
                    .http()
                    .post(url)
                    .header("X-Requested-With", "XMLHttpRequest")
                    .form(form)
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                let body = ensure_success(response)
                    .await?
                    .bytes()
                    .await
                    .map_err(from_reqwest)?;
                parse_overview(&body)
            })
            .await
    }

    async fn get_attachment(&self, attachment_id: &str) -> ApiResult<AttachmentFile> {
        let this = self;
        match &self.session {
            Some(session) => {
                let url = &format!("{}index.php?/attachments/get/{}", self.base_url, attachment_id);
                self.retry
                    .call("get_attachment", move || async move {
                        this.download(session.http().get(url)).await
                    })
                    .await
            }
            None => {
                let url = &self.api_url(&format!("get_attachment/{attachment_id}"));
                self.retry
                    .call("get_attachment", move || async move {
                        let request = this
                            .http
                            .get(url)
                            .basic_auth(&this.user, Some(&this.password));
                        this.download(request).await
                    })
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn client(base: &str) -> TestrailClient {
        TestrailClient::without_session(
            TestrailConfig {
                base_url: Url::parse(base).unwrap(),
                user: "qa@example.com".into(),
                password: "key".into(),
            },
            RetryPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn api_urls_keep_the_index_php_query_form() {
        let client = client("https://example.testrail.io/sub");
        let path = with_query("get_cases/4", &[("suite_id", positive(Some(2)))]);
        let path = with_query(path, &page(250, 500));
        assert_eq!(
            client.api_url(&path),
            "https://example.testrail.io/sub/index.php?/api/v2/get_cases/4&suite_id=2&limit=250&offset=500"
        );
        assert!(!client.has_session());
    }

    #[test]
    fn zero_filters_are_omitted() {
        let path = with_query("get_runs/1", &[("created_after", positive(Some(0)))]);
        assert_eq!(path, "get_runs/1");
    }

    #[tokio::test]
    async fn listing_without_session_is_empty() {
        let client = client("https://example.testrail.io/");
        assert!(client
            .list_attachments(ATTACHMENT_PAGE_SIZE, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn overview_rejects_other_page_sizes() {
        let client = client("https://example.testrail.io/");
        assert_matches!(
            client.list_attachments(100, 0).await,
            Err(ApiError::Request(_))
        );
    }
}
