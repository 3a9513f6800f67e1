//! [`TargetApi`] over the v1 REST API.

use async_trait::async_trait;
use casebridge_core::error::ApiError;
use casebridge_core::remote::{ApiResult, TargetApi};
use casebridge_core::source::AttachmentFile;
use casebridge_core::target::{
    AttachmentHandle, CaseCreate, CustomFieldCreate, MilestoneCreate, ProjectCreate,
    ProjectOutcome, ResultCreate, RunCreate, SharedStepCreate, SuiteCreate, TargetAuthor,
    TargetCustomField, TargetSystemField,
};
use casebridge_core::types::TargetId;
use casebridge_runtime::http::{build_client, from_reqwest, parse_json};
use casebridge_runtime::retry::{RetryPolicy, RetryingCaller};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use url::Url;

use crate::envelope::{is_duplicate_project, Created, CreatedHash, EntityPage, Envelope};

/// Header carrying the API token.
const TOKEN_HEADER: &str = "Token";

/// Connection settings for the target workspace.
#[derive(Debug, Clone)]
pub struct QaseConfig {
    /// API root including the version, e.g. `https://api.qase.io/v1`.
    pub base_url: Url,
    pub token: String,
}

#[derive(Debug)]
pub struct QaseClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryingCaller,
}

#[derive(Serialize)]
struct ProjectRequest<'a> {
    #[serde(flatten)]
    project: &'a ProjectCreate,
    settings: serde_json::Value,
}

#[derive(Serialize)]
struct BulkCases<'a> {
    cases: &'a [CaseCreate],
}

#[derive(Serialize)]
struct BulkResults<'a> {
    results: &'a [ResultCreate],
}

impl QaseClient {
    pub fn new(config: QaseConfig, policy: RetryPolicy) -> Result<Self, ApiError> {
        let base_url = config.base_url.as_str().trim_end_matches('/').to_string();
        Ok(Self {
            http: build_client(false)?,
            base_url,
            token: config.token,
            retry: RetryingCaller::new("target", policy),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<Envelope<T>> {
        let url = &self.url(path);
        let this = self;
        self.retry
            .call(operation, move || async move {
                let response = this
                    .http
                    .get(url)
                    .header(TOKEN_HEADER, &this.token)
                    .query(query)
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                parse_json(response).await
            })
            .await
    }

    async fn post<T, B>(&self, operation: &'static str, path: &str, body: &B) -> ApiResult<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let url = &self.url(path);
        let this = self;
        self.retry
            .call(operation, move || async move {
                let response = this
                    .http
                    .post(url)
                    .header(TOKEN_HEADER, &this.token)
                    .json(body)
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                parse_json(response).await
            })
            .await
    }
}

/// Multipart part for an attachment, falling back to the default content
/// type when the recorded one does not parse.
fn file_part(file: &AttachmentFile) -> Part {
    let part = || Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
    part().mime_str(&file.mime).unwrap_or_else(|_| part())
}

fn page(limit: u32, offset: u32) -> [(&'static str, String); 2] {
    [("limit", limit.to_string()), ("offset", offset.to_string())]
}

#[async_trait]
impl TargetApi for QaseClient {
    async fn get_authors(&self, limit: u32, offset: u32) -> ApiResult<Vec<TargetAuthor>> {
        let [limit, offset] = page(limit, offset);
        let query = [limit, offset, ("type", "user".to_string())];
        let page: EntityPage<TargetAuthor> = self.get("get_authors", "author", &query).await?.into_result()?;
        Ok(page.entities)
    }

    async fn get_system_fields(&self) -> ApiResult<Vec<TargetSystemField>> {
        self.get("get_system_fields", "system_field", &[])
            .await?
            .into_result()
    }

    async fn get_custom_fields(&self, limit: u32, offset: u32) -> ApiResult<Vec<TargetCustomField>> {
        let [limit, offset] = page(limit, offset);
        let query = [("entity", "case".to_string()), limit, offset];
        let page: EntityPage<TargetCustomField> = self
            .get("get_custom_fields", "custom_field", &query)
            .await?
            .into_result()?;
        Ok(page.entities)
    }

    async fn create_custom_field(&self, field: &CustomFieldCreate) -> ApiResult<TargetId> {
        let created: Created = self
            .post("create_custom_field", "custom_field", field)
            .await?
            .into_result()?;
        Ok(created.id)
    }

    async fn create_project(&self, project: &ProjectCreate) -> ApiResult<ProjectOutcome> {
        let request = ProjectRequest {
            project,
            settings: json!({"runs": {"auto_complete": false}}),
        };
        match self
            .post::<serde_json::Value, _>("create_project", "project", &request)
            .await
        {
            Ok(envelope) => {
                envelope.check()?;
                Ok(ProjectOutcome::Created)
            }
            Err(e) if is_duplicate_project(&e) => Ok(ProjectOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    async fn upload_attachment(&self, code: &str, file: AttachmentFile) -> ApiResult<AttachmentHandle> {
        let url = &self.url(&format!("attachment/{code}"));
        let file = &file;
        let this = self;
        self.retry
            .call("upload_attachment", move || async move {
                let form = Form::new().part("file", file_part(file));
                let response = this
                    .http
                    .post(url)
                    .header(TOKEN_HEADER, &this.token)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                let envelope: Envelope<Vec<AttachmentHandle>> = parse_json(response).await?;
                envelope
                    .into_result()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::Decode("upload returned no attachment".into()))
            })
            .await
    }

    async fn create_suite(&self, code: &str, suite: &SuiteCreate) -> ApiResult<TargetId> {
        let created: Created = self
            .post("create_suite", &format!("suite/{code}"), suite)
            .await?
            .into_result()?;
        Ok(created.id)
    }

    async fn create_cases(&self, code: &str, cases: &[CaseCreate]) -> ApiResult<()> {
        self.post::<serde_json::Value, _>("create_cases", &format!("case/{code}/bulk"), &BulkCases { cases })
            .await?
            .check()
    }

    async fn create_milestone(&self, code: &str, milestone: &MilestoneCreate) -> ApiResult<TargetId> {
        let created: Created = self
            .post("create_milestone", &format!("milestone/{code}"), milestone)
            .await?
            .into_result()?;
        Ok(created.id)
    }

    async fn create_configuration_group(&self, code: &str, title: &str) -> ApiResult<TargetId> {
        let created: Created = self
            .post(
                "create_configuration_group",
                &format!("configuration/{code}/group"),
                &json!({"title": title}),
            )
            .await?
            .into_result()?;
        Ok(created.id)
    }

    async fn create_configuration(&self, code: &str, group_id: TargetId, title: &str) -> ApiResult<TargetId> {
        let created: Created = self
            .post(
                "create_configuration",
                &format!("configuration/{code}"),
                &json!({"title": title, "group_id": group_id}),
            )
            .await?
            .into_result()?;
        Ok(created.id)
    }

    async fn create_shared_step(&self, code: &str, step: &SharedStepCreate) -> ApiResult<String> {
        let created: CreatedHash = self
            .post("create_shared_step", &format!("shared_step/{code}"), step)
            .await?
            .into_result()?;
        Ok(created.hash)
    }

    async fn create_run(&self, code: &str, run: &RunCreate) -> ApiResult<TargetId> {
        let created: Created = self
            .post("create_run", &format!("run/{code}"), run)
            .await?
            .into_result()?;
        Ok(created.id)
    }

    async fn create_results(&self, code: &str, run_id: TargetId, results: &[ResultCreate]) -> ApiResult<()> {
        self.post::<serde_json::Value, _>(
            "create_results",
            &format!("result/{code}/{run_id}/bulk"),
            &BulkResults { results },
        )
        .await?
        .check()
    }
}
