//! Seams between the pipeline and the two remote systems.
//!
//! The pipeline only talks to [`SourceApi`], [`TargetApi`] and
//! [`DirectoryApi`]; the concrete HTTP clients live in their own crates and
//! in-memory fakes implement the same traits in tests. Paginated listings take `limit`/`offset` and return
//! one page; a page shorter than `limit` ends the walk.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::source::{
    AttachmentFile, SourceAttachmentRef, SourceCase, SourceCaseField, SourceConfigGroup,
    SourceEnumValue, SourceMilestone, SourcePlan, SourcePlanSummary, SourceProject,
    SourceResult, SourceRun, SourceSection, SourceSharedStep, SourceStatus, SourceSuite,
    SourceTest, SourceUser,
};
use crate::target::{
    AttachmentHandle, CaseCreate, CustomFieldCreate, MilestoneCreate, ProjectCreate,
    ProjectOutcome, ResultCreate, RunCreate, SharedStepCreate, SuiteCreate, TargetAuthor,
    TargetCustomField, TargetSystemField, UserProvision,
};
use crate::types::{SourceId, TargetId, UnixTime};

pub type ApiResult<T> = Result<T, ApiError>;

/// Size of every page of [`SourceApi::list_attachments`]. The source serves
/// that listing in fixed pages, so callers must walk it with this limit.
pub const ATTACHMENT_PAGE_SIZE: u32 = 30;

/// Read access to the source system.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn get_projects(&self, limit: u32, offset: u32) -> ApiResult<Vec<SourceProject>>;

    async fn get_suites(&self, project_id: SourceId) -> ApiResult<Vec<SourceSuite>>;

    async fn get_sections(
        &self,
        project_id: SourceId,
        suite_id: Option<SourceId>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceSection>>;

    async fn get_users(&self) -> ApiResult<Vec<SourceUser>>;

    async fn get_case_types(&self) -> ApiResult<Vec<SourceEnumValue>>;

    async fn get_priorities(&self) -> ApiResult<Vec<SourceEnumValue>>;

    async fn get_result_statuses(&self) -> ApiResult<Vec<SourceStatus>>;

    async fn get_case_fields(&self) -> ApiResult<Vec<SourceCaseField>>;

    async fn get_cases(
        &self,
        project_id: SourceId,
        suite_id: Option<SourceId>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceCase>>;

    async fn get_runs(
        &self,
        project_id: SourceId,
        created_after: Option<UnixTime>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceRun>>;

    async fn get_plans(
        &self,
        project_id: SourceId,
        created_after: Option<UnixTime>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourcePlanSummary>>;

    async fn get_plan(&self, plan_id: SourceId) -> ApiResult<SourcePlan>;

    async fn get_tests(&self, run_id: SourceId, limit: u32, offset: u32)
        -> ApiResult<Vec<SourceTest>>;

    async fn get_results_for_run(
        &self,
        run_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceResult>>;

    async fn get_milestones(
        &self,
        project_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceMilestone>>;

    async fn get_configs(&self, project_id: SourceId) -> ApiResult<Vec<SourceConfigGroup>>;

    async fn get_shared_steps(
        &self,
        project_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceSharedStep>>;

    /// Instance-wide attachment listing. Returns an empty page when the
    /// listing is unavailable (e.g. no web session could be established).
    /// `limit` must be [`ATTACHMENT_PAGE_SIZE`].
    async fn list_attachments(&self, limit: u32, offset: u32)
        -> ApiResult<Vec<SourceAttachmentRef>>;

    async fn get_attachment(&self, attachment_id: &str) -> ApiResult<AttachmentFile>;
}

/// Read/write access to the target system. Project-scoped calls take the
/// target project code.
#[async_trait]
pub trait TargetApi: Send + Sync {
    async fn get_authors(&self, limit: u32, offset: u32) -> ApiResult<Vec<TargetAuthor>>;

    async fn get_system_fields(&self) -> ApiResult<Vec<TargetSystemField>>;

    async fn get_custom_fields(&self, limit: u32, offset: u32)
        -> ApiResult<Vec<TargetCustomField>>;

    async fn create_custom_field(&self, field: &CustomFieldCreate) -> ApiResult<TargetId>;

    async fn create_project(&self, project: &ProjectCreate) -> ApiResult<ProjectOutcome>;

    async fn upload_attachment(&self, code: &str, file: AttachmentFile)
        -> ApiResult<AttachmentHandle>;

    async fn create_suite(&self, code: &str, suite: &SuiteCreate) -> ApiResult<TargetId>;

    async fn create_cases(&self, code: &str, cases: &[CaseCreate]) -> ApiResult<()>;

    async fn create_milestone(&self, code: &str, milestone: &MilestoneCreate)
        -> ApiResult<TargetId>;

    async fn create_configuration_group(&self, code: &str, title: &str) -> ApiResult<TargetId>;

    async fn create_configuration(
        &self,
        code: &str,
        group_id: TargetId,
        title: &str,
    ) -> ApiResult<TargetId>;

    /// Returns the hash identifying the created shared step.
    async fn create_shared_step(&self, code: &str, step: &SharedStepCreate)
        -> ApiResult<String>;

    async fn create_run(&self, code: &str, run: &RunCreate) -> ApiResult<TargetId>;

    async fn create_results(
        &self,
        code: &str,
        run_id: TargetId,
        results: &[ResultCreate],
    ) -> ApiResult<()>;
}

/// User and group provisioning in the target workspace directory. Ids are
/// the directory's own opaque identifiers.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn create_group(&self, name: &str) -> ApiResult<String>;

    async fn create_user(&self, user: &UserProvision) -> ApiResult<String>;

    async fn add_user_to_group(&self, group_id: &str, user_id: &str) -> ApiResult<()>;
}
