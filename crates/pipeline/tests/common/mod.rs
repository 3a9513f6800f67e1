//! In-memory source and target used by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use casebridge_core::error::ApiError;
use casebridge_core::remote::{ApiResult, DirectoryApi, SourceApi, TargetApi};
use casebridge_core::source::*;
use casebridge_core::target::*;
use casebridge_core::types::{SourceId, TargetId, UnixTime};
use casebridge_pipeline::{MigrationContext, MigrationSettings};
use casebridge_runtime::{Pools, RateLimitedExecutor};

fn page<T: Clone>(items: &[T], limit: u32, offset: u32) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("{what} not found"),
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    pub projects: Vec<SourceProject>,
    pub suites: HashMap<SourceId, Vec<SourceSuite>>,
    /// Keyed by project id and suite id.
    pub sections: HashMap<(SourceId, Option<SourceId>), Vec<SourceSection>>,
    pub users: Vec<SourceUser>,
    pub case_types: Vec<SourceEnumValue>,
    pub priorities: Vec<SourceEnumValue>,
    pub statuses: Vec<SourceStatus>,
    pub case_fields: Vec<SourceCaseField>,
    /// Keyed by project id and suite id.
    pub cases: HashMap<(SourceId, Option<SourceId>), Vec<SourceCase>>,
    pub runs: HashMap<SourceId, Vec<SourceRun>>,
    pub plans: HashMap<SourceId, Vec<SourcePlan>>,
    pub tests: HashMap<SourceId, Vec<SourceTest>>,
    pub results: HashMap<SourceId, Vec<SourceResult>>,
    pub milestones: HashMap<SourceId, Vec<SourceMilestone>>,
    pub configs: HashMap<SourceId, Vec<SourceConfigGroup>>,
    pub shared_steps: HashMap<SourceId, Vec<SourceSharedStep>>,
    pub attachments: Vec<SourceAttachmentRef>,
    pub files: HashMap<String, AttachmentFile>,
    /// Section listings (project id, suite id) that answer 400.
    pub failing_sections: Vec<(SourceId, Option<SourceId>)>,
}

fn created_after<T>(items: &[T], after: Option<UnixTime>, created_on: impl Fn(&T) -> UnixTime) -> Vec<T>
where
    T: Clone,
{
    items
        .iter()
        .filter(|item| after.map_or(true, |after| created_on(item) > after))
        .cloned()
        .collect()
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn get_projects(&self, limit: u32, offset: u32) -> ApiResult<Vec<SourceProject>> {
        Ok(page(&self.projects, limit, offset))
    }

    async fn get_suites(&self, project_id: SourceId) -> ApiResult<Vec<SourceSuite>> {
        Ok(self.suites.get(&project_id).cloned().unwrap_or_default())
    }

    async fn get_sections(
        &self,
        project_id: SourceId,
        suite_id: Option<SourceId>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceSection>> {
        if self.failing_sections.contains(&(project_id, suite_id)) {
            return Err(ApiError::Status {
                status: 400,
                body: "sections unavailable".into(),
            });
        }
        let sections = self.sections.get(&(project_id, suite_id)).cloned().unwrap_or_default();
        Ok(page(&sections, limit, offset))
    }

    async fn get_users(&self) -> ApiResult<Vec<SourceUser>> {
        Ok(self.users.clone())
    }

    async fn get_case_types(&self) -> ApiResult<Vec<SourceEnumValue>> {
        Ok(self.case_types.clone())
    }

    async fn get_priorities(&self) -> ApiResult<Vec<SourceEnumValue>> {
        Ok(self.priorities.clone())
    }

    async fn get_result_statuses(&self) -> ApiResult<Vec<SourceStatus>> {
        Ok(self.statuses.clone())
    }

    async fn get_case_fields(&self) -> ApiResult<Vec<SourceCaseField>> {
        Ok(self.case_fields.clone())
    }

    async fn get_cases(
        &self,
        project_id: SourceId,
        suite_id: Option<SourceId>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceCase>> {
        let cases = self.cases.get(&(project_id, suite_id)).cloned().unwrap_or_default();
        Ok(page(&cases, limit, offset))
    }

    async fn get_runs(
        &self,
        project_id: SourceId,
        after: Option<UnixTime>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceRun>> {
        let runs = self.runs.get(&project_id).cloned().unwrap_or_default();
        let runs = created_after(&runs, after, |run| run.created_on);
        Ok(page(&runs, limit, offset))
    }

    async fn get_plans(
        &self,
        project_id: SourceId,
        _after: Option<UnixTime>,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourcePlanSummary>> {
        let plans: Vec<SourcePlanSummary> = self
            .plans
            .get(&project_id)
            .into_iter()
            .flatten()
            .map(|plan| SourcePlanSummary {
                id: plan.id,
                name: plan.name.clone(),
            })
            .collect();
        Ok(page(&plans, limit, offset))
    }

    async fn get_plan(&self, plan_id: SourceId) -> ApiResult<SourcePlan> {
        self.plans
            .values()
            .flatten()
            .find(|plan| plan.id == plan_id)
            .cloned()
            .ok_or_else(|| not_found("plan"))
    }

    async fn get_tests(&self, run_id: SourceId, limit: u32, offset: u32) -> ApiResult<Vec<SourceTest>> {
        let tests = self.tests.get(&run_id).cloned().unwrap_or_default();
        Ok(page(&tests, limit, offset))
    }

    async fn get_results_for_run(
        &self,
        run_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceResult>> {
        let results = self.results.get(&run_id).cloned().unwrap_or_default();
        Ok(page(&results, limit, offset))
    }

    async fn get_milestones(
        &self,
        project_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceMilestone>> {
        let milestones = self.milestones.get(&project_id).cloned().unwrap_or_default();
        Ok(page(&milestones, limit, offset))
    }

    async fn get_configs(&self, project_id: SourceId) -> ApiResult<Vec<SourceConfigGroup>> {
        Ok(self.configs.get(&project_id).cloned().unwrap_or_default())
    }

    async fn get_shared_steps(
        &self,
        project_id: SourceId,
        limit: u32,
        offset: u32,
    ) -> ApiResult<Vec<SourceSharedStep>> {
        let steps = self.shared_steps.get(&project_id).cloned().unwrap_or_default();
        Ok(page(&steps, limit, offset))
    }

    async fn list_attachments(&self, limit: u32, offset: u32) -> ApiResult<Vec<SourceAttachmentRef>> {
        Ok(page(&self.attachments, limit, offset))
    }

    async fn get_attachment(&self, attachment_id: &str) -> ApiResult<AttachmentFile> {
        // Let concurrent callers interleave before the download completes.
        tokio::task::yield_now().await;
        self.files
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| not_found("attachment"))
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Everything written to the fake target, in call order.
#[derive(Debug, Default)]
pub struct Written {
    pub projects: Vec<ProjectCreate>,
    pub fields: Vec<(TargetId, CustomFieldCreate)>,
    pub uploads: Vec<(String, String)>,
    pub suites: Vec<(String, TargetId, SuiteCreate)>,
    pub cases: Vec<(String, Vec<CaseCreate>)>,
    pub milestones: Vec<(String, TargetId, MilestoneCreate)>,
    pub configuration_groups: Vec<(String, TargetId, String)>,
    pub configurations: Vec<(String, TargetId, TargetId, String)>,
    pub shared_steps: Vec<(String, SharedStepCreate)>,
    pub runs: Vec<(String, TargetId, RunCreate)>,
    pub results: Vec<(TargetId, Vec<ResultCreate>)>,
    pub groups: Vec<String>,
    /// Provisioned users with the author id they received.
    pub directory_users: Vec<(TargetId, UserProvision)>,
    /// `(group id, user id)` pairs.
    pub memberships: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeTarget {
    pub authors: Vec<TargetAuthor>,
    pub system_fields: Vec<TargetSystemField>,
    pub custom_fields: Vec<TargetCustomField>,
    /// Codes of projects that already exist.
    pub existing_codes: Vec<String>,
    /// Project titles whose creation fails.
    pub failing_projects: Vec<String>,
    /// Result batches containing this case id are rejected.
    pub failing_result_case: Option<SourceId>,
    /// Emails the directory refuses to create.
    pub failing_users: Vec<String>,
    pub next_id: AtomicI64,
    pub written: Mutex<Written>,
}

impl FakeTarget {
    fn next_id(&self) -> TargetId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn written<R>(&self, f: impl FnOnce(&Written) -> R) -> R {
        f(&self.written.lock().unwrap())
    }

    fn write(&self, f: impl FnOnce(&mut Written)) {
        f(&mut self.written.lock().unwrap())
    }
}

#[async_trait]
impl TargetApi for FakeTarget {
    async fn get_authors(&self, limit: u32, offset: u32) -> ApiResult<Vec<TargetAuthor>> {
        let mut authors = self.authors.clone();
        self.written(|w| {
            authors.extend(w.directory_users.iter().map(|(id, user)| TargetAuthor {
                id: *id,
                email: Some(user.email.clone()),
            }))
        });
        Ok(page(&authors, limit, offset))
    }

    async fn get_system_fields(&self) -> ApiResult<Vec<TargetSystemField>> {
        Ok(self.system_fields.clone())
    }

    async fn get_custom_fields(&self, limit: u32, offset: u32) -> ApiResult<Vec<TargetCustomField>> {
        Ok(page(&self.custom_fields, limit, offset))
    }

    async fn create_custom_field(&self, field: &CustomFieldCreate) -> ApiResult<TargetId> {
        let id = self.next_id();
        self.write(|w| w.fields.push((id, field.clone())));
        Ok(id)
    }

    async fn create_project(&self, project: &ProjectCreate) -> ApiResult<ProjectOutcome> {
        if self.failing_projects.contains(&project.title) {
            return Err(ApiError::Status {
                status: 400,
                body: "invalid project".into(),
            });
        }
        if self.existing_codes.contains(&project.code) {
            return Ok(ProjectOutcome::AlreadyExists);
        }
        self.write(|w| w.projects.push(project.clone()));
        Ok(ProjectOutcome::Created)
    }

    async fn upload_attachment(&self, code: &str, file: AttachmentFile) -> ApiResult<AttachmentHandle> {
        self.write(|w| w.uploads.push((code.to_string(), file.filename.clone())));
        Ok(AttachmentHandle {
            hash: format!("hash-{}", file.filename),
            url: format!("https://target.test/{}", file.filename),
            filename: file.filename,
        })
    }

    async fn create_suite(&self, code: &str, suite: &SuiteCreate) -> ApiResult<TargetId> {
        let id = self.next_id();
        self.write(|w| w.suites.push((code.to_string(), id, suite.clone())));
        Ok(id)
    }

    async fn create_cases(&self, code: &str, cases: &[CaseCreate]) -> ApiResult<()> {
        self.write(|w| w.cases.push((code.to_string(), cases.to_vec())));
        Ok(())
    }

    async fn create_milestone(&self, code: &str, milestone: &MilestoneCreate) -> ApiResult<TargetId> {
        let id = self.next_id();
        self.write(|w| w.milestones.push((code.to_string(), id, milestone.clone())));
        Ok(id)
    }

    async fn create_configuration_group(&self, code: &str, title: &str) -> ApiResult<TargetId> {
        let id = self.next_id();
        self.write(|w| {
            w.configuration_groups
                .push((code.to_string(), id, title.to_string()))
        });
        Ok(id)
    }

    async fn create_configuration(&self, code: &str, group_id: TargetId, title: &str) -> ApiResult<TargetId> {
        let id = self.next_id();
        self.write(|w| {
            w.configurations
                .push((code.to_string(), group_id, id, title.to_string()))
        });
        Ok(id)
    }

    async fn create_shared_step(&self, code: &str, step: &SharedStepCreate) -> ApiResult<String> {
        let id = self.next_id();
        self.write(|w| w.shared_steps.push((code.to_string(), step.clone())));
        Ok(format!("step-{id}"))
    }

    async fn create_run(&self, code: &str, run: &RunCreate) -> ApiResult<TargetId> {
        let id = self.next_id();
        self.write(|w| w.runs.push((code.to_string(), id, run.clone())));
        Ok(id)
    }

    async fn create_results(&self, _code: &str, run_id: TargetId, results: &[ResultCreate]) -> ApiResult<()> {
        if let Some(case_id) = self.failing_result_case {
            if results.iter().any(|r| r.case_id == case_id) {
                return Err(ApiError::Status {
                    status: 400,
                    body: "rejected batch".into(),
                });
            }
        }
        self.write(|w| w.results.push((run_id, results.to_vec())));
        Ok(())
    }
}

#[async_trait]
impl DirectoryApi for FakeTarget {
    async fn create_group(&self, name: &str) -> ApiResult<String> {
        self.write(|w| w.groups.push(name.to_string()));
        Ok(format!("group-{}", self.next_id()))
    }

    async fn create_user(&self, user: &UserProvision) -> ApiResult<String> {
        if self.failing_users.contains(&user.email) {
            return Err(ApiError::Status {
                status: 409,
                body: "user exists".into(),
            });
        }
        let id = self.next_id();
        self.write(|w| w.directory_users.push((id, user.clone())));
        Ok(format!("user-{id}"))
    }

    async fn add_user_to_group(&self, group_id: &str, user_id: &str) -> ApiResult<()> {
        self.write(|w| w.memberships.push((group_id.to_string(), user_id.to_string())));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn context(source: FakeSource, target: Arc<FakeTarget>, settings: MigrationSettings) -> MigrationContext {
    let pools = Pools::new(
        RateLimitedExecutor::new("source", 8, 10_000, Duration::from_secs(1)),
        RateLimitedExecutor::new("target", 8, 10_000, Duration::from_secs(1)),
    );
    MigrationContext::new(Arc::new(source), target, pools, settings)
}

/// Deserialize a source record from JSON.
pub fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}

pub fn project(id: SourceId, name: &str, suite_mode: i64) -> SourceProject {
    SourceProject {
        id,
        name: name.into(),
        announcement: None,
        is_completed: false,
        suite_mode,
    }
}

pub fn section(id: SourceId, name: &str, parent_id: Option<SourceId>) -> SourceSection {
    SourceSection {
        id,
        name: name.into(),
        description: None,
        parent_id,
    }
}

pub fn system_field(slug: &str, options: &[(i64, &str, Option<&str>)]) -> TargetSystemField {
    TargetSystemField {
        slug: slug.into(),
        options: options
            .iter()
            .map(|(id, title, slug)| TargetSystemOption {
                id: *id,
                title: title.to_string(),
                slug: slug.map(str::to_string),
            })
            .collect(),
    }
}
