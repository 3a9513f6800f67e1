//! Project selection, code planning and creation.

use casebridge_core::source::SourceProject;
use casebridge_core::target::{ProjectCreate, ProjectOutcome};
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;
use crate::settings::MigrationSettings;

/// Whether the settings select `project` for import.
pub fn is_selected(project: &SourceProject, settings: &MigrationSettings) -> bool {
    if project.is_completed && !settings.import_completed {
        return false;
    }
    settings.projects.is_empty() || settings.projects.iter().any(|name| name == &project.name)
}

/// List source projects, keep the selected ones and assign their codes.
///
/// Nothing is written to the target yet; fields scoped to a project need
/// the code before the project itself exists.
pub async fn plan_projects(ctx: &MigrationContext) -> PipelineResult<Vec<PlannedProject>> {
    let projects = ctx
        .pools
        .collect_all(PoolKind::Source, ctx.settings.page_size, |limit, offset| {
            ctx.source.get_projects(limit, offset)
        })
        .await?;
    tracing::info!(count = projects.len(), "Found source projects");

    let mut planned = Vec::new();
    for project in projects {
        if !is_selected(&project, &ctx.settings) {
            tracing::info!(project = %project.name, "Skipping project");
            continue;
        }
        let code = ctx.codes.assign(&project.name);
        ctx.projects.insert(project.id, code.clone());
        ctx.stats.add_project(&code, &project.name);
        planned.push(PlannedProject {
            source: project,
            code,
        });
    }
    Ok(planned)
}

/// Create every planned project. Projects whose creation fails are left
/// out of the returned list.
pub async fn create_projects(ctx: &MigrationContext, planned: Vec<PlannedProject>) -> Vec<PlannedProject> {
    let created = join_all(planned.into_iter().map(|project| async move {
        let request = ProjectCreate {
            title: project.source.name.clone(),
            code: project.code.clone(),
            description: project.source.announcement.clone().unwrap_or_default(),
            group: ctx.users_group.get().cloned(),
        };
        let outcome = ctx
            .pools
            .run_on(PoolKind::Target, ctx.target.create_project(&request))
            .await;

        match outcome {
            Ok(ProjectOutcome::Created) => {
                tracing::info!(project = %project.source.name, code = %project.code, "Project created");
                Some(project)
            }
            Ok(ProjectOutcome::AlreadyExists) => {
                tracing::info!(code = %project.code, "Project code already exists, reusing project");
                Some(project)
            }
            Err(e) => {
                tracing::error!(
                    project = %project.source.name,
                    code = %project.code,
                    error = %e,
                    "Failed to create project",
                );
                ctx.stats.record_failure("projects");
                None
            }
        }
    }))
    .await;

    created.into_iter().flatten().collect()
}
