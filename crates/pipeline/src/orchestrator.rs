//! Stage ordering for one migration run.
//!
//! Global stages run first and in order: users, field and enumeration
//! maps, projects and, when enabled, the bulk attachment pass. After that
//! every project is imported concurrently. Inside a project the
//! configurations, shared steps and milestones go first (concurrently),
//! then suites, cases and runs in that order, since each depends on the
//! ids the previous one mapped.

use casebridge_core::stats::StatsSnapshot;
use futures::future::join_all;

use crate::attachments;
use crate::cases::import_cases;
use crate::configurations::import_configurations;
use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;
use crate::fields::import_fields;
use crate::milestones::import_milestones;
use crate::projects::{create_projects, plan_projects};
use crate::runs::import_runs;
use crate::shared_steps::import_shared_steps;
use crate::suites::import_suites;
use crate::users::import_users;

/// Run the whole migration and return the final counters.
///
/// Only failures of the global stages abort the run. Project stages log
/// and count their failures and the import carries on.
pub async fn run_migration(ctx: &MigrationContext) -> PipelineResult<StatsSnapshot> {
    tracing::info!("Starting migration");

    import_users(ctx).await?;
    let planned = plan_projects(ctx).await?;
    import_fields(ctx).await?;
    let projects = create_projects(ctx, planned).await;

    if ctx.settings.attachments_bulk_import {
        attachments::import_all(ctx).await?;
    }

    join_all(projects.iter().map(|project| import_project(ctx, project))).await;

    tracing::info!(projects = projects.len(), "Migration finished");
    Ok(ctx.stats.snapshot())
}

/// Import one project's content.
///
/// A failed stage leaves its ids unmapped; later stages still run and fall
/// back to defaults for whatever is missing.
pub async fn import_project(ctx: &MigrationContext, project: &PlannedProject) {
    tracing::info!(project = %project.source.name, code = %project.code, "Importing project");

    let (configurations, shared_steps, milestones) = tokio::join!(
        import_configurations(ctx, project),
        import_shared_steps(ctx, project),
        import_milestones(ctx, project),
    );
    settle(ctx, project, "configurations", configurations);
    settle(ctx, project, "shared_steps", shared_steps);
    settle(ctx, project, "milestones", milestones);

    settle(ctx, project, "suites", import_suites(ctx, project).await);
    settle(ctx, project, "cases", import_cases(ctx, project).await);
    settle(ctx, project, "runs", import_runs(ctx, project).await);

    tracing::info!(code = %project.code, "Project imported");
}

fn settle(ctx: &MigrationContext, project: &PlannedProject, stage: &'static str, result: PipelineResult<()>) {
    if let Err(e) = result {
        tracing::error!(project = %project.code, stage, error = %e, "Stage failed, continuing");
        ctx.stats.record_failure(stage);
    }
}
