//! Milestone import. The target has no nested milestones, so children are
//! flattened and carry their parent's name in the title.

use casebridge_core::source::SourceMilestone;
use casebridge_core::stats::{Entity, Side};
use casebridge_core::target::MilestoneCreate;
use casebridge_core::types::SourceId;
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;

/// Flatten a nested listing into creatable milestones, parents first.
pub fn flatten_milestones(milestones: &[SourceMilestone]) -> Vec<(SourceId, MilestoneCreate)> {
    let mut flat = Vec::new();
    for milestone in milestones {
        push_milestone(milestone, None, &mut flat);
    }
    flat
}

fn push_milestone(milestone: &SourceMilestone, parent: Option<&str>, flat: &mut Vec<(SourceId, MilestoneCreate)>) {
    let title = match parent {
        Some(parent) => format!("[{parent}] {}", milestone.name),
        None => milestone.name.clone(),
    };
    flat.push((
        milestone.id,
        MilestoneCreate {
            title,
            description: milestone.description.clone().filter(|d| !d.is_empty()),
            due_date: milestone.due_on,
        },
    ));
    for child in &milestone.milestones {
        push_milestone(child, Some(&milestone.name), flat);
    }
}

pub async fn import_milestones(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<()> {
    let code = project.code.as_str();
    let listed = ctx
        .pools
        .collect_all(PoolKind::Source, ctx.settings.page_size, |limit, offset| {
            ctx.source.get_milestones(project.source.id, limit, offset)
        })
        .await?;
    let flat = flatten_milestones(&listed);
    ctx.stats
        .add_entity(code, Entity::Milestones, Side::Source, flat.len() as u64);

    let maps = ctx.project_maps.for_project(code);
    join_all(flat.iter().map(|(source_id, request)| {
        let maps = &maps;
        async move {
            match ctx
                .pools
                .run_on(PoolKind::Target, ctx.target.create_milestone(code, request))
                .await
            {
                Ok(id) => {
                    maps.milestones.insert(*source_id, id);
                    ctx.stats.add_entity(code, Entity::Milestones, Side::Target, 1);
                }
                Err(e) => {
                    tracing::error!(project = code, milestone = %request.title, error = %e, "Failed to create milestone");
                    ctx.stats.record_failure("milestones");
                }
            }
        }
    }))
    .await;

    tracing::info!(project = code, count = flat.len(), "Milestones imported");
    Ok(())
}
