//! Configuration groups and their configurations.

use casebridge_core::id_map::ProjectIdMaps;
use casebridge_core::source::SourceConfigGroup;
use casebridge_core::stats::{Entity, Side};
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;

/// Create every configuration group of the project and map config ids so
/// runs can reference them.
pub async fn import_configurations(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<()> {
    let groups = ctx
        .pools
        .run_on(PoolKind::Source, ctx.source.get_configs(project.source.id))
        .await?;
    let total: usize = groups.iter().map(|group| group.configs.len()).sum();
    ctx.stats
        .add_entity(&project.code, Entity::Configurations, Side::Source, total as u64);

    let maps = ctx.project_maps.for_project(&project.code);
    join_all(groups.iter().map(|group| import_group(ctx, &project.code, &maps, group))).await;

    tracing::info!(
        project = %project.code,
        groups = groups.len(),
        configurations = maps.configurations.len(),
        "Configurations imported",
    );
    Ok(())
}

async fn import_group(ctx: &MigrationContext, code: &str, maps: &ProjectIdMaps, group: &SourceConfigGroup) {
    let group_id = match ctx
        .pools
        .run_on(PoolKind::Target, ctx.target.create_configuration_group(code, &group.name))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(project = code, group = %group.name, error = %e, "Failed to create configuration group");
            ctx.stats.record_failure("configurations");
            return;
        }
    };

    join_all(group.configs.iter().map(|config| async move {
        match ctx
            .pools
            .run_on(
                PoolKind::Target,
                ctx.target.create_configuration(code, group_id, &config.name),
            )
            .await
        {
            Ok(id) => {
                maps.configurations.insert(config.id, id);
                ctx.stats.add_entity(code, Entity::Configurations, Side::Target, 1);
            }
            Err(e) => {
                tracing::error!(project = code, config = %config.name, error = %e, "Failed to create configuration");
                ctx.stats.record_failure("configurations");
            }
        }
    }))
    .await;
}
