//! Suite and section hierarchy import.
//!
//! The target models both source suites and sections as suites. In a
//! multi-suite project each source suite becomes a top-level target suite
//! keyed by [`SuiteKey::SuiteRoot`], and its sections are created beneath it.
//! Sections are created level by level so a parent always exists before
//! its children; siblings on one level go out concurrently.

use std::collections::HashMap;

use casebridge_core::hierarchy::{order_parent_first, PlacedSection, SuiteKey};
use casebridge_core::id_map::ProjectIdMaps;
use casebridge_core::source::{SourceSection, SourceSuite};
use casebridge_core::stats::{Entity, Side};
use casebridge_core::target::SuiteCreate;
use casebridge_core::types::{SourceId, TargetId};
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::attachments::AttachmentRewriter;
use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;

/// Group parent-first sections into creation waves by depth.
pub fn creation_waves<'a>(placed: Vec<PlacedSection<'a>>) -> Vec<Vec<PlacedSection<'a>>> {
    let mut depth: HashMap<SourceId, usize> = HashMap::with_capacity(placed.len());
    let mut waves: Vec<Vec<PlacedSection<'a>>> = Vec::new();

    for entry in placed {
        let level = entry
            .parent
            .and_then(|parent| depth.get(&parent))
            .map_or(0, |d| d + 1);
        depth.insert(entry.section.id, level);
        if waves.len() <= level {
            waves.resize_with(level + 1, Vec::new);
        }
        waves[level].push(entry);
    }
    waves
}

pub async fn import_suites(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<()> {
    let maps = ctx.project_maps.for_project(&project.code);

    if !project.source.is_multi_suite() {
        let sections = list_sections(ctx, project, None).await?;
        import_sections(ctx, &project.code, &maps, &sections, None).await;
        return Ok(());
    }

    let suites = ctx
        .pools
        .run_on(PoolKind::Source, ctx.source.get_suites(project.source.id))
        .await?;
    tracing::info!(project = %project.code, count = suites.len(), "Importing suites");

    for (index, suite) in suites.iter().enumerate() {
        let key = SuiteKey::SuiteRoot(index);
        create_top_suite(ctx, &project.code, &maps, suite, key).await;

        match list_sections(ctx, project, Some(suite.id)).await {
            Ok(sections) => import_sections(ctx, &project.code, &maps, &sections, Some(key)).await,
            Err(e) => {
                tracing::error!(
                    project = %project.code,
                    suite = %suite.name,
                    error = %e,
                    "Failed to list sections, cases of this suite go to its root",
                );
                ctx.stats.record_failure("suites");
            }
        }
    }
    Ok(())
}

async fn list_sections(
    ctx: &MigrationContext,
    project: &PlannedProject,
    suite_id: Option<SourceId>,
) -> PipelineResult<Vec<SourceSection>> {
    let sections = ctx
        .pools
        .collect_all(PoolKind::Source, ctx.settings.page_size, |limit, offset| {
            ctx.source.get_sections(project.source.id, suite_id, limit, offset)
        })
        .await?;
    Ok(sections)
}

async fn create_top_suite(ctx: &MigrationContext, code: &str, maps: &ProjectIdMaps, suite: &SourceSuite, key: SuiteKey) {
    ctx.stats.add_entity(code, Entity::Suites, Side::Source, 1);
    let request = SuiteCreate {
        title: suite.name.clone(),
        description: AttachmentRewriter::new(ctx)
            .rewrite_opt(suite.description.as_deref(), code)
            .await,
        preconditions: String::new(),
        parent_id: None,
    };
    if let Some(id) = create_suite(ctx, code, &request).await {
        maps.suites.insert(key, id);
    }
}

/// Create `sections` under `root` (a synthetic suite, or `None` for the
/// project root).
async fn import_sections(
    ctx: &MigrationContext,
    code: &str,
    maps: &ProjectIdMaps,
    sections: &[SourceSection],
    root: Option<SuiteKey>,
) {
    ctx.stats
        .add_entity(code, Entity::Suites, Side::Source, sections.len() as u64);
    let rewriter = AttachmentRewriter::new(ctx);

    for wave in creation_waves(order_parent_first(sections)) {
        join_all(wave.iter().map(|placed| async move {
            // A parent that failed to create leaves its children at the root.
            let parent_id = placed
                .parent
                .and_then(|parent| maps.suites.get(&SuiteKey::Section(parent)))
                .or_else(|| root.and_then(|key| maps.suites.get(&key)));

            let request = SuiteCreate {
                title: placed.section.name.clone(),
                description: rewriter
                    .rewrite_opt(placed.section.description.as_deref(), code)
                    .await,
                preconditions: String::new(),
                parent_id,
            };
            if let Some(id) = create_suite(ctx, code, &request).await {
                maps.suites.insert(SuiteKey::Section(placed.section.id), id);
            }
        }))
        .await;
    }
}

async fn create_suite(ctx: &MigrationContext, code: &str, request: &SuiteCreate) -> Option<TargetId> {
    match ctx
        .pools
        .run_on(PoolKind::Target, ctx.target.create_suite(code, request))
        .await
    {
        Ok(id) => {
            ctx.stats.add_entity(code, Entity::Suites, Side::Target, 1);
            Some(id)
        }
        Err(e) => {
            tracing::error!(project = code, suite = %request.title, error = %e, "Failed to create suite");
            ctx.stats.record_failure("suites");
            None
        }
    }
}
