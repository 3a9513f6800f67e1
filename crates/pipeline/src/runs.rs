//! Run and result import.
//!
//! Standalone runs and the runs of test plans are merged into one index
//! ordered by creation time and created in that order. Results of a run
//! are cleaned, merged, sorted, and submitted in concurrent batches.

use std::collections::{BTreeSet, HashMap};

use casebridge_core::error::ApiError;
use casebridge_core::id_map::ProjectIdMaps;
use casebridge_core::results::{
    build_result_payload, chunk_results, clean_results, merge_comments, sort_chronologically,
    PayloadContext, RESULT_CHUNK_SIZE,
};
use casebridge_core::runs::{build_run_payload, flatten_plan, RunIndexEntry, RunLinks};
use casebridge_core::source::SourceTest;
use casebridge_core::stats::{Entity, Side};
use casebridge_core::target::ResultCreate;
use casebridge_core::types::{SourceId, TargetId};
use casebridge_runtime::pagination::fan_in_sorted;
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::attachments::AttachmentRewriter;
use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;
use crate::task_group::join_group;

/// Source test id to case id. Tests without a case are left out.
pub fn test_case_map(tests: &[SourceTest]) -> HashMap<SourceId, SourceId> {
    tests
        .iter()
        .filter_map(|test| Some((test.id, test.case_id?)))
        .collect()
}

/// Standalone runs and plan runs of one project, oldest first.
pub async fn build_run_index(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<Vec<RunIndexEntry>> {
    let project_id = project.source.id;
    let after = ctx.settings.runs_created_after;
    let page_size = ctx.settings.page_size;

    let standalone = async {
        let runs = ctx
            .pools
            .collect_all(PoolKind::Source, page_size, |limit, offset| {
                ctx.source.get_runs(project_id, after, limit, offset)
            })
            .await?;
        Ok::<_, ApiError>(runs.into_iter().map(RunIndexEntry::from_run).collect())
    };

    let planned = async {
        let plans = ctx
            .pools
            .collect_all(PoolKind::Source, page_size, |limit, offset| {
                ctx.source.get_plans(project_id, after, limit, offset)
            })
            .await?;
        let plans = join_group(
            plans
                .iter()
                .map(|plan| ctx.pools.run_on(PoolKind::Source, ctx.source.get_plan(plan.id))),
        )
        .await?;
        Ok::<_, ApiError>(plans.into_iter().flat_map(flatten_plan).collect())
    };

    let index = fan_in_sorted(standalone, planned, |entry: &RunIndexEntry| entry.created_on).await?;
    Ok(index)
}

pub async fn import_runs(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<()> {
    let index = build_run_index(ctx, project).await?;
    let code = project.code.as_str();
    ctx.stats
        .add_entity(code, Entity::Runs, Side::Source, index.len() as u64);
    tracing::info!(project = code, count = index.len(), "Importing runs");

    let maps = ctx.project_maps.for_project(code);
    for entry in &index {
        if let Err(e) = import_run(ctx, code, &maps, entry).await {
            tracing::error!(project = code, run_id = entry.id, error = %e, "Failed to import run");
            ctx.stats.record_failure("runs");
        }
    }
    Ok(())
}

async fn import_run(ctx: &MigrationContext, code: &str, maps: &ProjectIdMaps, entry: &RunIndexEntry) -> PipelineResult<()> {
    let page_size = ctx.settings.page_size;
    let (tests, results) = tokio::try_join!(
        ctx.pools.collect_all(PoolKind::Source, page_size, |limit, offset| {
            ctx.source.get_tests(entry.id, limit, offset)
        }),
        ctx.pools.collect_all(PoolKind::Source, page_size, |limit, offset| {
            ctx.source.get_results_for_run(entry.id, limit, offset)
        }),
    )?;
    let cases = test_case_map(&tests);
    let fetched = results.len();

    let rewriter = AttachmentRewriter::new(ctx);
    rewriter
        .ensure_all(
            results
                .iter()
                .flat_map(|result| result.attachment_ids.iter().map(|reference| reference.key())),
            code,
        )
        .await;
    let records = clean_results(results, |key| {
        ctx.attachments.get(&key.to_string()).map(|handle| handle.hash)
    });

    let start = entry.start_time(&records);
    let links = RunLinks {
        author_id: ctx.author_of(entry.created_by),
        milestone_id: entry.milestone_id.and_then(|id| maps.milestones.get(&id)),
        configurations: entry
            .config_ids
            .iter()
            .filter_map(|id| maps.configurations.get(id))
            .collect(),
        cases: cases.values().copied().collect::<BTreeSet<_>>().into_iter().collect(),
    };
    let mut payload = build_run_payload(entry, start, links);
    if let Some(description) = payload.description.take() {
        payload.description = Some(rewriter.rewrite(&description, code).await);
    }

    let run_id = ctx
        .pools
        .run_on(PoolKind::Target, ctx.target.create_run(code, &payload))
        .await?;
    ctx.stats.add_entity(code, Entity::Runs, Side::Target, 1);
    tracing::info!(project = code, run = %payload.title, run_id, "Run created");

    let mut records = merge_comments(records, ctx.settings.orphan_comments);
    sort_chronologically(&mut records);

    let fields = ctx.field_mappings();
    let author_of = |user: SourceId| ctx.author_of(Some(user));
    let payload_ctx = PayloadContext {
        run_start: start,
        cases: &cases,
        enums: &fields.enums,
        author_of: &author_of,
    };
    let mut results: Vec<ResultCreate> = records
        .iter()
        .filter_map(|record| build_result_payload(record, &payload_ctx))
        .collect();
    for result in &mut results {
        if !result.comment.is_empty() {
            result.comment = rewriter.rewrite(&result.comment, code).await;
        }
    }

    ctx.stats
        .add_entity(code, Entity::Results, Side::Source, fetched as u64);
    submit_results(ctx, code, run_id, results).await;
    Ok(())
}

/// Submit results in batches through the target pool. A failed batch is
/// recorded and the others still go out.
async fn submit_results(ctx: &MigrationContext, code: &str, run_id: TargetId, results: Vec<ResultCreate>) {
    let batches = chunk_results(results, RESULT_CHUNK_SIZE);
    let count = batches.len();

    join_all(batches.into_iter().enumerate().map(|(batch, chunk)| async move {
        match ctx
            .pools
            .run_on(PoolKind::Target, ctx.target.create_results(code, run_id, &chunk))
            .await
        {
            Ok(()) => {
                ctx.stats
                    .add_entity(code, Entity::Results, Side::Target, chunk.len() as u64);
            }
            Err(e) => {
                tracing::error!(
                    project = code,
                    run_id,
                    batch,
                    size = chunk.len(),
                    error = %e,
                    "Failed to submit results",
                );
                ctx.stats.record_failure("results");
            }
        }
    }))
    .await;

    tracing::debug!(project = code, run_id, batches = count, "Results submitted");
}
