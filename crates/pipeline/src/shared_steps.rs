//! Shared step import.

use casebridge_core::source::SourceSharedStep;
use casebridge_core::stats::{Entity, Side};
use casebridge_core::target::{SharedStepContent, SharedStepCreate};
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::attachments::AttachmentRewriter;
use crate::context::{MigrationContext, PlannedProject};
use crate::error::PipelineResult;

/// Action used when the source step has none; the target rejects empty ones.
pub const EMPTY_ACTION: &str = "No action";

pub fn shared_step_payload(step: &SourceSharedStep) -> SharedStepCreate {
    let steps = step
        .custom_steps_separated
        .iter()
        .map(|content| {
            let action = content
                .content
                .as_deref()
                .map(str::trim)
                .filter(|action| !action.is_empty())
                .unwrap_or(EMPTY_ACTION);
            SharedStepContent {
                action: action.to_string(),
                expected_result: content.expected.clone().unwrap_or_default(),
            }
        })
        .collect();

    SharedStepCreate {
        title: step.title.clone(),
        steps,
    }
}

pub async fn import_shared_steps(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<()> {
    let code = project.code.as_str();
    let shared = ctx
        .pools
        .collect_all(PoolKind::Source, ctx.settings.page_size, |limit, offset| {
            ctx.source.get_shared_steps(project.source.id, limit, offset)
        })
        .await?;
    ctx.stats
        .add_entity(code, Entity::SharedSteps, Side::Source, shared.len() as u64);

    let maps = ctx.project_maps.for_project(code);
    let rewriter = AttachmentRewriter::new(ctx);

    join_all(shared.iter().map(|step| {
        let maps = &maps;
        async move {
            let mut payload = shared_step_payload(step);
            for content in &mut payload.steps {
                content.action = rewriter.rewrite(&content.action, code).await;
                content.expected_result = rewriter.rewrite(&content.expected_result, code).await;
            }

            match ctx
                .pools
                .run_on(PoolKind::Target, ctx.target.create_shared_step(code, &payload))
                .await
            {
                Ok(hash) => {
                    maps.shared_steps.insert(step.id, hash);
                    ctx.stats.add_entity(code, Entity::SharedSteps, Side::Target, 1);
                }
                Err(e) => {
                    tracing::error!(project = code, step = %step.title, error = %e, "Failed to create shared step");
                    ctx.stats.record_failure("shared_steps");
                }
            }
        }
    }))
    .await;

    tracing::info!(project = code, count = shared.len(), "Shared steps imported");
    Ok(())
}
