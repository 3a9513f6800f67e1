//! Test case import.
//!
//! Cases are read page by page per suite and each page is written with a
//! single bulk request. The source case id is kept as the target case id.

use std::collections::BTreeMap;

use casebridge_core::hierarchy::SuiteKey;
use casebridge_core::id_map::ProjectIdMaps;
use casebridge_core::mapping::{plain_value, refs_url};
use casebridge_core::results::format_timestamp;
use casebridge_core::source::{SourceCase, SourceStep};
use casebridge_core::stats::{Entity, Side};
use casebridge_core::target::{CaseCreate, StepCreate};
use casebridge_core::types::{SourceId, TargetId};
use casebridge_runtime::PoolKind;
use futures::TryStreamExt;
use url::Url;

use crate::attachments::AttachmentRewriter;
use crate::context::{FieldMappings, MigrationContext, PlannedProject};
use crate::error::PipelineResult;
use crate::task_group::join_group;

/// Everything a case payload needs besides the case itself.
pub struct CaseInputs<'a> {
    pub fields: &'a FieldMappings,
    /// Target suite of the case's section.
    pub suite_id: Option<TargetId>,
    pub author_id: TargetId,
    pub refs_base: Option<&'a Url>,
}

/// Build the target payload for one case. Text is copied as is; inline
/// attachment markers are rewritten afterwards.
pub fn build_case_payload(case: &SourceCase, inputs: &CaseInputs<'_>) -> CaseCreate {
    let mut custom_field = BTreeMap::new();
    for mapped in inputs.fields.custom.values() {
        let Some(raw) = case.custom_value(&mapped.system_name) else {
            continue;
        };
        let value = if mapped.is_select() {
            mapped.select_value(raw)
        } else {
            plain_value(raw)
        };
        if let Some(value) = value {
            custom_field.insert(mapped.target_id.to_string(), value);
        }
    }

    if let (Some(field_id), Some(refs)) = (inputs.fields.refs_field, case.refs.as_deref()) {
        if let Some(url) = refs_url(refs, inputs.refs_base) {
            custom_field.insert(field_id.to_string(), url);
        }
    }

    CaseCreate {
        id: case.id,
        title: case.title.clone(),
        created_at: format_timestamp(case.created_on),
        updated_at: format_timestamp(case.updated_on.unwrap_or(case.created_on)),
        author_id: inputs.author_id,
        steps: case_steps(case, inputs.fields),
        is_flaky: 0,
        custom_field,
        priority: inputs.fields.enums.priority(case.priority_id),
        type_id: inputs.fields.enums.case_type(case.type_id),
        suite_id: inputs.suite_id,
    }
}

/// Separated steps of every step field, numbered from 1. Steps without an
/// action are skipped.
fn case_steps(case: &SourceCase, fields: &FieldMappings) -> Vec<StepCreate> {
    let mut steps = Vec::new();
    for name in &fields.step_fields {
        let Some(raw) = case.custom_value(&format!("custom_{name}")) else {
            continue;
        };
        let parsed: Vec<SourceStep> = match serde_json::from_value(raw.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(case_id = case.id, field = %name, error = %e, "Unreadable steps, skipping");
                continue;
            }
        };

        for step in parsed {
            let action = step.content.unwrap_or_default();
            if action.trim().is_empty() {
                tracing::warn!(case_id = case.id, "Step without action, skipping");
                continue;
            }
            steps.push(StepCreate {
                action,
                expected_result: step.expected.unwrap_or_default(),
                position: steps.len() as u32 + 1,
            });
        }
    }
    steps
}

pub async fn import_cases(ctx: &MigrationContext, project: &PlannedProject) -> PipelineResult<()> {
    let containers: Vec<(Option<SourceId>, Option<SuiteKey>)> = if project.source.is_multi_suite() {
        let suites = ctx
            .pools
            .run_on(PoolKind::Source, ctx.source.get_suites(project.source.id))
            .await?;
        suites
            .iter()
            .enumerate()
            .map(|(index, suite)| (Some(suite.id), Some(SuiteKey::SuiteRoot(index))))
            .collect()
    } else {
        vec![(None, None)]
    };

    join_group(
        containers
            .into_iter()
            .map(|(suite_id, root)| import_container(ctx, project, suite_id, root)),
    )
    .await?;
    Ok(())
}

/// Import the cases of one source suite, or of the whole project when
/// `suite_id` is `None`.
async fn import_container(
    ctx: &MigrationContext,
    project: &PlannedProject,
    suite_id: Option<SourceId>,
    root: Option<SuiteKey>,
) -> PipelineResult<()> {
    let code = project.code.as_str();
    let maps = ctx.project_maps.for_project(code);
    let fields = ctx.field_mappings();

    let pages = ctx
        .pools
        .stream_pages(PoolKind::Source, ctx.settings.page_size, |limit, offset| {
            ctx.source.get_cases(project.source.id, suite_id, limit, offset)
        });
    futures::pin_mut!(pages);

    while let Some(page) = pages.try_next().await? {
        if page.is_empty() {
            continue;
        }
        ctx.stats.add_entity(code, Entity::Cases, Side::Source, page.len() as u64);
        let payloads = build_page(ctx, code, &maps, &fields, &page, root).await;

        match ctx
            .pools
            .run_on(PoolKind::Target, ctx.target.create_cases(code, &payloads))
            .await
        {
            Ok(()) => {
                ctx.stats
                    .add_entity(code, Entity::Cases, Side::Target, payloads.len() as u64);
                tracing::info!(project = code, count = payloads.len(), "Cases imported");
            }
            Err(e) => {
                tracing::error!(project = code, count = payloads.len(), error = %e, "Failed to import cases");
                ctx.stats.record_failure("cases");
            }
        }
    }
    Ok(())
}

async fn build_page(
    ctx: &MigrationContext,
    code: &str,
    maps: &ProjectIdMaps,
    fields: &FieldMappings,
    page: &[SourceCase],
    root: Option<SuiteKey>,
) -> Vec<CaseCreate> {
    let rewriter = AttachmentRewriter::new(ctx);
    let fallback_suite = root.and_then(|key| maps.suites.get(&key));

    let mut payloads = Vec::with_capacity(page.len());
    for case in page {
        let inputs = CaseInputs {
            fields,
            suite_id: case
                .section_id
                .and_then(|section| maps.suites.get(&SuiteKey::Section(section)))
                .or(fallback_suite),
            author_id: ctx.author_of(case.created_by),
            refs_base: ctx.settings.refs_base.as_ref(),
        };
        let mut payload = build_case_payload(case, &inputs);

        for step in &mut payload.steps {
            step.action = rewriter.rewrite(&step.action, code).await;
            step.expected_result = rewriter.rewrite(&step.expected_result, code).await;
        }
        for value in payload.custom_field.values_mut() {
            *value = rewriter.rewrite(value, code).await;
        }
        payloads.push(payload);
    }
    payloads
}
