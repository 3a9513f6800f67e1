//! Enumeration maps and custom field import.

use casebridge_core::mapping::{
    is_field_selected, map_enum_ids, map_statuses, parse_options, target_field_type,
    target_options, target_type_from_name, EnumMaps, MappedField, REFS_FIELD_TITLE,
    REFS_FIELD_TYPE,
};
use casebridge_core::source::{
    SourceCaseField, FIELD_TYPE_DROPDOWN, FIELD_TYPE_MULTISELECT, FIELD_TYPE_STEPS,
};
use casebridge_core::stats::Side;
use casebridge_core::target::{
    CustomFieldCreate, TargetCustomField, TargetSystemField, TargetSystemOption,
};
use casebridge_core::types::{ProjectCode, SourceId, TargetId};
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::context::{FieldMappings, MigrationContext};
use crate::error::PipelineResult;
use crate::settings::TARGET_PAGE_SIZE;

/// Target entity number of test cases.
const CASE_ENTITY: i64 = 0;

/// What to do with one source custom field.
#[derive(Debug)]
pub enum FieldPlan {
    Skip,
    Reuse(MappedField),
    Create(CustomFieldCreate),
}

/// Build the enumeration maps and import the selected custom fields.
pub async fn import_fields(ctx: &MigrationContext) -> PipelineResult<()> {
    tracing::info!("Loading custom fields");
    let (source_fields, target_fields, system_fields) = tokio::try_join!(
        ctx.pools.run_on(PoolKind::Source, ctx.source.get_case_fields()),
        ctx.pools.collect_all(PoolKind::Target, TARGET_PAGE_SIZE, |limit, offset| {
            ctx.target.get_custom_fields(limit, offset)
        }),
        ctx.pools.run_on(PoolKind::Target, ctx.target.get_system_fields()),
    )?;

    let enums = build_enum_maps(ctx, &system_fields).await?;
    ctx.stats.add_custom_fields(Side::Source, source_fields.len() as u64);
    tracing::info!(count = source_fields.len(), "Found source custom fields");

    let mut mappings = FieldMappings {
        enums,
        ..FieldMappings::default()
    };

    let scope = |id: SourceId| ctx.projects.get(&id);
    let mut creations = Vec::new();
    for field in &source_fields {
        if field.type_id == FIELD_TYPE_STEPS {
            mappings.step_fields.insert(field.name.clone());
        }
        match plan_field(field, &target_fields, &ctx.settings.fields, &scope) {
            FieldPlan::Skip => {
                tracing::debug!(field = %field.name, "Skipping custom field");
            }
            FieldPlan::Reuse(mapped) => {
                tracing::info!(field = %field.label, "Custom field already exists");
                mappings.custom.insert(field.name.clone(), mapped);
            }
            FieldPlan::Create(request) => creations.push((field, request)),
        }
    }

    let created = join_all(creations.into_iter().map(|(field, request)| async move {
        match ctx
            .pools
            .run_on(PoolKind::Target, ctx.target.create_custom_field(&request))
            .await
        {
            Ok(id) => {
                tracing::info!(field = %field.label, id, "Custom field created");
                ctx.stats.add_custom_fields(Side::Target, 1);
                Some((field.name.clone(), MappedField::new(field, id)))
            }
            Err(e) => {
                tracing::error!(field = %field.label, error = %e, "Failed to create custom field");
                ctx.stats.record_failure("fields");
                None
            }
        }
    }))
    .await;
    mappings.custom.extend(created.into_iter().flatten());

    if ctx.settings.refs_enabled {
        mappings.refs_field = refs_field(ctx, &target_fields).await;
    }

    ctx.set_field_mappings(mappings);
    Ok(())
}

async fn build_enum_maps(ctx: &MigrationContext, system: &[TargetSystemField]) -> PipelineResult<EnumMaps> {
    let (types, priorities, statuses) = tokio::try_join!(
        ctx.pools.run_on(PoolKind::Source, ctx.source.get_case_types()),
        ctx.pools.run_on(PoolKind::Source, ctx.source.get_priorities()),
        ctx.pools.run_on(PoolKind::Source, ctx.source.get_result_statuses()),
    )?;

    Ok(EnumMaps {
        types: map_enum_ids(&types, system_options(system, "type")),
        priorities: map_enum_ids(&priorities, system_options(system, "priority")),
        statuses: map_statuses(&statuses, system_options(system, "result_status")),
    })
}

fn system_options<'a>(fields: &'a [TargetSystemField], slug: &str) -> &'a [TargetSystemOption] {
    fields
        .iter()
        .find(|field| field.slug == slug)
        .map(|field| field.options.as_slice())
        .unwrap_or(&[])
}

/// Decide how to import one source field.
///
/// * `existing` - Custom fields already present in the target.
/// * `project_code` - Resolves a source project id to its planned code.
pub fn plan_field<F>(
    field: &SourceCaseField,
    existing: &[TargetCustomField],
    allow_list: &[String],
    project_code: F,
) -> FieldPlan
where
    F: Fn(SourceId) -> Option<ProjectCode>,
{
    if !field.is_active || !is_field_selected(field, allow_list) {
        return FieldPlan::Skip;
    }
    let Some(target_type) = target_field_type(field.type_id) else {
        return FieldPlan::Skip;
    };

    let reusable = existing.iter().find(|candidate| {
        candidate.title == field.label && target_type_from_name(&candidate.type_name) == Some(target_type)
    });
    if let Some(candidate) = reusable {
        return FieldPlan::Reuse(MappedField::bind_existing(field, candidate));
    }

    let mut request = CustomFieldCreate {
        title: field.label.clone(),
        entity: CASE_ENTITY,
        type_id: target_type,
        value: Vec::new(),
        is_filterable: true,
        is_visible: true,
        is_required: false,
        is_enabled_for_all_projects: true,
        projects_codes: Vec::new(),
        default_value: field.default_value(),
    };

    if let Some(project_ids) = field.project_scope() {
        request.is_enabled_for_all_projects = false;
        request.projects_codes = project_ids.into_iter().filter_map(&project_code).collect();
    }

    if field.type_id == FIELD_TYPE_DROPDOWN || field.type_id == FIELD_TYPE_MULTISELECT {
        match field.option_items() {
            Some(items) => request.value = target_options(&parse_options(items)),
            None => tracing::warn!(field = %field.label, "Select field has no options"),
        }
    }

    FieldPlan::Create(request)
}

/// Reuse or create the url field that carries case references.
async fn refs_field(ctx: &MigrationContext, existing: &[TargetCustomField]) -> Option<TargetId> {
    if let Some(field) = existing.iter().find(|f| f.title == REFS_FIELD_TITLE) {
        tracing::info!(id = field.id, "Found references field");
        return Some(field.id);
    }

    let request = CustomFieldCreate {
        title: REFS_FIELD_TITLE.to_string(),
        entity: CASE_ENTITY,
        type_id: REFS_FIELD_TYPE,
        value: Vec::new(),
        is_filterable: true,
        is_visible: true,
        is_required: false,
        is_enabled_for_all_projects: true,
        projects_codes: Vec::new(),
        default_value: None,
    };
    match ctx
        .pools
        .run_on(PoolKind::Target, ctx.target.create_custom_field(&request))
        .await
    {
        Ok(id) => {
            tracing::info!(id, "References field created");
            Some(id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create references field, references will be skipped");
            ctx.stats.record_failure("fields");
            None
        }
    }
}
