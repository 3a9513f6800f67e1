//! User matching between the two systems, with optional provisioning of
//! missing users in the target directory.

use std::sync::Arc;

use casebridge_core::mapping::{match_users, users_to_provision};
use casebridge_core::remote::DirectoryApi;
use casebridge_core::source::SourceUser;
use casebridge_core::stats::Side;
use casebridge_core::target::{TargetAuthor, UserProvision};
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::context::MigrationContext;
use crate::error::PipelineResult;
use crate::settings::TARGET_PAGE_SIZE;

/// Fill `ctx.users` with a target author for every source user.
pub async fn import_users(ctx: &MigrationContext) -> PipelineResult<()> {
    tracing::info!("Loading users");

    let (source, target) = tokio::join!(
        ctx.pools.run_on(PoolKind::Source, ctx.source.get_users()),
        load_authors(ctx),
    );
    let source = source?;
    let mut target = target?;

    if let (true, Some(directory)) = (ctx.settings.create_users, ctx.directory.as_ref()) {
        if provision_users(ctx, directory, &source, &target).await > 0 {
            target = load_authors(ctx).await?;
        }
    }

    ctx.stats.add_users(Side::Source, source.len() as u64);
    ctx.stats.add_users(Side::Target, target.len() as u64);

    let matched = match_users(&source, &target, ctx.settings.default_user_id);
    for (source_id, target_id) in matched {
        ctx.users.insert(source_id, target_id);
    }

    tracing::info!(
        source = source.len(),
        target = target.len(),
        "Users mapped",
    );
    Ok(())
}

async fn load_authors(ctx: &MigrationContext) -> PipelineResult<Vec<TargetAuthor>> {
    let authors = ctx
        .pools
        .collect_all(PoolKind::Target, TARGET_PAGE_SIZE, |limit, offset| {
            ctx.target.get_authors(limit, offset)
        })
        .await?;
    Ok(authors)
}

/// Create the migration group and every missing active user in it.
///
/// Returns how many users were created. Failures are logged and counted
/// under `users`; a group that cannot be created skips provisioning.
async fn provision_users(
    ctx: &MigrationContext,
    directory: &Arc<dyn DirectoryApi>,
    source: &[SourceUser],
    target: &[TargetAuthor],
) -> usize {
    let name = ctx.settings.users_group_name.as_str();
    let group = match ctx.pools.run_on(PoolKind::Target, directory.create_group(name)).await {
        Ok(group) => group,
        Err(e) => {
            tracing::error!(group = name, error = %e, "Failed to create user group");
            ctx.stats.record_failure("users");
            return 0;
        }
    };
    tracing::info!(group = name, id = %group, "User group created");
    let _ = ctx.users_group.set(group.clone());

    let missing = users_to_provision(source, target);
    let created = join_all(missing.iter().map(|user| provision_one(ctx, directory, &group, user))).await;
    let created = created.into_iter().filter(|ok| *ok).count();

    tracing::info!(missing = missing.len(), created, "Users provisioned");
    created
}

async fn provision_one(
    ctx: &MigrationContext,
    directory: &Arc<dyn DirectoryApi>,
    group: &str,
    user: &UserProvision,
) -> bool {
    let user_id = match ctx.pools.run_on(PoolKind::Target, directory.create_user(user)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(email = %user.email, error = %e, "Failed to create user");
            ctx.stats.record_failure("users");
            return false;
        }
    };
    if let Err(e) = ctx
        .pools
        .run_on(PoolKind::Target, directory.add_user_to_group(group, &user_id))
        .await
    {
        tracing::warn!(email = %user.email, group, error = %e, "Failed to add user to group");
        ctx.stats.record_failure("users");
    }
    true
}
