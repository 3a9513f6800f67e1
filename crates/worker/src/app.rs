//! Builds the clients and pools from a [`MigrationConfig`] and runs the
//! pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use casebridge_core::stats::{MigrationStats, StatsSnapshot};
use casebridge_pipeline::{run_migration, MigrationContext};
use casebridge_qase::{QaseClient, ScimClient};
use casebridge_runtime::Pools;
use casebridge_testrail::TestrailClient;

use crate::config::MigrationConfig;

/// Run a full migration and write its statistics. Returns the path of the
/// statistics file.
pub async fn run(config: MigrationConfig) -> anyhow::Result<PathBuf> {
    let stats_path = config.stats_path();

    let source = TestrailClient::connect(config.source, config.retry)
        .await
        .context("failed to create source client")?;
    let target = QaseClient::new(config.target, config.retry).context("failed to create target client")?;
    let pools = Pools::new(
        config.source_pool.executor("source"),
        config.target_pool.executor("target"),
    );

    tracing::info!(
        source_workers = config.source_pool.max_workers,
        target_workers = config.target_pool.max_workers,
        bulk_attachments = config.settings.attachments_bulk_import,
        "Clients ready",
    );

    let mut ctx = MigrationContext::new(Arc::new(source), Arc::new(target), pools, config.settings);
    if let Some(directory) = config.directory {
        let directory = ScimClient::new(directory, config.retry).context("failed to create directory client")?;
        ctx = ctx.with_directory(Arc::new(directory));
    }
    let stats = run_migration(&ctx).await?;

    write_stats(&stats_path, &ctx.stats).await?;
    log_summary(&stats);
    Ok(stats_path)
}

/// Write `stats` as pretty JSON, creating the parent directory if needed.
pub async fn write_stats(path: &Path, stats: &MigrationStats) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = stats.to_json_pretty()?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn log_summary(stats: &StatsSnapshot) {
    for (code, project) in &stats.projects {
        tracing::info!(
            project = %code,
            suites = project.target.suites,
            cases = project.target.cases,
            runs = project.target.runs,
            results = project.target.results,
            "Project summary",
        );
    }
    let failures: u64 = stats.failures.values().sum();
    if failures > 0 {
        tracing::warn!(failures, stages = ?stats.failures, "Migration finished with failures");
    }
}
