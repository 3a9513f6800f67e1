//! Per-run counters of what was read from the source and written to the
//! target.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

/// Which side of the migration a count belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// Project-scoped entity kinds that are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Suites,
    Cases,
    Runs,
    Results,
    Milestones,
    SharedSteps,
    Configurations,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityCounts {
    pub suites: u64,
    pub cases: u64,
    pub runs: u64,
    pub results: u64,
    pub milestones: u64,
    pub shared_steps: u64,
    pub configurations: u64,
}

impl EntityCounts {
    fn slot(&mut self, entity: Entity) -> &mut u64 {
        match entity {
            Entity::Suites => &mut self.suites,
            Entity::Cases => &mut self.cases,
            Entity::Runs => &mut self.runs,
            Entity::Results => &mut self.results,
            Entity::Milestones => &mut self.milestones,
            Entity::SharedSteps => &mut self.shared_steps,
            Entity::Configurations => &mut self.configurations,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectStats {
    pub title: String,
    pub source: EntityCounts,
    pub target: EntityCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SideCounts {
    pub source: u64,
    pub target: u64,
}

impl SideCounts {
    fn slot(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::Source => &mut self.source,
            Side::Target => &mut self.target,
        }
    }
}

/// Serializable view of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub projects: BTreeMap<String, ProjectStats>,
    pub users: SideCounts,
    pub attachments: SideCounts,
    pub custom_fields: SideCounts,
    /// Failed operations per stage name.
    pub failures: BTreeMap<String, u64>,
}

/// Thread-safe migration counters.
#[derive(Debug, Default)]
pub struct MigrationStats {
    inner: Mutex<StatsSnapshot>,
}

impl MigrationStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut StatsSnapshot) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn add_project(&self, code: &str, title: &str) {
        self.with(|s| {
            s.projects.entry(code.to_string()).or_default().title = title.to_string();
        });
    }

    pub fn add_entity(&self, code: &str, entity: Entity, side: Side, count: u64) {
        self.with(|s| {
            let project = s.projects.entry(code.to_string()).or_default();
            let counts = match side {
                Side::Source => &mut project.source,
                Side::Target => &mut project.target,
            };
            *counts.slot(entity) += count;
        });
    }

    pub fn add_users(&self, side: Side, count: u64) {
        self.with(|s| *s.users.slot(side) += count);
    }

    pub fn add_attachments(&self, side: Side, count: u64) {
        self.with(|s| *s.attachments.slot(side) += count);
    }

    pub fn add_custom_fields(&self, side: Side, count: u64) {
        self.with(|s| *s.custom_fields.slot(side) += count);
    }

    pub fn record_failure(&self, stage: &str) {
        self.with(|s| *s.failures.entry(stage.to_string()).or_default() += 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.with(|s| s.clone())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}
