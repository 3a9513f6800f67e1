//! The migration pipeline.
//!
//! [`orchestrator::run_migration`] drives every stage against a shared
//! [`context::MigrationContext`]. Stages read from the source through the
//! source pool, write to the target through the target pool, and record
//! what they did in [`casebridge_core::stats::MigrationStats`].

pub mod attachments;
pub mod cases;
pub mod configurations;
pub mod context;
pub mod error;
pub mod fields;
pub mod milestones;
pub mod orchestrator;
pub mod projects;
pub mod runs;
pub mod settings;
pub mod shared_steps;
pub mod suites;
pub mod task_group;
pub mod users;

pub use context::MigrationContext;
pub use error::{PipelineError, PipelineResult};
pub use orchestrator::run_migration;
pub use settings::MigrationSettings;
