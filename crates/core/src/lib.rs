//! Domain logic for migrating test-management data between two systems.
//!
//! Everything here is free of I/O: typed source and target records, the
//! remote seams ([`remote::SourceApi`], [`remote::TargetApi`]), and the pure
//! mapping, ordering and aggregation rules the pipeline applies.

pub mod attachments;
pub mod error;
pub mod hierarchy;
pub mod id_map;
pub mod mapping;
pub mod project_code;
pub mod remote;
pub mod results;
pub mod runs;
pub mod source;
pub mod stats;
pub mod target;
pub mod types;
