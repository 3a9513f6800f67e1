//! Knobs that shape what the pipeline imports.

use casebridge_core::results::OrphanCommentPolicy;
use casebridge_core::types::{TargetId, UnixTime};
use url::Url;

/// Page size for source listings.
pub const DEFAULT_PAGE_SIZE: u32 = 250;

/// Page size for target listings.
pub const TARGET_PAGE_SIZE: u32 = 100;

/// Directory group that provisioned users join.
pub const DEFAULT_USERS_GROUP: &str = "TestRail Migration";

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Project names to import; empty imports every project.
    pub projects: Vec<String>,
    /// Import projects the source marks as completed.
    pub import_completed: bool,
    /// Custom field names to import; empty imports every `custom_` field.
    pub fields: Vec<String>,
    /// Copy case references into a url field.
    pub refs_enabled: bool,
    /// Base joined onto relative references.
    pub refs_base: Option<Url>,
    /// Target author used for unmatched source users.
    pub default_user_id: TargetId,
    /// Provision unmatched active source users in the target directory.
    pub create_users: bool,
    pub users_group_name: String,
    /// Only runs and plans created after this time are imported.
    pub runs_created_after: Option<UnixTime>,
    pub orphan_comments: OrphanCommentPolicy,
    /// Upload every attachment up front instead of on first reference.
    pub attachments_bulk_import: bool,
    pub page_size: u32,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            import_completed: false,
            fields: Vec::new(),
            refs_enabled: false,
            refs_base: None,
            default_user_id: 1,
            create_users: false,
            users_group_name: DEFAULT_USERS_GROUP.to_string(),
            runs_created_after: None,
            orphan_comments: OrphanCommentPolicy::default(),
            attachments_bulk_import: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
