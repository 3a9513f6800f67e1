//! Shared state for one migration run.
//!
//! Every stage receives the same [`MigrationContext`]. It owns the remote
//! clients, the two executor pools, the settings, and every id map built
//! along the way. Maps use their own locks, none of which is held across an
//! await point.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use casebridge_core::id_map::{IdMap, ProjectMapRegistry};
use casebridge_core::mapping::{EnumMaps, MappedField};
use casebridge_core::project_code::ProjectCodeRegistry;
use casebridge_core::remote::{DirectoryApi, SourceApi, TargetApi};
use casebridge_core::source::SourceProject;
use casebridge_core::stats::MigrationStats;
use casebridge_core::target::AttachmentHandle;
use casebridge_core::types::{ProjectCode, SourceId, TargetId};
use casebridge_runtime::Pools;
use tokio::sync::OnceCell;

use crate::settings::MigrationSettings;

/// Outcome of one attachment transfer, `None` when it failed.
pub(crate) type AttachmentTransfer = Arc<OnceCell<Option<AttachmentHandle>>>;

/// Field and enumeration mappings produced by the fields stage.
#[derive(Debug, Clone, Default)]
pub struct FieldMappings {
    pub enums: EnumMaps,
    /// Imported custom fields by source name (without `custom_`).
    pub custom: HashMap<String, MappedField>,
    /// Source names of separated-steps fields.
    pub step_fields: BTreeSet<String>,
    pub refs_field: Option<TargetId>,
}

/// A source project selected for import and the code assigned to it.
#[derive(Debug, Clone)]
pub struct PlannedProject {
    pub source: SourceProject,
    pub code: ProjectCode,
}

pub struct MigrationContext {
    pub source: Arc<dyn SourceApi>,
    pub target: Arc<dyn TargetApi>,
    /// Target directory, present when users are provisioned.
    pub directory: Option<Arc<dyn DirectoryApi>>,
    pub pools: Pools,
    pub settings: MigrationSettings,
    pub codes: ProjectCodeRegistry,
    pub project_maps: ProjectMapRegistry,
    /// Source user id to target author id.
    pub users: IdMap<TargetId>,
    /// Normalised source attachment id to uploaded file.
    pub attachments: IdMap<AttachmentHandle, String>,
    /// One transfer slot per attachment id; concurrent callers share it.
    pub(crate) attachment_transfers: IdMap<AttachmentTransfer, String>,
    /// Source project id to target project code.
    pub projects: IdMap<ProjectCode>,
    pub stats: MigrationStats,
    /// Directory group holding provisioned users; new projects are shared with it.
    pub users_group: OnceLock<String>,
    fields: RwLock<Arc<FieldMappings>>,
}

impl MigrationContext {
    pub fn new(
        source: Arc<dyn SourceApi>,
        target: Arc<dyn TargetApi>,
        pools: Pools,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            source,
            target,
            directory: None,
            pools,
            settings,
            codes: ProjectCodeRegistry::new(),
            project_maps: ProjectMapRegistry::new(),
            users: IdMap::new(),
            attachments: IdMap::new(),
            attachment_transfers: IdMap::new(),
            projects: IdMap::new(),
            stats: MigrationStats::new(),
            users_group: OnceLock::new(),
            fields: RwLock::new(Arc::new(FieldMappings::default())),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn DirectoryApi>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Target author for a source user, falling back to the default user.
    pub fn author_of(&self, user: Option<SourceId>) -> TargetId {
        user.and_then(|id| self.users.get(&id))
            .unwrap_or(self.settings.default_user_id)
    }

    pub fn field_mappings(&self) -> Arc<FieldMappings> {
        Arc::clone(&self.fields.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn set_field_mappings(&self, mappings: FieldMappings) {
        *self.fields.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(mappings);
    }
}
