//! Attachment transfer and inline marker rewriting.
//!
//! Attachments reach the target in one of two ways: the optional bulk pass
//! uploads everything the source lists up front, and the rewriter uploads
//! any attachment the first time a text or result references it.

use casebridge_core::attachments::{find_attachment_ids, normalize_attachment_id, rewrite_markers};
use casebridge_core::remote::ATTACHMENT_PAGE_SIZE;
use casebridge_core::source::SourceAttachmentRef;
use casebridge_core::stats::Side;
use casebridge_core::target::AttachmentHandle;
use casebridge_runtime::PoolKind;
use futures::future::join_all;

use crate::context::MigrationContext;
use crate::error::PipelineResult;

/// Rewrites inline markers, uploading missing attachments on demand.
#[derive(Clone, Copy)]
pub struct AttachmentRewriter<'a> {
    ctx: &'a MigrationContext,
}

impl<'a> AttachmentRewriter<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self { ctx }
    }

    /// Handle for `id`, uploading the attachment into project `code` when
    /// it has not been transferred yet. `None` when the transfer fails.
    ///
    /// Each id is transferred at most once per run: concurrent callers wait
    /// on the same transfer, and a failed transfer is not retried.
    pub async fn ensure(&self, id: &str, code: &str) -> Option<AttachmentHandle> {
        let id = normalize_attachment_id(id);
        if let Some(handle) = self.ctx.attachments.get(&id.to_string()) {
            return Some(handle);
        }

        let slot = self
            .ctx
            .attachment_transfers
            .get_or_insert_with(id.to_string(), Default::default);
        slot.get_or_init(|| async {
            tracing::debug!(attachment = id, project = code, "Attachment not transferred yet, uploading");
            let handle = transfer(self.ctx, id, code).await;
            if let Some(handle) = &handle {
                self.ctx.attachments.insert(id.to_string(), handle.clone());
            }
            handle
        })
        .await
        .clone()
    }

    /// Make sure every id is transferred. Ids that cannot be transferred
    /// stay unknown and are dropped by later lookups.
    pub async fn ensure_all<I>(&self, ids: I, code: &str)
    where
        I: IntoIterator<Item = String>,
    {
        let mut distinct: Vec<String> = Vec::new();
        for id in ids {
            let id = normalize_attachment_id(&id).to_string();
            if !distinct.contains(&id) && !self.ctx.attachments.contains(&id) {
                distinct.push(id);
            }
        }
        join_all(distinct.iter().map(|id| self.ensure(id, code))).await;
    }

    /// Replace every inline marker in `text` with a link to the uploaded
    /// file. Markers whose attachment cannot be transferred are kept.
    pub async fn rewrite(&self, text: &str, code: &str) -> String {
        let ids = find_attachment_ids(text);
        if ids.is_empty() {
            return text.to_string();
        }
        self.ensure_all(ids, code).await;
        rewrite_markers(text, |id| self.ctx.attachments.get(&id.to_string()))
    }

    pub async fn rewrite_opt(&self, text: Option<&str>, code: &str) -> String {
        match text {
            Some(text) if !text.is_empty() => self.rewrite(text, code).await,
            _ => String::new(),
        }
    }
}

/// Download one attachment from the source and upload it into `code`.
async fn transfer(ctx: &MigrationContext, id: &str, code: &str) -> Option<AttachmentHandle> {
    let file = match ctx
        .pools
        .run_on(PoolKind::Source, ctx.source.get_attachment(id))
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(attachment = id, error = %e, "Failed to download attachment");
            ctx.stats.record_failure("attachments");
            return None;
        }
    };

    match ctx
        .pools
        .run_on(PoolKind::Target, ctx.target.upload_attachment(code, file))
        .await
    {
        Ok(handle) => {
            ctx.stats.add_attachments(Side::Target, 1);
            Some(handle)
        }
        Err(e) => {
            tracing::error!(attachment = id, project = code, error = %e, "Failed to upload attachment");
            ctx.stats.record_failure("attachments");
            None
        }
    }
}

/// Transfer every attachment the source lists, filing each under the
/// first project it belongs to.
pub async fn import_all(ctx: &MigrationContext) -> PipelineResult<()> {
    tracing::info!("Importing all attachments");
    let listed = ctx
        .pools
        .collect_all(PoolKind::Source, ATTACHMENT_PAGE_SIZE, |limit, offset| {
            ctx.source.list_attachments(limit, offset)
        })
        .await?;
    ctx.stats.add_attachments(Side::Source, listed.len() as u64);

    join_all(listed.iter().map(|attachment| import_listed(ctx, attachment))).await;

    tracing::info!(
        listed = listed.len(),
        transferred = ctx.attachments.len(),
        "Attachment import finished",
    );
    Ok(())
}

async fn import_listed(ctx: &MigrationContext, attachment: &SourceAttachmentRef) {
    let Some(&project_id) = attachment.project_ids.first() else {
        tracing::warn!(attachment = %attachment.id, "Attachment is not linked to any project");
        return;
    };
    if attachment.project_ids.len() > 1 {
        tracing::warn!(attachment = %attachment.id, "Attachment is linked to several projects, using the first");
    }
    let Some(code) = ctx.projects.get(&project_id) else {
        tracing::debug!(attachment = %attachment.id, project_id, "Attachment belongs to a project that is not imported");
        return;
    };

    AttachmentRewriter::new(ctx).ensure(&attachment.id, &code).await;
}
