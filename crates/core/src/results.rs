//! Result aggregation: cleaning, comment merging, ordering, chunking and
//! target payload construction.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::DateTime;

use crate::error::CoreError;
use crate::mapping::EnumMaps;
use crate::source::{Elapsed, SourceResult, SourceStepResult};
use crate::target::{ResultCreate, StepResultCreate};
use crate::types::{SourceId, TargetId, UnixTime};

/// Source status of superseded "retest" entries, which are never migrated.
pub const RETEST_STATUS_ID: i64 = 3;

/// Maximum number of results sent in one bulk request.
pub const RESULT_CHUNK_SIZE: usize = 500;

/// What to do with a comment-only record whose test has no status-bearing
/// result to merge into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanCommentPolicy {
    #[default]
    Drop,
    /// Keep the comment as a standalone record with the fallback status.
    Preserve,
}

impl FromStr for OrphanCommentPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "preserve" => Ok(Self::Preserve),
            other => Err(CoreError::Validation(format!(
                "unknown orphan comment policy '{other}', expected 'drop' or 'preserve'"
            ))),
        }
    }
}

/// A cleaned source result ready for merging and submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub id: SourceId,
    pub test_id: SourceId,
    /// `None` marks a comment-only record.
    pub status_id: Option<i64>,
    pub created_on: UnixTime,
    pub created_by: Option<SourceId>,
    pub comment: Option<String>,
    pub elapsed_secs: i64,
    /// Target attachment hashes.
    pub attachments: Vec<String>,
    pub step_results: Vec<SourceStepResult>,
}

impl ResultRecord {
    pub fn is_comment(&self) -> bool {
        self.status_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Drop retest entries and resolve attachment references.
///
/// `resolve` maps a normalised attachment id to a target hash; ids it
/// cannot resolve are dropped with a warning.
pub fn clean_results<F>(results: Vec<SourceResult>, resolve: F) -> Vec<ResultRecord>
where
    F: Fn(&str) -> Option<String>,
{
    results
        .into_iter()
        .filter(|r| r.status_id != Some(RETEST_STATUS_ID))
        .map(|r| {
            let attachments = r
                .attachment_ids
                .iter()
                .filter_map(|reference| {
                    let key = reference.key();
                    let hash = resolve(&key);
                    if hash.is_none() {
                        tracing::warn!(
                            result_id = r.id,
                            attachment = %key,
                            "Attachment not found in attachment map, dropping"
                        );
                    }
                    hash
                })
                .collect();

            ResultRecord {
                id: r.id,
                test_id: r.test_id,
                status_id: r.status_id,
                created_on: r.created_on,
                created_by: r.created_by,
                comment: r.comment,
                elapsed_secs: r.elapsed.as_ref().map(parse_elapsed).unwrap_or(0),
                attachments,
                step_results: r.custom_step_results.unwrap_or_default(),
            }
        })
        .collect()
}

/// Fold comment-only records into a status-bearing sibling.
///
/// The target is the sibling (same test) with the latest timestamp at or
/// before the comment, or the earliest sibling when none precede it.
/// Comments without any sibling follow `policy`.
pub fn merge_comments(records: Vec<ResultRecord>, policy: OrphanCommentPolicy) -> Vec<ResultRecord> {
    let (mut comments, mut merged): (Vec<_>, Vec<_>) =
        records.into_iter().partition(ResultRecord::is_comment);
    comments.sort_by_key(|c| c.created_on);

    let mut by_test: HashMap<SourceId, Vec<usize>> = HashMap::new();
    for (i, record) in merged.iter().enumerate() {
        by_test.entry(record.test_id).or_default().push(i);
    }

    let mut orphans = Vec::new();
    for comment in comments {
        let Some(siblings) = by_test.get(&comment.test_id) else {
            orphans.push(comment);
            continue;
        };

        let preceding = siblings
            .iter()
            .copied()
            .filter(|&i| merged[i].created_on <= comment.created_on)
            .max_by_key(|&i| merged[i].created_on);
        let target = preceding.or_else(|| siblings.iter().copied().min_by_key(|&i| merged[i].created_on));

        if let Some(i) = target {
            append_comment(&mut merged[i], comment);
        }
    }

    match policy {
        OrphanCommentPolicy::Drop => {
            for orphan in &orphans {
                tracing::debug!(
                    result_id = orphan.id,
                    test_id = orphan.test_id,
                    "Dropping comment without a status-bearing result"
                );
            }
        }
        OrphanCommentPolicy::Preserve => merged.extend(orphans),
    }

    merged
}

fn append_comment(record: &mut ResultRecord, comment: ResultRecord) {
    let added = format!(
        "\nOn {} a comment was added:\n{}",
        format_timestamp(comment.created_on),
        comment.comment.unwrap_or_default()
    );
    match record.comment.as_mut() {
        Some(text) => text.push_str(&added),
        None => record.comment = Some(added),
    }
    record.attachments.extend(comment.attachments);
}

/// Stable ascending sort by creation time.
pub fn sort_chronologically(records: &mut [ResultRecord]) {
    records.sort_by_key(|r| r.created_on);
}

/// Split into consecutive batches of at most `size` items.
pub fn chunk_results<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Seconds represented by an elapsed value such as `"1d 2h 3m 4s"`.
///
/// Unrecognised components count as zero. Values too large for an `i64`
/// saturate.
pub fn parse_elapsed(elapsed: &Elapsed) -> i64 {
    match elapsed {
        Elapsed::Seconds(secs) => (*secs).max(0),
        Elapsed::Text(text) => text
            .split_whitespace()
            .map(|component| {
                let Some((split, unit)) = component.char_indices().last() else {
                    return 0;
                };
                let number = &component[..split];
                let factor = match unit {
                    'd' => 86_400,
                    'h' => 3_600,
                    'm' => 60,
                    's' => 1,
                    _ => return 0,
                };
                number
                    .parse::<i64>()
                    .map(|n| n.max(0).saturating_mul(factor))
                    .unwrap_or(0)
            })
            .fold(0, i64::saturating_add),
    }
}

/// Per-run inputs needed to turn records into target payloads.
pub struct PayloadContext<'a> {
    /// Start of the run; result start times never precede it.
    pub run_start: UnixTime,
    /// Source test id to case id.
    pub cases: &'a HashMap<SourceId, SourceId>,
    pub enums: &'a EnumMaps,
    pub author_of: &'a (dyn Fn(SourceId) -> TargetId + Send + Sync),
}

/// Build the target payload for one record, or `None` when its test has
/// no case in this run.
pub fn build_result_payload(record: &ResultRecord, ctx: &PayloadContext<'_>) -> Option<ResultCreate> {
    let Some(&case_id) = ctx.cases.get(&record.test_id) else {
        tracing::warn!(
            result_id = record.id,
            test_id = record.test_id,
            "Result has no case in this run, skipping"
        );
        return None;
    };

    let start_time = if record.created_on > 0 {
        record.created_on.saturating_sub(record.elapsed_secs).max(ctx.run_start)
    } else {
        ctx.run_start
    };

    let steps = record
        .step_results
        .iter()
        .map(|step| StepResultCreate {
            status: ctx.enums.step_status(step.status_id),
            comment: step
                .actual
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
        })
        .collect();

    Some(ResultCreate {
        case_id,
        status: ctx.enums.status(record.status_id),
        time_ms: record.elapsed_secs.saturating_mul(1000),
        comment: record.comment.clone().unwrap_or_default(),
        attachments: record.attachments.clone(),
        start_time: Some(start_time),
        author_id: record.created_by.map(ctx.author_of),
        steps,
    })
}

/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_timestamp(ts: UnixTime) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
