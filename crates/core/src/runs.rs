//! Run index entries and run payload construction.

use crate::results::{format_timestamp, ResultRecord};
use crate::source::{SourcePlan, SourceRun};
use crate::target::RunCreate;
use crate::types::{SourceId, TargetId, UnixTime};

/// One run to import, either standalone or taken from a test plan.
#[derive(Debug, Clone, PartialEq)]
pub struct RunIndexEntry {
    pub id: SourceId,
    pub name: String,
    pub description: Option<String>,
    pub created_on: UnixTime,
    pub completed_on: Option<UnixTime>,
    pub is_completed: bool,
    pub milestone_id: Option<SourceId>,
    pub config_ids: Vec<SourceId>,
    pub created_by: Option<SourceId>,
    pub plan_id: Option<SourceId>,
    pub plan_name: Option<String>,
}

impl RunIndexEntry {
    pub fn from_run(run: SourceRun) -> Self {
        Self {
            id: run.id,
            name: run.name,
            description: run.description.filter(|d| !d.is_empty()),
            created_on: run.created_on,
            completed_on: run.completed_on,
            is_completed: run.is_completed,
            milestone_id: run.milestone_id,
            config_ids: run.config_ids,
            created_by: run.created_by,
            plan_id: None,
            plan_name: None,
        }
    }

    /// Target title: plan runs are prefixed with the plan name.
    pub fn title(&self) -> String {
        match self.plan_name.as_deref() {
            Some(plan) if !plan.is_empty() => format!("[{plan}] {}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Effective start: the earliest of the run's own creation time and
    /// its results.
    pub fn start_time(&self, results: &[ResultRecord]) -> UnixTime {
        let own = (self.created_on > 0).then_some(self.created_on);
        results
            .iter()
            .map(|r| r.created_on)
            .filter(|&t| t > 0)
            .chain(own)
            .min()
            .unwrap_or(self.created_on)
    }
}

/// Every run of every entry of a plan, tagged with the plan.
pub fn flatten_plan(plan: SourcePlan) -> Vec<RunIndexEntry> {
    let SourcePlan { id, name, entries } = plan;
    entries
        .into_iter()
        .flat_map(|entry| entry.runs)
        .map(|run| RunIndexEntry {
            plan_id: Some(id),
            plan_name: Some(name.clone()),
            ..RunIndexEntry::from_run(run)
        })
        .collect()
}

/// Target-side references resolved for one run.
#[derive(Debug, Clone, Default)]
pub struct RunLinks {
    pub author_id: TargetId,
    pub milestone_id: Option<TargetId>,
    pub configurations: Vec<TargetId>,
    /// Case ids included in the run.
    pub cases: Vec<SourceId>,
}

pub fn build_run_payload(entry: &RunIndexEntry, start: UnixTime, links: RunLinks) -> RunCreate {
    let end_time = if entry.is_completed {
        entry.completed_on.map(format_timestamp)
    } else {
        None
    };

    RunCreate {
        title: entry.title(),
        description: entry.description.clone(),
        start_time: format_timestamp(start),
        end_time,
        author_id: links.author_id,
        milestone_id: links.milestone_id,
        configurations: links.configurations,
        cases: links.cases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourcePlanEntry;

    fn run(id: SourceId, created_on: UnixTime) -> SourceRun {
        serde_json::from_value(serde_json::json!({
            "id": id, "name": format!("Run {id}"), "created_on": created_on,
        }))
        .unwrap()
    }

    #[test]
    fn plan_runs_are_tagged_and_prefixed() {
        let plan = SourcePlan {
            id: 5,
            name: "Release 1".into(),
            entries: vec![
                SourcePlanEntry { runs: vec![run(1, 10), run(2, 20)] },
                SourcePlanEntry { runs: vec![run(3, 30)] },
            ],
        };
        let entries = flatten_plan(plan);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].plan_id, Some(5));
        assert_eq!(entries[0].title(), "[Release 1] Run 1");
        assert_eq!(RunIndexEntry::from_run(run(9, 0)).title(), "Run 9");
    }

    #[test]
    fn start_time_takes_earliest_result() {
        let entry = RunIndexEntry::from_run(run(1, 500));
        let early = ResultRecord {
            id: 1,
            test_id: 1,
            status_id: Some(1),
            created_on: 400,
            created_by: None,
            comment: None,
            elapsed_secs: 0,
            attachments: vec![],
            step_results: vec![],
        };
        assert_eq!(entry.start_time(&[early]), 400);
        assert_eq!(entry.start_time(&[]), 500);
    }

    #[test]
    fn payload_sets_end_time_only_when_completed() {
        let mut entry = RunIndexEntry::from_run(run(1, 0));
        entry.completed_on = Some(86_400);
        let open = build_run_payload(&entry, 0, RunLinks::default());
        assert_eq!(open.start_time, "1970-01-01 00:00:00");
        assert!(open.end_time.is_none());

        entry.is_completed = true;
        let done = build_run_payload(&entry, 0, RunLinks { author_id: 4, ..Default::default() });
        assert_eq!(done.end_time.as_deref(), Some("1970-01-02 00:00:00"));
        assert_eq!(done.author_id, 4);
    }
}
