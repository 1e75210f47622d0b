//! Pipeline-progress aggregation. A pure query over the
//! current status of every task in a pipeline — no separate state.

use crate::model::{TaskId, TaskKind, TaskStatus};

/// One task's contribution to the aggregate, as seen by the aggregator.
#[derive(Debug, Clone)]
pub struct TaskProgressInput {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub weight: i32,
    /// Latest `progress.percent` row for this task, if any. Only consulted
    /// while `status == Processing`.
    pub in_flight_percent: Option<i16>,
}

impl TaskProgressInput {
    /// This task's contribution to the pipeline-level aggregate.
    pub fn task_progress(&self) -> i16 {
        match self.status {
            TaskStatus::Completed => 100,
            TaskStatus::Queued => 0,
            TaskStatus::Processing => self.in_flight_percent.unwrap_or(0).clamp(0, 99),
            TaskStatus::Failed | TaskStatus::Cancelled => 0,
        }
    }
}

/// Per-task view returned alongside the aggregate percent by `get_pipeline_progress`.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    pub percent: u8,
    pub per_task: Vec<TaskProgressEntry>,
    /// Set once every task in the pipeline has reached a terminal status.
    pub terminal: bool,
    /// Set when `terminal` and at least one task ended `failed`/`cancelled`.
    pub partial_failure: bool,
}

#[derive(Debug, Clone)]
pub struct TaskProgressEntry {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: i16,
}

/// `aggregate = round(sum(weight * task_progress) / sum(weight))`.
///
/// An empty pipeline (no tasks) aggregates to 0% and is reported terminal,
/// matching "a pipeline has no row of its own beyond what can be derived
/// from its tasks" — nothing to derive means nothing pending.
pub fn aggregate_pipeline_progress(tasks: &[TaskProgressInput]) -> PipelineProgress {
    let total_weight: i64 = tasks.iter().map(|t| t.weight.max(0) as i64).sum();

    let percent = if total_weight == 0 {
        0
    } else {
        let weighted: i64 = tasks
            .iter()
            .map(|t| t.weight.max(0) as i64 * t.task_progress() as i64)
            .sum();
        ((weighted as f64 / total_weight as f64).round() as i64).clamp(0, 100) as u8
    };

    let terminal = !tasks.is_empty() && tasks.iter().all(|t| t.status.is_terminal());
    let partial_failure = terminal
        && tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Cancelled));

    let per_task = tasks
        .iter()
        .map(|t| TaskProgressEntry {
            id: t.id,
            kind: t.kind.clone(),
            status: t.status,
            progress: t.task_progress(),
        })
        .collect();

    PipelineProgress {
        percent,
        per_task,
        terminal,
        partial_failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: TaskId, status: TaskStatus, weight: i32, in_flight: Option<i16>) -> TaskProgressInput {
        TaskProgressInput {
            id,
            kind: "k".into(),
            status,
            weight,
            in_flight_percent: in_flight,
        }
    }

    #[test]
    fn empty_pipeline_is_zero_and_terminal_false() {
        let p = aggregate_pipeline_progress(&[]);
        assert_eq!(p.percent, 0);
        assert!(!p.terminal);
    }

    #[test]
    fn equal_weight_linear_pipeline_visits_expected_percentages() {
        // Matches S1: A -> B -> C, weights 1/1/1.
        let only_a_running = aggregate_pipeline_progress(&[
            task(1, TaskStatus::Processing, 1, Some(0)),
            task(2, TaskStatus::Queued, 1, None),
            task(3, TaskStatus::Queued, 1, None),
        ]);
        assert_eq!(only_a_running.percent, 0);

        let a_done = aggregate_pipeline_progress(&[
            task(1, TaskStatus::Completed, 1, None),
            task(2, TaskStatus::Queued, 1, None),
            task(3, TaskStatus::Queued, 1, None),
        ]);
        assert_eq!(a_done.percent, 33);

        let ab_done = aggregate_pipeline_progress(&[
            task(1, TaskStatus::Completed, 1, None),
            task(2, TaskStatus::Completed, 1, None),
            task(3, TaskStatus::Queued, 1, None),
        ]);
        assert_eq!(ab_done.percent, 67);

        let all_done = aggregate_pipeline_progress(&[
            task(1, TaskStatus::Completed, 1, None),
            task(2, TaskStatus::Completed, 1, None),
            task(3, TaskStatus::Completed, 1, None),
        ]);
        assert_eq!(all_done.percent, 100);
        assert!(all_done.terminal);
        assert!(!all_done.partial_failure);
    }

    #[test]
    fn failed_task_contributes_zero_and_marks_partial_failure() {
        // Matches S4: A -> {B, C}, A fails permanently, B and C cascade-cancelled.
        let p = aggregate_pipeline_progress(&[
            task(1, TaskStatus::Failed, 1, None),
            task(2, TaskStatus::Cancelled, 1, None),
            task(3, TaskStatus::Cancelled, 1, None),
        ]);
        assert_eq!(p.percent, 0);
        assert!(p.terminal);
        assert!(p.partial_failure);
    }

    #[test]
    fn weights_skew_the_aggregate() {
        let p = aggregate_pipeline_progress(&[
            task(1, TaskStatus::Completed, 9, None),
            task(2, TaskStatus::Queued, 1, None),
        ]);
        assert_eq!(p.percent, 90);
    }

    #[test]
    fn retry_can_drop_per_task_progress_and_the_aggregate_with_it() {
        // Progress is monotone only in the absence of retries.
        let mid_run = aggregate_pipeline_progress(&[task(1, TaskStatus::Processing, 1, Some(80))]);
        assert_eq!(mid_run.percent, 80);

        let after_retry = aggregate_pipeline_progress(&[task(1, TaskStatus::Processing, 1, Some(0))]);
        assert_eq!(after_retry.percent, 0);
    }
}
